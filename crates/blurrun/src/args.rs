//! # Canonical Argument Adapter
//!
//! Normalizes positional and record call styles into a named-argument record
//! with defaults applied. Pure: nothing here touches the backend.
//!
//! ## Invariants
//! - Every declared argument is present in the output, explicitly or by default
//!   (`Null` when the declaration has no default).
//! - A required argument that ends up unset is an error, raised before any
//!   network activity.

use crate::value::Kwargs;
use crate::value::SOURCE;
use crate::value::TARGET;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A positional call supplied more values than there are declared arguments.
    TooManyPositional { declared: usize, received: usize },
    /// A required argument was not supplied.
    MissingRequired(String),
    /// A record call used a key that is neither declared nor reserved.
    UnknownArgument(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooManyPositional { declared, received } => {
                write!(f, "expected at most {} positional arguments, received {}", declared, received)
            }
            Self::MissingRequired(name) => write!(f, "missing required argument '{}'", name),
            Self::UnknownArgument(name) => write!(f, "unknown argument '{}'", name),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// Declaration of one operation argument.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgSpec {
    pub name: String,
    pub default: Option<Value>,
    pub required: bool,
}

impl ArgSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
            required: false,
        }
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

impl From<&str> for ArgSpec {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// The two call styles an operation accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum Args {
    Positional(Vec<Value>),
    Keyword(Kwargs),
}

impl Args {
    /// Picks the call style of a raw argument list: a lone record whose keys
    /// are all known argument names is a keyword call, anything else is
    /// positional.
    pub fn infer(values: Vec<Value>, specs: &[ArgSpec]) -> Self {
        match <[Value; 1]>::try_from(values) {
            Ok([Value::Record(record)]) if record.keys().all(|key| is_known(key, specs)) => {
                Self::Keyword(record)
            }
            Ok([value]) => Self::Positional(vec![value]),
            Err(values) => Self::Positional(values),
        }
    }
}

impl Default for Args {
    fn default() -> Self {
        Self::Keyword(Kwargs::new())
    }
}

impl From<Kwargs> for Args {
    fn from(kwargs: Kwargs) -> Self {
        Self::Keyword(kwargs)
    }
}

fn is_reserved(key: &str) -> bool {
    key == SOURCE || key == TARGET
}

fn is_known(key: &str, specs: &[ArgSpec]) -> bool {
    is_reserved(key) || specs.iter().any(|spec| spec.name == key)
}

/// Builds the canonical kwargs record for a call.
///
/// Reserved keys (`source`, `target`) come first in the output, followed by
/// the declared arguments in declaration order.
pub fn adapt(args: Args, specs: &[ArgSpec]) -> Result<Kwargs> {
    let mut given = match args {
        Args::Keyword(kwargs) => {
            if let Some(key) = kwargs.keys().find(|key| !is_known(key, specs)) {
                return Err(Error::UnknownArgument(key.clone()));
            }
            kwargs
        }
        Args::Positional(values) => {
            if values.len() > specs.len() {
                return Err(Error::TooManyPositional {
                    declared: specs.len(),
                    received: values.len(),
                });
            }
            specs
                .iter()
                .zip(values)
                .map(|(spec, value)| (spec.name.clone(), value))
                .collect()
        }
    };

    let mut kwargs = Kwargs::with_capacity(given.len() + specs.len());
    for key in [SOURCE, TARGET] {
        if let Some(value) = given.shift_remove(key) {
            kwargs.insert(key.to_string(), value);
        }
    }

    for spec in specs {
        let value = match given.shift_remove(&spec.name) {
            Some(value) => value,
            None if spec.required => return Err(Error::MissingRequired(spec.name.clone())),
            None => spec.default.clone().unwrap_or(Value::Null),
        };
        kwargs.insert(spec.name.clone(), value);
    }

    Ok(kwargs)
}
