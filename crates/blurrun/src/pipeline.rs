//! # Pipelines
//!
//! An `Invocation` is one not-yet-executed call of an operation. A pipeline
//! is an ordered list of them, run strictly one after another by `reduce`.
//!
//! ## Invariants
//! - Every step is resolved and its arguments adapted before the first step
//!   runs, so an unknown operation or a bad argument fails the whole chain
//!   without touching the backend.
//! - A step without a source takes the previous step's result as its source
//!   only when the previous step produced a dataframe, this step consumes
//!   one, and the result is not null. Plain values never chain.

use tracing::debug;
use tracing::warn;

use crate::args::Args;
use crate::dispatch::Dispatcher;
use crate::dispatch::Outcome;
use crate::dispatch::Prepared;
use crate::error::Result;
use crate::operation::Kind;
use crate::value::Callback;
use crate::value::Kwargs;
use crate::value::SOURCE;
use crate::value::TARGET;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub(crate) operation: String,
    pub(crate) args: Args,
    pub(crate) source: Option<Value>,
    pub(crate) target: Option<Value>,
    pub(crate) callback: Option<Callback>,
}

impl Invocation {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            args: Args::default(),
            source: None,
            target: None,
            callback: None,
        }
    }

    pub fn args(mut self, args: impl Into<Args>) -> Self {
        self.args = args.into();
        self
    }

    /// Sets one keyword argument. Ignored, with a warning, on an invocation
    /// built from positional arguments.
    pub fn arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        match &mut self.args {
            Args::Keyword(kwargs) => {
                kwargs.insert(name.into(), value.into());
            }
            Args::Positional(_) => {
                warn!(operation = %self.operation, "keyword argument on a positional invocation ignored");
            }
        }
        self
    }

    pub fn source(mut self, source: impl Into<Value>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn target(mut self, target: impl Into<Value>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn callback(mut self, callback: Callback) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn source_value(&self) -> Option<&Value> {
        self.reserved(&self.source, SOURCE)
    }

    pub fn target_value(&self) -> Option<&Value> {
        self.reserved(&self.target, TARGET)
    }

    fn reserved<'a>(&'a self, explicit: &'a Option<Value>, key: &str) -> Option<&'a Value> {
        let value = match (explicit, &self.args) {
            (Some(value), _) => Some(value),
            (None, Args::Keyword(kwargs)) => kwargs.get(key),
            (None, Args::Positional(_)) => None,
        };
        value.filter(|value| !value.is_null())
    }
}

fn has_source(kwargs: &Kwargs) -> bool {
    kwargs.get(SOURCE).is_some_and(|value| !value.is_null())
}

/// Runs `steps` in order and returns the last step's result, converted by
/// `wrap`. An empty pipeline yields `Null`.
pub async fn reduce<F>(dispatcher: &Dispatcher, steps: Vec<Invocation>, wrap: F) -> Result<Value>
where
    F: Fn(Outcome) -> Value + Send + Sync,
{
    let prepared = steps
        .into_iter()
        .map(|step| dispatcher.prepare(step))
        .collect::<Result<Vec<_>>>()?;

    let mut result = Value::Null;
    let mut previous: Option<Kind> = None;
    for (i, Prepared { operation, mut kwargs, callback }) in prepared.into_iter().enumerate() {
        if let Some(kind) = previous {
            let chains = kind == Kind::Dataframe && operation.source_kind() == Some(Kind::Dataframe);
            if chains && !has_source(&kwargs) && !result.is_null() {
                debug!(step = i, operation = operation.name(), "chaining previous result as source");
                kwargs.insert(SOURCE.to_string(), result.clone());
            }
        }
        let outcome = dispatcher.call(&operation, kwargs, callback).await?;
        result = wrap(outcome);
        previous = Some(operation.target_kind());
    }
    Ok(result)
}
