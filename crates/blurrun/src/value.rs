//! # Values
//!
//! The argument and result model shared by every layer. A value is one of a
//! closed set of variants; the marshaller and the wire codec match on them
//! exhaustively.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::source::Source;

/// Keyword arguments of one invocation, in insertion order.
pub type Kwargs = IndexMap<String, Value>;

/// A keyed record, in insertion order.
pub type Record = IndexMap<String, Value>;

/// Reserved kwarg naming the input handle of an operation.
pub const SOURCE: &str = "source";
/// Reserved kwarg naming the variable an operation writes to.
pub const TARGET: &str = "target";

/// The variable a reserved kwarg such as `source` or `target` refers to.
pub(crate) fn reference(kwargs: &Kwargs, key: &str) -> Option<String> {
    kwargs
        .get(key)
        .filter(|value| !value.is_null())
        .and_then(Value::as_reference)
        .map(str::to_string)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// A bare reference to a variable living in the backend.
    Name(Name),
    /// A client-side handle to a backend variable.
    Handle(Source),
    Buffer(Vec<u8>),
    Callback(Callback),
    /// A live object owned by an in-process backend.
    Proxy(Proxy),
    List(Vec<Value>),
    Record(Record),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The backend variable this value stands for, if any.
    pub fn remote_name(&self) -> Option<&str> {
        match self {
            Self::Name(name) => Some(name.as_str()),
            Self::Handle(source) => Some(source.name()),
            _ => None,
        }
    }

    /// Renders a source or target kwarg as a variable reference: plain strings
    /// and names are used verbatim.
    pub fn as_reference(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            other => other.remote_name(),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Name> for Value {
    fn from(v: Name) -> Self {
        Self::Name(v)
    }
}

impl From<Source> for Value {
    fn from(v: Source) -> Self {
        Self::Handle(v)
    }
}

impl From<Callback> for Value {
    fn from(v: Callback) -> Self {
        Self::Callback(v)
    }
}

impl From<Proxy> for Value {
    fn from(v: Proxy) -> Self {
        Self::Proxy(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::List(v)
    }
}

impl From<Record> for Value {
    fn from(v: Record) -> Self {
        Self::Record(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// The marshalled form of a handle: only the variable name survives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Name(String);

impl Name {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A function the backend may call back into, zero or more times.
///
/// The optional key names the callback inside the request-unique token the
/// backend sees, so one request can tell several callbacks apart.
#[derive(Clone)]
pub struct Callback {
    f: Arc<dyn Fn(Value) + Send + Sync>,
    key: Option<Arc<str>>,
}

impl Callback {
    pub fn new(f: impl Fn(Value) + Send + Sync + 'static) -> Self {
        Self { f: Arc::new(f), key: None }
    }

    pub fn with_key(mut self, key: &str) -> Self {
        self.key = Some(Arc::from(key));
        self
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn call(&self, value: Value) {
        (self.f)(value)
    }
}

impl std::fmt::Debug for Callback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.key {
            Some(key) => write!(f, "Callback({})", key),
            None => f.write_str("Callback(..)"),
        }
    }
}

impl PartialEq for Callback {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.f, &other.f) && self.key == other.key
    }
}

/// Opaque reference to an object owned by an in-process engine.
///
/// Only the engine that minted it can interpret the id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Proxy {
    id: u64,
    type_name: Arc<str>,
}

impl Proxy {
    pub fn new(id: u64, type_name: &str) -> Self {
        Self {
            id,
            type_name: Arc::from(type_name),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }
}
