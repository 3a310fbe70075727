//! # Engine Contract
//!
//! The computation collaborator: whatever actually evaluates code and owns
//! the variables. The worker host and the in-process backend both drive an
//! `Engine`; nothing in this crate implements real dataframe semantics.

use serde_json::Value as JsonValue;

use crate::value::Kwargs;
use crate::value::Value;

/// An exception raised by the engine, carried as its message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineError(pub String);

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for EngineError {}

impl From<String> for EngineError {
    fn from(msg: String) -> Self {
        Self(msg)
    }
}

impl From<&str> for EngineError {
    fn from(msg: &str) -> Self {
        Self(msg.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[async_trait::async_trait]
pub trait Engine: Send + Sync + 'static {
    /// One-time startup with the client's options.
    async fn initialize(&self, options: &JsonValue) -> Result<()>;

    async fn load(&self, packages: &[String]) -> Result<()>;

    async fn run_code(&self, code: &str) -> Result<Value>;

    /// Invokes `path` on `source`, or as a free function when there is no
    /// source.
    async fn run_method(&self, source: Option<Value>, path: &str, kwargs: Kwargs) -> Result<Value>;

    /// Binds a global. A `Value::Callback` bound this way may be called by
    /// code the engine runs later.
    async fn set_global(&self, name: &str, value: Value) -> Result<()>;

    async fn get_global(&self, name: &str) -> Result<Value>;

    /// Unbinds a global. Unbinding a name that is not bound is not an error.
    async fn delete_global(&self, name: &str) -> Result<()>;
}
