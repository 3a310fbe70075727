//! # Execution Backend Contract
//!
//! What the dispatch layer needs from whatever actually runs the code: a
//! worker process behind a channel, or an engine in this process.

use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use crate::error::Result;
use crate::value::Callback;
use crate::value::Kwargs;
use crate::value::Value;

/// Optional capabilities negotiated with a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feature {
    /// Binary buffers can be bound as backend globals.
    Buffers,
    /// Functions can be bound as backend globals.
    Callbacks,
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buffers => write!(f, "buffers"),
            Self::Callbacks => write!(f, "callbacks"),
        }
    }
}

#[async_trait::async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Executes a source snippet and returns its value.
    ///
    /// `callback`, when given, may receive any number of partial results
    /// before the call returns.
    async fn run_code(&self, code: &str, callback: Option<Callback>) -> Result<Value>;

    /// Executes a source snippet that writes the variable `target`.
    ///
    /// A backend that cannot hand the result back may answer with a
    /// reference to `target` instead.
    async fn run_code_into(&self, code: &str, _target: &str, callback: Option<Callback>) -> Result<Value> {
        self.run_code(code, callback).await
    }

    /// Invokes `path` on `source` with keyword arguments.
    ///
    /// `source` is a variable reference (name or string) or, in process, a
    /// live proxy.
    async fn run_method(
        &self,
        source: Option<Value>,
        path: &str,
        kwargs: Kwargs,
        callback: Option<Callback>,
    ) -> Result<Value>;

    /// Binds `value` to a backend global.
    async fn set_global(&self, name: &str, value: Value) -> Result<()>;

    /// Reads a backend global.
    async fn get_global(&self, name: &str) -> Result<Value>;

    fn supports(&self, feature: Feature) -> bool;
}

pub type SharedBackend = Arc<dyn Backend>;
