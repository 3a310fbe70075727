//! # Operation Descriptors
//!
//! An `Operation` is the immutable description of one remote-callable
//! operation: its method path, the kinds of value it reads and writes, its
//! declared arguments, how it executes, and an optional one-time initializer.
//!
//! Descriptors are built once with `OperationBuilder` and shared behind an
//! `Arc`; nothing mutates them afterwards.

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::args;
use crate::args::ArgSpec;
use crate::args::Args;
use crate::backend::SharedBackend;
use crate::error::Result;
use crate::value::Kwargs;
use crate::value::Value;

/// What an operation reads from or writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// A named table living in the backend.
    Dataframe,
    /// A plain value returned to the caller.
    Value,
}

pub type CodeFn = Arc<dyn Fn(&Kwargs) -> String + Send + Sync>;
pub type CallFn = Arc<dyn Fn(SharedBackend, Kwargs) -> BoxFuture<'static, Result<Value>> + Send + Sync>;
pub type InitFn = Arc<dyn Fn(SharedBackend) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// How an operation executes. Fixed when the descriptor is built.
#[derive(Clone)]
pub enum Strategy {
    /// Emits a source snippet from the kwargs; the snippet is run as code.
    Code(CodeFn),
    /// Calls the backend directly.
    Call(CallFn),
    /// `<target> = <source>.<name>(<args>)`, or a structured method call
    /// when running in process.
    Method,
}

impl std::fmt::Debug for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Code(_) => f.write_str("Code(..)"),
            Self::Call(_) => f.write_str("Call(..)"),
            Self::Method => f.write_str("Method"),
        }
    }
}

/// Setup run at most once per operation name, before the first call.
#[derive(Clone)]
pub enum Initializer {
    Code(String),
    Call(InitFn),
}

impl Initializer {
    pub async fn run(&self, backend: SharedBackend) -> Result<()> {
        match self {
            Self::Code(code) => backend.run_code(code, None).await.map(|_| ()),
            Self::Call(f) => f(backend).await,
        }
    }
}

impl std::fmt::Debug for Initializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Code(code) => f.debug_tuple("Code").field(code).finish(),
            Self::Call(_) => f.write_str("Call(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Operation {
    name: String,
    source_kind: Option<Kind>,
    target_kind: Kind,
    args: Vec<ArgSpec>,
    strategy: Strategy,
    initializer: Option<Initializer>,
    default_source: Option<String>,
    creates_new: bool,
}

impl Operation {
    pub fn builder(name: impl Into<String>) -> OperationBuilder {
        OperationBuilder::new(name)
    }

    /// The remote method path, e.g. `cols.upper`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `None` for operations that take no source, like readers.
    pub fn source_kind(&self) -> Option<Kind> {
        self.source_kind
    }

    pub fn target_kind(&self) -> Kind {
        self.target_kind
    }

    pub fn args(&self) -> &[ArgSpec] {
        &self.args
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub fn initializer(&self) -> Option<&Initializer> {
        self.initializer.as_ref()
    }

    /// Variable used as the source when a call does not name one.
    pub fn default_source(&self) -> Option<&str> {
        self.default_source.as_deref()
    }

    /// The operation always writes to a freshly minted variable instead of
    /// overwriting its source.
    pub fn creates_new(&self) -> bool {
        self.creates_new
    }

    /// Canonical kwargs for a call to this operation.
    pub fn adapt(&self, args: Args) -> args::Result<Kwargs> {
        args::adapt(args, &self.args)
    }
}

/// Fluent builder for operation descriptors.
pub struct OperationBuilder {
    operation: Operation,
}

impl OperationBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            operation: Operation {
                name: name.into(),
                source_kind: None,
                target_kind: Kind::Value,
                args: Vec::new(),
                strategy: Strategy::Method,
                initializer: None,
                default_source: None,
                creates_new: false,
            },
        }
    }

    pub fn source(mut self, kind: Kind) -> Self {
        self.operation.source_kind = Some(kind);
        self
    }

    pub fn target(mut self, kind: Kind) -> Self {
        self.operation.target_kind = kind;
        self
    }

    pub fn arg(mut self, spec: impl Into<ArgSpec>) -> Self {
        self.operation.args.push(spec.into());
        self
    }

    pub fn code(mut self, f: impl Fn(&Kwargs) -> String + Send + Sync + 'static) -> Self {
        self.operation.strategy = Strategy::Code(Arc::new(f));
        self
    }

    pub fn call<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(SharedBackend, Kwargs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.operation.strategy = Strategy::Call(Arc::new(move |backend, kwargs| f(backend, kwargs).boxed()));
        self
    }

    pub fn init_code(mut self, code: impl Into<String>) -> Self {
        self.operation.initializer = Some(Initializer::Code(code.into()));
        self
    }

    pub fn init_call<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(SharedBackend) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.operation.initializer = Some(Initializer::Call(Arc::new(move |backend| f(backend).boxed())));
        self
    }

    pub fn default_source(mut self, name: impl Into<String>) -> Self {
        self.operation.default_source = Some(name.into());
        self
    }

    pub fn creates_new(mut self) -> Self {
        self.operation.creates_new = true;
        self
    }

    pub fn build(self) -> Operation {
        self.operation
    }
}
