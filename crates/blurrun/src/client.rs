//! # Client
//!
//! The user-facing entry point. A `Client` owns a dispatcher over one
//! backend and turns backend results into handles.
//!
//! ## Deferral
//! Against a worker, a chain whose last step produces a dataframe is not
//! sent. `run` instead returns a handle, named after the chain's target,
//! whose param queue holds the whole chain. Running an operation on that
//! handle extends the chain; `Source::materialize` or any value-producing
//! step sends it.

use std::sync::Arc;

use tracing::debug;

use crate::args::Args;
use crate::backend::Feature;
use crate::backend::SharedBackend;
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::dispatch::Outcome;
use crate::engine::Engine;
use crate::error::Result;
use crate::local::LocalBackend;
use crate::mode::ExecutionMode;
use crate::mode::LocalProxyMode;
use crate::mode::RemoteCodeGenMode;
use crate::names::NameMint;
use crate::operation::Kind;
use crate::operation::Operation;
use crate::pipeline;
use crate::pipeline::Invocation;
use crate::registry::InitRegistry;
use crate::registry::OperationRegistry;
use crate::source::Source;
use crate::transport::Transport;
use crate::value::Callback;
use crate::value::Value;
use crate::worker::WorkerBackend;

#[derive(Clone)]
pub struct Client {
    dispatcher: Arc<Dispatcher>,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn operations(&self) -> &OperationRegistry {
        self.dispatcher.operations()
    }

    pub fn supports(&self, feature: Feature) -> bool {
        self.dispatcher.backend().supports(feature)
    }

    /// Runs a chain of invocations, deferring it when the mode allows.
    ///
    /// If the first step's source is a deferred handle, that handle's queue
    /// is drained and runs first.
    pub async fn run(&self, steps: Vec<Invocation>) -> Result<Value> {
        let pending = match steps.first().and_then(Invocation::source_value) {
            Some(Value::Handle(source)) if source.is_deferred() => Some(source.clone()),
            _ => None,
        };

        // A rejected step leaves the handle's chain where it was.
        let queued = pending.as_ref().map(Source::queued).unwrap_or_default();
        for step in queued.iter().chain(&steps) {
            self.dispatcher.prepare(step.clone())?;
        }

        let mut queue = match &pending {
            Some(source) => source.take_queue(),
            None => Vec::new(),
        };
        queue.extend(steps);

        let Some(last) = queue.last_mut() else {
            return Ok(Value::Null);
        };
        let operation = self.dispatcher.operations().resolve(last.operation())?;
        if operation.target_kind() == Kind::Dataframe && self.dispatcher.mode().defers() {
            let target = match last.target_value().and_then(Value::as_reference) {
                Some(target) => target.to_string(),
                None => {
                    let target = self.deferred_target(&operation, last);
                    last.target = Some(Value::Str(target.clone()));
                    target
                }
            };
            debug!(variable = %target, steps = queue.len(), "deferring chain");
            return Ok(Value::Handle(Source::deferred(self.clone(), target, queue)));
        }

        self.send(queue).await
    }

    fn deferred_target(&self, operation: &Operation, last: &Invocation) -> String {
        if !operation.creates_new() {
            if let Some(source) = last.source_value().and_then(Value::as_reference) {
                return source.to_string();
            }
        }
        self.dispatcher.names().mint("df")
    }

    /// Runs a chain now, without deferral.
    pub async fn send(&self, steps: Vec<Invocation>) -> Result<Value> {
        debug!(steps = steps.len(), "sending chain");
        pipeline::reduce(&self.dispatcher, steps, |outcome| self.prepare_result(outcome)).await
    }

    /// Source text for a chain, one line per step, without running it.
    pub fn code(&self, steps: &[Invocation]) -> Result<String> {
        let mut code = String::new();
        for step in steps {
            code.push_str(&self.dispatcher.render(step.clone())?);
            code.push('\n');
        }
        Ok(code)
    }

    /// Calls an operation with a raw argument list: a lone record of known
    /// argument names is a keyword call, anything else is positional.
    pub async fn call(&self, operation: &str, values: Vec<Value>) -> Result<Value> {
        let resolved = self.dispatcher.operations().resolve(operation)?;
        let args = Args::infer(values, resolved.args());
        self.run(vec![Invocation::new(operation).args(args)]).await
    }

    pub async fn run_code(&self, code: &str, callback: Option<Callback>) -> Result<Value> {
        let value = self.dispatcher.backend().run_code(code, callback).await?;
        Ok(self.prepare_result(Outcome { value, target: None }))
    }

    /// A handle to an existing backend variable, or to a fresh name.
    pub fn source(&self, name: Option<&str>) -> Source {
        match name {
            Some(name) => Source::new(self.clone(), name),
            None => Source::new(self.clone(), self.dispatcher.names().mint("source")),
        }
    }

    pub async fn set_global(&self, name: &str, value: Value) -> Result<()> {
        self.dispatcher.backend().set_global(name, value).await
    }

    pub async fn get_global(&self, name: &str) -> Result<Value> {
        let value = self.dispatcher.backend().get_global(name).await?;
        Ok(self.prepare_result(Outcome { value, target: None }))
    }

    /// Turns names and proxies into handles owned by this client.
    fn prepare_result(&self, outcome: Outcome) -> Value {
        match outcome.value {
            Value::Name(name) => Value::Handle(Source::new(self.clone(), name.as_str())),
            Value::Proxy(proxy) => {
                let name = outcome
                    .target
                    .unwrap_or_else(|| self.dispatcher.names().mint("source"));
                Value::Handle(Source::with_data(self.clone(), name, proxy))
            }
            value => value,
        }
    }
}

pub struct ClientBuilder {
    config: Config,
    operations: Option<Arc<OperationRegistry>>,
    inits: Option<Arc<InitRegistry>>,
    names: Option<Arc<NameMint>>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            operations: None,
            inits: None,
            names: None,
        }
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn operations(mut self, operations: Arc<OperationRegistry>) -> Self {
        self.operations = Some(operations);
        self
    }

    /// Isolates initializer tracking from the rest of the process.
    pub fn inits(mut self, inits: Arc<InitRegistry>) -> Self {
        self.inits = Some(inits);
        self
    }

    pub fn names(mut self, names: Arc<NameMint>) -> Self {
        self.names = Some(names);
        self
    }

    /// Builds a client over an already connected backend. The mode follows
    /// `config.local`.
    pub fn build(self, backend: SharedBackend) -> Client {
        let mode: Arc<dyn ExecutionMode> = if self.config.local {
            Arc::new(LocalProxyMode)
        } else {
            Arc::new(RemoteCodeGenMode)
        };
        let names = self
            .names
            .unwrap_or_else(|| Arc::new(self.config.name_mint()));
        let dispatcher = Dispatcher::new(
            backend,
            mode,
            self.operations.unwrap_or_default(),
            self.inits.unwrap_or_else(InitRegistry::global),
            names,
        );
        Client {
            dispatcher: Arc::new(dispatcher),
        }
    }

    /// Connects to a worker over `transport` and builds a code-generating
    /// client.
    pub async fn connect(mut self, transport: Box<dyn Transport>) -> Result<Client> {
        self.config.local = false;
        let backend = WorkerBackend::connect(transport, &self.config).await?;
        Ok(self.build(Arc::new(backend)))
    }

    /// Builds a client over an engine running in this process.
    pub fn in_process<E: Engine>(mut self, engine: Arc<E>) -> Client {
        self.config.local = true;
        self.build(Arc::new(LocalBackend::new(engine)))
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
