//! # Dispatcher
//!
//! Runs a single operation: initializer, target assignment, marshalling,
//! global registration and execution, in that order.
//!
//! ## Target assignment
//! A call to an operation whose target kind is `Dataframe` always writes to
//! a named variable. If the kwargs do not name one:
//! - `creates_new` operations, and calls without a source, get a freshly
//!   minted name;
//! - otherwise, when source and target kinds match, the source is
//!   overwritten in place;
//! - otherwise a fresh name is minted.

use std::sync::Arc;

use tracing::debug;

use crate::backend::SharedBackend;
use crate::error::Result;
use crate::marshal;
use crate::marshal::Marshaller;
use crate::mode::ExecutionMode;
use crate::mode::RemoteCodeGenMode;
use crate::names::NameMint;
use crate::operation::Kind;
use crate::operation::Operation;
use crate::operation::Strategy;
use crate::pipeline::Invocation;
use crate::registry::InitRegistry;
use crate::registry::OperationRegistry;
use crate::value::Callback;
use crate::value::Kwargs;
use crate::value::Name;
use crate::value::SOURCE;
use crate::value::TARGET;
use crate::value::Value;
use crate::value::reference;

/// Result of one dispatched operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub value: Value,
    /// The variable the operation wrote to, if it has one.
    pub target: Option<String>,
}

/// An invocation resolved against the registry, with canonical kwargs.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub operation: Arc<Operation>,
    pub kwargs: Kwargs,
    pub callback: Option<Callback>,
}

pub struct Dispatcher {
    backend: SharedBackend,
    mode: Arc<dyn ExecutionMode>,
    operations: Arc<OperationRegistry>,
    inits: Arc<InitRegistry>,
    names: Arc<NameMint>,
}

impl Dispatcher {
    pub fn new(
        backend: SharedBackend,
        mode: Arc<dyn ExecutionMode>,
        operations: Arc<OperationRegistry>,
        inits: Arc<InitRegistry>,
        names: Arc<NameMint>,
    ) -> Self {
        Self {
            backend,
            mode,
            operations,
            inits,
            names,
        }
    }

    pub fn backend(&self) -> &SharedBackend {
        &self.backend
    }

    pub fn mode(&self) -> &dyn ExecutionMode {
        self.mode.as_ref()
    }

    pub fn operations(&self) -> &OperationRegistry {
        &self.operations
    }

    pub fn inits(&self) -> &InitRegistry {
        &self.inits
    }

    pub fn names(&self) -> &NameMint {
        &self.names
    }

    /// Resolves the operation and adapts the arguments. Never touches the
    /// backend.
    pub fn prepare(&self, invocation: Invocation) -> Result<Prepared> {
        let Invocation {
            operation,
            args,
            source,
            target,
            callback,
        } = invocation;
        let operation = self.operations.resolve(&operation)?;
        let mut kwargs = operation.adapt(args)?;
        if let Some(source) = source {
            kwargs.insert(SOURCE.to_string(), source);
        }
        if let Some(target) = target {
            kwargs.insert(TARGET.to_string(), target);
        }
        Ok(Prepared {
            operation,
            kwargs,
            callback,
        })
    }

    /// Resolves and runs one invocation.
    pub async fn invoke(&self, invocation: Invocation) -> Result<Outcome> {
        let Prepared {
            operation,
            kwargs,
            callback,
        } = self.prepare(invocation)?;
        self.call(&operation, kwargs, callback).await
    }

    /// Runs an operation with canonical kwargs.
    pub async fn call(&self, operation: &Operation, kwargs: Kwargs, callback: Option<Callback>) -> Result<Outcome> {
        self.inits.ensure(operation, &self.backend).await?;

        let mut kwargs = kwargs;
        self.apply_default_source(operation, &mut kwargs);
        let target = self.assign_target(operation, &mut kwargs);

        let mut marshaller = Marshaller::new(self.backend.as_ref(), &self.names, self.mode.use_proxies());
        let kwargs = marshaller.marshal_kwargs(kwargs);
        marshal::register(self.backend.as_ref(), marshaller.into_registrations()).await?;

        debug!(operation = operation.name(), variable = ?target, "dispatching");
        let value = match operation.strategy() {
            Strategy::Code(f) => {
                let code = f(&self.mode.prepare_explicit(kwargs));
                match &target {
                    Some(target) => self.backend.run_code_into(&code, target, callback).await?,
                    None => self.backend.run_code(&code, callback).await?,
                }
            }
            Strategy::Call(f) => f(self.backend.clone(), self.mode.prepare_explicit(kwargs)).await?,
            Strategy::Method => {
                self.mode
                    .run_method(self.backend.as_ref(), operation, kwargs, callback)
                    .await?
            }
        };

        let value = match (&target, operation.target_kind()) {
            (Some(target), Kind::Dataframe) => match value {
                Value::Proxy(proxy) => Value::Proxy(proxy),
                _ => Value::Name(Name::new(target.as_str())),
            },
            _ => value,
        };
        Ok(Outcome { value, target })
    }

    /// Renders an invocation as the source line it would run, without
    /// running it or registering anything.
    pub fn render(&self, invocation: Invocation) -> Result<String> {
        let Prepared {
            operation,
            mut kwargs,
            ..
        } = self.prepare(invocation)?;
        self.apply_default_source(&operation, &mut kwargs);
        self.assign_target(&operation, &mut kwargs);
        Ok(match operation.strategy() {
            Strategy::Code(f) => f(&kwargs),
            Strategy::Call(_) | Strategy::Method => RemoteCodeGenMode::render(&operation, &kwargs),
        })
    }

    fn apply_default_source(&self, operation: &Operation, kwargs: &mut Kwargs) {
        let Some(default) = operation.default_source() else {
            return;
        };
        if !kwargs.get(SOURCE).is_some_and(|value| !value.is_null()) {
            kwargs.insert(SOURCE.to_string(), Value::Name(Name::new(default)));
        }
    }

    fn assign_target(&self, operation: &Operation, kwargs: &mut Kwargs) -> Option<String> {
        if let Some(target) = reference(kwargs, TARGET) {
            return Some(target);
        }
        if operation.target_kind() != Kind::Dataframe {
            return None;
        }
        let target = match reference(kwargs, SOURCE) {
            Some(source) if !operation.creates_new() && operation.source_kind() == Some(Kind::Dataframe) => source,
            _ => self.names.mint("df"),
        };
        kwargs.insert(TARGET.to_string(), Value::Str(target.clone()));
        Some(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::args::ArgSpec;
    use crate::local::LocalBackend;
    use crate::mock_engine::EngineCall;
    use crate::mock_engine::RecordingEngine;
    use crate::mode::LocalProxyMode;

    fn dispatcher(engine: Arc<RecordingEngine>, mode: Arc<dyn ExecutionMode>) -> Dispatcher {
        let operations: OperationRegistry = [
            Operation::builder("cols.upper")
                .source(Kind::Dataframe)
                .target(Kind::Dataframe)
                .arg(ArgSpec::new("cols").default("*"))
                .build(),
            Operation::builder("cols.names")
                .source(Kind::Dataframe)
                .target(Kind::Value)
                .build(),
            Operation::builder("values.sum")
                .source(Kind::Value)
                .target(Kind::Value)
                .build(),
            Operation::builder("copy")
                .source(Kind::Dataframe)
                .target(Kind::Dataframe)
                .creates_new()
                .build(),
            Operation::builder("profile")
                .source(Kind::Dataframe)
                .code(|kwargs| format!("profile({})", kwargs.get(SOURCE).and_then(Value::as_reference).unwrap_or("?")))
                .init_code("import profiler")
                .build(),
        ]
        .into_iter()
        .collect();
        Dispatcher::new(
            Arc::new(LocalBackend::new(engine)),
            mode,
            Arc::new(operations),
            Arc::new(InitRegistry::new()),
            Arc::new(NameMint::with_tag("t")),
        )
    }

    #[tokio::test]
    async fn test_in_place_target() {
        let engine = Arc::new(RecordingEngine::new());
        let dispatcher = dispatcher(engine.clone(), Arc::new(RemoteCodeGenMode));

        let outcome = dispatcher
            .invoke(Invocation::new("cols.upper").source("df1"))
            .await
            .unwrap();

        assert_eq!(outcome.value, Value::Name(Name::new("df1")));
        assert_eq!(outcome.target.as_deref(), Some("df1"));
        assert_eq!(engine.codes(), vec![r#"df1 = df1.cols.upper(cols="*")"#.to_string()]);
    }

    #[tokio::test]
    async fn test_explicit_target() {
        let engine = Arc::new(RecordingEngine::new());
        let dispatcher = dispatcher(engine.clone(), Arc::new(RemoteCodeGenMode));

        let outcome = dispatcher
            .invoke(Invocation::new("cols.upper").source("df1").target("df2"))
            .await
            .unwrap();

        assert_eq!(outcome.value, Value::Name(Name::new("df2")));
        assert_eq!(engine.codes(), vec![r#"df2 = df1.cols.upper(cols="*")"#.to_string()]);
    }

    #[tokio::test]
    async fn test_creates_new_mints_target() {
        let engine = Arc::new(RecordingEngine::new());
        let dispatcher = dispatcher(engine.clone(), Arc::new(RemoteCodeGenMode));

        let outcome = dispatcher.invoke(Invocation::new("copy").source("df1")).await.unwrap();

        assert_eq!(outcome.target.as_deref(), Some("df_t_1"));
        assert_eq!(engine.codes(), vec!["df_t_1 = df1.copy()".to_string()]);
    }

    #[tokio::test]
    async fn test_value_operation_returns_engine_result() {
        let engine = Arc::new(RecordingEngine::new().respond("cols.names", Value::List(vec!["a".into()])));
        let dispatcher = dispatcher(engine.clone(), Arc::new(RemoteCodeGenMode));

        let outcome = dispatcher
            .invoke(Invocation::new("cols.names").source("df1"))
            .await
            .unwrap();

        assert_eq!(outcome.value, Value::List(vec!["a".into()]));
        assert_eq!(outcome.target, None);
        assert_eq!(engine.codes(), vec!["df1.cols.names()".to_string()]);
    }

    #[tokio::test]
    async fn test_initializer_precedes_first_call_only() {
        let engine = Arc::new(RecordingEngine::new());
        let dispatcher = dispatcher(engine.clone(), Arc::new(RemoteCodeGenMode));

        dispatcher.invoke(Invocation::new("profile").source("df1")).await.unwrap();
        dispatcher.invoke(Invocation::new("profile").source("df2")).await.unwrap();

        assert_eq!(
            engine.codes(),
            vec!["import profiler".to_string(), "profile(df1)".into(), "profile(df2)".into()]
        );
    }

    #[tokio::test]
    async fn test_unknown_operation_fails_before_backend() {
        let engine = Arc::new(RecordingEngine::new());
        let dispatcher = dispatcher(engine.clone(), Arc::new(RemoteCodeGenMode));

        let result = dispatcher.invoke(Invocation::new("rows.nope")).await;

        assert!(matches!(result, Err(crate::Error::OperationNotFound(name)) if name == "rows.nope"));
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_local_mode_uses_structured_call() {
        let engine = Arc::new(RecordingEngine::new().proxy_results());
        let dispatcher = dispatcher(engine.clone(), Arc::new(LocalProxyMode));

        let outcome = dispatcher
            .invoke(Invocation::new("cols.upper").source("df1"))
            .await
            .unwrap();

        assert!(matches!(outcome.value, Value::Proxy(_)));
        assert_eq!(outcome.target.as_deref(), Some("df1"));
        let mut kwargs = Kwargs::new();
        kwargs.insert("cols".into(), "*".into());
        assert_eq!(
            engine.calls(),
            vec![EngineCall::RunMethod {
                source: Some("df1".into()),
                path: "cols.upper".into(),
                kwargs,
            }]
        );
    }

    #[test]
    fn test_render_does_not_touch_backend() {
        let engine = Arc::new(RecordingEngine::new());
        let dispatcher = dispatcher(engine.clone(), Arc::new(RemoteCodeGenMode));

        let code = dispatcher
            .render(Invocation::new("cols.upper").source("df1"))
            .unwrap();

        assert_eq!(code, r#"df1 = df1.cols.upper(cols="*")"#);
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_value_results_do_not_chain() {
        let names = Value::List(vec!["a".into()]);
        let engine = Arc::new(RecordingEngine::new().respond("cols.names", names));
        let dispatcher = dispatcher(engine.clone(), Arc::new(LocalProxyMode));

        let steps = vec![
            Invocation::new("cols.names").source("df1"),
            Invocation::new("values.sum"),
        ];
        crate::pipeline::reduce(&dispatcher, steps, |outcome| outcome.value)
            .await
            .unwrap();

        let sources: Vec<_> = engine
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                EngineCall::RunMethod { source, .. } => Some(source),
                _ => None,
            })
            .collect();
        assert_eq!(sources, vec![Some(Value::Str("df1".into())), None]);
    }
}
