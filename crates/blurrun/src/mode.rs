//! # Execution Modes
//!
//! Everything that differs between running against an in-process engine and
//! a separate worker lives behind `ExecutionMode`, chosen once when a client
//! is built.
//!
//! - `LocalProxyMode`: live objects are handed over by reference and the
//!   default strategy is a structured method call.
//! - `RemoteCodeGenMode`: values are reduced to names and literals and the
//!   default strategy is a generated source line.

use crate::backend::Backend;
use crate::error::Result;
use crate::operation::Operation;
use crate::python;
use crate::value::Callback;
use crate::value::Kwargs;
use crate::value::SOURCE;
use crate::value::TARGET;
use crate::value::Value;
use crate::value::reference;

#[async_trait::async_trait]
pub trait ExecutionMode: Send + Sync + 'static {
    /// Whether the marshaller may hand proxies, buffers and callbacks over
    /// by reference.
    fn use_proxies(&self) -> bool;

    /// Whether a chain ending in a dataframe is returned unexecuted.
    fn defers(&self) -> bool;

    /// Adjusts kwargs before they reach a `Code` or `Call` strategy.
    fn prepare_explicit(&self, kwargs: Kwargs) -> Kwargs;

    /// Runs the default `Method` strategy.
    async fn run_method(
        &self,
        backend: &dyn Backend,
        operation: &Operation,
        kwargs: Kwargs,
        callback: Option<Callback>,
    ) -> Result<Value>;
}

/// In-process engine; the target is tracked by the client, not the engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalProxyMode;

#[async_trait::async_trait]
impl ExecutionMode for LocalProxyMode {
    fn use_proxies(&self) -> bool {
        true
    }

    fn defers(&self) -> bool {
        false
    }

    fn prepare_explicit(&self, mut kwargs: Kwargs) -> Kwargs {
        kwargs.shift_remove(TARGET);
        kwargs
    }

    async fn run_method(
        &self,
        backend: &dyn Backend,
        operation: &Operation,
        mut kwargs: Kwargs,
        callback: Option<Callback>,
    ) -> Result<Value> {
        kwargs.shift_remove(TARGET);
        let source = kwargs.shift_remove(SOURCE).filter(|value| !value.is_null());
        backend.run_method(source, operation.name(), kwargs, callback).await
    }
}

/// Separate worker reached over a channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoteCodeGenMode;

impl RemoteCodeGenMode {
    /// The line the default strategy runs for these kwargs.
    pub fn render(operation: &Operation, kwargs: &Kwargs) -> String {
        let target = reference(kwargs, TARGET);
        let source = reference(kwargs, SOURCE);
        python::method_call(target.as_deref(), source.as_deref(), operation.name(), kwargs)
    }
}

#[async_trait::async_trait]
impl ExecutionMode for RemoteCodeGenMode {
    fn use_proxies(&self) -> bool {
        false
    }

    fn defers(&self) -> bool {
        true
    }

    fn prepare_explicit(&self, kwargs: Kwargs) -> Kwargs {
        kwargs
    }

    async fn run_method(
        &self,
        backend: &dyn Backend,
        operation: &Operation,
        kwargs: Kwargs,
        callback: Option<Callback>,
    ) -> Result<Value> {
        let code = Self::render(operation, &kwargs);
        match reference(&kwargs, TARGET) {
            Some(target) => backend.run_code_into(&code, &target, callback).await,
            None => backend.run_code(&code, callback).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::args::ArgSpec;
    use crate::operation::Kind;
    use crate::value::Name;

    fn upper() -> Operation {
        Operation::builder("cols.upper")
            .source(Kind::Dataframe)
            .target(Kind::Dataframe)
            .arg(ArgSpec::new("cols").default("*"))
            .build()
    }

    #[test]
    fn test_render_in_place() {
        let mut kwargs = Kwargs::new();
        kwargs.insert(SOURCE.into(), Value::Name(Name::new("df1")));
        kwargs.insert(TARGET.into(), "df1".into());
        kwargs.insert("cols".into(), "*".into());

        assert_eq!(RemoteCodeGenMode::render(&upper(), &kwargs), r#"df1 = df1.cols.upper(cols="*")"#);
    }

    #[test]
    fn test_render_without_source_or_target() {
        let op = Operation::builder("readCsv").arg("url").build();
        let mut kwargs = Kwargs::new();
        kwargs.insert("url".into(), "a.csv".into());
        kwargs.insert(TARGET.into(), Value::Null);

        assert_eq!(RemoteCodeGenMode::render(&op, &kwargs), r#"read_csv(url="a.csv")"#);
    }

    #[test]
    fn test_local_mode_strips_target_from_explicit_kwargs() {
        let mut kwargs = Kwargs::new();
        kwargs.insert(TARGET.into(), "df2".into());
        kwargs.insert("n".into(), Value::Int(1));

        let kwargs = LocalProxyMode.prepare_explicit(kwargs);
        assert!(!kwargs.contains_key(TARGET));
        assert_eq!(kwargs["n"], Value::Int(1));
    }
}
