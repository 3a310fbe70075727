//! # Value Marshaller
//!
//! Converts argument values into a form the backend can accept. Values that
//! cannot be cloned across the boundary (buffers, functions) are bound as
//! backend globals under freshly minted names and replaced by Name
//! references.
//!
//! Marshalling itself is synchronous. The bindings it decides on are
//! collected as `Registration`s and must be applied with `register` before
//! the marshalled value is sent.
//!
//! ## Invariants
//! - Deterministic, and idempotent on already-marshalled input: a Name
//!   reference marshals to itself.
//! - A value the backend cannot take is dropped to `Null` with a warning,
//!   never an error.

use tracing::warn;

use crate::backend::Backend;
use crate::backend::Feature;
use crate::error::Result;
use crate::names::NameMint;
use crate::value::Kwargs;
use crate::value::Name;
use crate::value::Value;

/// A backend global that must be bound before the marshalled value is used.
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub name: String,
    pub value: Value,
}

pub struct Marshaller<'a> {
    backend: &'a dyn Backend,
    names: &'a NameMint,
    use_proxies: bool,
    registrations: Vec<Registration>,
}

impl<'a> Marshaller<'a> {
    /// `use_proxies` selects the in-process fast path: live objects, buffers
    /// and functions are handed over by reference.
    pub fn new(backend: &'a dyn Backend, names: &'a NameMint, use_proxies: bool) -> Self {
        Self {
            backend,
            names,
            use_proxies,
            registrations: Vec::new(),
        }
    }

    pub fn marshal(&mut self, value: Value) -> Value {
        match value {
            Value::Proxy(proxy) => Value::Proxy(proxy),
            Value::Handle(source) => match source.data() {
                Some(proxy) if self.use_proxies => Value::Proxy(proxy.clone()),
                _ => Value::Name(Name::new(source.name())),
            },
            Value::Name(name) => Value::Name(name),
            Value::Buffer(bytes) => self.bind(Feature::Buffers, "file", Value::Buffer(bytes)),
            Value::Callback(callback) => self.bind(Feature::Callbacks, "func", Value::Callback(callback)),
            Value::List(items) => Value::List(items.into_iter().map(|v| self.marshal(v)).collect()),
            Value::Record(record) => Value::Record(
                record.into_iter().map(|(k, v)| (k, self.marshal(v))).collect(),
            ),
            primitive => primitive,
        }
    }

    pub fn marshal_kwargs(&mut self, kwargs: Kwargs) -> Kwargs {
        kwargs.into_iter().map(|(k, v)| (k, self.marshal(v))).collect()
    }

    fn bind(&mut self, feature: Feature, prefix: &str, value: Value) -> Value {
        if !self.backend.supports(feature) {
            warn!(%feature, "backend does not support {}, argument replaced by None", feature);
            return Value::Null;
        }
        if self.use_proxies {
            return value;
        }
        let name = self.names.mint(prefix);
        self.registrations.push(Registration { name: name.clone(), value });
        Value::Name(Name::new(name))
    }

    pub fn registrations(&self) -> &[Registration] {
        &self.registrations
    }

    pub fn into_registrations(self) -> Vec<Registration> {
        self.registrations
    }
}

/// Binds every registration on the backend, in order.
pub async fn register(backend: &dyn Backend, registrations: Vec<Registration>) -> Result<()> {
    for Registration { name, value } in registrations {
        backend.set_global(&name, value).await?;
    }
    Ok(())
}
