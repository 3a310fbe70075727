//! # In-Process Backend
//!
//! `LocalBackend` drives an `Engine` living in this process. Values are
//! handed over as they are: proxies, buffers and callbacks need no wire
//! form.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use blurrpc::CALLBACK_PLACEHOLDER;
use tracing::warn;

use crate::backend::Backend;
use crate::backend::Feature;
use crate::engine::Engine;
use crate::error::Error;
use crate::error::Result;
use crate::value::Callback;
use crate::value::Kwargs;
use crate::value::Name;
use crate::value::Value;

pub struct LocalBackend<E: Engine> {
    engine: Arc<E>,
    features: HashSet<Feature>,
    callbacks: AtomicU64,
}

impl<E: Engine> LocalBackend<E> {
    /// A backend supporting both buffers and callbacks.
    pub fn new(engine: Arc<E>) -> Self {
        Self::with_features(engine, [Feature::Buffers, Feature::Callbacks])
    }

    pub fn with_features(engine: Arc<E>, features: impl IntoIterator<Item = Feature>) -> Self {
        Self {
            engine,
            features: features.into_iter().collect(),
            callbacks: AtomicU64::new(1),
        }
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    /// Binds the callback under a fresh token and returns the token.
    async fn bind_callback(&self, callback: Callback) -> Result<String> {
        let n = self.callbacks.fetch_add(1, Ordering::Relaxed);
        let token = format!("{}{}_{}", CALLBACK_PLACEHOLDER, n, callback.key().unwrap_or("default"));
        self.engine.set_global(&token, Value::Callback(callback)).await?;
        Ok(token)
    }

    /// Tokens are single-use; the global goes once the call has returned.
    async fn unbind_callback(&self, token: &str) {
        if let Err(e) = self.engine.delete_global(token).await {
            warn!(token, error = %e, "could not unbind callback");
        }
    }

    fn check(&self, value: &Value) -> Result<()> {
        let feature = match value {
            Value::Buffer(_) => Feature::Buffers,
            Value::Callback(_) => Feature::Callbacks,
            _ => return Ok(()),
        };
        if self.features.contains(&feature) {
            Ok(())
        } else {
            Err(Error::Unsupported(feature))
        }
    }
}

fn rename_names(value: &mut Value, from: &str, to: &str) {
    match value {
        Value::Name(name) if name.as_str() == from => *name = Name::new(to),
        Value::List(items) => items.iter_mut().for_each(|v| rename_names(v, from, to)),
        Value::Record(record) => record.values_mut().for_each(|v| rename_names(v, from, to)),
        _ => (),
    }
}

#[async_trait::async_trait]
impl<E: Engine> Backend for LocalBackend<E> {
    async fn run_code(&self, code: &str, callback: Option<Callback>) -> Result<Value> {
        let Some(callback) = callback else {
            return Ok(self.engine.run_code(code).await?);
        };
        let token = self.bind_callback(callback).await?;
        let result = self.engine.run_code(&code.replace(CALLBACK_PLACEHOLDER, &token)).await;
        self.unbind_callback(&token).await;
        Ok(result?)
    }

    async fn run_method(
        &self,
        source: Option<Value>,
        path: &str,
        mut kwargs: Kwargs,
        callback: Option<Callback>,
    ) -> Result<Value> {
        let Some(callback) = callback else {
            return Ok(self.engine.run_method(source, path, kwargs).await?);
        };
        let token = self.bind_callback(callback).await?;
        for value in kwargs.values_mut() {
            rename_names(value, CALLBACK_PLACEHOLDER, &token);
        }
        let result = self.engine.run_method(source, path, kwargs).await;
        self.unbind_callback(&token).await;
        Ok(result?)
    }

    async fn set_global(&self, name: &str, value: Value) -> Result<()> {
        self.check(&value)?;
        Ok(self.engine.set_global(name, value).await?)
    }

    async fn get_global(&self, name: &str) -> Result<Value> {
        Ok(self.engine.get_global(name).await?)
    }

    fn supports(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }
}
