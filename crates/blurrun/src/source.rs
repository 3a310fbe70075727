//! # Remote Handles
//!
//! A `Source` names a value living in the backend. In process it may also
//! carry the live proxy itself. A handle returned by a deferred chain
//! carries the chain in its param queue; the queue is drained exactly once,
//! by whichever call sends it first.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use crate::args::Args;
use crate::client::Client;
use crate::error::Result;
use crate::pipeline::Invocation;
use crate::value::Proxy;
use crate::value::Value;

/// Invocations collected while execution is deferred.
pub type ParamQueue = Arc<Mutex<Vec<Invocation>>>;

#[derive(Clone)]
pub struct Source {
    name: String,
    data: Option<Proxy>,
    queue: ParamQueue,
    client: Client,
}

impl Source {
    pub(crate) fn new(client: Client, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: None,
            queue: ParamQueue::default(),
            client,
        }
    }

    pub(crate) fn with_data(client: Client, name: impl Into<String>, data: Proxy) -> Self {
        Self {
            data: Some(data),
            ..Self::new(client, name)
        }
    }

    pub(crate) fn deferred(client: Client, name: impl Into<String>, queue: Vec<Invocation>) -> Self {
        Self {
            queue: Arc::new(Mutex::new(queue)),
            ..Self::new(client, name)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The live object, when the backend runs in process.
    pub fn data(&self) -> Option<&Proxy> {
        self.data.as_ref()
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Whether the value is still waiting on an unsent chain.
    pub fn is_deferred(&self) -> bool {
        !self.lock().is_empty()
    }

    /// A copy of the unsent chain.
    pub fn queued(&self) -> Vec<Invocation> {
        self.lock().clone()
    }

    /// Drains the unsent chain. Later calls see an empty queue.
    pub fn take_queue(&self) -> Vec<Invocation> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Invocation>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Calls `operation` with this handle as its source.
    pub async fn call(&self, operation: &str, args: impl Into<Args>) -> Result<Value> {
        let step = Invocation::new(operation)
            .args(args)
            .source(Value::Handle(self.clone()));
        self.client.run(vec![step]).await
    }

    /// Sends the unsent chain, if any, and returns the resulting handle.
    pub async fn materialize(&self) -> Result<Value> {
        let queue = self.take_queue();
        if queue.is_empty() {
            return Ok(Value::Handle(self.clone()));
        }
        self.client.send(queue).await
    }

    /// Source text of the unsent chain.
    pub fn code(&self) -> Result<String> {
        self.client.code(&self.queued())
    }
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Source")
            .field("name", &self.name)
            .field("data", &self.data)
            .field("queued", &self.lock().len())
            .finish()
    }
}

impl PartialEq for Source {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.data == other.data
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}
