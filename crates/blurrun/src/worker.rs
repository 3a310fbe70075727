//! # Worker Backend
//!
//! `WorkerBackend` reaches an engine running behind a channel. Every backend
//! call becomes one message on a `Peer`; buffers travel in the frame's
//! transfer list.

use blurrpc::Message;
use serde_json::Value as JsonValue;
use tracing::debug;
use tracing::warn;

use crate::backend::Backend;
use crate::backend::Feature;
use crate::codec;
use crate::config::Config;
use crate::error::Error;
use crate::error::Result;
use crate::peer::Peer;
use crate::peer::Request;
use crate::transport::Transport;
use crate::value::Callback;
use crate::value::Kwargs;
use crate::value::Value;

pub struct WorkerBackend {
    peer: Peer,
    features: Vec<Feature>,
}

impl WorkerBackend {
    /// Wraps a transport without any handshake.
    ///
    /// Functions cannot be bound as worker globals; they only travel as the
    /// callback of a `run` request, so `callbacks` is never advertised.
    pub fn new(transport: Box<dyn Transport>, config: &Config) -> Self {
        if config.features.contains(&Feature::Callbacks) {
            warn!("worker globals cannot hold functions, ignoring the callbacks feature");
        }
        Self {
            peer: Peer::with_timeouts("worker", transport, config.timeouts()),
            features: config
                .features
                .iter()
                .copied()
                .filter(|feature| *feature != Feature::Callbacks)
                .collect(),
        }
    }

    /// Wraps a transport, sends `init`, then `load` if packages are
    /// configured.
    pub async fn connect(transport: Box<dyn Transport>, config: &Config) -> Result<Self> {
        let backend = Self::new(transport, config);
        backend.init(config.init_options.clone()).await?;
        if !config.packages.is_empty() {
            backend.load(config.packages.clone()).await?;
        }
        Ok(backend)
    }

    pub async fn init(&self, options: JsonValue) -> Result<()> {
        debug!("initializing worker");
        self.peer.request(Message::init(options)).await?;
        Ok(())
    }

    pub async fn load(&self, packages: Vec<String>) -> Result<()> {
        debug!(?packages, "loading packages");
        self.peer.request(Message::load(packages)).await?;
        Ok(())
    }

    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    fn with_callback(request: Request, callback: Option<Callback>) -> Request {
        match callback {
            Some(callback) => request.callback(callback),
            None => request,
        }
    }
}

#[async_trait::async_trait]
impl Backend for WorkerBackend {
    async fn run_code(&self, code: &str, callback: Option<Callback>) -> Result<Value> {
        let request = Self::with_callback(Request::new(Message::run_code(code)), callback);
        Ok(self.peer.request(request).await?.result)
    }

    async fn run_code_into(&self, code: &str, target: &str, callback: Option<Callback>) -> Result<Value> {
        let message = Message::run_code(code).with_target(target);
        let request = Self::with_callback(Request::new(message), callback);
        Ok(self.peer.request(request).await?.result)
    }

    async fn run_method(
        &self,
        source: Option<Value>,
        path: &str,
        kwargs: Kwargs,
        callback: Option<Callback>,
    ) -> Result<Value> {
        let source = match &source {
            Some(value) => Some(
                value
                    .as_reference()
                    .ok_or(codec::Error::Unclonable("proxy"))?
                    .to_string(),
            ),
            None => None,
        };
        let mut transfer = Vec::new();
        let kwargs = codec::encode_kwargs(&kwargs, &mut transfer)?;
        let request = Request::new(Message::run_method(source, path, kwargs)).transfer(transfer);
        let request = Self::with_callback(request, callback);
        Ok(self.peer.request(request).await?.result)
    }

    async fn set_global(&self, name: &str, value: Value) -> Result<()> {
        match &value {
            Value::Buffer(_) if !self.supports(Feature::Buffers) => {
                return Err(Error::Unsupported(Feature::Buffers));
            }
            Value::Callback(_) => return Err(Error::Unsupported(Feature::Callbacks)),
            _ => (),
        }
        let mut transfer = Vec::new();
        let json = codec::encode(&value, &mut transfer)?;
        let request = Request::new(Message::set_global(name, json)).transfer(transfer);
        self.peer.request(request).await?;
        Ok(())
    }

    async fn get_global(&self, name: &str) -> Result<Value> {
        self.run_code(name, None).await
    }

    fn supports(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }
}
