//! # Worker Host
//!
//! The worker side of the channel: reads request frames, drives an `Engine`
//! and writes replies.
//!
//! ## Invariants
//! - Every request gets exactly one terminal reply with its own id and kind.
//! - Callback deliveries for a request are written before its terminal
//!   reply; a single writer task keeps frames in the order they are queued.
//! - A callback bound for a `run` request is unbound before its terminal
//!   reply is written.
//! - `init` reaches the engine once; repeated `init` requests get the first
//!   outcome.
//! - A result that cannot be encoded is replaced by a Name stub for the
//!   request's `target` kwarg and flagged `partial`. Without a target the
//!   request fails instead.
//! - A frame that cannot be attributed to a request is answered with an
//!   id-less fault.

use std::sync::Arc;

use blurrpc::Frame;
use blurrpc::Message;
use blurrpc::MessageKind;
use blurrpc::name_ref;
use serde_json::Value as JsonValue;
use tokio::sync::OnceCell;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::warn;

use crate::codec;
use crate::engine::Engine;
use crate::transport::Transport;
use crate::value::Callback;
use crate::value::Kwargs;
use crate::value::Name;
use crate::value::Value;

/// Queue feeding the single writer task.
#[derive(Clone)]
struct Outbox {
    tx: mpsc::UnboundedSender<Frame>,
}

impl Outbox {
    fn send(&self, message: &Message, transfer: Vec<Vec<u8>>) {
        match Frame::encode(message, transfer) {
            Ok(frame) => {
                if self.tx.send(frame).is_err() {
                    debug!(id = ?message.id, "writer gone, reply dropped");
                }
            }
            Err(e) => error!(id = ?message.id, error = %e, "could not encode reply"),
        }
    }

    /// Encodes a value into a message built by `build`, or reports why it
    /// cannot be encoded.
    fn send_value(&self, value: &Value, build: impl FnOnce(JsonValue) -> Message) -> Result<(), codec::Error> {
        let mut transfer = Vec::new();
        let json = codec::encode(value, &mut transfer)?;
        self.send(&build(json), transfer);
        Ok(())
    }
}

pub struct WorkerHost<E: Engine> {
    engine: Arc<E>,
    transport: Arc<dyn Transport>,
    initialized: Arc<OnceCell<Result<(), String>>>,
}

impl<E: Engine> WorkerHost<E> {
    pub fn new(engine: Arc<E>, transport: Box<dyn Transport>) -> Self {
        Self {
            engine,
            transport: Arc::from(transport),
            initialized: Arc::new(OnceCell::new()),
        }
    }

    /// Serves on a background task until the channel closes.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.serve())
    }

    pub async fn serve(self) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Frame>();
        let writer_transport = self.transport.clone();
        let writer = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if let Err(e) = writer_transport.send(frame).await {
                    error!(error = %e, "worker could not write reply");
                    break;
                }
            }
        });
        let outbox = Outbox { tx };

        loop {
            match self.transport.recv().await {
                Ok(Some(frame)) => {
                    let engine = self.engine.clone();
                    let initialized = self.initialized.clone();
                    let outbox = outbox.clone();
                    tokio::spawn(async move {
                        handle_frame(engine.as_ref(), &initialized, frame, &outbox).await;
                    });
                }
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "worker channel failed");
                    break;
                }
            }
        }

        drop(outbox);
        let _ = writer.await;
    }
}

async fn handle_frame<E: Engine>(
    engine: &E,
    initialized: &OnceCell<Result<(), String>>,
    frame: Frame,
    outbox: &Outbox,
) {
    let message = match frame.decode() {
        Ok(message) => message,
        Err(e) => {
            let reply = match frame.peek_id() {
                Some(id) => Message::failure(MessageKind::Run, id, e.to_string()),
                None => Message::fault(MessageKind::Run, e.to_string()),
            };
            outbox.send(&reply, Vec::new());
            return;
        }
    };
    let Some(id) = message.id else {
        outbox.send(&Message::fault(message.kind, "request without id"), Vec::new());
        return;
    };

    let kind = message.kind;
    debug!(id, %kind, "handling request");
    let result = match kind {
        MessageKind::Init => {
            let options = message.options.clone().unwrap_or(JsonValue::Null);
            initialized
                .get_or_init(|| async { engine.initialize(&options).await.map_err(|e| e.0) })
                .await
                .clone()
                .map(|()| Value::Null)
        }
        MessageKind::Load => engine
            .load(message.packages.as_deref().unwrap_or_default())
            .await
            .map(|()| Value::Null)
            .map_err(|e| e.0),
        MessageKind::Run => run(engine, &message, &frame.transfer, outbox).await,
        MessageKind::SetGlobal => set_global(engine, &message, &frame.transfer).await,
    };

    match result {
        Ok(value) => {
            if let Err(e) = outbox.send_value(&value, |json| Message::reply(kind, id, json)) {
                match message.target() {
                    Some(target) => {
                        warn!(id, error = %e, variable = target, "result not sendable, replying with a name stub");
                        outbox.send(&Message::reply(kind, id, name_ref(target)).with_partial(), Vec::new());
                    }
                    None => outbox.send(&Message::failure(kind, id, e.to_string()), Vec::new()),
                }
            }
        }
        Err(error) => outbox.send(&Message::failure(kind, id, error), Vec::new()),
    }
}

async fn run<E: Engine>(engine: &E, message: &Message, transfer: &[Vec<u8>], outbox: &Outbox) -> Result<Value, String> {
    let id = message.id.unwrap_or_default();
    let Some(token) = &message.uses_callback else {
        return execute(engine, message, transfer).await;
    };

    let emitter = outbox.clone();
    let callback = Callback::new(move |value| {
        if let Err(e) = emitter.send_value(&value, |json| Message::callback(id, json)) {
            warn!(id, error = %e, "callback result not sendable, dropped");
        }
    });
    engine
        .set_global(token, Value::Callback(callback))
        .await
        .map_err(|e| e.0)?;

    let result = execute(engine, message, transfer).await;
    if let Err(e) = engine.delete_global(token).await {
        warn!(id, token = %token, error = %e, "could not unbind callback");
    }
    result
}

async fn execute<E: Engine>(engine: &E, message: &Message, transfer: &[Vec<u8>]) -> Result<Value, String> {
    if let Some(code) = &message.code {
        return engine.run_code(code).await.map_err(|e| e.0);
    }
    let Some(path) = &message.path else {
        return Err("run request without code or path".into());
    };
    let kwargs = match &message.kwargs {
        Some(obj) => codec::decode_kwargs(obj, transfer).map_err(|e| e.to_string())?,
        None => Kwargs::new(),
    };
    let source = message.source.as_deref().map(|name| Value::Name(Name::new(name)));
    engine.run_method(source, path, kwargs).await.map_err(|e| e.0)
}

async fn set_global<E: Engine>(engine: &E, message: &Message, transfer: &[Vec<u8>]) -> Result<Value, String> {
    let Some(name) = &message.name else {
        return Err("setGlobal request without name".into());
    };
    let value = match &message.value {
        Some(json) => codec::decode(json, transfer).map_err(|e| e.to_string())?,
        None => Value::Null,
    };
    engine.set_global(name, value).await.map_err(|e| e.0)?;
    Ok(Value::Null)
}
