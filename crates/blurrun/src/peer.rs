//! # RPC Peer with Async Pump
//!
//! The `Peer` owns one transport and multiplexes any number of concurrent
//! requests over it. A background pump reads frames and routes each reply to
//! the request with the same id; a sweeper rejects requests whose deadline
//! has passed.
//!
//! ## Invariants
//! - Ids start at 1 and are never reused by a peer.
//! - An id is inserted into the pending arena before its frame is sent and
//!   removed exactly once: by its terminal reply, by the sweeper, by
//!   cancellation, or by a channel fault.
//! - Callback deliveries (`isCallbackResult`) never remove the entry.
//! - A reply for a timed out or cancelled id is ignored while the id is
//!   remembered, which is one request timeout from its retirement. The sweep
//!   forgets it after that.
//! - A reply for an id that is neither pending nor remembered as retired is
//!   a fault that closes the channel and rejects everything still pending.

use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use blurrpc::CALLBACK_PLACEHOLDER;
use blurrpc::Frame;
use blurrpc::Message;
use blurrpc::MessageKind;
use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;
use tracing::error;
use tracing::warn;

use crate::codec;
use crate::transport;
use crate::transport::Transport;
use crate::value::Callback;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    Transport(transport::Error),
    /// A frame or value could not be encoded or decoded.
    Protocol(String),
    /// The worker answered with an error message.
    Remote(String),
    Timeout,
    Cancelled,
    /// The peer went away before the reply arrived.
    ChannelClosed,
    /// The worker reported a failure no request can be blamed for.
    Fault(String),
    /// A reply named an id that was never issued or is already settled.
    UnknownId(u64),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "Transport error: {}", e),
            Self::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            Self::Remote(msg) => f.write_str(msg),
            Self::Timeout => write!(f, "Request timed out"),
            Self::Cancelled => write!(f, "Request cancelled"),
            Self::ChannelClosed => write!(f, "Response channel closed"),
            Self::Fault(msg) => write!(f, "Channel fault: {}", msg),
            Self::UnknownId(id) => write!(f, "Reply for unknown request id {}", id),
        }
    }
}

impl std::error::Error for Error {}

impl From<transport::Error> for Error {
    fn from(e: transport::Error) -> Self {
        Self::Transport(e)
    }
}

impl From<blurrpc::Error> for Error {
    fn from(e: blurrpc::Error) -> Self {
        Self::Protocol(e.to_string())
    }
}

impl From<codec::Error> for Error {
    fn from(e: codec::Error) -> Self {
        Self::Protocol(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Deadline of each request, measured from when it is sent.
    pub request: Duration,
    /// Period of the expiry sweep.
    pub sweep: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(30),
            sweep: Duration::from_secs(1),
        }
    }
}

/// Terminal result of a request.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub result: Value,
    /// The worker could not send the real result back and `result` is only a
    /// Name stub for the target variable.
    pub partial: bool,
}

/// An outgoing message with its transfer list and optional callback.
pub struct Request {
    message: Message,
    transfer: Vec<Vec<u8>>,
    callback: Option<Callback>,
    callback_key: Option<String>,
    placeholder: String,
}

impl Request {
    pub fn new(message: Message) -> Self {
        Self {
            message,
            transfer: Vec::new(),
            callback: None,
            callback_key: None,
            placeholder: CALLBACK_PLACEHOLDER.to_string(),
        }
    }

    pub fn transfer(mut self, transfer: Vec<Vec<u8>>) -> Self {
        self.transfer = transfer;
        self
    }

    pub fn callback(mut self, callback: Callback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Suffix of the per-request callback token. Falls back to the
    /// callback's own key, then to `default`.
    pub fn callback_key(mut self, key: impl Into<String>) -> Self {
        self.callback_key = Some(key.into());
        self
    }

    /// The token in code or kwargs that stands for this request's callback.
    pub fn placeholder(mut self, token: impl Into<String>) -> Self {
        self.placeholder = token.into();
        self
    }
}

impl From<Message> for Request {
    fn from(message: Message) -> Self {
        Self::new(message)
    }
}

struct Pending {
    tx: oneshot::Sender<Result<Reply>>,
    callback: Option<Callback>,
    deadline: Instant,
}

/// The pending arena shared by the peer, its pump and outstanding requests.
struct Inflight {
    pending: DashMap<u64, Pending>,
    /// Retired ids and when to forget them.
    retired: DashMap<u64, Instant>,
    retention: Duration,
    next_id: AtomicU64,
    fault: OnceLock<Error>,
}

impl Inflight {
    fn new(retention: Duration) -> Self {
        Self {
            pending: DashMap::new(),
            retired: DashMap::new(),
            retention,
            next_id: AtomicU64::new(1),
            fault: OnceLock::new(),
        }
    }

    /// Rejects a pending request and remembers its id so a late reply is
    /// not mistaken for a fault.
    fn retire(&self, id: u64, error: Error) {
        if let Some((_, pending)) = self.pending.remove(&id) {
            self.retired.insert(id, Instant::now() + self.retention);
            let _ = pending.tx.send(Err(error));
        }
    }

    fn sweep(&self, now: Instant) {
        let expired: Vec<u64> = self
            .pending
            .iter()
            .filter(|entry| entry.deadline <= now)
            .map(|entry| *entry.key())
            .collect();
        for id in expired {
            warn!(id, "request timed out");
            self.retire(id, Error::Timeout);
        }
        self.retired.retain(|_, forget_at| *forget_at > now);
    }

    fn fail_all(&self, error: Error) {
        let _ = self.fault.set(error.clone());
        let keys: Vec<u64> = self.pending.iter().map(|entry| *entry.key()).collect();
        for key in keys {
            if let Some((_, pending)) = self.pending.remove(&key) {
                let _ = pending.tx.send(Err(error.clone()));
            }
        }
    }

    fn handle_frame(&self, frame: Frame) -> Result<()> {
        let message = match frame.decode() {
            Ok(message) => message,
            Err(e) => {
                let Some(id) = frame.peek_id() else {
                    return Err(e.into());
                };
                warn!(id, error = %e, "undecodable reply");
                return self.settle(id, Err(e.into()));
            }
        };

        let Some(id) = message.id else {
            let reason = message
                .error
                .unwrap_or_else(|| format!("{} message without id", message.kind));
            return Err(Error::Fault(reason));
        };

        if message.is_callback_result() {
            return self.deliver(id, &message, &frame.transfer);
        }

        let partial = message.is_partial();
        let result = match &message.error {
            Some(error) => Err(Error::Remote(error.clone())),
            None => decode_result(&message, &frame.transfer).map(|result| Reply { result, partial }),
        };
        if partial {
            warn!(id, "worker could not return the result, got a name stub");
        }
        self.settle(id, result)
    }

    fn settle(&self, id: u64, result: Result<Reply>) -> Result<()> {
        match self.pending.remove(&id) {
            Some((_, pending)) => {
                debug!(id, ok = result.is_ok(), "request settled");
                let _ = pending.tx.send(result);
                Ok(())
            }
            None if self.retired.remove(&id).is_some() => {
                warn!(id, "late reply for retired request ignored");
                Ok(())
            }
            None => Err(Error::UnknownId(id)),
        }
    }

    fn deliver(&self, id: u64, message: &Message, transfer: &[Vec<u8>]) -> Result<()> {
        let callback = match self.pending.get(&id) {
            Some(entry) => entry.callback.clone(),
            None if self.retired.contains_key(&id) => {
                debug!(id, "callback result for retired request ignored");
                return Ok(());
            }
            None => return Err(Error::UnknownId(id)),
        };
        let Some(callback) = callback else {
            warn!(id, "callback result for a request without callback ignored");
            return Ok(());
        };
        match decode_result(message, transfer) {
            Ok(value) => callback.call(value),
            Err(e) => warn!(id, error = %e, "undecodable callback result dropped"),
        }
        Ok(())
    }
}

fn decode_result(message: &Message, transfer: &[Vec<u8>]) -> Result<Value> {
    match &message.result {
        Some(json) => Ok(codec::decode(json, transfer)?),
        None => Ok(Value::Null),
    }
}

/// RPC peer with an async message pump for concurrent requests.
pub struct Peer {
    peer_name: String,
    transport: Arc<dyn Transport>,
    inflight: Arc<Inflight>,
    timeouts: Timeouts,
    pump: JoinHandle<()>,
    sweeper: JoinHandle<()>,
}

impl Peer {
    /// Creates a peer with default timeouts and spawns its background tasks.
    pub fn new(peer_name: impl Into<String>, transport: Box<dyn Transport>) -> Self {
        Self::with_timeouts(peer_name, transport, Timeouts::default())
    }

    pub fn with_timeouts(peer_name: impl Into<String>, transport: Box<dyn Transport>, timeouts: Timeouts) -> Self {
        let peer_name = peer_name.into();
        let transport: Arc<dyn Transport> = Arc::from(transport);
        let inflight = Arc::new(Inflight::new(timeouts.request));

        let pump_transport = transport.clone();
        let pump_inflight = inflight.clone();
        let pump_name = peer_name.clone();
        let pump = tokio::spawn(async move {
            let error = loop {
                match pump_transport.recv().await {
                    Ok(Some(frame)) => {
                        if let Err(e) = pump_inflight.handle_frame(frame) {
                            break e;
                        }
                    }
                    Ok(None) => {
                        break Error::Transport(transport::Error::ConnectionLost("Stream closed".into()));
                    }
                    Err(e) => break Error::Transport(e),
                }
            };
            error!(peer = %pump_name, error = %error, "channel failed, rejecting pending requests");
            pump_inflight.fail_all(error);
        });

        let sweep_inflight = inflight.clone();
        let period = timeouts.sweep.max(Duration::from_millis(1));
        let sweeper = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                sweep_inflight.sweep(Instant::now());
            }
        });

        Self {
            peer_name,
            transport,
            inflight,
            timeouts,
            pump,
            sweeper,
        }
    }

    pub fn peer_name(&self) -> &str {
        &self.peer_name
    }

    /// Number of requests still waiting for a terminal reply.
    pub fn in_flight(&self) -> usize {
        self.inflight.pending.len()
    }

    /// Number of timed out or cancelled ids still remembered.
    pub fn retired(&self) -> usize {
        self.inflight.retired.len()
    }

    pub fn is_pending(&self, id: u64) -> bool {
        self.inflight.pending.contains_key(&id)
    }

    /// Registers and sends a request without waiting for its reply.
    ///
    /// If the request carries a callback and is a `run`, every occurrence of
    /// the placeholder token is rewritten to a token unique to this request,
    /// which is also sent as `usesCallback`.
    pub async fn start(&self, request: Request) -> Result<PendingRequest> {
        let Request {
            mut message,
            transfer,
            callback,
            callback_key,
            placeholder,
        } = request;

        if let Some(error) = self.inflight.fault.get() {
            return Err(error.clone());
        }

        let id = self.inflight.next_id.fetch_add(1, Ordering::Relaxed);
        message.id = Some(id);

        let callback = match callback {
            Some(callback) if message.kind == MessageKind::Run => {
                let key = callback_key.as_deref().or(callback.key()).unwrap_or("default");
                let unique = format!("{}{}_{}", CALLBACK_PLACEHOLDER, id, key);
                message.rewrite_callback(&placeholder, &unique);
                message.uses_callback = Some(unique);
                Some(callback)
            }
            Some(_) => {
                warn!(id, kind = %message.kind, "callback ignored on a non-run request");
                None
            }
            None => None,
        };

        let frame = Frame::encode(&message, transfer)?;
        let (tx, rx) = oneshot::channel();
        self.inflight.pending.insert(id, Pending {
            tx,
            callback,
            deadline: Instant::now() + self.timeouts.request,
        });

        // The pump may have failed between the first check and the insert.
        if let Some(error) = self.inflight.fault.get() {
            self.inflight.pending.remove(&id);
            return Err(error.clone());
        }

        debug!(peer = %self.peer_name, id, kind = %message.kind, "sending request");
        if let Err(e) = self.transport.send(frame).await {
            self.inflight.pending.remove(&id);
            return Err(e.into());
        }

        Ok(PendingRequest {
            id,
            rx,
            inflight: self.inflight.clone(),
            settled: false,
        })
    }

    /// Sends a request and waits for its terminal reply.
    pub async fn request(&self, request: impl Into<Request>) -> Result<Reply> {
        self.start(request.into()).await?.wait().await
    }
}

impl Drop for Peer {
    fn drop(&mut self) {
        self.pump.abort();
        self.sweeper.abort();
        self.inflight.fail_all(Error::ChannelClosed);
    }
}

/// A sent request awaiting its terminal reply.
///
/// Dropping it before the reply arrives retires the id.
pub struct PendingRequest {
    id: u64,
    rx: oneshot::Receiver<Result<Reply>>,
    inflight: Arc<Inflight>,
    settled: bool,
}

impl PendingRequest {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Rejects the request with `Cancelled`. No-op once it has settled.
    pub fn cancel(&self) {
        self.inflight.retire(self.id, Error::Cancelled);
    }

    /// A handle that can cancel this request from another task.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            id: self.id,
            inflight: self.inflight.clone(),
        }
    }

    pub async fn wait(mut self) -> Result<Reply> {
        let received = (&mut self.rx).await;
        self.settled = true;
        match received {
            Ok(result) => result,
            Err(_) => Err(Error::ChannelClosed),
        }
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        if !self.settled {
            self.inflight.retire(self.id, Error::Cancelled);
        }
    }
}

#[derive(Clone)]
pub struct CancelHandle {
    id: u64,
    inflight: Arc<Inflight>,
}

impl CancelHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn cancel(&self) {
        self.inflight.retire(self.id, Error::Cancelled);
    }
}
