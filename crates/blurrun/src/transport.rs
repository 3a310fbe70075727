//! # Transport Abstraction
//!
//! A minimal async interface for moving frames between a client and a worker.
//!
//! ## Philosophy
//!
//! - **Frame-Oriented**: The transport moves a JSON body and its transfer list.
//!   It never looks inside the body.
//! - **Duplex**: Sending and receiving are independent. Correlation of replies
//!   to requests happens in the peer, not here.

use blurrpc::Frame;

/// Errors that occur at the channel layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The other side is gone or the connection was dropped.
    ConnectionLost(String),
    /// Generic I/O error or internal transport failure.
    Io(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectionLost(msg) => write!(f, "Connection lost: {}", msg),
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// A bidirectional frame channel.
///
/// Object-safe, so it can live behind `Arc<dyn Transport>`.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Queues a frame for the other side. Frames arrive in send order.
    async fn send(&self, frame: Frame) -> Result<()>;

    /// Waits for the next frame. `Ok(None)` means the stream closed cleanly.
    async fn recv(&self) -> Result<Option<Frame>>;
}
