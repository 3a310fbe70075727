//! In-memory transports.
//!
//! `ChannelTransport` carries frames between a client `Peer` and a
//! `WorkerHost` in the same process, with the full encode/decode path in
//! between. Either end can hang up without being dropped, which is how the
//! suites simulate a worker going away mid-request.

use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use blurrpc::Frame;
use tokio::sync::mpsc;

use crate::transport;
use crate::transport::Transport;

/// One end of an in-memory frame channel.
pub struct ChannelTransport {
    /// `None` once this end has hung up.
    outgoing: Mutex<Option<mpsc::UnboundedSender<Frame>>>,
    incoming: tokio::sync::Mutex<mpsc::UnboundedReceiver<Frame>>,
    sent: AtomicUsize,
}

impl ChannelTransport {
    /// Two ends connected to each other: frames sent on one come out of the
    /// other's `recv`.
    pub fn pair() -> (Self, Self) {
        let (to_b, from_a) = mpsc::unbounded_channel();
        let (to_a, from_b) = mpsc::unbounded_channel();
        (Self::end(to_b, from_b), Self::end(to_a, from_a))
    }

    fn end(outgoing: mpsc::UnboundedSender<Frame>, incoming: mpsc::UnboundedReceiver<Frame>) -> Self {
        Self {
            outgoing: Mutex::new(Some(outgoing)),
            incoming: tokio::sync::Mutex::new(incoming),
            sent: AtomicUsize::new(0),
        }
    }

    /// Frames sent from this end so far.
    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::Relaxed)
    }

    /// Hangs up this end. The other end reads whatever is already queued,
    /// then sees the stream close; later sends from this end fail.
    pub fn close(&self) {
        self.outgoing().take();
    }

    pub fn is_closed(&self) -> bool {
        self.outgoing().is_none()
    }

    fn outgoing(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<Frame>>> {
        self.outgoing.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait::async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, frame: Frame) -> transport::Result<()> {
        let outgoing = self.outgoing();
        let Some(tx) = outgoing.as_ref() else {
            return Err(transport::Error::ConnectionLost("Channel closed by this end".into()));
        };
        tx.send(frame)
            .map_err(|_| transport::Error::ConnectionLost("Channel closed".into()))?;
        self.sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn recv(&self) -> transport::Result<Option<Frame>> {
        Ok(self.incoming.lock().await.recv().await)
    }
}
