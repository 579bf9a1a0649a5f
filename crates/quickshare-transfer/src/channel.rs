/// The message channel a session runs on.
///
/// Implementations must deliver messages exactly once, in send order, without
/// corruption. `send` may suspend while the transport applies backpressure;
/// the engine never has more than one send in flight.

use std::future::Future;

use quickshare_types::PeerMessage;
use tokio::sync::mpsc;

use crate::error::TransferError;

pub trait Channel: Send + 'static {
    /// Send one message, waiting for transport capacity if needed.
    fn send(
        &mut self,
        message: PeerMessage,
    ) -> impl Future<Output = Result<(), TransferError>> + Send;

    /// Next message from the peer. `None` once the channel is closed.
    fn recv(&mut self) -> impl Future<Output = Option<Result<PeerMessage, TransferError>>> + Send;

    /// Close the channel. Idempotent.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// In-process channel end backed by bounded tokio mpsc queues.
///
/// The bounded capacity is the backpressure: `send` waits while the peer's
/// queue is full.
pub struct MemoryChannel {
    tx: Option<mpsc::Sender<PeerMessage>>,
    rx: mpsc::Receiver<PeerMessage>,
}

/// Two connected channel ends.
pub fn memory_pair(capacity: usize) -> (MemoryChannel, MemoryChannel) {
    let (a_tx, b_rx) = mpsc::channel(capacity);
    let (b_tx, a_rx) = mpsc::channel(capacity);
    (
        MemoryChannel { tx: Some(a_tx), rx: a_rx },
        MemoryChannel { tx: Some(b_tx), rx: b_rx },
    )
}

impl Channel for MemoryChannel {
    async fn send(&mut self, message: PeerMessage) -> Result<(), TransferError> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| TransferError::channel("channel closed"))?;
        tx.send(message)
            .await
            .map_err(|_| TransferError::channel("peer hung up"))
    }

    async fn recv(&mut self) -> Option<Result<PeerMessage, TransferError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        self.tx = None;
        self.rx.close();
    }
}
