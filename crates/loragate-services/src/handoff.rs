//! Handoff queue — the bounded channel between ingest and egress.
//!
//! With capacity 1 this is a single slot: `send` waits until egress has
//! taken the previous packet, so at most one unconsumed packet is ever in
//! transit and ingest feels egress backpressure directly. Larger
//! capacities add slack without changing ordering. Delivery is strict
//! FIFO under one producer and one consumer.

use std::time::Duration;

use tokio::sync::mpsc;

use loragate_core::Packet;

#[derive(Debug, thiserror::Error)]
pub enum HandoffError {
    /// The other half was dropped. Carries the packet back on send.
    #[error("handoff queue closed")]
    Closed(Option<Packet>),
    #[error("handoff queue timed out after {0:?}")]
    Timeout(Duration),
}

/// Ingest half.
#[derive(Debug, Clone)]
pub struct HandoffSender {
    tx: mpsc::Sender<Packet>,
}

/// Egress half.
#[derive(Debug)]
pub struct HandoffReceiver {
    rx: mpsc::Receiver<Packet>,
}

/// Create a handoff queue with `capacity` slots (at least one).
pub fn handoff(capacity: usize) -> (HandoffSender, HandoffReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (HandoffSender { tx }, HandoffReceiver { rx })
}

impl HandoffSender {
    /// Wait for a free slot, then enqueue. Waits indefinitely.
    pub async fn send(&self, packet: Packet) -> Result<(), HandoffError> {
        self.tx
            .send(packet)
            .await
            .map_err(|e| HandoffError::Closed(Some(e.0)))
    }

    /// Like [`send`](Self::send), giving up after `timeout`.
    pub async fn send_timeout(&self, packet: Packet, timeout: Duration) -> Result<(), HandoffError> {
        use mpsc::error::SendTimeoutError;
        match self.tx.send_timeout(packet, timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(HandoffError::Timeout(timeout)),
            Err(SendTimeoutError::Closed(p)) => Err(HandoffError::Closed(Some(p))),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl HandoffReceiver {
    /// Wait for the next packet. `None` once every sender is gone and the
    /// queue is drained.
    pub async fn recv(&mut self) -> Option<Packet> {
        self.rx.recv().await
    }

    /// Like [`recv`](Self::recv), giving up after `timeout`.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Result<Packet, HandoffError> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(packet)) => Ok(packet),
            Ok(None) => Err(HandoffError::Closed(None)),
            Err(_) => Err(HandoffError::Timeout(timeout)),
        }
    }
}
