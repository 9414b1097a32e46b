//! Radio ingest — polls the radio, drops relayed duplicates, and hands
//! unique packets to egress.
//!
//! Two states. Polling: nothing pending, sleep for the poll interval.
//! Draining: the radio reports frames, read them one at a time until it
//! reports none. Every frame with a valid identity is recorded in the
//! duplicate filter whether or not it is forwarded.

use std::time::Duration;

use tokio::sync::broadcast;

use loragate_core::Packet;
use loragate_services::{DuplicateFilter, HandoffError, HandoffSender, Radio};

use crate::stats::IngestStats;

/// What happened to one received frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDisposition {
    Forwarded,
    Duplicate,
    /// Shorter than the identity header.
    Rejected,
}

pub struct IngestLoop<R> {
    radio: R,
    filter: DuplicateFilter,
    queue: HandoffSender,
    buf: Vec<u8>,
    poll_interval: Duration,
    stats: IngestStats,
}

impl<R: Radio> IngestLoop<R> {
    pub fn new(
        radio: R,
        filter: DuplicateFilter,
        queue: HandoffSender,
        receive_buffer_bytes: usize,
        poll_interval: Duration,
        stats: IngestStats,
    ) -> Self {
        Self {
            radio,
            filter,
            queue,
            buf: vec![0u8; receive_buffer_bytes],
            poll_interval,
            stats,
        }
    }

    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> anyhow::Result<()> {
        tracing::info!(
            dedup_capacity = self.filter.capacity(),
            buffer = self.buf.len(),
            "ingest loop started"
        );
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("ingest loop shutting down");
                    return Ok(());
                }

                drained = self.drain() => {
                    if let Err(e) = drained {
                        tracing::info!(error = %e, "handoff queue closed, ingest loop exiting");
                        return Ok(());
                    }
                }
            }

            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("ingest loop shutting down");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    /// Read every pending frame. Returns how many were forwarded.
    ///
    /// Fails only when egress has gone away.
    pub async fn drain(&mut self) -> Result<usize, HandoffError> {
        let mut forwarded = 0;
        while self.radio.has_data() {
            let len = match self.radio.read(&mut self.buf) {
                Ok(len) => len,
                Err(e) => {
                    tracing::warn!(error = %e, "radio read failed");
                    break;
                }
            };
            match self.handle_frame(len).await? {
                FrameDisposition::Forwarded => forwarded += 1,
                // Nothing awaited for this frame; let other tasks run.
                FrameDisposition::Duplicate | FrameDisposition::Rejected => {
                    tokio::task::yield_now().await
                }
            }
        }
        Ok(forwarded)
    }

    async fn handle_frame(&mut self, len: usize) -> Result<FrameDisposition, HandoffError> {
        self.stats.record_received();

        let packet = match Packet::from_frame(&self.buf[..len]) {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!(error = %e, "runt frame, discarding");
                self.stats.record_rejected();
                return Ok(FrameDisposition::Rejected);
            }
        };
        let id = packet.identity;

        if self.filter.check_and_record(id) {
            tracing::debug!(
                node_id = id.node_id,
                message_id = id.message_id,
                "duplicate via relay, dropping"
            );
            self.stats.record_duplicate();
            return Ok(FrameDisposition::Duplicate);
        }

        tracing::info!(
            node_id = id.node_id,
            message_id = id.message_id,
            len = packet.len(),
            head = hex::encode(&packet.payload[..packet.len().min(16)]),
            "packet received"
        );

        self.queue.send(packet).await?;
        self.stats.record_forwarded();
        Ok(FrameDisposition::Forwarded)
    }

    pub fn filter(&self) -> &DuplicateFilter {
        &self.filter
    }

    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }
}
