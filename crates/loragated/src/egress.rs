//! Egress — takes packets off the handoff queue and POSTs them to the
//! collector.
//!
//! Best-effort: each packet gets one delivery, re-issued while the
//! collector signals retry-needed, and is then dropped whatever the
//! outcome. A failed packet never holds up the ones behind it.

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::broadcast;

use loragate_core::config::PipelineConfig;
use loragate_core::Packet;
use loragate_services::{
    AssembledResponse, HandoffReceiver, ResponseAccumulator, SendOutcome, Transport,
    TransportError,
};

use crate::stats::EgressStats;

/// Bounds on the retry-needed loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Re-issues allowed per packet. `None` = keep going.
    pub max_retries: Option<u32>,
    /// Pause between re-issues. Zero = yield to the scheduler only.
    pub backoff: Duration,
    /// Limit on a whole delivery, retries included.
    pub deadline: Option<Duration>,
}

impl Default for RetryPolicy {
    /// Unbounded retries, paced by the configured default backoff.
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl RetryPolicy {
    /// Re-issue immediately, yielding to the scheduler between attempts.
    pub fn yield_only() -> Self {
        Self {
            backoff: Duration::ZERO,
            ..Self::default()
        }
    }
}

impl From<&PipelineConfig> for RetryPolicy {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            max_retries: config.max_retries(),
            backoff: config.retry_backoff(),
            deadline: config.send_deadline(),
        }
    }
}

/// Result of a successful delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub status: u16,
    /// Declared Content-Length, or the accumulated body length without one.
    pub response_len: u64,
    /// Retry-needed re-issues before the final response.
    pub retries: u32,
    pub response: Option<AssembledResponse>,
}

pub struct EgressLoop<T> {
    transport: T,
    queue: HandoffReceiver,
    response: ResponseAccumulator,
    retry: RetryPolicy,
    retries: u32,
    stats: EgressStats,
}

impl<T: Transport> EgressLoop<T> {
    pub fn new(
        transport: T,
        queue: HandoffReceiver,
        response: ResponseAccumulator,
        retry: RetryPolicy,
        stats: EgressStats,
    ) -> Self {
        Self {
            transport,
            queue,
            response,
            retry,
            retries: 0,
            stats,
        }
    }

    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> anyhow::Result<()> {
        tracing::info!(retry = ?self.retry, "egress loop started");
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("egress loop shutting down");
                    return Ok(());
                }

                msg = self.queue.recv() => {
                    let packet = match msg {
                        Some(p) => p,
                        None => {
                            tracing::info!("ingest dropped the queue, egress loop exiting");
                            return Ok(());
                        }
                    };
                    self.forward(packet).await;
                }
            }
        }
    }

    /// Deliver one packet and log the outcome. The packet is released
    /// here either way.
    pub async fn forward(&mut self, packet: Packet) {
        let id = packet.identity;
        match self.deliver(&packet).await {
            Ok(delivery) => {
                self.stats.record_delivered(delivery.retries);
                tracing::info!(
                    node_id = id.node_id,
                    message_id = id.message_id,
                    status = delivery.status,
                    response_len = delivery.response_len,
                    retries = delivery.retries,
                    "packet delivered"
                );
                if !(200..300).contains(&delivery.status) {
                    tracing::warn!(
                        node_id = id.node_id,
                        message_id = id.message_id,
                        status = delivery.status,
                        "collector did not accept packet"
                    );
                }
                if let Some(truncated) = delivery.response.as_ref().map(|r| r.truncated) {
                    if truncated > 0 {
                        tracing::warn!(truncated, "response exceeded buffer, tail dropped");
                    }
                }
            }
            Err(e) => {
                self.stats.record_failed();
                tracing::warn!(
                    node_id = id.node_id,
                    message_id = id.message_id,
                    kind = e.kind(),
                    error = %e,
                    "packet dropped"
                );
            }
        }
    }

    /// Send `packet` to the collector, re-issuing on retry-needed.
    pub async fn deliver(&mut self, packet: &Packet) -> Result<Delivery, TransportError> {
        self.response.reset();
        self.retries = 0;

        let result = match self.retry.deadline {
            Some(deadline) => {
                match tokio::time::timeout(deadline, self.send_with_retry(&packet.payload)).await {
                    Ok(r) => r,
                    Err(_) => Err(TransportError::DeadlineExceeded {
                        retries: self.retries,
                    }),
                }
            }
            None => self.send_with_retry(&packet.payload).await,
        };

        // Whatever happened, the next packet starts from a clean buffer.
        let response = self.response.take_response();
        self.response.reset();

        let (status, content_length) = result?;
        let response_len = content_length
            .or_else(|| response.as_ref().map(|r| r.body.len() as u64))
            .unwrap_or(0);
        Ok(Delivery {
            status,
            response_len,
            retries: self.retries,
            response,
        })
    }

    async fn send_with_retry(
        &mut self,
        body: &Bytes,
    ) -> Result<(u16, Option<u64>), TransportError> {
        loop {
            match self.transport.perform(body, &mut self.response).await? {
                SendOutcome::Complete {
                    status,
                    content_length,
                } => return Ok((status, content_length)),
                SendOutcome::Retry => {
                    if let Some(max) = self.retry.max_retries {
                        if self.retries >= max {
                            return Err(TransportError::RetriesExhausted { attempts: max });
                        }
                    }
                    self.retries += 1;
                    tracing::trace!(retries = self.retries, "collector not ready, re-issuing");
                    if self.retry.backoff.is_zero() {
                        tokio::task::yield_now().await;
                    } else {
                        tokio::time::sleep(self.retry.backoff).await;
                    }
                }
            }
        }
    }

    pub fn stats(&self) -> &EgressStats {
        &self.stats
    }
}
