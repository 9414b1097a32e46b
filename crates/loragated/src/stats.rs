//! Pipeline counters, shared between a loop and the stats printer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct IngestCounters {
    received: AtomicU64,
    forwarded: AtomicU64,
    duplicates: AtomicU64,
    rejected: AtomicU64,
}

/// What ingest did with each radio frame.
#[derive(Debug, Clone, Default)]
pub struct IngestStats {
    inner: Arc<IngestCounters>,
}

impl IngestStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_received(&self) {
        self.inner.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_forwarded(&self) {
        self.inner.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_duplicate(&self) {
        self.inner.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.inner.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn received(&self) -> u64 {
        self.inner.received.load(Ordering::Relaxed)
    }

    pub fn forwarded(&self) -> u64 {
        self.inner.forwarded.load(Ordering::Relaxed)
    }

    pub fn duplicates(&self) -> u64 {
        self.inner.duplicates.load(Ordering::Relaxed)
    }

    /// Frames too short to carry an identity.
    pub fn rejected(&self) -> u64 {
        self.inner.rejected.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
struct EgressCounters {
    delivered: AtomicU64,
    failed: AtomicU64,
    retries: AtomicU64,
}

/// What happened to each packet egress took off the queue.
#[derive(Debug, Clone, Default)]
pub struct EgressStats {
    inner: Arc<EgressCounters>,
}

impl EgressStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_delivered(&self, retries: u32) {
        self.inner.delivered.fetch_add(1, Ordering::Relaxed);
        self.inner
            .retries
            .fetch_add(u64::from(retries), Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.inner.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn delivered(&self) -> u64 {
        self.inner.delivered.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.inner.failed.load(Ordering::Relaxed)
    }

    /// Retry-needed re-issues across all delivered packets.
    pub fn retries(&self) -> u64 {
        self.inner.retries.load(Ordering::Relaxed)
    }
}

/// Log a snapshot of both loops' counters. Quiet until traffic arrives.
pub fn print_stats(ingest: &IngestStats, egress: &EgressStats) {
    if ingest.received() == 0 {
        return;
    }
    tracing::info!(
        received = ingest.received(),
        forwarded = ingest.forwarded(),
        duplicates = ingest.duplicates(),
        rejected = ingest.rejected(),
        delivered = egress.delivered(),
        failed = egress.failed(),
        retries = egress.retries(),
        "pipeline stats"
    );
}
