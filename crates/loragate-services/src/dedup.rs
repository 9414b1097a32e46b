//! Duplicate filter — bounded history of recently seen packet identities.
//!
//! Several relay nodes can hear the same transmission and forward it, so
//! the gateway sees one message arrive two or three times in quick
//! succession. The filter remembers the last N identities in a ring and
//! evicts strictly by insertion age (FIFO, not LRU): seeing an identity
//! again does not refresh it.

use loragate_core::PacketIdentity;

/// Fixed-capacity ring of recent identities.
///
/// Starts empty. Owned by the ingest path; it has no internal locking, so
/// anything sharing it between writers must hold one lock across
/// [`is_duplicate`](Self::is_duplicate) and [`record`](Self::record), or
/// use [`check_and_record`](Self::check_and_record).
#[derive(Debug, Clone)]
pub struct DuplicateFilter {
    entries: Vec<PacketIdentity>,
    cursor: usize,
    capacity: usize,
}

impl DuplicateFilter {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            cursor: 0,
            capacity,
        }
    }

    /// True iff `identity` matches a stored entry on both fields.
    pub fn is_duplicate(&self, identity: &PacketIdentity) -> bool {
        self.entries.iter().any(|e| e == identity)
    }

    /// Store `identity` at the write cursor, overwriting the oldest entry
    /// once the ring is full.
    pub fn record(&mut self, identity: PacketIdentity) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() < self.capacity {
            self.entries.push(identity);
        } else {
            self.entries[self.cursor] = identity;
        }
        self.cursor = (self.cursor + 1) % self.capacity;
    }

    /// Check, then record unconditionally. Returns whether the identity
    /// was already present.
    ///
    /// Recording even the duplicates keeps a third relay's copy of the same
    /// message suppressed after the first copy has aged toward eviction.
    pub fn check_and_record(&mut self, identity: PacketIdentity) -> bool {
        let duplicate = self.is_duplicate(&identity);
        self.record(identity);
        duplicate
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
