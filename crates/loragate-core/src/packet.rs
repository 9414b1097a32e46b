//! Packet — one received radio frame on its way to the collector.

use bytes::Bytes;

use crate::wire::PacketIdentity;

/// An owned radio frame.
///
/// Ingest copies the frame out of its reusable receive buffer into a
/// `Packet`, which then moves through the handoff queue to egress. The
/// payload is the full frame, identity header included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub identity: PacketIdentity,
    pub payload: Bytes,
}

impl Packet {
    pub fn new(identity: PacketIdentity, payload: Bytes) -> Self {
        Self { identity, payload }
    }

    /// Copy a received frame and parse its identity.
    pub fn from_frame(frame: &[u8]) -> Result<Self, crate::wire::PacketError> {
        let identity = PacketIdentity::from_payload(frame)?;
        Ok(Self {
            identity,
            payload: Bytes::copy_from_slice(frame),
        })
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
