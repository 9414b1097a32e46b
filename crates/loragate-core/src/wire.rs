//! Relay packet header — the on-air prefix every telemetry node writes.
//!
//! The first 8 bytes of a packet payload identify the transmission:
//!
//!   offset 0  node_id     u32 little-endian
//!   offset 4  message_id  u32 little-endian
//!
//! Everything after the header is opaque to the gateway and is forwarded
//! to the collector as-is, header included. Relay nodes retransmit the
//! same bytes, so the header doubles as the deduplication key.

use static_assertions::assert_eq_size;
use zerocopy::byteorder::{LittleEndian, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

/// Size of the identity prefix in bytes.
pub const HEADER_LEN: usize = 8;

/// Identity prefix as it appears on air.
///
/// Byte order is fixed to little-endian. The nodes that produce these
/// packets are little-endian microcontrollers, and pinning the order keeps
/// identities stable on gateways of either endianness.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct PacketHeader {
    pub node_id: U32<LittleEndian>,
    pub message_id: U32<LittleEndian>,
}

assert_eq_size!(PacketHeader, [u8; HEADER_LEN]);

/// Deduplication key: which node sent it, and which of its messages it is.
///
/// Not cryptographically unique. Two unrelated packets that share both
/// fields are treated as the same transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketIdentity {
    pub node_id: u32,
    pub message_id: u32,
}

impl PacketIdentity {
    pub const fn new(node_id: u32, message_id: u32) -> Self {
        Self {
            node_id,
            message_id,
        }
    }

    /// Extract the identity from the start of a received payload.
    ///
    /// Payloads shorter than the header are rejected rather than padded.
    pub fn from_payload(payload: &[u8]) -> Result<Self, PacketError> {
        let header = PacketHeader::read_from_prefix(payload)
            .ok_or(PacketError::TooShort { len: payload.len() })?;
        Ok(Self::from(&header))
    }

    /// The on-air header bytes for this identity.
    pub fn header_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out.copy_from_slice(PacketHeader::from(*self).as_bytes());
        out
    }
}

impl From<&PacketHeader> for PacketIdentity {
    fn from(header: &PacketHeader) -> Self {
        Self {
            node_id: header.node_id.get(),
            message_id: header.message_id.get(),
        }
    }
}

impl From<PacketIdentity> for PacketHeader {
    fn from(id: PacketIdentity) -> Self {
        Self {
            node_id: U32::new(id.node_id),
            message_id: U32::new(id.message_id),
        }
    }
}

impl std::fmt::Display for PacketIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.node_id, self.message_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    #[error("packet too short for identity header: {len} bytes, need {HEADER_LEN}")]
    TooShort { len: usize },
}
