//! loragate-core — shared types, packet header format, and configuration.
//! All other loragate crates depend on this one.

pub mod config;
pub mod packet;
pub mod wire;

pub use packet::Packet;
pub use wire::{PacketError, PacketIdentity};
