//! loragated — LoRa relay gateway daemon.
//!
//! Two long-running tasks connected by the handoff queue:
//!
//!   radio → [`ingest::IngestLoop`] → handoff → [`egress::EgressLoop`] → collector
//!
//! Ingest drops relayed duplicates; egress POSTs each remaining packet to
//! the collector and moves on, whatever the outcome.

pub mod egress;
pub mod http;
pub mod ingest;
pub mod radio;
pub mod stats;
