//! loragate-services — the building blocks of the relay pipeline.
//!
//! Ingest owns a [`DuplicateFilter`] and the sending half of the handoff
//! queue; egress owns the receiving half and a [`ResponseAccumulator`].
//! The radio and the collector are reached through the [`Radio`] and
//! [`Transport`] traits so the loops can be driven by test doubles.

pub mod accumulator;
pub mod dedup;
pub mod handoff;
pub mod radio;
pub mod transport;

pub use accumulator::{AccumulatorError, AssembledResponse, BufferPolicy, ResponseAccumulator};
pub use dedup::DuplicateFilter;
pub use handoff::{handoff, HandoffError, HandoffReceiver, HandoffSender};
pub use radio::Radio;
pub use transport::{SendOutcome, Transport, TransportError, TransportEvent};
