//! Radio collaborator — the two operations ingest needs from a receiver.
//!
//! Transceiver bring-up (frequency, spreading factor, bandwidth, coding
//! rate) happens before the gateway sees the radio. Ingest only asks
//! whether a frame is pending and reads it.

use std::io;

pub trait Radio: Send {
    /// True if at least one received frame is waiting to be read.
    fn has_data(&mut self) -> bool;

    /// Read one pending frame into `buf`, returning its length.
    /// Frames longer than `buf` are truncated.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

impl<R: Radio + ?Sized> Radio for Box<R> {
    fn has_data(&mut self) -> bool {
        (**self).has_data()
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }
}
