//! Response accumulator — assembles a streamed response into one buffer.
//!
//! A transport delivers the response body as a series of data events. The
//! accumulator is the explicit per-request state those events are folded
//! into: the buffer is created on the first data event, grows by copying
//! each fragment at the write offset, and is released when the request
//! reaches a terminal event (finished or disconnected).
//!
//! Capacity is either a fixed ceiling chosen by the caller or the
//! Content-Length the collector declared. Data past capacity is dropped
//! without failing the request; the number of dropped bytes is reported
//! alongside the body so callers can tell a truncated response from a
//! complete one.

use bytes::Bytes;

use crate::transport::TransportEvent;

/// How the response buffer is sized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferPolicy {
    /// Use a buffer of exactly this many bytes for every response.
    Fixed(usize),
    /// Size the buffer from the declared Content-Length, up to `max`.
    ContentLength { max: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccumulatorError {
    #[error("failed to allocate {requested} byte response buffer")]
    Allocation { requested: usize },
    #[error("declared content length {declared} exceeds limit {max}")]
    TooLarge { declared: u64, max: usize },
    #[error("response has no declared content length")]
    UnknownLength,
}

/// A response body assembled from one request's data events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledResponse {
    pub body: Bytes,
    /// Bytes received past capacity and dropped.
    pub truncated: usize,
}

#[derive(Debug)]
pub struct ResponseAccumulator {
    policy: BufferPolicy,
    buf: Option<Vec<u8>>,
    capacity: usize,
    truncated: usize,
    completed: Option<AssembledResponse>,
}

impl ResponseAccumulator {
    pub fn new(policy: BufferPolicy) -> Self {
        Self {
            policy,
            buf: None,
            capacity: 0,
            truncated: 0,
            completed: None,
        }
    }

    pub fn policy(&self) -> BufferPolicy {
        self.policy
    }

    /// Allocate the buffer for the current request. No-op if it already
    /// exists.
    pub fn begin(&mut self, content_length: Option<u64>) -> Result<(), AccumulatorError> {
        if self.buf.is_some() {
            return Ok(());
        }

        let capacity = match self.policy {
            BufferPolicy::Fixed(n) => n,
            BufferPolicy::ContentLength { max } => {
                let declared = content_length.ok_or(AccumulatorError::UnknownLength)?;
                match usize::try_from(declared) {
                    Ok(n) if n <= max => n,
                    _ => return Err(AccumulatorError::TooLarge { declared, max }),
                }
            }
        };

        // A fixed ceiling only bounds the body; reserve what was declared.
        let reserve = match content_length.and_then(|n| usize::try_from(n).ok()) {
            Some(declared) => capacity.min(declared),
            None => capacity,
        };
        let mut buf = Vec::new();
        buf.try_reserve_exact(reserve)
            .map_err(|_| AccumulatorError::Allocation { requested: reserve })?;

        self.buf = Some(buf);
        self.capacity = capacity;
        self.truncated = 0;
        Ok(())
    }

    /// Copy as much of `bytes` as fits. Returns the number of bytes copied.
    pub fn append(&mut self, bytes: &[u8]) -> usize {
        let Some(buf) = self.buf.as_mut() else {
            return 0;
        };
        let copy_len = bytes.len().min(self.capacity - buf.len());
        buf.extend_from_slice(&bytes[..copy_len]);
        self.truncated += bytes.len() - copy_len;
        copy_len
    }

    /// Release the buffer and reset for the next request, returning what
    /// was assembled.
    pub fn finish(&mut self) -> Option<AssembledResponse> {
        let buf = self.buf.take()?;
        let response = AssembledResponse {
            body: Bytes::from(buf),
            truncated: self.truncated,
        };
        self.capacity = 0;
        self.truncated = 0;
        Some(response)
    }

    /// Feed one transport event.
    ///
    /// Data on a chunked response is observed but not copied. An error
    /// means the buffer could not be sized and the request must be
    /// aborted.
    pub fn on_event(&mut self, event: TransportEvent<'_>) -> Result<(), AccumulatorError> {
        match event {
            TransportEvent::Data {
                bytes,
                chunked,
                content_length,
            } => {
                if chunked {
                    tracing::trace!(len = bytes.len(), "chunked response data, not accumulated");
                    return Ok(());
                }
                self.begin(content_length)?;
                self.append(bytes);
            }
            TransportEvent::Finished => {
                self.completed = self.finish();
            }
            TransportEvent::Disconnected => {
                if let Some(partial) = self.finish() {
                    tracing::debug!(
                        received = partial.body.len(),
                        "disconnected mid-response, partial body discarded"
                    );
                }
            }
            TransportEvent::Header { name, value } => {
                tracing::trace!(name, value, "response header");
            }
            TransportEvent::Redirect { location } => {
                // The redirected request starts its own body.
                self.finish();
                tracing::trace!(location, "request redirected");
            }
            TransportEvent::Connected | TransportEvent::HeaderSent => {
                tracing::trace!(?event, "transport event");
            }
        }
        Ok(())
    }

    /// Take the body of the last request that finished cleanly.
    pub fn take_response(&mut self) -> Option<AssembledResponse> {
        self.completed.take()
    }

    /// Drop all per-request state, finished or not.
    pub fn reset(&mut self) {
        self.finish();
        self.completed = None;
    }

    /// True while a buffer is allocated for an in-flight request.
    pub fn is_active(&self) -> bool {
        self.buf.is_some()
    }

    /// Bytes written so far for the in-flight request.
    pub fn written(&self) -> usize {
        self.buf.as_ref().map(|b| b.len()).unwrap_or(0)
    }

    /// Bytes dropped so far for the in-flight request.
    pub fn truncated(&self) -> usize {
        self.truncated
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
