//! Network collaborator — submit one request, stream its response.
//!
//! A transport performs a single request attempt and reports progress as
//! [`TransportEvent`]s into the caller's
//! [`ResponseAccumulator`](crate::ResponseAccumulator). The attempt ends in
//! one of three ways:
//!
//! - `Ok(SendOutcome::Complete)` — a final response was received;
//! - `Ok(SendOutcome::Retry)` — the collector is not ready, re-issue the
//!   same request (transient, never surfaced as an error);
//! - `Err(TransportError)` — the request failed for this packet.

use std::future::Future;

use bytes::Bytes;

use crate::accumulator::{AccumulatorError, ResponseAccumulator};

/// Progress of one request, in the order a transport observes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent<'a> {
    Connected,
    HeaderSent,
    Header { name: &'a str, value: &'a str },
    /// The request is being re-issued to `location`.
    Redirect { location: &'a str },
    /// A fragment of the response body.
    Data {
        bytes: &'a [u8],
        /// The body uses chunked transfer encoding.
        chunked: bool,
        /// Declared Content-Length, if any.
        content_length: Option<u64>,
    },
    Finished,
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Complete {
        status: u16,
        content_length: Option<u64>,
    },
    Retry,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("response body failed: {0}")]
    Body(String),
    #[error("too many redirects ({0})")]
    TooManyRedirects(u32),
    #[error("response buffer: {0}")]
    ResponseBuffer(#[from] AccumulatorError),
    #[error("collector still not ready after {attempts} retries")]
    RetriesExhausted { attempts: u32 },
    #[error("delivery deadline exceeded after {retries} retries")]
    DeadlineExceeded { retries: u32 },
}

impl TransportError {
    /// Short classification for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connect(_) => "connect",
            Self::Request(_) => "request",
            Self::Body(_) => "body",
            Self::TooManyRedirects(_) => "redirect",
            Self::ResponseBuffer(_) => "resource",
            Self::RetriesExhausted { .. } => "retries_exhausted",
            Self::DeadlineExceeded { .. } => "deadline",
        }
    }
}

/// A long-lived connection to the collector, reused for every packet.
pub trait Transport: Send {
    /// Perform one attempt at delivering `body`, reporting response
    /// progress into `response`.
    fn perform(
        &mut self,
        body: &Bytes,
        response: &mut ResponseAccumulator,
    ) -> impl Future<Output = Result<SendOutcome, TransportError>> + Send;
}
