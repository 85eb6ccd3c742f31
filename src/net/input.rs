//! Input channel contract.
//!
//! # Responsibilities
//! - Accept one connection per call, bounded by a timeout
//! - Hand back a deferred conversion job instead of a parsed request
//!
//! # Design Decisions
//! - `Ok(None)` means "timed out, ask again"; it is not an error
//! - Conversion runs on the worker pool, never on the accepting thread
//! - A failed conversion may still carry the bound output so it gets closed

use std::fmt;
use std::io;
use std::time::Duration;

use crate::http::output::ResponseGuard;
use crate::http::request::Request;

/// A converted connection: the request and the channel to answer it on.
#[derive(Debug)]
pub struct Exchange {
    pub request: Request,
    pub output: ResponseGuard,
}

impl Exchange {
    pub fn new(request: Request, output: ResponseGuard) -> Self {
        Self { request, output }
    }
}

/// Deferred conversion of an accepted connection into an [`Exchange`].
pub type PendingExchange = Box<dyn FnOnce() -> Result<Exchange, ConversionError> + Send + 'static>;

/// Malformed or unreadable incoming data.
#[derive(thiserror::Error)]
#[error("request conversion failed: {reason}")]
pub struct ConversionError {
    pub reason: String,
    /// Output bound before the failure, if the transport got that far.
    pub output: Option<ResponseGuard>,
}

impl ConversionError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            output: None,
        }
    }

    pub fn with_output(mut self, output: ResponseGuard) -> Self {
        self.output = Some(output);
        self
    }
}

impl fmt::Debug for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionError")
            .field("reason", &self.reason)
            .field("has_output", &self.output.is_some())
            .finish()
    }
}

impl From<io::Error> for ConversionError {
    fn from(e: io::Error) -> Self {
        Self::new(e.to_string())
    }
}

/// A source of inbound connections (socket, TLS listener, test script...).
pub trait InputChannel: Send + Sync + 'static {
    fn port(&self) -> u16;

    fn is_secure(&self) -> bool;

    /// Block for at most `timeout` waiting for a connection.
    fn wait_for_incoming_request(&self, timeout: Duration) -> io::Result<Option<PendingExchange>>;
}
