//! Output channel contract and the exactly-once response guard.
//!
//! # Responsibilities
//! - Define what a transport must offer to answer one exchange
//! - Enforce at most one terminal send followed by exactly one close
//!
//! # Design Decisions
//! - The guard closes on drop, so panics and early returns still close
//! - An exchange dropped without an answer gets `send_error` first
//! - Send failures are logged, never retried

use std::fmt;
use std::io;

use crate::http::response::{Response, Status};

/// A transport-side channel bound to one connection.
///
/// Callers never use this directly; they go through [`ResponseGuard`], which
/// upholds the one-send-then-close protocol.
pub trait Output: Send {
    /// Produce an empty response for the handler to fill in.
    fn make_response(&self) -> Response {
        Response::new()
    }

    fn send_ok(&mut self, response: Response) -> io::Result<()>;

    fn send_redirect(&mut self, response: Response) -> io::Result<()>;

    fn send_proxy(&mut self, response: Response) -> io::Result<()>;

    fn send_error(&mut self) -> io::Result<()>;

    fn close_channel(&mut self) -> io::Result<()>;
}

/// Which terminal send was issued through a guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sent {
    Ok,
    Redirect,
    Proxy,
    Error,
}

/// Owns an [`Output`] and makes the send/close protocol impossible to break.
pub struct ResponseGuard {
    output: Box<dyn Output>,
    sent: Option<Sent>,
    closed: bool,
}

impl ResponseGuard {
    pub fn new(output: Box<dyn Output>) -> Self {
        Self {
            output,
            sent: None,
            closed: false,
        }
    }

    pub fn make_response(&self) -> Response {
        self.output.make_response()
    }

    /// Send `response` through the method matching its status.
    ///
    /// Returns `false` if a terminal send already happened or the channel is
    /// closed; the response is discarded in that case.
    pub fn respond(&mut self, response: Response) -> bool {
        if !self.can_send() {
            tracing::warn!(previous = ?self.sent, "Discarding second response for exchange");
            return false;
        }

        let (kind, result) = match response.get_status() {
            Status::Ok => (Sent::Ok, self.output.send_ok(response)),
            Status::Redirect => (Sent::Redirect, self.output.send_redirect(response)),
            Status::Proxy => (Sent::Proxy, self.output.send_proxy(response)),
        };
        self.sent = Some(kind);

        if let Err(e) = result {
            tracing::warn!(error = %e, kind = ?kind, "Failed to send response");
        }
        true
    }

    /// Send the error response unless something was already sent.
    pub fn fail(&mut self) {
        if !self.can_send() {
            return;
        }
        self.sent = Some(Sent::Error);
        if let Err(e) = self.output.send_error() {
            tracing::warn!(error = %e, "Failed to send error response");
        }
    }

    /// Close the channel, answering with an error first if nothing was sent.
    /// Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.fail();
        self.closed = true;
        if let Err(e) = self.output.close_channel() {
            tracing::debug!(error = %e, "Failed to close output channel");
        }
    }

    /// Terminal send issued so far, if any.
    pub fn sent(&self) -> Option<Sent> {
        self.sent
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn can_send(&self) -> bool {
        self.sent.is_none() && !self.closed
    }
}

impl Drop for ResponseGuard {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for ResponseGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseGuard")
            .field("sent", &self.sent)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}
