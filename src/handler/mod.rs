//! Handler subsystem.
//!
//! # Data Flow
//! ```text
//! register_handler(command, template)
//!     → registry.rs (template stored, staged copies for that command dropped)
//!
//! Dispatch stage:
//!     get_handler(command)
//!         → template for command, else default ("") template, else None
//!         → pop a pre-staged copy, or copy the template on the spot
//!         → staged copies below min_staged: background refill up to max_staged
//!     → instance runs one request on a blocking worker, then is dropped
//! ```
//!
//! # Design Decisions
//! - Templates are shared and never handed out; callers always get a copy
//! - Staged copies are keyed by command, so replacing a template cannot
//!   leak stale instances
//! - Refills run on their own thread so copying never blocks dispatch

pub mod builtin;
pub mod registry;

use crate::error::HandlerError;
use crate::http::output::ResponseGuard;
use crate::http::request::Request;
use crate::http::response::Response;

pub use builtin::{EchoHandler, RedirectHandler, VersionHandler};
pub use registry::{HandlerRegistry, DEFAULT_COMMAND};

/// Application logic for one command.
///
/// A registered value is a *template*: it is only ever asked to
/// [`copy`](Handler::copy) itself. Each request runs on a private copy.
pub trait Handler: Send + Sync + 'static {
    /// Build the response for `request`.
    ///
    /// `output` is only for [`ResponseGuard::make_response`]; the caller sends
    /// the returned response and closes the channel.
    fn handle(&mut self, request: &Request, output: &ResponseGuard) -> Result<Response, HandlerError>;

    /// A fresh instance in the template's initial state.
    fn copy(&self) -> Box<dyn Handler>;
}
