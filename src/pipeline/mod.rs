//! Request pipeline stages.
//!
//! # Data Flow
//! ```text
//! accept loop
//!     → Conversion  (conversion.rs): run the deferred conversion on a
//!                    blocking worker, hand the result over a oneshot
//!     → Middleware  (middleware.rs): wait for the conversion with backoff,
//!                    ask the AccessGate, publish Dispatch or deny
//!     → Dispatch    (dispatch.rs): resolve the command, fetch a handler
//!                    instance, publish Handler or answer unrouted
//!     → Handler     (handler.rs): run the instance on a blocking worker,
//!                    send its response, close the channel
//! ```
//!
//! # Design Decisions
//! - Every arrow is a publish onto the EventQueue, never a direct call
//! - The exchange's `ResponseGuard` travels with the request, so any stage
//!   that drops it (error, panic, shutdown) still closes the connection
//! - The quit switch is the only cancellation signal

pub mod conversion;
pub mod dispatch;
pub mod handler;
pub mod middleware;

use std::sync::Arc;

use crate::config::{DrainPolicy, PollingConfig, ServerConfig};
use crate::lifecycle::QuitSwitch;
use crate::observability::PipelineStats;
use crate::queue::EventQueue;
use crate::routing::Router;
use crate::security::AccessGate;

pub use conversion::ConversionEvent;
pub use dispatch::DispatchEvent;
pub use handler::HandlerEvent;
pub use middleware::MiddlewareEvent;

/// Everything a stage needs besides its own payload.
pub struct PipelineContext {
    pub(crate) queue: Arc<EventQueue>,
    pub(crate) gate: Arc<AccessGate>,
    pub(crate) router: Router,
    pub(crate) stats: Arc<PipelineStats>,
    pub(crate) quit: QuitSwitch,
    pub(crate) polling: PollingConfig,
    pub(crate) drain: DrainPolicy,
    pub(crate) reverse_lookup: bool,
    pub(crate) case_sensitive: bool,
}

impl PipelineContext {
    pub fn new(
        config: &ServerConfig,
        queue: Arc<EventQueue>,
        gate: Arc<AccessGate>,
        router: Router,
        stats: Arc<PipelineStats>,
        quit: QuitSwitch,
    ) -> Self {
        Self {
            queue,
            gate,
            router,
            stats,
            quit,
            polling: config.polling,
            drain: config.queue.drain,
            reverse_lookup: config.access_control.reverse_lookup,
            case_sensitive: config.access_control.case_sensitive,
        }
    }

    /// Whether waiting stages should give up now.
    pub fn should_abandon(&self) -> bool {
        self.quit.is_set() && self.drain == DrainPolicy::Abandon
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
