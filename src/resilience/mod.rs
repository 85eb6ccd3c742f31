//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Middleware stage waiting on a deferred conversion:
//!     → backoff.rs (PollBackoff::next_delay)
//!     → wait on the conversion with that timeout
//!     → not ready: re-check the quit switch, ask for the next delay
//! ```
//!
//! # Design Decisions
//! - Waits are bounded; the waiter never blocks past one backoff step
//! - Jitter keeps many waiters from polling in lockstep
//! - Growth occasionally steps back so long waits stay responsive

pub mod backoff;

pub use backoff::{calculate_backoff, PollBackoff};
