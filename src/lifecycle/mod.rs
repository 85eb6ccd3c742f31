//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Registration:
//!     Server::start / embedding code → Lifecycle::add_quittable(component)
//!
//! Shutdown (shutdown.rs):
//!     set_quitting(true) → QuitSwitch flips (waiters wake)
//!         → aggregator thread runs once: every member → set_quitting(true)
//!         → later registrations are quit on the spot
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Lifecycle::set_quitting(true)
//! ```
//!
//! # Design Decisions
//! - Every switch is monotonic: false → true only, repeats are no-ops
//! - The aggregator is one-shot; a second run does nothing
//! - The context is passed explicitly; `Lifecycle::global()` exists for
//!   embedders that want a single process-wide instance

pub mod shutdown;
pub mod signals;

pub use shutdown::{Lifecycle, QuitSwitch, Quittable};
pub use signals::{shutdown_signal, spawn_signal_listener};
