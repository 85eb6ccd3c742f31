//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Request path
//!     → router.rs (façade over registry + resolver)
//!     → resolver.rs:
//!         1. exact registered command (including the default "")
//!         2. memoized derivation for this path
//!         3. slash prefixes, longest first; first registered one wins
//!     → Return: Some(command) or None
//! ```
//!
//! # Design Decisions
//! - Deterministic: exact path, then longest registered ancestor, then "/"
//! - Only derived (prefix) results are memoized; misses are not
//! - The memo is dropped whenever the registry's command set changes

pub mod resolver;
pub mod router;

pub use resolver::CommandResolver;
pub use router::Router;
