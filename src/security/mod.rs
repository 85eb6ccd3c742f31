//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Converted request (source address)
//!     → access_control.rs (AccessGate::allow)
//!         → cached AllowList, or lazy load when unset / past TTL:
//!             allow_list.rs (AllowListSource::load → compile → canary self-test)
//!         → regex match on source
//!         → optional reverse lookup, each host name matched once (depth 1)
//!         → no match and stale: one forced reload + retry
//!     → allowed: dispatch stage / denied: error response + close
//! ```
//!
//! # Design Decisions
//! - Fail closed: an unset, unloadable or self-test-failing list denies everything
//! - Reads are lock-free (`ArcSwapOption`); reloads are serialized
//! - Canaries are checked case-insensitively

pub mod access_control;
pub mod allow_list;

pub use access_control::{AccessGate, DnsResolver, HostResolver};
pub use allow_list::{AllowList, AllowListSource, FileAllowList, StaticAllowList};

/// Errors raised while loading an allow-list.
#[derive(Debug, thiserror::Error)]
pub enum AccessControlError {
    /// A freshly loaded list admitted a known-bad source.
    #[error("allow pattern {pattern:?} admits canary {canary:?}")]
    CanaryAdmitted { canary: String, pattern: String },

    #[error("invalid allow pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },

    #[error("failed to read allow-list {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse allow-list {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("allow-list {path} has no usable {key:?} entry")]
    MissingKey { path: String, key: String },
}
