//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!     → handed to Server::new, which slices it per subsystem
//!
//! Allow-list file change:
//!     watcher.rs detects change
//!     → AccessGate::invalidate()
//!     → next allow() reloads and re-runs the canary self-test
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; only the allow-list is reloaded live
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AccessControlConfig, DrainPolicy, LifecycleConfig, ListenerConfig, ObservabilityConfig,
    PollingConfig, PoolConfig, QueueConfig, RoutingConfig, ServerConfig,
};
pub use validation::{validate_config, ValidationError};
pub use watcher::AllowListWatcher;
