//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the dispatch server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address, timeouts, limits).
    pub listener: ListenerConfig,

    /// Event queue and worker pool sizing.
    pub queue: QueueConfig,

    /// Pre-staged handler instance watermarks.
    pub pool: PoolConfig,

    /// Command resolution settings.
    pub routing: RoutingConfig,

    /// Source address allow-list.
    pub access_control: AccessControlConfig,

    /// Backoff used while waiting for request conversion.
    pub polling: PollingConfig,

    /// Startup and shutdown timing.
    pub lifecycle: LifecycleConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Whether the channel reports itself as secure.
    pub secure: bool,

    /// How long one accept call blocks before the loop re-checks shutdown.
    pub accept_timeout_ms: u64,

    /// Socket read timeout while converting a request.
    pub read_timeout_ms: u64,

    /// Maximum concurrent open connections (backpressure).
    pub max_connections: usize,

    /// Upper bound on bytes read for one request.
    pub max_request_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            secure: false,
            accept_timeout_ms: 250,
            read_timeout_ms: 5_000,
            max_connections: 10_000,
            max_request_bytes: 64 * 1024,
        }
    }
}

/// What happens to queued envelopes at shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DrainPolicy {
    /// Drop published-but-unconsumed envelopes.
    #[default]
    Abandon,
    /// Run already-accepted work to completion, bounded by the shutdown grace.
    Complete,
}

/// Event queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Ring buffer slots. Must be a power of two.
    pub capacity: usize,

    /// Worker threads executing envelopes.
    pub worker_threads: usize,

    /// Shutdown drain policy.
    pub drain: DrainPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            worker_threads: 4,
            drain: DrainPolicy::Abandon,
        }
    }
}

/// Pre-staged handler instance watermarks.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Below this many staged copies a background refill starts.
    pub min_staged: usize,

    /// Refill stops at this many staged copies.
    pub max_staged: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_staged: 2,
            max_staged: 8,
        }
    }
}

/// Command resolution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Entries kept in the derived path → command memo.
    pub memo_capacity: usize,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self { memo_capacity: 1024 }
    }
}

/// Access control configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AccessControlConfig {
    /// Inline allow patterns (regular expressions, whole-string match).
    pub allow: Vec<String>,

    /// External allow-list file. Takes precedence over `allow` when set.
    pub allow_file: Option<String>,

    /// Key holding the patterns inside `allow_file`.
    pub allow_key: String,

    /// Seconds a loaded allow-list stays valid.
    pub ttl_secs: u64,

    /// Known-bad sources; a list admitting any of them is rejected.
    pub canaries: Vec<String>,

    /// Also test the reverse-resolved host names of the source.
    pub reverse_lookup: bool,

    /// Match patterns case-sensitively.
    pub case_sensitive: bool,

    /// Invalidate the cached list when `allow_file` changes on disk.
    pub watch_file: bool,
}

impl Default for AccessControlConfig {
    fn default() -> Self {
        Self {
            allow: vec![r"127\.0\.0\.1".to_string(), r"::1".to_string()],
            allow_file: None,
            allow_key: "allow".to_string(),
            ttl_secs: 300,
            canaries: default_canaries(),
            reverse_lookup: false,
            case_sensitive: false,
            watch_file: false,
        }
    }
}

/// Sources no sane allow-list admits.
pub fn default_canaries() -> Vec<String> {
    [
        "192.0.2.1",
        "198.51.100.23",
        "203.0.113.254",
        "8.8.8.8",
        "attacker.example.net",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Middleware polling backoff.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct PollingConfig {
    /// First wait, in milliseconds.
    pub base_ms: u64,

    /// Cap on a single wait, in milliseconds.
    pub max_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            base_ms: 1,
            max_ms: 100,
        }
    }
}

/// Startup and shutdown timing.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// How long `start` blocks the caller after launching the accept loop.
    pub warm_up_ms: u64,

    /// Time allowed for in-flight work when shutting down.
    pub shutdown_grace_ms: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            warm_up_ms: 0,
            shutdown_grace_ms: 5_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
