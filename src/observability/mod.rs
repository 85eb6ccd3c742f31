//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing macros (structured events, request_id on every request line)
//!     → metrics.rs (PipelineStats counters, mirrored into the metrics facade)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout, filtered by RUST_LOG or config)
//!     → Prometheus exporter (optional, observability.metrics_enabled)
//! ```
//!
//! # Design Decisions
//! - The library never installs a subscriber; only the binary does
//! - Counters are plain atomics so tests can read them without a recorder
//! - Request ID flows through all stages

pub mod logging;
pub mod metrics;

pub use metrics::{PipelineStats, StatsSnapshot};
