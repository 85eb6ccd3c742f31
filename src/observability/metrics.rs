//! Pipeline counters and metrics exposition.
//!
//! # Metrics
//! - `dispatch_accepted_total`: connections handed to the pipeline
//! - `dispatch_accept_errors_total`: failed accept calls
//! - `dispatch_conversion_failures_total`: malformed or unreadable requests
//! - `dispatch_denied_total`: requests refused by the access gate
//! - `dispatch_dispatched_total`: requests bound to a handler
//! - `dispatch_unrouted_total`: requests with no handler at all
//! - `dispatch_completed_total`: handler responses sent
//! - `dispatch_handler_failures_total`: handler errors
//! - `dispatch_handler_panics_total`: handler panics
//! - `dispatch_abandoned_total`: requests dropped by shutdown
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations)
//! - Without an installed recorder the facade calls are no-ops

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Serialize;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

macro_rules! stats {
    ($($field:ident => $record:ident, $metric:literal;)*) => {
        /// Shared request counters.
        #[derive(Debug, Default)]
        pub struct PipelineStats {
            $($field: AtomicU64,)*
        }

        /// Point-in-time copy of [`PipelineStats`].
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
        pub struct StatsSnapshot {
            $(pub $field: u64,)*
        }

        impl PipelineStats {
            pub fn new() -> Self {
                Self::default()
            }

            $(
                pub fn $record(&self) {
                    self.$field.fetch_add(1, Ordering::Relaxed);
                    ::metrics::counter!($metric).increment(1);
                }
            )*

            pub fn snapshot(&self) -> StatsSnapshot {
                StatsSnapshot {
                    $($field: self.$field.load(Ordering::Relaxed),)*
                }
            }
        }
    };
}

stats! {
    accepted => record_accepted, "dispatch_accepted_total";
    accept_errors => record_accept_error, "dispatch_accept_errors_total";
    conversion_failures => record_conversion_failure, "dispatch_conversion_failures_total";
    denied => record_denied, "dispatch_denied_total";
    dispatched => record_dispatched, "dispatch_dispatched_total";
    unrouted => record_unrouted, "dispatch_unrouted_total";
    completed => record_completed, "dispatch_completed_total";
    handler_failures => record_handler_failure, "dispatch_handler_failures_total";
    handler_panics => record_handler_panic, "dispatch_handler_panics_total";
    abandoned => record_abandoned, "dispatch_abandoned_total";
}
