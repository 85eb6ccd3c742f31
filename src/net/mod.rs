//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (bounded-wait accept, connection limits)
//!     → input.rs contract: a deferred conversion job, not a request
//!     → on a worker: read request head → Request + TcpOutput
//!     → connection.rs (lifecycle tracking, response writer)
//! ```
//!
//! # Design Decisions
//! - Backpressure: no accept while `max_connections` are open
//! - Each connection is tracked until its output is dropped
//! - Any transport can plug in by implementing `InputChannel`/`Output`

pub mod connection;
pub mod input;
pub mod listener;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker, TcpOutput};
pub use input::{ConversionError, Exchange, InputChannel, PendingExchange};
pub use listener::{ListenerError, TcpInput};
