//! Embeddable request dispatch server.
//!
//! Accepts connections, converts them into requests off the accepting
//! thread, screens sources against an allow-list, resolves commands by
//! longest path prefix and runs pooled handler instances through a bounded
//! event queue, closing every connection exactly once.

// Core pipeline
pub mod handler;
pub mod http;
pub mod net;
pub mod pipeline;
pub mod queue;
pub mod routing;

// Cross-cutting concerns
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;

pub use config::ServerConfig;
pub use error::{Error, HandlerError};
pub use handler::{Handler, HandlerRegistry};
pub use http::{Output, Request, Response, ResponseGuard, Server};
pub use lifecycle::{Lifecycle, Quittable};
pub use net::InputChannel;
pub use routing::Router;
pub use security::AccessGate;
