//! Crate-level error types.

use crate::config::loader::ConfigError;
use crate::net::listener::ListenerError;
use crate::queue::QueueError;

/// Errors surfaced by server construction and startup.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("listener error: {0}")]
    Listener(#[from] ListenerError),

    #[error("event queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("server already started")]
    AlreadyStarted,
}

/// Failure inside a handler body.
///
/// Returned errors are logged with the request context and answered with
/// `send_error`; they never reach the accept loop or other requests.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("handler failed: {0}")]
    Failed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
