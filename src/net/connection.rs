//! Connection tracking and the TCP output channel.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Count open connections so the listener can apply backpressure
//! - Write responses back onto an accepted socket

use std::io::{self, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::http::output::Output;
use crate::http::response::Response;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Tracks open connections.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    active_count: Arc<AtomicU64>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new open connection. Returns a guard that decrements on drop.
    pub fn track(&self) -> ConnectionGuard {
        self.active_count.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            active_count: Arc::clone(&self.active_count),
            id: ConnectionId::new(),
        }
    }

    /// Get current open connection count.
    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }
}

/// Guard that tracks a connection's lifetime.
/// Decrements the open count when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    active_count: Arc<AtomicU64>,
    id: ConnectionId,
}

impl ConnectionGuard {
    /// Get this connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}

/// [`Output`] writing plain HTTP/1.x responses onto a socket.
///
/// Every response carries `Connection: close`; one exchange per socket.
pub struct TcpOutput {
    stream: TcpStream,
    guard: ConnectionGuard,
}

impl TcpOutput {
    pub fn new(stream: TcpStream, guard: ConnectionGuard) -> Self {
        Self { stream, guard }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.guard.id()
    }

    fn write_response(&mut self, status_line: &str, response: Option<&Response>) -> io::Result<()> {
        let mut head = format!("HTTP/1.1 {}\r\nConnection: close\r\n", status_line);
        let body: &[u8] = match response {
            Some(response) => {
                head.push_str(&format!(
                    "Content-Type: {}\r\n",
                    response.get_data_type().content_type()
                ));
                for (name, value) in response.get_headers() {
                    head.push_str(&format!("{}: {}\r\n", name, value));
                }
                response.get_body()
            }
            None => &[],
        };
        head.push_str(&format!("Content-Length: {}\r\n\r\n", body.len()));

        self.stream.write_all(head.as_bytes())?;
        self.stream.write_all(body)?;
        self.stream.flush()
    }
}

impl Output for TcpOutput {
    fn send_ok(&mut self, response: Response) -> io::Result<()> {
        self.write_response("200 OK", Some(&response))
    }

    fn send_redirect(&mut self, response: Response) -> io::Result<()> {
        self.write_response("302 Found", Some(&response))
    }

    fn send_proxy(&mut self, response: Response) -> io::Result<()> {
        self.write_response("200 OK", Some(&response))
    }

    fn send_error(&mut self) -> io::Result<()> {
        self.write_response("500 Internal Server Error", None)
    }

    fn close_channel(&mut self) -> io::Result<()> {
        match self.stream.shutdown(Shutdown::Both) {
            Err(e) if e.kind() != io::ErrorKind::NotConnected => Err(e),
            _ => Ok(()),
        }
    }
}
