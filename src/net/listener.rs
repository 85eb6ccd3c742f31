//! TCP input channel with backpressure.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Accept connections with a bounded wait so the accept loop can poll for shutdown
//! - Enforce `max_connections` by not accepting while the limit is reached
//! - Defer request-head parsing to the worker pool
//!
//! # Design Decisions
//! - Minimal HTTP/1.x framing: request line, headers, url-encoded POST body
//! - A malformed request drops the socket without a response

use std::io::{self, BufRead, BufReader, Read};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::ListenerConfig;
use crate::http::output::ResponseGuard;
use crate::http::request::{Method, Request};
use crate::net::connection::{ConnectionGuard, ConnectionTracker, TcpOutput};
use crate::net::input::{ConversionError, Exchange, InputChannel, PendingExchange};

/// How long to sleep between non-blocking accept attempts.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Error type for listener operations.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// Failed to parse the bind address.
    #[error("invalid bind address {address}: {source}")]
    Address {
        address: String,
        source: std::net::AddrParseError,
    },
    /// Failed to bind to address.
    #[error("failed to bind: {0}")]
    Bind(#[from] io::Error),
}

/// A bounded TCP listener implementing [`InputChannel`].
pub struct TcpInput {
    inner: TcpListener,
    local_addr: SocketAddr,
    secure: bool,
    connections: ConnectionTracker,
    max_connections: usize,
    read_timeout: Duration,
    max_request_bytes: usize,
}

impl TcpInput {
    /// Bind to the configured address with connection limits.
    pub fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let addr: SocketAddr =
            config
                .bind_address
                .parse()
                .map_err(|source| ListenerError::Address {
                    address: config.bind_address.clone(),
                    source,
                })?;

        let inner = TcpListener::bind(addr)?;
        inner.set_nonblocking(true)?;
        let local_addr = inner.local_addr()?;

        tracing::info!(
            address = %local_addr,
            max_connections = config.max_connections,
            "Listener bound"
        );

        Ok(Self {
            inner,
            local_addr,
            secure: config.secure,
            connections: ConnectionTracker::new(),
            max_connections: config.max_connections,
            read_timeout: Duration::from_millis(config.read_timeout_ms),
            max_request_bytes: config.max_request_bytes,
        })
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Connections accepted and not yet closed.
    pub fn active_connections(&self) -> u64 {
        self.connections.active_count()
    }

    fn at_capacity(&self) -> bool {
        self.connections.active_count() >= self.max_connections as u64
    }

    fn defer_conversion(&self, stream: TcpStream, peer: SocketAddr) -> io::Result<PendingExchange> {
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(self.read_timeout))?;

        let guard = self.connections.track();
        let max_bytes = self.max_request_bytes;

        tracing::debug!(
            peer_addr = %peer,
            connection_id = %guard.id(),
            active = self.connections.active_count(),
            "Connection accepted"
        );

        Ok(Box::new(move || convert(stream, peer, guard, max_bytes)))
    }
}

impl InputChannel for TcpInput {
    fn port(&self) -> u16 {
        self.local_addr.port()
    }

    fn is_secure(&self) -> bool {
        self.secure
    }

    fn wait_for_incoming_request(&self, timeout: Duration) -> io::Result<Option<PendingExchange>> {
        let deadline = Instant::now() + timeout;

        loop {
            if !self.at_capacity() {
                match self.inner.accept() {
                    Ok((stream, peer)) => return self.defer_conversion(stream, peer).map(Some),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                    Err(e) => return Err(e),
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            thread::sleep(ACCEPT_POLL_INTERVAL.min(deadline - now));
        }
    }
}

fn convert(
    stream: TcpStream,
    peer: SocketAddr,
    guard: ConnectionGuard,
    max_bytes: usize,
) -> Result<Exchange, ConversionError> {
    let request = read_request(&stream, peer, max_bytes)?;
    let output = ResponseGuard::new(Box::new(TcpOutput::new(stream, guard)));
    Ok(Exchange::new(request, output))
}

/// Read one request head (and url-encoded body, for POST) from `stream`.
fn read_request(stream: &TcpStream, peer: SocketAddr, max_bytes: usize) -> Result<Request, ConversionError> {
    let mut reader = BufReader::new(stream.take(max_bytes as u64));

    let line = read_line(&mut reader)?;
    if line.is_empty() {
        return Err(ConversionError::new("connection closed before request line"));
    }

    let mut parts = line.split_whitespace();
    let (method, target, version) = match (parts.next(), parts.next(), parts.next()) {
        (Some(m), Some(t), Some(v)) if v.starts_with("HTTP/") => (m, t, v),
        _ => return Err(ConversionError::new(format!("malformed request line: {:?}", line))),
    };
    tracing::trace!(method, target, version, "Request line read");

    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (target, None),
    };

    let mut request = Request::new(peer.ip().to_string(), Method::parse(method), path);
    if let Some(query) = query {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            request.add_param(key, value);
        }
    }

    loop {
        let line = read_line(&mut reader)?;
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| ConversionError::new(format!("malformed header line: {:?}", line)))?;
        request.add_header(name.trim(), value.trim());
    }

    let form_body = request.method() == Method::Post
        && request
            .header("Content-Type")
            .map(|ct| ct.starts_with("application/x-www-form-urlencoded"))
            .unwrap_or(false);

    if form_body {
        let length: usize = request
            .header("Content-Length")
            .unwrap_or("0")
            .parse()
            .map_err(|_| ConversionError::new("invalid Content-Length"))?;

        // Bytes still readable under `max_bytes`: the unread limit plus what
        // is already buffered.
        let budget = reader.get_ref().limit() as usize + reader.buffer().len();
        if length > budget {
            return Err(ConversionError::new(format!(
                "request body of {} bytes exceeds max_request_bytes ({} left)",
                length, budget
            )));
        }

        let mut body = vec![0u8; length];
        reader
            .read_exact(&mut body)
            .map_err(|e| ConversionError::new(format!("short request body: {}", e)))?;
        for (key, value) in url::form_urlencoded::parse(&body) {
            request.add_param(key, value);
        }
    }

    Ok(request)
}

/// Read a CRLF (or LF) terminated line without its terminator.
/// An empty string means end of input or a blank line.
fn read_line<R: BufRead>(reader: &mut R) -> Result<String, ConversionError> {
    let mut line = String::new();
    reader.read_line(&mut line)?;
    let trimmed = line.trim_end_matches(['\r', '\n']).len();
    line.truncate(trimmed);
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn test_read_get_with_query() {
        let (mut client, server) = pair();
        client
            .write_all(b"GET /a/b?x=1&x=2&y=z HTTP/1.1\r\nHost: local\r\nX-Multi: 1\r\nX-Multi: 2\r\n\r\n")
            .unwrap();

        let peer = server.peer_addr().unwrap();
        let req = read_request(&server, peer, 8192).unwrap();
        assert_eq!(req.method(), Method::Get);
        assert_eq!(req.path(), "/a/b");
        assert_eq!(req.source(), "127.0.0.1");
        assert_eq!(req.param_values("x").map(|v| v.len()), Some(2));
        assert_eq!(req.param("y"), Some("z"));
        assert_eq!(req.header_values("x-multi").len(), 2);
    }

    #[test]
    fn test_read_post_form() {
        let (mut client, server) = pair();
        client
            .write_all(
                b"POST /submit HTTP/1.0\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: 14\r\n\r\nname=a+b&n=%31",
            )
            .unwrap();

        let peer = server.peer_addr().unwrap();
        let req = read_request(&server, peer, 8192).unwrap();
        assert_eq!(req.method(), Method::Post);
        assert_eq!(req.param("name"), Some("a b"));
        assert_eq!(req.param("n"), Some("1"));
    }

    #[test]
    fn test_oversized_content_length_rejected() {
        let (mut client, server) = pair();
        client
            .write_all(
                b"POST /submit HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: 1099511627776\r\n\r\nname=a",
            )
            .unwrap();

        let peer = server.peer_addr().unwrap();
        let err = read_request(&server, peer, 8192).unwrap_err();
        assert!(err.reason.contains("exceeds max_request_bytes"), "{}", err.reason);
        assert!(err.output.is_none());
    }

    #[test]
    fn test_body_must_fit_remaining_budget() {
        let head = b"POST /submit HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: 64\r\n\r\n";
        let (mut client, server) = pair();
        client.write_all(head).unwrap();
        client.write_all(&[b'a'; 64]).unwrap();

        // Head plus body is over the limit even though the body alone is not.
        let peer = server.peer_addr().unwrap();
        let err = read_request(&server, peer, head.len() + 32).unwrap_err();
        assert!(err.reason.contains("exceeds max_request_bytes"), "{}", err.reason);
    }

    #[test]
    fn test_malformed_request_line() {
        let (mut client, server) = pair();
        client.write_all(b"garbage\r\n\r\n").unwrap();

        let peer = server.peer_addr().unwrap();
        let err = read_request(&server, peer, 8192).unwrap_err();
        assert!(err.reason.contains("malformed request line"));
        assert!(err.output.is_none());
    }
}
