//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use dispatch_server::config::ServerConfig;
use dispatch_server::error::HandlerError;
use dispatch_server::http::{Method, Output, Request, Response, ResponseGuard};
use dispatch_server::net::{ConversionError, Exchange, InputChannel, PendingExchange};
use dispatch_server::Handler;

/// Config tuned for fast tests: ephemeral port, short timeouts, loopback only.
pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.listener.accept_timeout_ms = 10;
    config.listener.read_timeout_ms = 1_000;
    config.queue.capacity = 64;
    config.queue.worker_threads = 2;
    config.polling.base_ms = 1;
    config.polling.max_ms = 10;
    config.lifecycle.shutdown_grace_ms = 2_000;
    config.access_control.allow = vec![r"127\.0\.0\.1".to_string()];
    config
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while !condition() {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(2));
    }
    true
}

/// Every call made on a [`RecordingOutput`].
#[derive(Debug, Default, Clone)]
pub struct Calls {
    pub ok: usize,
    pub redirect: usize,
    pub proxy: usize,
    pub error: usize,
    pub close: usize,
    pub body: Vec<u8>,
}

impl Calls {
    pub fn terminal_sends(&self) -> usize {
        self.ok + self.redirect + self.proxy + self.error
    }

    /// One close, at most one terminal send.
    pub fn assert_closed_once(&self) {
        assert_eq!(self.close, 1, "close count: {:?}", self);
        assert!(self.terminal_sends() <= 1, "terminal sends: {:?}", self);
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Output that records calls instead of writing anywhere.
pub struct RecordingOutput {
    calls: Arc<Mutex<Calls>>,
}

impl RecordingOutput {
    pub fn new() -> (Self, Recorder) {
        let calls = Arc::new(Mutex::new(Calls::default()));
        (
            Self {
                calls: Arc::clone(&calls),
            },
            Recorder(calls),
        )
    }
}

impl Output for RecordingOutput {
    fn send_ok(&mut self, response: Response) -> io::Result<()> {
        let mut calls = self.calls.lock().unwrap();
        calls.ok += 1;
        calls.body = response.get_body().to_vec();
        Ok(())
    }

    fn send_redirect(&mut self, _response: Response) -> io::Result<()> {
        self.calls.lock().unwrap().redirect += 1;
        Ok(())
    }

    fn send_proxy(&mut self, _response: Response) -> io::Result<()> {
        self.calls.lock().unwrap().proxy += 1;
        Ok(())
    }

    fn send_error(&mut self) -> io::Result<()> {
        self.calls.lock().unwrap().error += 1;
        Ok(())
    }

    fn close_channel(&mut self) -> io::Result<()> {
        self.calls.lock().unwrap().close += 1;
        Ok(())
    }
}

/// Read side of a [`RecordingOutput`].
#[derive(Clone)]
pub struct Recorder(Arc<Mutex<Calls>>);

impl Recorder {
    pub fn calls(&self) -> Calls {
        self.0.lock().unwrap().clone()
    }

    pub fn wait_closed(&self) -> Calls {
        assert!(
            wait_until(Duration::from_secs(5), || self.calls().close > 0),
            "output never closed: {:?}",
            self.calls()
        );
        self.calls()
    }
}

/// A conversion job yielding `request` bound to a fresh recording output.
pub fn exchange(request: Request) -> (PendingExchange, Recorder) {
    let (output, recorder) = RecordingOutput::new();
    let job: PendingExchange = Box::new(move || {
        Ok(Exchange::new(request, ResponseGuard::new(Box::new(output))))
    });
    (job, recorder)
}

pub fn get(source: &str, path: &str) -> Request {
    Request::new(source, Method::Get, path)
}

/// A conversion job that fails after binding an output.
pub fn malformed() -> (PendingExchange, Recorder) {
    let (output, recorder) = RecordingOutput::new();
    let job: PendingExchange = Box::new(move || {
        Err(ConversionError::new("garbage on the wire")
            .with_output(ResponseGuard::new(Box::new(output))))
    });
    (job, recorder)
}

/// A conversion job that takes `delay` before yielding.
pub fn slow_exchange(request: Request, delay: Duration) -> (PendingExchange, Recorder) {
    let (job, recorder) = exchange(request);
    let slow: PendingExchange = Box::new(move || {
        thread::sleep(delay);
        job()
    });
    (slow, recorder)
}

/// Input channel fed from test code.
#[derive(Clone, Default)]
pub struct ScriptedInput {
    pending: Arc<Mutex<VecDeque<PendingExchange>>>,
}

impl ScriptedInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, job: PendingExchange) {
        self.pending.lock().unwrap().push_back(job);
    }

    pub fn remaining(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}

impl InputChannel for ScriptedInput {
    fn port(&self) -> u16 {
        0
    }

    fn is_secure(&self) -> bool {
        false
    }

    fn wait_for_incoming_request(&self, timeout: Duration) -> io::Result<Option<PendingExchange>> {
        if let Some(job) = self.pending.lock().unwrap().pop_front() {
            return Ok(Some(job));
        }
        thread::sleep(timeout.min(Duration::from_millis(2)));
        Ok(None)
    }
}

/// Answers with a fixed body, prefixed by the resolved command.
#[derive(Clone)]
pub struct StaticHandler(pub &'static str);

impl Handler for StaticHandler {
    fn handle(&mut self, request: &Request, output: &ResponseGuard) -> Result<Response, HandlerError> {
        let body = format!("{}|{}", request.command().unwrap_or("?"), self.0);
        Ok(output.make_response().body(body))
    }

    fn copy(&self) -> Box<dyn Handler> {
        Box::new(self.clone())
    }
}

/// Always returns an error.
#[derive(Clone)]
pub struct FailingHandler;

impl Handler for FailingHandler {
    fn handle(&mut self, _: &Request, _: &ResponseGuard) -> Result<Response, HandlerError> {
        Err(HandlerError::Failed("intentional failure".to_string()))
    }

    fn copy(&self) -> Box<dyn Handler> {
        Box::new(self.clone())
    }
}

/// Always panics.
#[derive(Clone)]
pub struct PanickingHandler;

impl Handler for PanickingHandler {
    fn handle(&mut self, _: &Request, _: &ResponseGuard) -> Result<Response, HandlerError> {
        panic!("handler exploded");
    }

    fn copy(&self) -> Box<dyn Handler> {
        Box::new(self.clone())
    }
}

/// Sleeps before answering; flags when it has started.
#[derive(Clone)]
pub struct SlowHandler {
    pub delay: Duration,
    pub started: Arc<AtomicBool>,
}

impl SlowHandler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            started: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn has_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}

impl Handler for SlowHandler {
    fn handle(&mut self, _: &Request, output: &ResponseGuard) -> Result<Response, HandlerError> {
        self.started.store(true, Ordering::SeqCst);
        thread::sleep(self.delay);
        Ok(output.make_response().body("slow"))
    }

    fn copy(&self) -> Box<dyn Handler> {
        Box::new(self.clone())
    }
}
