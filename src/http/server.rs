//! Server: accept loop, worker pool, event queue and shutdown.
//!
//! # Responsibilities
//! - Own one input channel and run its accept loop on a dedicated thread
//! - Publish each accepted connection as Conversion + Middleware events
//! - Start the queue dispatcher on the worker pool
//! - Register with the lifecycle and shut down per the drain policy
//!
//! # Design Decisions
//! - The accept loop never parses; conversion runs on the pool
//! - `set_quitting` is monotonic; the drain happens in `join`
//! - `join` must be called from outside the worker pool

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use notify::RecommendedWatcher;
use tokio::runtime::Handle;

use crate::config::{validate_config, ConfigError, DrainPolicy, ServerConfig};
use crate::config::watcher::AllowListWatcher;
use crate::error::Error;
use crate::handler::Handler;
use crate::lifecycle::{Lifecycle, QuitSwitch, Quittable};
use crate::net::input::InputChannel;
use crate::observability::PipelineStats;
use crate::pipeline::{ConversionEvent, MiddlewareEvent, PipelineContext};
use crate::queue::{Event, EventQueue, QueueError, ResultListener, WorkerPool};
use crate::resilience::calculate_backoff;
use crate::routing::Router;
use crate::security::AccessGate;

/// How often the complete-drain wait re-checks the queue.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Builder for [`Server`].
pub struct ServerBuilder {
    config: ServerConfig,
    input: Arc<dyn InputChannel>,
    router: Option<Router>,
    gate: Option<Arc<AccessGate>>,
    lifecycle: Option<Lifecycle>,
    listeners: Vec<Arc<dyn ResultListener>>,
}

impl ServerBuilder {
    /// Use `router` instead of an empty one built from the config.
    pub fn router(mut self, router: Router) -> Self {
        self.router = Some(router);
        self
    }

    /// Use `gate` instead of one built from `[access_control]`.
    pub fn gate(mut self, gate: AccessGate) -> Self {
        self.gate = Some(Arc::new(gate));
        self
    }

    /// Register with `lifecycle` instead of a private one.
    pub fn lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    /// Attach `listener` to every envelope the server publishes.
    pub fn listener(mut self, listener: impl ResultListener) -> Self {
        self.listeners.push(Arc::new(listener));
        self
    }

    pub fn build(self) -> Result<Server, Error> {
        validate_config(&self.config).map_err(ConfigError::Validation)?;

        let config = self.config;
        let router = self
            .router
            .unwrap_or_else(|| Router::new(&config.routing, config.pool));
        let gate = self
            .gate
            .unwrap_or_else(|| Arc::new(AccessGate::from_config(&config.access_control)));
        let lifecycle = self.lifecycle.unwrap_or_default();

        let pool = Arc::new(WorkerPool::new(config.queue.worker_threads)?);
        let queue = self
            .listeners
            .into_iter()
            .fold(EventQueue::new(config.queue.capacity)?, EventQueue::with_listener);
        let queue = Arc::new(queue);

        let stats = Arc::new(PipelineStats::new());
        let state = Arc::new(ServerState {
            switch: QuitSwitch::new(),
            pool: Arc::clone(&pool),
            queue: Arc::clone(&queue),
            drain: config.queue.drain,
        });

        let ctx = Arc::new(PipelineContext::new(
            &config,
            Arc::clone(&queue),
            Arc::clone(&gate),
            router.clone(),
            Arc::clone(&stats),
            state.switch.clone(),
        ));

        Ok(Server {
            config,
            input: self.input,
            router,
            gate,
            lifecycle,
            stats,
            queue,
            pool,
            state,
            ctx,
            started: AtomicBool::new(false),
            accept_thread: Mutex::new(None),
            watcher: Mutex::new(None),
        })
    }
}

/// The server's quit switch, registered with the [`Lifecycle`].
///
/// Quitting stops the accept loop and abandoning stages; under
/// [`DrainPolicy::Abandon`] it also closes the worker pool and queue.
pub struct ServerState {
    switch: QuitSwitch,
    pool: Arc<WorkerPool>,
    queue: Arc<EventQueue>,
    drain: DrainPolicy,
}

impl Quittable for ServerState {
    fn set_quitting(&self, quit: bool) {
        if !self.switch.set(quit) {
            return;
        }
        tracing::info!(drain = ?self.drain, "Server quitting");
        if self.drain == DrainPolicy::Abandon {
            self.pool.stop_accepting();
            self.queue.close();
        }
    }

    fn is_quitting(&self) -> bool {
        self.switch.is_set()
    }

    fn name(&self) -> &str {
        "server"
    }
}

/// Accepts connections and drives them through the pipeline.
pub struct Server {
    config: ServerConfig,
    input: Arc<dyn InputChannel>,
    router: Router,
    gate: Arc<AccessGate>,
    lifecycle: Lifecycle,
    stats: Arc<PipelineStats>,
    queue: Arc<EventQueue>,
    pool: Arc<WorkerPool>,
    state: Arc<ServerState>,
    ctx: Arc<PipelineContext>,
    started: AtomicBool,
    accept_thread: Mutex<Option<JoinHandle<()>>>,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

impl Server {
    pub fn builder(config: ServerConfig, input: impl InputChannel) -> ServerBuilder {
        ServerBuilder {
            config,
            input: Arc::new(input),
            router: None,
            gate: None,
            lifecycle: None,
            listeners: Vec::new(),
        }
    }

    /// Launch the dispatcher and the accept loop.
    ///
    /// Blocks for `lifecycle.warm_up_ms` before returning.
    pub fn start(&self) -> Result<(), Error> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyStarted);
        }

        self.lifecycle.add_quittable(Arc::clone(&self.state) as Arc<dyn Quittable>);
        self.router.registry().prestage();
        self.queue.start(Arc::clone(&self.ctx), Arc::clone(&self.pool));
        self.watch_allow_list();

        let input = Arc::clone(&self.input);
        let queue = Arc::clone(&self.queue);
        let stats = Arc::clone(&self.stats);
        let handle = self.pool.handle().clone();
        let quit = self.state.switch.clone();
        let timeout = Duration::from_millis(self.config.listener.accept_timeout_ms);

        let accept = thread::Builder::new()
            .name(format!("accept-{}", self.input.port()))
            .spawn(move || accept_loop(input.as_ref(), &queue, &handle, &quit, &stats, timeout))?;
        *self.accept_thread.lock().expect("accept thread mutex poisoned") = Some(accept);

        tracing::info!(
            port = self.input.port(),
            secure = self.input.is_secure(),
            workers = self.config.queue.worker_threads,
            queue_capacity = self.queue.capacity(),
            handlers = self.router.registry().len(),
            "Server started"
        );

        if self.config.lifecycle.warm_up_ms > 0 {
            thread::sleep(Duration::from_millis(self.config.lifecycle.warm_up_ms));
        }
        Ok(())
    }

    /// Flip this server to quitting. Monotonic; `false` is ignored.
    pub fn set_quitting(&self, quit: bool) {
        self.state.set_quitting(quit);
    }

    pub fn is_quitting(&self) -> bool {
        self.state.is_quitting()
    }

    /// Block until the server has quit and its work has drained.
    ///
    /// Returns immediately if the server was never started.
    pub fn join(&self) {
        let accept = self
            .accept_thread
            .lock()
            .expect("accept thread mutex poisoned")
            .take();
        let Some(accept) = accept else {
            return;
        };
        if accept.join().is_err() {
            tracing::error!("Accept loop panicked");
        }

        let grace = Duration::from_millis(self.config.lifecycle.shutdown_grace_ms);
        if self.state.drain == DrainPolicy::Complete {
            self.drain_queue(Instant::now() + grace);
        }

        self.pool.stop_accepting();
        self.queue.close();
        self.pool.shutdown(grace);
        self.watcher.lock().expect("watcher mutex poisoned").take();

        tracing::info!(stats = ?self.stats.snapshot(), "Server stopped");
    }

    /// Add or replace a route while serving.
    pub fn register_handler(&self, command: impl Into<String>, template: impl Handler) {
        self.router.register_handler(command, template);
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn gate(&self) -> &Arc<AccessGate> {
        &self.gate
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn port(&self) -> u16 {
        self.input.port()
    }

    /// Runtime handle of the worker pool.
    pub fn handle(&self) -> &Handle {
        self.pool.handle()
    }

    /// Envelopes waiting in the queue.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Envelopes executing on the pool.
    pub fn in_flight(&self) -> u64 {
        self.pool.in_flight()
    }

    /// Wait until queued and executing work is gone, or the deadline.
    ///
    /// Idle must be observed on two consecutive polls: the dispatcher holds
    /// an envelope briefly between the ring and the pool.
    fn drain_queue(&self, deadline: Instant) {
        let is_idle = || self.queue.is_empty() && self.pool.in_flight() == 0;
        loop {
            if is_idle() {
                thread::sleep(DRAIN_POLL_INTERVAL);
                if is_idle() {
                    break;
                }
            }
            if Instant::now() >= deadline {
                tracing::warn!(
                    queued = self.queue.len(),
                    in_flight = self.pool.in_flight(),
                    "Shutdown grace expired before the queue drained"
                );
                return;
            }
            thread::sleep(DRAIN_POLL_INTERVAL);
        }
        tracing::info!("Queue drained");
    }

    fn watch_allow_list(&self) {
        let access = &self.config.access_control;
        let Some(path) = access.allow_file.as_ref().filter(|_| access.watch_file) else {
            return;
        };

        match AllowListWatcher::new(std::path::Path::new(path), Arc::clone(&self.gate)).run() {
            Ok(watcher) => {
                *self.watcher.lock().expect("watcher mutex poisoned") = Some(watcher);
            }
            Err(e) => tracing::error!(path = %path, error = %e, "Failed to watch allow-list file"),
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let accept = self.accept_thread.get_mut().ok().and_then(Option::take);
        if let Some(accept) = accept {
            self.state.set_quitting(true);
            let _ = accept.join();
            self.queue.close();
        }
    }
}

fn accept_loop(
    input: &dyn InputChannel,
    queue: &EventQueue,
    handle: &Handle,
    quit: &QuitSwitch,
    stats: &PipelineStats,
    timeout: Duration,
) {
    tracing::info!(port = input.port(), "Accept loop started");
    let mut consecutive_errors = 0u32;

    while !quit.is_set() {
        let job = match input.wait_for_incoming_request(timeout) {
            Ok(Some(job)) => job,
            Ok(None) => continue,
            Err(e) => {
                consecutive_errors = consecutive_errors.saturating_add(1);
                stats.record_accept_error();
                tracing::warn!(error = %e, consecutive_errors, "Accept failed");
                thread::sleep(calculate_backoff(consecutive_errors, 5, 1_000));
                continue;
            }
        };
        consecutive_errors = 0;
        stats.record_accepted();

        let (conversion, pending) = ConversionEvent::new(job);
        let published = handle.block_on(async {
            queue.publish(Event::Conversion(conversion)).await?;
            queue.publish(Event::Middleware(MiddlewareEvent::new(pending))).await
        });

        match published {
            Ok(()) => {}
            Err(QueueError::Closed) => {
                tracing::debug!("Queue closed, dropping accepted connection");
                break;
            }
            Err(e) => tracing::warn!(error = %e, "Failed to publish accepted connection"),
        }
    }

    tracing::info!(port = input.port(), "Accept loop stopped");
}
