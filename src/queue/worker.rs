//! Worker pool executing envelopes.
//!
//! A multi-threaded Tokio runtime; blocking work (conversion reads, access
//! checks, handler bodies) goes to its blocking pool.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tokio::runtime::{Builder, Handle, Runtime};

use crate::pipeline::PipelineContext;
use crate::queue::envelope::{Envelope, Outcome};

/// How often [`WorkerPool::wait_idle`] re-checks the in-flight count.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(5);

pub struct WorkerPool {
    runtime: Mutex<Option<Runtime>>,
    handle: Handle,
    accepting: AtomicBool,
    in_flight: Arc<AtomicU64>,
}

impl WorkerPool {
    pub fn new(worker_threads: usize) -> io::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(worker_threads.max(1))
            .thread_name("dispatch-worker")
            .enable_all()
            .build()?;
        let handle = runtime.handle().clone();

        Ok(Self {
            runtime: Mutex::new(Some(runtime)),
            handle,
            accepting: AtomicBool::new(true),
            in_flight: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Run `envelope` on a worker. Returns `false` (and discards it as
    /// abandoned) once the pool stopped accepting.
    pub fn execute(&self, envelope: Envelope, ctx: Arc<PipelineContext>) -> bool {
        if !self.is_accepting() {
            tracing::debug!(kind = %envelope.kind(), "Worker pool closed, abandoning envelope");
            envelope.discard(Outcome::Abandoned);
            return false;
        }

        let guard = InFlight::track(&self.in_flight);
        self.handle.spawn(async move {
            let _guard = guard;
            let kind = envelope.kind();
            let outcome = envelope.run(&ctx).await;
            tracing::trace!(kind = %kind, outcome = ?outcome, "Envelope executed");
        });
        true
    }

    /// Refuse new work; running envelopes finish.
    pub fn stop_accepting(&self) {
        if self.accepting.swap(false, Ordering::SeqCst) {
            tracing::info!(in_flight = self.in_flight(), "Worker pool stopped accepting work");
        }
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Envelopes currently executing.
    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Block until nothing is executing or `deadline` passes.
    pub fn wait_idle(&self, deadline: Instant) -> bool {
        while self.in_flight() > 0 {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(IDLE_POLL_INTERVAL);
        }
        true
    }

    /// Shut the runtime down, giving running tasks `grace` to finish.
    ///
    /// Must not be called from inside the pool. Idempotent.
    pub fn shutdown(&self, grace: Duration) {
        let runtime = self
            .runtime
            .lock()
            .expect("worker runtime mutex poisoned")
            .take();
        if let Some(runtime) = runtime {
            self.stop_accepting();
            runtime.shutdown_timeout(grace);
            tracing::info!("Worker pool shut down");
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        let runtime = self
            .runtime
            .get_mut()
            .map(Option::take)
            .unwrap_or_else(|poisoned| poisoned.into_inner().take());
        if let Some(runtime) = runtime {
            // Dropping a runtime inside another runtime panics.
            runtime.shutdown_background();
        }
    }
}

/// Counts one executing envelope; decrements on drop.
struct InFlight(Arc<AtomicU64>);

impl InFlight {
    fn track(counter: &Arc<AtomicU64>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
