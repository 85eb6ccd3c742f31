//! Event queue subsystem.
//!
//! # Data Flow
//! ```text
//! Producer (accept loop or a pipeline stage)
//!     → EventQueue::publish(event)
//!         → wrap in an Envelope with the default listeners
//!         → ring.rs: wait for a free slot, move the envelope in
//!     → dispatcher task: ring.next() in sequence order
//!     → worker.rs: WorkerPool::execute (one task per envelope)
//!         → Event::execute → Outcome
//!         → every ResultListener, each isolated from the others' panics
//! ```
//!
//! # Design Decisions
//! - A full ring applies backpressure; events are never dropped silently
//! - One dispatcher consumes; execution fans out to the pool
//! - On close, unconsumed envelopes are discarded as `Outcome::Abandoned`
//!   and their exchanges are closed when dropped

pub mod envelope;
pub mod ring;
pub mod worker;

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::pipeline::PipelineContext;

pub use envelope::{Envelope, Event, EventKind, Outcome, ResultListener};
pub use ring::RingBuffer;
pub use worker::WorkerPool;

/// Errors from publishing onto the queue.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("event queue is full")]
    Full,

    #[error("event queue is closed")]
    Closed,

    #[error("queue capacity must be a power of two, got {0}")]
    InvalidCapacity(usize),
}

/// Ring buffer plus the listeners attached to every envelope.
pub struct EventQueue {
    ring: RingBuffer,
    listeners: Vec<Arc<dyn ResultListener>>,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Result<Self, QueueError> {
        Ok(Self {
            ring: RingBuffer::new(capacity)?,
            listeners: Vec::new(),
        })
    }

    /// Attach `listener` to every envelope published from now on.
    pub fn with_listener(mut self, listener: Arc<dyn ResultListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Publish `event`, waiting while the ring is full.
    pub async fn publish(&self, event: Event) -> Result<(), QueueError> {
        self.ring.publish(self.envelope(event)).await
    }

    /// Publish `event` without waiting.
    pub fn try_publish(&self, event: Event) -> Result<(), QueueError> {
        self.ring.try_publish(self.envelope(event))
    }

    /// Publish a pre-built envelope; the default listeners are added to it.
    pub async fn publish_envelope(&self, mut envelope: Envelope) -> Result<(), QueueError> {
        envelope.add_listeners(&self.listeners);
        self.ring.publish(envelope).await
    }

    fn envelope(&self, event: Event) -> Envelope {
        let mut envelope = Envelope::new(event);
        envelope.add_listeners(&self.listeners);
        envelope
    }

    /// Start the dispatcher that hands envelopes to `pool`.
    ///
    /// The task ends when the queue is closed.
    pub fn start(self: &Arc<Self>, ctx: Arc<PipelineContext>, pool: Arc<WorkerPool>) -> JoinHandle<()> {
        let queue = Arc::clone(self);
        pool.handle().clone().spawn(async move {
            tracing::debug!(capacity = queue.capacity(), "Event dispatcher started");
            while let Some(envelope) = queue.ring.next().await {
                pool.execute(envelope, Arc::clone(&ctx));
            }
            tracing::debug!("Event dispatcher stopped");
        })
    }

    /// Close the queue, discarding whatever was not consumed.
    ///
    /// Returns how many envelopes were abandoned. Idempotent.
    pub fn close(&self) -> usize {
        self.ring.close();
        let abandoned = self.ring.drain();
        let count = abandoned.len();
        for envelope in abandoned {
            envelope.discard(Outcome::Abandoned);
        }
        if count > 0 {
            tracing::warn!(abandoned = count, "Event queue closed with unconsumed envelopes");
        }
        count
    }

    pub fn is_closed(&self) -> bool {
        self.ring.is_closed()
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}
