//! Queue envelopes: an event payload plus its result listeners.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::pipeline::{ConversionEvent, DispatchEvent, HandlerEvent, MiddlewareEvent, PipelineContext};

/// What a pipeline stage does when it reaches the front of the queue.
#[derive(Default)]
pub enum Event {
    #[default]
    Noop,
    Conversion(ConversionEvent),
    Middleware(MiddlewareEvent),
    Dispatch(DispatchEvent),
    Handler(HandlerEvent),
}

/// Payload discriminant, reported to listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Noop,
    Conversion,
    Middleware,
    Dispatch,
    Handler,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Noop => "noop",
            EventKind::Conversion => "conversion",
            EventKind::Middleware => "middleware",
            EventKind::Dispatch => "dispatch",
            EventKind::Handler => "handler",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Noop => EventKind::Noop,
            Event::Conversion(_) => EventKind::Conversion,
            Event::Middleware(_) => EventKind::Middleware,
            Event::Dispatch(_) => EventKind::Dispatch,
            Event::Handler(_) => EventKind::Handler,
        }
    }

    /// Run this stage on a worker.
    pub async fn execute(self, ctx: &Arc<PipelineContext>) -> Outcome {
        match self {
            Event::Noop => Outcome::Noop,
            Event::Conversion(event) => event.execute(ctx).await,
            Event::Middleware(event) => event.execute(ctx).await,
            Event::Dispatch(event) => event.execute(ctx).await,
            Event::Handler(event) => event.execute(ctx).await,
        }
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Event").field(&self.kind()).finish()
    }
}

/// Result of executing one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Noop,
    /// The next stage was published.
    Forwarded,
    /// A handler response was sent.
    Completed,
    /// The connection could not be converted into a request.
    Malformed,
    /// The access gate refused the source.
    Denied,
    /// No handler matched, not even the default.
    Unrouted,
    /// The handler returned an error.
    Failed(String),
    /// The handler panicked.
    Panicked(String),
    /// Dropped because the server is shutting down.
    Abandoned,
}

/// Observer notified after every envelope executes.
pub trait ResultListener: Send + Sync + 'static {
    fn on_result(&self, kind: EventKind, outcome: &Outcome, elapsed: Duration);
}

impl<F> ResultListener for F
where
    F: Fn(EventKind, &Outcome, Duration) + Send + Sync + 'static,
{
    fn on_result(&self, kind: EventKind, outcome: &Outcome, elapsed: Duration) {
        self(kind, outcome, elapsed)
    }
}

/// A queue slot's contents.
#[derive(Default)]
pub struct Envelope {
    published_at: Option<Instant>,
    event: Event,
    listeners: Vec<Arc<dyn ResultListener>>,
}

impl Envelope {
    pub fn new(event: Event) -> Self {
        Self {
            published_at: None,
            event,
            listeners: Vec::new(),
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn ResultListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn add_listeners<'a>(&mut self, listeners: impl IntoIterator<Item = &'a Arc<dyn ResultListener>>) {
        self.listeners.extend(listeners.into_iter().cloned());
    }

    /// Take over `other`'s payload and listeners, stamping the publish time.
    ///
    /// The slot keeps its own listener storage; `other` is left empty.
    pub fn become_from(&mut self, other: &mut Envelope) {
        self.published_at = Some(Instant::now());
        self.event = std::mem::take(&mut other.event);
        self.listeners.clear();
        self.listeners.append(&mut other.listeners);
    }

    /// Move the contents out, leaving a no-op envelope behind.
    ///
    /// The listener `Vec` stays with `self` so the slot's capacity survives.
    pub fn take(&mut self) -> Envelope {
        Envelope {
            published_at: self.published_at.take(),
            event: std::mem::take(&mut self.event),
            listeners: self.listeners.drain(..).collect(),
        }
    }

    pub fn kind(&self) -> EventKind {
        self.event.kind()
    }

    pub fn published_at(&self) -> Option<Instant> {
        self.published_at
    }

    pub fn is_noop(&self) -> bool {
        matches!(self.event, Event::Noop)
    }

    /// Execute the payload and notify every listener.
    pub async fn run(mut self, ctx: &Arc<PipelineContext>) -> Outcome {
        let event = std::mem::take(&mut self.event);
        let kind = event.kind();
        let outcome = event.execute(ctx).await;
        self.notify(kind, &outcome);
        outcome
    }

    /// Notify listeners without executing, dropping the payload.
    pub fn discard(mut self, outcome: Outcome) {
        let kind = self.event.kind();
        self.event = Event::Noop;
        self.notify(kind, &outcome);
    }

    fn notify(&self, kind: EventKind, outcome: &Outcome) {
        let elapsed = self
            .published_at
            .map(|at| at.elapsed())
            .unwrap_or_default();

        for listener in &self.listeners {
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                listener.on_result(kind, outcome, elapsed)
            }));
            if result.is_err() {
                tracing::error!(kind = %kind, outcome = ?outcome, "Result listener panicked");
            }
        }
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("event", &self.event)
            .field("listeners", &self.listeners.len())
            .field("published_at", &self.published_at)
            .finish()
    }
}
