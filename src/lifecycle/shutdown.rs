//! Cooperative, idempotent shutdown coordination.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;

use tokio::sync::watch;

/// A component exposing a cooperative stop switch.
///
/// Implementations must be monotonic: once quitting, always quitting.
pub trait Quittable: Send + Sync + 'static {
    fn set_quitting(&self, quit: bool);

    fn is_quitting(&self) -> bool;

    /// Name used in lifecycle log lines.
    fn name(&self) -> &str {
        "component"
    }
}

/// Monotonic quit flag with waiters.
///
/// Clones share the same flag.
#[derive(Debug, Clone)]
pub struct QuitSwitch {
    tx: Arc<watch::Sender<bool>>,
}

impl QuitSwitch {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Flip to quitting. Returns `true` only for the call that flipped it.
    ///
    /// `quit == false` is ignored; a quitting switch never resets.
    pub fn set(&self, quit: bool) -> bool {
        if !quit {
            if self.is_set() {
                tracing::warn!("Ignoring attempt to clear a quit flag");
            }
            return false;
        }
        self.tx.send_if_modified(|quitting| {
            if *quitting {
                false
            } else {
                *quitting = true;
                true
            }
        })
    }

    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Resolve once the switch is quitting.
    pub async fn wait(&self) {
        let mut rx = self.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|quitting| *quitting).await;
    }
}

impl Default for QuitSwitch {
    fn default() -> Self {
        Self::new()
    }
}

impl Quittable for QuitSwitch {
    fn set_quitting(&self, quit: bool) {
        self.set(quit);
    }

    fn is_quitting(&self) -> bool {
        self.is_set()
    }

    fn name(&self) -> &str {
        "quit-switch"
    }
}

struct LifecycleInner {
    switch: QuitSwitch,
    members: Mutex<Vec<Arc<dyn Quittable>>>,
    ran: AtomicBool,
}

/// Registry of quittable components plus a one-shot aggregator.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Lifecycle {
    inner: Arc<LifecycleInner>,
}

static GLOBAL: OnceLock<Lifecycle> = OnceLock::new();

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(LifecycleInner {
                switch: QuitSwitch::new(),
                members: Mutex::new(Vec::new()),
                ran: AtomicBool::new(false),
            }),
        }
    }

    /// The process-wide instance, created on first use.
    pub fn global() -> &'static Lifecycle {
        GLOBAL.get_or_init(Lifecycle::new)
    }

    /// Register `component` for shutdown.
    ///
    /// If shutdown has already begun the component is quit immediately.
    pub fn add_quittable(&self, component: Arc<dyn Quittable>) {
        let mut members = self
            .inner
            .members
            .lock()
            .expect("lifecycle members mutex poisoned");

        if self.inner.switch.is_set() || self.inner.ran.load(Ordering::SeqCst) {
            drop(members);
            tracing::debug!(component = component.name(), "Registered after shutdown, quitting now");
            quit_member(component.as_ref());
            return;
        }
        members.push(component);
    }

    /// Non-blocking form of [`set_quitting_with`](Self::set_quitting_with).
    pub fn set_quitting(&self, quit: bool) {
        self.set_quitting_with(quit, false);
    }

    /// Begin shutdown. The aggregator runs on its own thread; with `block`
    /// the caller waits for it.
    ///
    /// Repeated calls, and any `quit == false`, are no-ops.
    pub fn set_quitting_with(&self, quit: bool, block: bool) {
        if !self.inner.switch.set(quit) {
            if quit {
                tracing::debug!("Shutdown already in progress");
            }
            return;
        }

        tracing::info!(members = self.member_count(), "Shutdown requested");

        let inner = Arc::clone(&self.inner);
        let spawned = thread::Builder::new()
            .name("quit-aggregator".to_string())
            .spawn(move || inner.run_aggregator());

        match spawned {
            Ok(handle) if block => {
                if handle.join().is_err() {
                    tracing::error!("Quit aggregator panicked");
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Failed to spawn quit aggregator, running inline");
                self.inner.run_aggregator();
            }
        }
    }

    pub fn is_quitting(&self) -> bool {
        self.inner.switch.is_set()
    }

    /// The shared switch, for components that only need to observe shutdown.
    pub fn switch(&self) -> &QuitSwitch {
        &self.inner.switch
    }

    /// Components still waiting for the aggregator.
    pub fn member_count(&self) -> usize {
        self.inner
            .members
            .lock()
            .expect("lifecycle members mutex poisoned")
            .len()
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleInner {
    fn run_aggregator(&self) {
        if self.ran.swap(true, Ordering::SeqCst) {
            return;
        }

        let members = std::mem::take(
            &mut *self
                .members
                .lock()
                .expect("lifecycle members mutex poisoned"),
        );

        for member in &members {
            if !member.is_quitting() {
                quit_member(member.as_ref());
            }
        }

        tracing::info!(members = members.len(), "All components notified of shutdown");
    }
}

/// Quit one component; a panicking component does not stop the others.
fn quit_member(member: &dyn Quittable) {
    let result = panic::catch_unwind(AssertUnwindSafe(|| member.set_quitting(true)));
    match result {
        Ok(()) => tracing::debug!(component = member.name(), "Component quitting"),
        Err(_) => tracing::error!(component = member.name(), "Component panicked while quitting"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Counting {
        switch: QuitSwitch,
        calls: AtomicUsize,
    }

    impl Quittable for Counting {
        fn set_quitting(&self, quit: bool) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.switch.set(quit);
        }

        fn is_quitting(&self) -> bool {
            self.switch.is_set()
        }
    }

    #[test]
    fn test_switch_is_monotonic() {
        let switch = QuitSwitch::new();
        assert!(!switch.is_set());
        assert!(!switch.set(false));
        assert!(switch.set(true));
        assert!(!switch.set(true));
        assert!(!switch.set(false));
        assert!(switch.is_set());
    }

    #[test]
    fn test_member_notified_exactly_once() {
        let lifecycle = Lifecycle::new();
        let member = Arc::new(Counting::default());
        lifecycle.add_quittable(member.clone());

        lifecycle.set_quitting_with(true, true);
        lifecycle.set_quitting_with(true, true);
        lifecycle.set_quitting_with(false, true);

        assert!(lifecycle.is_quitting());
        assert!(member.is_quitting());
        assert_eq!(member.calls.load(Ordering::SeqCst), 1);
        assert_eq!(lifecycle.member_count(), 0);
    }

    #[test]
    fn test_late_registration_quits_immediately() {
        let lifecycle = Lifecycle::new();
        lifecycle.set_quitting_with(true, true);

        let late = Arc::new(Counting::default());
        lifecycle.add_quittable(late.clone());
        assert!(late.is_quitting());
        assert_eq!(late.calls.load(Ordering::SeqCst), 1);
        assert_eq!(lifecycle.member_count(), 0);
    }

    #[test]
    fn test_panicking_member_does_not_block_others() {
        struct Exploding;
        impl Quittable for Exploding {
            fn set_quitting(&self, _quit: bool) {
                panic!("boom");
            }
            fn is_quitting(&self) -> bool {
                false
            }
        }

        let lifecycle = Lifecycle::new();
        let good = Arc::new(Counting::default());
        lifecycle.add_quittable(Arc::new(Exploding));
        lifecycle.add_quittable(good.clone());

        lifecycle.set_quitting_with(true, true);
        assert!(good.is_quitting());
    }

    #[tokio::test]
    async fn test_waiters_wake_on_quit() {
        let switch = QuitSwitch::new();
        let waiter = {
            let switch = switch.clone();
            tokio::spawn(async move { switch.wait().await })
        };
        switch.set(true);
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
