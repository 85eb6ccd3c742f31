//! Handler templates and the pre-staged instance pool.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use dashmap::DashMap;

use crate::config::PoolConfig;
use crate::handler::Handler;

/// Registry key of the fallback handler.
pub const DEFAULT_COMMAND: &str = "";

#[derive(Default)]
struct Staging {
    lists: HashMap<String, Vec<Box<dyn Handler>>>,
    refilling: HashSet<String>,
}

struct RegistryInner {
    templates: DashMap<String, Arc<dyn Handler>>,
    staging: Mutex<Staging>,
    pool: PoolConfig,
    generation: AtomicU64,
    copies_made: AtomicU64,
}

/// Command → handler template map with per-command staged copies.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct HandlerRegistry {
    inner: Arc<RegistryInner>,
}

impl HandlerRegistry {
    pub fn new(pool: PoolConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                templates: DashMap::new(),
                staging: Mutex::new(Staging::default()),
                pool,
                generation: AtomicU64::new(0),
                copies_made: AtomicU64::new(0),
            }),
        }
    }

    /// Add or replace the template for `command`. Safe while serving.
    ///
    /// Use [`DEFAULT_COMMAND`] for the fallback handler.
    pub fn register_handler(&self, command: impl Into<String>, template: impl Handler) {
        let command = command.into();
        let template: Arc<dyn Handler> = Arc::new(template);

        let mut staging = self.inner.lock_staging();
        let replaced = self.inner.templates.insert(command.clone(), template).is_some();
        staging.lists.remove(&command);
        drop(staging);

        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        tracing::info!(command = %command, replaced, "Handler registered");
    }

    /// A private instance for `command`, falling back to the default handler.
    ///
    /// `None` only when neither `command` nor the default is registered.
    pub fn get_handler(&self, command: &str) -> Option<Box<dyn Handler>> {
        let (key, template) = match self.inner.templates.get(command) {
            Some(template) => (command, Arc::clone(template.value())),
            None => {
                let template = self.inner.templates.get(DEFAULT_COMMAND)?;
                (DEFAULT_COMMAND, Arc::clone(template.value()))
            }
        };

        let mut staging = self.inner.lock_staging();
        let list = staging.lists.entry(key.to_string()).or_default();
        let staged = list.pop();
        let refill = list.len() < self.inner.pool.min_staged && !staging.refilling.contains(key);
        if refill {
            staging.refilling.insert(key.to_string());
        }
        drop(staging);

        if refill {
            self.spawn_refill(key.to_string(), Arc::clone(&template));
        }

        Some(match staged {
            Some(instance) => instance,
            None => {
                tracing::trace!(command = key, "No staged instance, copying template");
                self.inner.copy_of(&template)
            }
        })
    }

    /// Synchronously stage `max_staged` copies of every template.
    pub fn prestage(&self) {
        let templates: Vec<(String, Arc<dyn Handler>)> = self
            .inner
            .templates
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        for (command, template) in templates {
            self.inner.fill(&command, &template);
        }
    }

    pub fn contains(&self, command: &str) -> bool {
        self.inner.templates.contains_key(command)
    }

    pub fn commands(&self) -> Vec<String> {
        let mut commands: Vec<String> = self.inner.templates.iter().map(|e| e.key().clone()).collect();
        commands.sort();
        commands
    }

    pub fn len(&self) -> usize {
        self.inner.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.templates.is_empty()
    }

    /// Copies currently staged for `command`.
    pub fn staged_len(&self, command: &str) -> usize {
        self.inner
            .lock_staging()
            .lists
            .get(command)
            .map_or(0, Vec::len)
    }

    /// Whether a background refill for `command` is running.
    pub fn is_refilling(&self, command: &str) -> bool {
        self.inner.lock_staging().refilling.contains(command)
    }

    /// Total template copies made, staged or on demand.
    pub fn copies_made(&self) -> u64 {
        self.inner.copies_made.load(Ordering::Relaxed)
    }

    /// Bumped on every registration; lets caches keyed on the command set
    /// notice changes.
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    fn spawn_refill(&self, command: String, template: Arc<dyn Handler>) {
        let inner = Arc::clone(&self.inner);
        let key = command.clone();
        let spawned = thread::Builder::new()
            .name("handler-refill".to_string())
            .spawn(move || {
                inner.fill(&key, &template);
                inner.lock_staging().refilling.remove(&key);
            });

        if let Err(e) = spawned {
            tracing::warn!(command = %command, error = %e, "Failed to spawn handler refill");
            self.inner.lock_staging().refilling.remove(&command);
        }
    }
}

impl RegistryInner {
    fn lock_staging(&self) -> std::sync::MutexGuard<'_, Staging> {
        self.staging.lock().expect("handler staging mutex poisoned")
    }

    fn copy_of(&self, template: &Arc<dyn Handler>) -> Box<dyn Handler> {
        self.copies_made.fetch_add(1, Ordering::Relaxed);
        template.copy()
    }

    fn is_current(&self, command: &str, template: &Arc<dyn Handler>) -> bool {
        self.templates
            .get(command)
            .is_some_and(|current| same_template(current.value(), template))
    }

    /// Stage copies of `template` for `command` up to `max_staged`.
    ///
    /// Copies are made outside the lock and dropped if the template was
    /// replaced in the meantime.
    fn fill(&self, command: &str, template: &Arc<dyn Handler>) {
        let mut staged = 0usize;
        loop {
            let instance = self.copy_of(template);

            let mut staging = self.lock_staging();
            if !self.is_current(command, template) {
                tracing::debug!(command, "Template replaced during refill, stopping");
                break;
            }
            let list = staging.lists.entry(command.to_string()).or_default();
            if list.len() >= self.pool.max_staged {
                break;
            }
            list.push(instance);
            staged += 1;
        }
        tracing::debug!(command, staged, "Handler instances staged");
    }
}

fn same_template(a: &Arc<dyn Handler>, b: &Arc<dyn Handler>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}
