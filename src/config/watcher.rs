//! Allow-list file watcher.
//!
//! Changes to the external allow-list invalidate the gate's cache; the next
//! access check reloads the file and re-runs the canary self-test.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};

use crate::security::AccessGate;

/// Watches one allow-list file on behalf of an [`AccessGate`].
pub struct AllowListWatcher {
    path: PathBuf,
    gate: Arc<AccessGate>,
}

impl AllowListWatcher {
    pub fn new(path: &Path, gate: Arc<AccessGate>) -> Self {
        Self {
            path: path.to_path_buf(),
            gate,
        }
    }

    /// Start watching the file in a background thread.
    ///
    /// Watching stops when the returned watcher is dropped.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let gate = Arc::clone(&self.gate);

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove() {
                        tracing::info!(paths = ?event.paths, "Allow-list change detected");
                        gate.invalidate();
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Allow-list watcher started");
        Ok(watcher)
    }
}
