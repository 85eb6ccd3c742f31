//! Source-address access gate.
//!
//! # Responsibilities
//! - Decide whether a source may proceed past the middleware stage
//! - Lazily (re)load the allow-list when unset, past TTL or invalidated
//! - Refuse any list that admits a canary, leaving the gate closed
//!
//! # Design Decisions
//! - Readers never block on a reload; the current list is an `Arc` snapshot
//! - Reverse lookups go through [`HostResolver`] so tests stay offline

use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arc_swap::ArcSwapOption;

use crate::config::AccessControlConfig;
use crate::security::allow_list::{AllowList, AllowListSource, FileAllowList, StaticAllowList};
use crate::security::AccessControlError;

/// Resolves a source address to host names.
pub trait HostResolver: Send + Sync + 'static {
    /// Host names for `source`; empty when unknown.
    fn reverse(&self, source: &str) -> Vec<String>;
}

/// Reverse DNS through the system resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct DnsResolver;

impl HostResolver for DnsResolver {
    fn reverse(&self, source: &str) -> Vec<String> {
        let Ok(ip) = source.parse::<IpAddr>() else {
            return Vec::new();
        };
        match dns_lookup::lookup_addr(&ip) {
            Ok(host) if host != source => vec![host],
            Ok(_) => Vec::new(),
            Err(e) => {
                tracing::debug!(source, error = %e, "Reverse lookup failed");
                Vec::new()
            }
        }
    }
}

/// TTL-cached, self-validating allow-list gate.
pub struct AccessGate {
    source: Box<dyn AllowListSource>,
    resolver: Box<dyn HostResolver>,
    canaries: Vec<String>,
    ttl: Duration,
    current: ArcSwapOption<AllowList>,
    reload_lock: Mutex<()>,
    loads: AtomicU64,
}

impl AccessGate {
    pub fn new(source: Box<dyn AllowListSource>, canaries: Vec<String>, ttl: Duration) -> Self {
        Self {
            source,
            resolver: Box::new(DnsResolver),
            canaries,
            ttl,
            current: ArcSwapOption::empty(),
            reload_lock: Mutex::new(()),
            loads: AtomicU64::new(0),
        }
    }

    /// Build a gate from the `[access_control]` section.
    ///
    /// `allow_file` wins over inline `allow` patterns when both are set.
    pub fn from_config(config: &AccessControlConfig) -> Self {
        let source: Box<dyn AllowListSource> = match &config.allow_file {
            Some(path) => Box::new(FileAllowList::new(path, config.allow_key.clone())),
            None => Box::new(StaticAllowList::new(config.allow.clone())),
        };
        Self::new(source, config.canaries.clone(), Duration::from_secs(config.ttl_secs))
    }

    pub fn with_resolver(mut self, resolver: impl HostResolver) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    /// Whether `source` may proceed.
    ///
    /// Empty sources and any load failure deny.
    pub fn allow(&self, source: &str, reverse_lookup: bool, case_sensitive: bool) -> bool {
        if source.is_empty() {
            return false;
        }

        let list = match self.current_or_load() {
            Ok(list) => list,
            Err(e) => {
                tracing::error!(source, error = %e, "Allow-list unavailable, denying");
                return false;
            }
        };

        if self.check(&list, source, reverse_lookup, case_sensitive) {
            return true;
        }

        if list.is_expired() {
            tracing::debug!(source, "No match on stale allow-list, reloading once");
            return match self.reload() {
                Ok(fresh) => self.check(&fresh, source, reverse_lookup, case_sensitive),
                Err(e) => {
                    tracing::error!(source, error = %e, "Allow-list reload failed, denying");
                    false
                }
            };
        }

        false
    }

    /// Drop the cached list; the next check reloads.
    pub fn invalidate(&self) {
        self.current.store(None);
        tracing::info!(source = %self.source.describe(), "Allow-list invalidated");
    }

    /// Load (or reload) now, surfacing any configuration error.
    pub fn reload(&self) -> Result<Arc<AllowList>, AccessControlError> {
        let _serialized = self
            .reload_lock
            .lock()
            .expect("allow-list reload mutex poisoned");
        self.load_locked()
    }

    pub fn is_loaded(&self) -> bool {
        self.current.load().is_some()
    }

    /// Number of load attempts so far, successful or not.
    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }

    fn current_or_load(&self) -> Result<Arc<AllowList>, AccessControlError> {
        if let Some(list) = self.fresh() {
            return Ok(list);
        }

        let _serialized = self
            .reload_lock
            .lock()
            .expect("allow-list reload mutex poisoned");
        // Another thread may have loaded while we waited.
        if let Some(list) = self.fresh() {
            return Ok(list);
        }
        self.load_locked()
    }

    fn fresh(&self) -> Option<Arc<AllowList>> {
        self.current.load_full().filter(|list| !list.is_expired())
    }

    fn load_locked(&self) -> Result<Arc<AllowList>, AccessControlError> {
        self.loads.fetch_add(1, Ordering::Relaxed);

        let loaded = self
            .source
            .load()
            .and_then(|patterns| AllowList::compile(&patterns, self.ttl))
            .and_then(|list| list.self_test(&self.canaries).map(|()| list));

        match loaded {
            Ok(list) => {
                let list = Arc::new(list);
                self.current.store(Some(Arc::clone(&list)));
                tracing::info!(
                    source = %self.source.describe(),
                    patterns = list.len(),
                    ttl_secs = self.ttl.as_secs(),
                    "Allow-list loaded"
                );
                Ok(list)
            }
            Err(e) => {
                self.current.store(None);
                tracing::error!(
                    source = %self.source.describe(),
                    error = %e,
                    "Rejected allow-list, gate is closed"
                );
                Err(e)
            }
        }
    }

    fn check(&self, list: &AllowList, source: &str, reverse_lookup: bool, case_sensitive: bool) -> bool {
        if list.matches(source, case_sensitive) {
            return true;
        }
        reverse_lookup
            && self
                .resolver
                .reverse(source)
                .iter()
                .any(|host| self.check(list, host, false, case_sensitive))
    }
}
