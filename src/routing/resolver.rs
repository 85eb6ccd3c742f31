//! Memoized longest-prefix command resolution.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use lru::LruCache;

use crate::handler::HandlerRegistry;

struct Memo {
    derived: LruCache<String, String>,
    generation: u64,
}

/// Maps request paths to registered commands.
pub struct CommandResolver {
    memo: Mutex<Memo>,
    scans: AtomicU64,
}

impl CommandResolver {
    /// `capacity` bounds the memo; zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            memo: Mutex::new(Memo {
                derived: LruCache::new(capacity),
                generation: 0,
            }),
            scans: AtomicU64::new(0),
        }
    }

    /// Resolve `path` against the commands in `registry`.
    pub fn resolve(&self, registry: &HandlerRegistry, path: &str) -> Option<String> {
        if registry.contains(path) {
            return Some(path.to_string());
        }

        let generation = registry.generation();
        {
            let mut memo = self.lock_memo();
            if memo.generation != generation {
                memo.derived.clear();
                memo.generation = generation;
            }
            if let Some(command) = memo.derived.get(path) {
                return Some(command.clone());
            }
        }

        self.scans.fetch_add(1, Ordering::Relaxed);
        let command = prefix_candidates(path)
            .find(|candidate| registry.contains(candidate))?
            .to_string();

        let mut memo = self.lock_memo();
        if memo.generation == generation {
            memo.derived.put(path.to_string(), command.clone());
        }
        tracing::trace!(path, command = %command, "Derived command memoized");
        Some(command)
    }

    /// Prefix scans performed; memo hits do not count.
    pub fn scan_count(&self) -> u64 {
        self.scans.load(Ordering::Relaxed)
    }

    pub fn memo_len(&self) -> usize {
        self.lock_memo().derived.len()
    }

    fn lock_memo(&self) -> std::sync::MutexGuard<'_, Memo> {
        self.memo.lock().expect("resolver memo mutex poisoned")
    }
}

/// Ancestor prefixes of `path`, longest first.
///
/// Each `/` ends a candidate: the slash at index 0 yields `"/"`, any other
/// yields the text before it.
fn prefix_candidates(path: &str) -> impl Iterator<Item = &str> {
    path.match_indices('/')
        .map(|(index, _)| index)
        .rev()
        .map(move |index| if index == 0 { "/" } else { &path[..index] })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::handler::EchoHandler;

    fn registry(commands: &[&str]) -> HandlerRegistry {
        let registry = HandlerRegistry::new(PoolConfig::default());
        for command in commands {
            registry.register_handler(*command, EchoHandler);
        }
        registry
    }

    #[test]
    fn test_prefix_candidates_longest_first() {
        let candidates: Vec<&str> = prefix_candidates("/a/b/c").collect();
        assert_eq!(candidates, vec!["/a/b", "/a", "/"]);

        let trailing: Vec<&str> = prefix_candidates("/a/b/").collect();
        assert_eq!(trailing, vec!["/a/b", "/a", "/"]);
    }

    #[test]
    fn test_longest_registered_prefix_wins() {
        let registry = registry(&["/a/b", "/"]);
        let resolver = CommandResolver::new(16);
        assert_eq!(resolver.resolve(&registry, "/a/b/c"), Some("/a/b".to_string()));
    }

    #[test]
    fn test_root_catches_everything() {
        let registry = registry(&["/"]);
        let resolver = CommandResolver::new(16);
        assert_eq!(resolver.resolve(&registry, "/x/y"), Some("/".to_string()));
    }

    #[test]
    fn test_exact_beats_prefix() {
        let registry = registry(&["/a", "/a/b/c"]);
        let resolver = CommandResolver::new(16);
        assert_eq!(resolver.resolve(&registry, "/a/b/c"), Some("/a/b/c".to_string()));
        assert_eq!(resolver.scan_count(), 0);
    }

    #[test]
    fn test_not_found() {
        let registry = registry(&["/a"]);
        let resolver = CommandResolver::new(16);
        assert_eq!(resolver.resolve(&registry, "/b/c"), None);
        assert_eq!(resolver.resolve(&registry, "/b/c"), None);
        assert_eq!(resolver.memo_len(), 0);
        assert_eq!(resolver.scan_count(), 2);
    }

    #[test]
    fn test_second_resolution_skips_scan() {
        let registry = registry(&["/api"]);
        let resolver = CommandResolver::new(16);

        let first = resolver.resolve(&registry, "/api/users/7");
        assert_eq!(resolver.scan_count(), 1);
        let second = resolver.resolve(&registry, "/api/users/7");
        assert_eq!(first, second);
        assert_eq!(resolver.scan_count(), 1);
    }

    #[test]
    fn test_registration_invalidates_memo() {
        let registry = registry(&["/api"]);
        let resolver = CommandResolver::new(16);
        assert_eq!(resolver.resolve(&registry, "/api/users/7"), Some("/api".to_string()));

        registry.register_handler("/api/users", EchoHandler);
        assert_eq!(
            resolver.resolve(&registry, "/api/users/7"),
            Some("/api/users".to_string())
        );
        assert_eq!(resolver.scan_count(), 2);
    }
}
