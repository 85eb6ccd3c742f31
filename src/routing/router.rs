//! Router façade: command registry plus resolver.

use std::sync::Arc;

use crate::config::{PoolConfig, RoutingConfig};
use crate::handler::{Handler, HandlerRegistry};
use crate::routing::resolver::CommandResolver;

/// Shared routing state handed to the dispatch stage.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Router {
    registry: HandlerRegistry,
    resolver: Arc<CommandResolver>,
}

impl Router {
    pub fn new(routing: &RoutingConfig, pool: PoolConfig) -> Self {
        Self {
            registry: HandlerRegistry::new(pool),
            resolver: Arc::new(CommandResolver::new(routing.memo_capacity)),
        }
    }

    /// Add or replace a route while serving.
    pub fn register_handler(&self, command: impl Into<String>, template: impl Handler) {
        self.registry.register_handler(command, template);
    }

    /// Command for `path`, or `None` when nothing matches.
    pub fn resolve(&self, path: &str) -> Option<String> {
        self.resolver.resolve(&self.registry, path)
    }

    /// A private handler instance for `command` (default handler on a miss).
    pub fn get_handler(&self, command: &str) -> Option<Box<dyn Handler>> {
        self.registry.get_handler(command)
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn resolver(&self) -> &CommandResolver {
        &self.resolver
    }
}
