//! Routing of execution contexts to data sources.
//!
//! Resolution order:
//! 1. registered strategies, in registration order; the first one that
//!    returns a key wins;
//! 2. the default strategy, when one is configured;
//! 3. [`ResourceKey::DEFAULT`].
//!
//! The DEFAULT key goes straight to the fallback data source. Any other key
//! is looked up in the registry, and a miss also lands on the fallback. Only
//! when there is no fallback does resolution fail.

use crate::db::connection::DataSource;
use crate::db::entry::ResourceEntry;
use crate::error::{DbError, DbResult};
use crate::models::{ResourceKey, RoutingContext};
use arc_swap::ArcSwap;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Picks a data source key for an execution context.
///
/// Returning `None` abstains and lets the next strategy decide. Any closure
/// `Fn(&RoutingContext) -> Option<ResourceKey>` is a strategy.
pub trait RoutingStrategy: Send + Sync {
    fn route(&self, ctx: &RoutingContext<'_>) -> Option<ResourceKey>;
}

impl<F> RoutingStrategy for F
where
    F: Fn(&RoutingContext<'_>) -> Option<ResourceKey> + Send + Sync,
{
    fn route(&self, ctx: &RoutingContext<'_>) -> Option<ResourceKey> {
        self(ctx)
    }
}

/// Registry of data sources plus the ordered strategies that choose between them.
///
/// Registration and resolution may run concurrently. A resolution sees each
/// registry slot and the strategy list either before or after a concurrent
/// update, never half-applied.
pub struct ResourceRouter {
    registry: DashMap<ResourceKey, Arc<dyn DataSource>>,
    strategies: ArcSwap<Vec<Arc<dyn RoutingStrategy>>>,
    default_strategy: Option<Arc<dyn RoutingStrategy>>,
    fallback: Option<Arc<dyn DataSource>>,
}

impl ResourceRouter {
    pub fn new(fallback: Option<Arc<dyn DataSource>>) -> Self {
        Self {
            registry: DashMap::new(),
            strategies: ArcSwap::from_pointee(Vec::new()),
            default_strategy: None,
            fallback,
        }
    }

    /// Consulted after every registered strategy has abstained.
    pub fn with_default_strategy(mut self, strategy: Arc<dyn RoutingStrategy>) -> Self {
        self.default_strategy = Some(strategy);
        self
    }

    /// Register a data source under its key, replacing any previous one.
    /// `None` is ignored.
    pub fn register_entry(&self, entry: impl Into<Option<ResourceEntry>>) {
        let Some(entry) = entry.into() else {
            return;
        };
        debug!(key = %entry.key(), "Registering data source");
        self.registry
            .insert(entry.key().clone(), Arc::clone(entry.data_source()));
    }

    /// Append a strategy. `None` is ignored.
    pub fn register_strategy(&self, strategy: impl Into<Option<Arc<dyn RoutingStrategy>>>) {
        let Some(strategy) = strategy.into() else {
            return;
        };
        self.strategies.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(Arc::clone(&strategy));
            next
        });
    }

    /// Resolve the data source for `ctx`.
    pub fn resolve(&self, ctx: &RoutingContext<'_>) -> DbResult<ResourceEntry> {
        let key = self.determine_key(ctx);

        if key.is_default() {
            if let Some(fallback) = &self.fallback {
                return Ok(ResourceEntry::new(key, Arc::clone(fallback)));
            }
        }

        let registered = self
            .registry
            .get(&key)
            .map(|slot| Arc::clone(slot.value()));

        match (registered, &self.fallback) {
            (Some(data_source), _) => Ok(ResourceEntry::new(key, data_source)),
            (None, Some(fallback)) => {
                debug!(key = %key, "No data source registered for key, using fallback");
                Ok(ResourceEntry::new(key, Arc::clone(fallback)))
            }
            (None, None) => Err(DbError::configuration(format!(
                "No suitable data source found for key '{}' and no fallback data source configured",
                key
            ))),
        }
    }

    fn determine_key(&self, ctx: &RoutingContext<'_>) -> ResourceKey {
        let strategies = self.strategies.load();
        strategies
            .iter()
            .find_map(|strategy| strategy.route(ctx))
            .or_else(|| {
                self.default_strategy
                    .as_ref()
                    .and_then(|strategy| strategy.route(ctx))
            })
            .unwrap_or(ResourceKey::DEFAULT)
    }

    /// Registered entry for `key`, without fallback.
    pub fn entry(&self, key: &ResourceKey) -> Option<ResourceEntry> {
        self.registry
            .get(key)
            .map(|slot| ResourceEntry::new(key.clone(), Arc::clone(slot.value())))
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<ResourceKey> {
        let mut keys: Vec<_> = self.registry.iter().map(|slot| slot.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    pub fn strategy_count(&self) -> usize {
        self.strategies.load().len()
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    pub fn fallback(&self) -> Option<&Arc<dyn DataSource>> {
        self.fallback.as_ref()
    }
}

impl std::fmt::Debug for ResourceRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceRouter")
            .field("keys", &self.keys())
            .field("strategies", &self.strategy_count())
            .field("has_default_strategy", &self.default_strategy.is_some())
            .field("has_fallback", &self.has_fallback())
            .finish()
    }
}
