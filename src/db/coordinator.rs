//! The coordinator: routing plus lifecycle behind one entry point.
//!
//! ```ignore
//! let coordinator = Coordinator::builder()
//!     .fallback(primary)
//!     .data_source("reports", replica)
//!     .strategy_fn(|ctx| ctx.sql().filter(|s| s.starts_with("SELECT")).map(|_| "reports".into()))
//!     .isolation_level(IsolationLevel::ReadCommitted)
//!     .build()?;
//!
//! let mut conn = coordinator.acquire(&RoutingContext::new().with_sql(sql))?;
//! coordinator.begin(&mut conn)?;
//! // ... use conn ...
//! coordinator.commit(&mut conn)?;
//! coordinator.release(&mut conn)?;
//! ```

use crate::db::connection::{DataSource, TransactionSynchronization};
use crate::db::entry::{ConnectionEnvelope, ResourceEntry};
use crate::db::lifecycle::{Lifecycle, StandardLifecycle, TransactionPolicy};
use crate::db::managed::ManagedLifecycle;
use crate::db::router::{ResourceRouter, RoutingStrategy};
use crate::error::{DbError, DbResult};
use crate::models::{IsolationLevel, ResourceKey, RoutingContext};
use std::any::Any;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Routes execution contexts to data sources and manages the connections
/// handed out for them.
///
/// Immutable once built, apart from registrations made through
/// [`Coordinator::router`]. Safe to share across threads.
#[derive(Debug)]
pub struct Coordinator {
    router: ResourceRouter,
    policy: TransactionPolicy,
    lifecycle: Arc<dyn Lifecycle>,
}

impl Coordinator {
    pub fn builder() -> CoordinatorBuilder {
        CoordinatorBuilder::default()
    }

    pub fn router(&self) -> &ResourceRouter {
        &self.router
    }

    pub fn policy(&self) -> &TransactionPolicy {
        &self.policy
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.policy.isolation
    }

    pub fn desired_autocommit(&self) -> bool {
        self.policy.desired_autocommit
    }

    pub fn lifecycle(&self) -> &Arc<dyn Lifecycle> {
        &self.lifecycle
    }

    /// Resolve the data source for `ctx` without opening a connection.
    pub fn acquire_resource(&self, ctx: &RoutingContext<'_>) -> DbResult<ResourceEntry> {
        let entry = self.router.resolve(ctx)?;
        debug!(key = %entry.key(), "Resolved data source");
        Ok(entry)
    }

    /// Acquire a configured connection for `ctx`.
    pub fn acquire(&self, ctx: &RoutingContext<'_>) -> DbResult<ConnectionEnvelope> {
        let entry = self.acquire_resource(ctx)?;
        self.lifecycle.acquire(entry, &self.policy)
    }

    /// Acquire with an empty context.
    pub fn acquire_default(&self) -> DbResult<ConnectionEnvelope> {
        self.acquire(&RoutingContext::new())
    }

    /// Acquire with `data` as the only routing input.
    pub fn acquire_for<T: Any + Send + Sync>(&self, data: &T) -> DbResult<ConnectionEnvelope> {
        self.acquire(&RoutingContext::with_data(data))
    }

    pub fn release(&self, envelope: &mut ConnectionEnvelope) -> DbResult<()> {
        self.lifecycle.release(envelope)
    }

    pub fn begin(&self, envelope: &mut ConnectionEnvelope) -> DbResult<()> {
        self.lifecycle.begin(envelope)
    }

    pub fn commit(&self, envelope: &mut ConnectionEnvelope) -> DbResult<()> {
        self.lifecycle.commit(envelope)
    }

    pub fn rollback(&self, envelope: &mut ConnectionEnvelope) -> DbResult<()> {
        self.lifecycle.rollback(envelope)
    }

    /// Like [`Coordinator::release`], but logs failures and reports success as a bool.
    pub fn release_safely(&self, envelope: &mut ConnectionEnvelope) -> bool {
        match self.release(envelope) {
            Ok(()) => true,
            Err(e) => {
                error!(connection_id = %envelope.id(), error = %e, "Failed to release connection");
                false
            }
        }
    }

    pub fn begin_safely(&self, envelope: &mut ConnectionEnvelope) -> bool {
        match self.begin(envelope) {
            Ok(()) => true,
            Err(e) => {
                error!(connection_id = %envelope.id(), error = %e, "Failed to begin transaction");
                false
            }
        }
    }

    pub fn commit_safely(&self, envelope: &mut ConnectionEnvelope) -> bool {
        match self.commit(envelope) {
            Ok(()) => true,
            Err(e) => {
                error!(connection_id = %envelope.id(), error = %e, "Failed to commit transaction");
                false
            }
        }
    }

    pub fn rollback_safely(&self, envelope: &mut ConnectionEnvelope) -> bool {
        match self.rollback(envelope) {
            Ok(()) => true,
            Err(e) => {
                error!(connection_id = %envelope.id(), error = %e, "Failed to roll back transaction");
                false
            }
        }
    }

    /// Run `f` inside a transaction on a connection acquired for `ctx`.
    ///
    /// Commits when `f` succeeds and rolls back when it fails. The connection
    /// is released either way, or discarded if the rollback fails. Cleanup
    /// failures on the error path are logged and the first error is returned.
    pub fn with_transaction<T, E, F>(&self, ctx: &RoutingContext<'_>, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut ConnectionEnvelope) -> Result<T, E>,
        E: From<DbError>,
    {
        let mut envelope = self.acquire(ctx)?;

        if let Err(e) = self.begin(&mut envelope) {
            self.release_safely(&mut envelope);
            return Err(e.into());
        }

        match f(&mut envelope) {
            Ok(value) => {
                if let Err(e) = self.commit(&mut envelope) {
                    self.abandon(&mut envelope);
                    return Err(e.into());
                }
                self.release(&mut envelope)?;
                Ok(value)
            }
            Err(e) => {
                self.abandon(&mut envelope);
                Err(e)
            }
        }
    }

    /// Roll back and release after a failure. When the rollback itself fails
    /// the connection is discarded, since restoring autocommit would commit.
    fn abandon(&self, envelope: &mut ConnectionEnvelope) {
        if self.rollback_safely(envelope) {
            self.release_safely(envelope);
        } else if let Err(e) = self.lifecycle.discard(envelope) {
            error!(connection_id = %envelope.id(), error = %e, "Failed to discard connection");
        }
    }
}

/// Builder for [`Coordinator`]. A fallback data source is required.
#[derive(Default)]
pub struct CoordinatorBuilder {
    fallback: Option<Arc<dyn DataSource>>,
    entries: Vec<ResourceEntry>,
    strategies: Vec<Arc<dyn RoutingStrategy>>,
    default_strategy: Option<Arc<dyn RoutingStrategy>>,
    policy: TransactionPolicy,
    synchronization: Option<Arc<dyn TransactionSynchronization>>,
    lifecycle: Option<Arc<dyn Lifecycle>>,
}

impl CoordinatorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Data source used for the DEFAULT key and for unregistered keys.
    pub fn fallback(mut self, data_source: Arc<dyn DataSource>) -> Self {
        self.fallback = Some(data_source);
        self
    }

    pub fn data_source(self, key: impl Into<ResourceKey>, data_source: Arc<dyn DataSource>) -> Self {
        self.entry(ResourceEntry::new(key, data_source))
    }

    /// Register an entry. `None` is ignored.
    pub fn entry(mut self, entry: impl Into<Option<ResourceEntry>>) -> Self {
        if let Some(entry) = entry.into() {
            self.entries.push(entry);
        }
        self
    }

    /// Append a routing strategy. Strategies are consulted in the order added.
    pub fn strategy<S: RoutingStrategy + 'static>(mut self, strategy: S) -> Self {
        self.strategies.push(Arc::new(strategy));
        self
    }

    /// Append a closure as a routing strategy.
    pub fn strategy_fn<F>(self, f: F) -> Self
    where
        F: Fn(&RoutingContext<'_>) -> Option<ResourceKey> + Send + Sync + 'static,
    {
        self.strategy(f)
    }

    /// Strategy consulted after all others abstain.
    pub fn default_strategy<S: RoutingStrategy + 'static>(mut self, strategy: S) -> Self {
        self.default_strategy = Some(Arc::new(strategy));
        self
    }

    pub fn default_strategy_fn<F>(self, f: F) -> Self
    where
        F: Fn(&RoutingContext<'_>) -> Option<ResourceKey> + Send + Sync + 'static,
    {
        self.default_strategy(f)
    }

    pub fn isolation_level(mut self, isolation: IsolationLevel) -> Self {
        self.policy.isolation = isolation;
        self
    }

    pub fn desired_autocommit(mut self, autocommit: bool) -> Self {
        self.policy.desired_autocommit = autocommit;
        self
    }

    /// Cooperate with an external transaction manager.
    pub fn synchronization(mut self, synchronization: Arc<dyn TransactionSynchronization>) -> Self {
        self.synchronization = Some(synchronization);
        self
    }

    /// Use a custom lifecycle. Takes precedence over [`CoordinatorBuilder::synchronization`].
    pub fn lifecycle(mut self, lifecycle: Arc<dyn Lifecycle>) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    pub fn build(self) -> DbResult<Coordinator> {
        let fallback = self
            .fallback
            .ok_or_else(|| DbError::configuration("No fallback data source is set"))?;

        let mut router = ResourceRouter::new(Some(fallback));
        if let Some(strategy) = self.default_strategy {
            router = router.with_default_strategy(strategy);
        }
        for entry in self.entries {
            router.register_entry(entry);
        }
        for strategy in self.strategies {
            router.register_strategy(strategy);
        }

        let lifecycle: Arc<dyn Lifecycle> = match (self.lifecycle, self.synchronization) {
            (Some(lifecycle), synchronization) => {
                if synchronization.is_some() {
                    warn!("Custom lifecycle configured; ignoring transaction synchronization");
                }
                lifecycle
            }
            (None, Some(synchronization)) => Arc::new(ManagedLifecycle::new(synchronization)),
            (None, None) => Arc::new(StandardLifecycle::new()),
        };

        info!(
            data_sources = router.len(),
            strategies = router.strategy_count(),
            isolation = %self.policy.isolation,
            autocommit = self.policy.desired_autocommit,
            "Coordinator built"
        );

        Ok(Coordinator {
            router,
            policy: self.policy,
            lifecycle,
        })
    }
}

impl std::fmt::Debug for CoordinatorBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinatorBuilder")
            .field("has_fallback", &self.fallback.is_some())
            .field("entries", &self.entries.len())
            .field("strategies", &self.strategies.len())
            .field("has_default_strategy", &self.default_strategy.is_some())
            .field("policy", &self.policy)
            .field("has_synchronization", &self.synchronization.is_some())
            .field("has_lifecycle", &self.lifecycle.is_some())
            .finish()
    }
}
