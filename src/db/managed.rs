//! Lifecycle that cooperates with an external transaction manager.

use crate::db::connection::TransactionSynchronization;
use crate::db::entry::{ConnectionEnvelope, ConnectionOrigin, ResourceEntry};
use crate::db::lifecycle::{Lifecycle, StandardLifecycle, TransactionPolicy};
use crate::error::{DbError, DbResult};
use std::sync::Arc;
use tracing::debug;

/// Lifecycle used when connections may be owned by a [`TransactionSynchronization`].
///
/// A connection the manager confirms as managed is wrapped in an externally
/// managed envelope: no isolation or autocommit policy is applied and the
/// transaction boundaries are left to the manager. A bound connection the
/// manager does not manage gets the standard policy and boundaries. Either
/// way release hands the connection back to the manager instead of closing
/// it. Connections opened through the data source behave as under
/// [`StandardLifecycle`].
#[derive(Debug, Clone)]
pub struct ManagedLifecycle {
    synchronization: Arc<dyn TransactionSynchronization>,
    standard: StandardLifecycle,
}

impl ManagedLifecycle {
    pub fn new(synchronization: Arc<dyn TransactionSynchronization>) -> Self {
        Self {
            synchronization,
            standard: StandardLifecycle::new(),
        }
    }

    pub fn synchronization(&self) -> &Arc<dyn TransactionSynchronization> {
        &self.synchronization
    }

    fn hand_back(&self, envelope: &mut ConnectionEnvelope) -> DbResult<()> {
        let entry = envelope.entry().clone();
        self.synchronization
            .release_managed_connection(envelope.connection_mut(), &entry)
            .map_err(|e| DbError::persistence("Error releasing managed connection", e))?;
        debug!(connection_id = %envelope.id(), "Returned connection to transaction manager");
        Ok(())
    }
}

impl Lifecycle for ManagedLifecycle {
    fn acquire(
        &self,
        entry: ResourceEntry,
        policy: &TransactionPolicy,
    ) -> DbResult<ConnectionEnvelope> {
        let bound = self
            .synchronization
            .managed_connection(&entry)
            .map_err(|e| DbError::persistence("Error getting managed connection", e))?;

        let Some(connection) = bound else {
            return self.standard.acquire(entry, policy);
        };

        if self.synchronization.is_managed(connection.as_ref(), &entry) {
            let envelope = ConnectionEnvelope::externally_managed(entry, connection);
            debug!(
                connection_id = %envelope.id(),
                key = %envelope.key(),
                "Acquired externally managed connection"
            );
            return Ok(envelope);
        }

        let envelope = ConnectionEnvelope::with_origin(entry, connection, ConnectionOrigin::Bound);
        self.standard.apply_policy(envelope, policy)
    }

    fn release(&self, envelope: &mut ConnectionEnvelope) -> DbResult<()> {
        if !envelope.is_from_manager() {
            return self.standard.release(envelope);
        }
        if !envelope.is_externally_managed() {
            self.standard.restore_autocommit(envelope);
        }
        self.hand_back(envelope)
    }

    fn discard(&self, envelope: &mut ConnectionEnvelope) -> DbResult<()> {
        if !envelope.is_from_manager() {
            return self.standard.discard(envelope);
        }
        self.hand_back(envelope)
    }

    fn begin(&self, envelope: &mut ConnectionEnvelope) -> DbResult<()> {
        if envelope.is_externally_managed() {
            debug!(connection_id = %envelope.id(), "Skipping begin on managed connection");
            return Ok(());
        }
        self.standard.begin(envelope)
    }

    fn commit(&self, envelope: &mut ConnectionEnvelope) -> DbResult<()> {
        if envelope.is_externally_managed() {
            debug!(connection_id = %envelope.id(), "Skipping commit on managed connection");
            return Ok(());
        }
        self.standard.commit(envelope)
    }

    fn rollback(&self, envelope: &mut ConnectionEnvelope) -> DbResult<()> {
        if envelope.is_externally_managed() {
            debug!(connection_id = %envelope.id(), "Skipping rollback on managed connection");
            return Ok(());
        }
        self.standard.rollback(envelope)
    }
}
