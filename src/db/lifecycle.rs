//! Connection lifecycle: acquisition, transaction boundaries and release.
//!
//! A [`Lifecycle`] turns a resolved [`ResourceEntry`] into a configured
//! [`ConnectionEnvelope`] and drives it through
//! `acquire -> begin -> commit | rollback -> release`.
//! [`StandardLifecycle`] talks to the connection directly; the managed
//! variant in [`crate::db::managed`] defers to an external transaction
//! manager where one owns the connection.

use crate::db::entry::{ConnectionEnvelope, ResourceEntry};
use crate::error::{DbError, DbResult};
use crate::models::IsolationLevel;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Session settings applied to every freshly acquired connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionPolicy {
    /// `IsolationLevel::None` leaves the data source's setting untouched.
    pub isolation: IsolationLevel,
    pub desired_autocommit: bool,
}

impl Default for TransactionPolicy {
    fn default() -> Self {
        Self {
            isolation: IsolationLevel::None,
            desired_autocommit: true,
        }
    }
}

/// The lifecycle operations the coordinator delegates to.
pub trait Lifecycle: Send + Sync + std::fmt::Debug {
    /// Open a connection for `entry` and apply `policy` to it.
    fn acquire(
        &self,
        entry: ResourceEntry,
        policy: &TransactionPolicy,
    ) -> DbResult<ConnectionEnvelope>;

    /// Restore autocommit and close. Does nothing if already closed.
    fn release(&self, envelope: &mut ConnectionEnvelope) -> DbResult<()>;

    /// Close without restoring autocommit, dropping any uncommitted work.
    ///
    /// Used when a rollback failed and a regular release could commit.
    fn discard(&self, envelope: &mut ConnectionEnvelope) -> DbResult<()>;

    /// Switch autocommit off so statements run inside a transaction.
    fn begin(&self, envelope: &mut ConnectionEnvelope) -> DbResult<()>;

    fn commit(&self, envelope: &mut ConnectionEnvelope) -> DbResult<()>;

    fn rollback(&self, envelope: &mut ConnectionEnvelope) -> DbResult<()>;
}

/// Lifecycle that manages connections directly.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardLifecycle;

impl StandardLifecycle {
    pub fn new() -> Self {
        Self
    }

    /// Apply isolation and autocommit settings to a fresh envelope.
    ///
    /// On failure the connection is closed before the error is returned.
    pub fn apply_policy(
        &self,
        mut envelope: ConnectionEnvelope,
        policy: &TransactionPolicy,
    ) -> DbResult<ConnectionEnvelope> {
        if let Err(e) = configure(&mut envelope, policy) {
            if let Err(close_err) = envelope.connection_mut().close() {
                warn!(
                    connection_id = %envelope.id(),
                    error = %close_err,
                    "Failed to close connection after configuration error"
                );
            }
            return Err(e);
        }
        Ok(envelope)
    }

    /// Switch autocommit back on if the connection left it off. Failures are logged.
    pub fn restore_autocommit(&self, envelope: &mut ConnectionEnvelope) {
        let connection_id = envelope.id().to_string();
        let connection = envelope.connection_mut();
        match connection.autocommit() {
            Ok(true) => {}
            Ok(false) => {
                if let Err(e) = connection.set_autocommit(true) {
                    warn!(connection_id = %connection_id, error = %e, "Failed to restore autocommit");
                }
            }
            Err(e) => {
                warn!(connection_id = %connection_id, error = %e, "Failed to read autocommit mode");
            }
        }
    }
}

fn configure(envelope: &mut ConnectionEnvelope, policy: &TransactionPolicy) -> DbResult<()> {
    let connection = envelope.connection_mut();

    if !policy.isolation.is_none() {
        connection
            .set_isolation_level(policy.isolation)
            .map_err(|e| {
                DbError::transaction(
                    format!("Error setting isolation level to {}", policy.isolation),
                    e,
                )
            })?;
    }

    let autocommit = connection
        .autocommit()
        .map_err(|e| DbError::transaction("Error reading autocommit mode", e))?;
    if autocommit != policy.desired_autocommit {
        connection
            .set_autocommit(policy.desired_autocommit)
            .map_err(|e| DbError::transaction("Error configuring autocommit mode", e))?;
    }

    Ok(())
}

impl Lifecycle for StandardLifecycle {
    fn acquire(
        &self,
        entry: ResourceEntry,
        policy: &TransactionPolicy,
    ) -> DbResult<ConnectionEnvelope> {
        let connection = entry
            .data_source()
            .connect()
            .map_err(|e| DbError::persistence("Error getting connection", e))?;

        if !connection.is_open() {
            return Err(DbError::persistence(
                format!("Data source '{}' returned a closed connection", entry.key()),
                None,
            ));
        }

        let envelope = ConnectionEnvelope::new(entry, connection);
        debug!(
            connection_id = %envelope.id(),
            key = %envelope.key(),
            isolation = %policy.isolation,
            autocommit = policy.desired_autocommit,
            "Acquired connection"
        );
        self.apply_policy(envelope, policy)
    }

    fn release(&self, envelope: &mut ConnectionEnvelope) -> DbResult<()> {
        if !envelope.is_open() {
            return Ok(());
        }

        // Pools may hand the session to another caller; it must not stay in a transaction.
        self.restore_autocommit(envelope);

        envelope
            .connection_mut()
            .close()
            .map_err(|e| DbError::persistence("Error releasing connection", e))?;

        debug!(connection_id = %envelope.id(), "Released connection");
        Ok(())
    }

    fn discard(&self, envelope: &mut ConnectionEnvelope) -> DbResult<()> {
        if !envelope.is_open() {
            return Ok(());
        }
        envelope
            .connection_mut()
            .close()
            .map_err(|e| DbError::persistence("Error discarding connection", e))?;
        warn!(connection_id = %envelope.id(), "Discarded connection without committing");
        Ok(())
    }

    fn begin(&self, envelope: &mut ConnectionEnvelope) -> DbResult<()> {
        let connection = envelope.connection_mut();
        let autocommit = connection
            .autocommit()
            .map_err(|e| DbError::transaction("Error beginning transaction", e))?;
        if autocommit {
            connection
                .set_autocommit(false)
                .map_err(|e| DbError::transaction("Error beginning transaction", e))?;
            debug!(connection_id = %envelope.id(), "Transaction started");
        }
        Ok(())
    }

    fn commit(&self, envelope: &mut ConnectionEnvelope) -> DbResult<()> {
        let connection = envelope.connection_mut();
        let autocommit = connection
            .autocommit()
            .map_err(|e| DbError::transaction("Error committing transaction", e))?;
        if !autocommit {
            connection
                .commit()
                .map_err(|e| DbError::transaction("Error committing transaction", e))?;
            debug!(connection_id = %envelope.id(), "Transaction committed");
        }
        Ok(())
    }

    fn rollback(&self, envelope: &mut ConnectionEnvelope) -> DbResult<()> {
        let connection = envelope.connection_mut();
        let autocommit = connection
            .autocommit()
            .map_err(|e| DbError::transaction("Error rolling back transaction", e))?;
        if !autocommit {
            connection
                .rollback()
                .map_err(|e| DbError::transaction("Error rolling back transaction", e))?;
            debug!(connection_id = %envelope.id(), "Transaction rolled back");
        }
        Ok(())
    }
}
