//! Capability traits consumed by the director.
//!
//! The director never talks to a database driver directly. It sees a data
//! source only through [`DataSource`], a live session only through
//! [`Connection`], and an external transaction manager only through
//! [`TransactionSynchronization`].

use crate::db::entry::ResourceEntry;
use crate::error::DriverResult;
use crate::models::IsolationLevel;
use std::any::Any;
use std::fmt::Debug;

/// Something that hands out connections.
pub trait DataSource: Send + Sync + Debug {
    /// Obtain a new connection.
    fn connect(&self) -> DriverResult<Box<dyn Connection>>;
}

/// A live database session.
///
/// Autocommit semantics follow the usual driver contract: while autocommit is
/// on every statement commits on its own, and `commit`/`rollback` are only
/// meaningful once it has been switched off.
pub trait Connection: Send {
    /// Whether the session can still be used.
    fn is_open(&self) -> bool;

    fn autocommit(&self) -> DriverResult<bool>;

    fn set_autocommit(&mut self, autocommit: bool) -> DriverResult<()>;

    fn isolation_level(&self) -> DriverResult<IsolationLevel>;

    fn set_isolation_level(&mut self, level: IsolationLevel) -> DriverResult<()>;

    fn commit(&mut self) -> DriverResult<()>;

    fn rollback(&mut self) -> DriverResult<()>;

    /// Close the session. Closing twice must be harmless.
    fn close(&mut self) -> DriverResult<()>;

    /// Access to the concrete type, for callers that need driver specifics.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// An external transaction manager that may already own a connection for a
/// data source (for example one bound to the current unit of work).
pub trait TransactionSynchronization: Send + Sync + Debug {
    /// Connection bound to the current unit of work for `entry`, if any.
    fn managed_connection(&self, entry: &ResourceEntry)
    -> DriverResult<Option<Box<dyn Connection>>>;

    /// Hand a managed connection back to the manager.
    fn release_managed_connection(
        &self,
        connection: &mut dyn Connection,
        entry: &ResourceEntry,
    ) -> DriverResult<()>;

    /// Whether the manager owns the transactional boundaries of `connection`.
    fn is_managed(&self, connection: &dyn Connection, entry: &ResourceEntry) -> bool;
}
