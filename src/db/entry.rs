//! Resolved data sources and the connections handed out for them.

use crate::db::connection::{Connection, DataSource};
use crate::models::ResourceKey;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// A data source together with the key it was resolved under.
#[derive(Debug, Clone)]
pub struct ResourceEntry {
    key: ResourceKey,
    data_source: Arc<dyn DataSource>,
}

impl ResourceEntry {
    pub fn new(key: impl Into<ResourceKey>, data_source: Arc<dyn DataSource>) -> Self {
        Self {
            key: key.into(),
            data_source,
        }
    }

    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    pub fn data_source(&self) -> &Arc<dyn DataSource> {
        &self.data_source
    }

    /// Whether this entry points at exactly `data_source`.
    pub fn uses(&self, data_source: &Arc<dyn DataSource>) -> bool {
        Arc::ptr_eq(&self.data_source, data_source)
    }
}

impl PartialEq for ResourceEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && Arc::ptr_eq(&self.data_source, &other.data_source)
    }
}

impl Eq for ResourceEntry {}

/// Where an envelope's connection came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionOrigin {
    /// Opened through the entry's data source and closed by the director.
    DataSource,
    /// Bound to an external transaction manager that leaves the transaction
    /// boundaries to the director. Released back to the manager.
    Bound,
    /// Owned by an external transaction manager, boundaries included.
    Managed,
}

/// A connection bound to the entry it came from.
///
/// Envelopes are exclusively owned by the caller that acquired them. The
/// origin is fixed at creation.
pub struct ConnectionEnvelope {
    id: String,
    entry: ResourceEntry,
    connection: Box<dyn Connection>,
    origin: ConnectionOrigin,
    acquired_at: DateTime<Utc>,
}

impl ConnectionEnvelope {
    pub fn new(entry: ResourceEntry, connection: Box<dyn Connection>) -> Self {
        Self::with_origin(entry, connection, ConnectionOrigin::DataSource)
    }

    /// Envelope for a connection owned by an external transaction manager.
    pub fn externally_managed(entry: ResourceEntry, connection: Box<dyn Connection>) -> Self {
        Self::with_origin(entry, connection, ConnectionOrigin::Managed)
    }

    pub fn with_origin(
        entry: ResourceEntry,
        connection: Box<dyn Connection>,
        origin: ConnectionOrigin,
    ) -> Self {
        Self {
            id: generate_connection_id(),
            entry,
            connection,
            origin,
            acquired_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn entry(&self) -> &ResourceEntry {
        &self.entry
    }

    pub fn key(&self) -> &ResourceKey {
        self.entry.key()
    }

    pub fn connection(&self) -> &dyn Connection {
        self.connection.as_ref()
    }

    pub fn connection_mut(&mut self) -> &mut dyn Connection {
        self.connection.as_mut()
    }

    pub fn origin(&self) -> ConnectionOrigin {
        self.origin
    }

    /// Transaction boundaries belong to an external manager.
    pub fn is_externally_managed(&self) -> bool {
        self.origin == ConnectionOrigin::Managed
    }

    /// The connection must be handed back to an external manager on release.
    pub fn is_from_manager(&self) -> bool {
        self.origin != ConnectionOrigin::DataSource
    }

    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }

    pub fn is_open(&self) -> bool {
        self.connection.is_open()
    }

    /// The underlying connection as its concrete type.
    ///
    /// ```ignore
    /// let sqlx = envelope.downcast_mut::<SqlxConnection>().unwrap();
    /// sqlx.execute("INSERT INTO audit VALUES (1)")?;
    /// ```
    pub fn downcast_mut<T: Connection + 'static>(&mut self) -> Option<&mut T> {
        self.connection.as_any_mut().downcast_mut::<T>()
    }
}

impl std::fmt::Debug for ConnectionEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionEnvelope")
            .field("id", &self.id)
            .field("key", self.entry.key())
            .field("origin", &self.origin)
            .field("acquired_at", &self.acquired_at)
            .field("open", &self.connection.is_open())
            .finish_non_exhaustive()
    }
}

fn generate_connection_id() -> String {
    format!("conn_{}", uuid::Uuid::new_v4().simple())
}
