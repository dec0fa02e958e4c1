//! Routing and connection lifecycle.
//!
//! - Capability traits for data sources, connections and external
//!   transaction managers
//! - Resource routing by ordered strategies with fallback
//! - Standard and externally managed connection lifecycles
//! - The coordinator and its builder
//! - A process-wide coordinator holder
//! - sqlx-backed data sources and their dispatch macros

pub mod connection;
pub mod coordinator;
pub mod entry;
pub mod holder;
pub mod lifecycle;
pub mod macros;
pub mod managed;
pub mod pool;
pub mod router;

pub use connection::{Connection, DataSource, TransactionSynchronization};
pub use coordinator::{Coordinator, CoordinatorBuilder};
pub use entry::{ConnectionEnvelope, ConnectionOrigin, ResourceEntry};
pub use holder::{clear_global, configure_global, global, set_global, try_global};
pub use lifecycle::{Lifecycle, StandardLifecycle, TransactionPolicy};
pub use managed::ManagedLifecycle;
pub use pool::{DbPool, PooledConnection, SqlxConnection, SqlxDataSource};
pub use router::{ResourceRouter, RoutingStrategy};
