//! SQL director library.
//!
//! Routes database work to one of several interchangeable data sources and
//! manages the transactional lifecycle of the connections it hands out.
//! Drivers plug in through the [`db::DataSource`] and [`db::Connection`]
//! traits; a sqlx-backed implementation for SQLite, PostgreSQL and MySQL is
//! included.

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod models;

pub use config::Config;
pub use db::{ConnectionEnvelope, Coordinator, CoordinatorBuilder, ResourceEntry};
pub use error::{DbError, DbResult};
pub use models::{IsolationLevel, ResourceKey, RoutingContext};
