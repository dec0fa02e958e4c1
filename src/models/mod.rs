//! Data models shared across the crate.

pub mod connection;
pub mod routing;

pub use connection::{DatabaseType, IsolationLevel};
pub use routing::{ResourceKey, RoutingContext};
