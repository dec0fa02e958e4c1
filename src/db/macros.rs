//! Backend dispatch macros for the sqlx data source.
//!
//! sqlx exposes one concrete pool and connection type per backend. These
//! macros expand a single body into one match arm per backend, so the same
//! code is written once and type-checked against every driver.

/// Dispatch over the variants of `DbPool`.
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(pool, {
///     MySql(p) => p.close().await,
///     Postgres(p) => p.close().await,
///     SQLite(p) => p.close().await,
/// });
/// ```
#[macro_export]
macro_rules! impl_db_dispatch {
    ($pool:expr, { $($variant:ident($p:ident) => $body:expr),+ $(,)? }) => {
        match $pool {
            $(
                $crate::db::pool::DbPool::$variant($p) => $body,
            )+
        }
    };
}

/// Run the same body against whichever backend a `PooledConnection` holds.
///
/// `$c` is bound to the backend's `PoolConnection` in every arm.
///
/// ```ignore
/// let rows = dispatch_connection!(conn, c => {
///     sqlx::raw_sql("DELETE FROM t").execute(&mut **c).await?.rows_affected()
/// });
/// ```
#[macro_export]
macro_rules! dispatch_connection {
    ($conn:expr, $c:ident => $body:expr) => {
        match $conn {
            $crate::db::pool::PooledConnection::MySql($c) => $body,
            $crate::db::pool::PooledConnection::Postgres($c) => $body,
            $crate::db::pool::PooledConnection::SQLite($c) => $body,
        }
    };
}

pub use dispatch_connection;
pub use impl_db_dispatch;
