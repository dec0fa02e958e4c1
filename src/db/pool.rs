//! sqlx-backed data sources.
//!
//! [`SqlxDataSource`] wraps a database-specific sqlx pool (MySqlPool, PgPool,
//! SqlitePool) and exposes it through the synchronous [`DataSource`] trait.
//! Async calls are driven on a tokio runtime handle with `block_on`, so these
//! types must be used from threads that are not running that runtime's tasks
//! (plain threads or `spawn_blocking`).
//!
//! [`SqlxConnection`] gives a pooled connection the usual driver autocommit
//! contract: switching autocommit off opens a transaction, commit and
//! rollback end it and immediately open the next one, and switching
//! autocommit back on commits whatever is pending.

use crate::config::DatabaseConfig;
use crate::db::connection::{Connection, DataSource};
use crate::error::{DbError, DbResult, DriverResult};
use crate::models::{DatabaseType, IsolationLevel};
use crate::{dispatch_connection, impl_db_dispatch};
use sqlx::pool::{PoolConnection, PoolOptions as SqlxPoolOptions};
use sqlx::{
    MySql, MySqlPool, PgPool, Postgres, Sqlite, SqlitePool, mysql::MySqlConnectOptions,
    postgres::PgConnectOptions, sqlite::SqliteConnectOptions,
};
use std::any::Any;
use std::str::FromStr;
use tokio::runtime::Handle;
use tracing::{debug, warn};

/// Database-specific connection pool (avoids AnyPool limitations).
#[derive(Debug, Clone)]
pub enum DbPool {
    MySql(MySqlPool),
    Postgres(PgPool),
    SQLite(SqlitePool),
}

impl DbPool {
    /// Close the connection pool.
    pub async fn close(&self) {
        impl_db_dispatch!(self, {
            MySql(pool) => pool.close().await,
            Postgres(pool) => pool.close().await,
            SQLite(pool) => pool.close().await,
        })
    }

    /// Get the database type for this pool.
    pub fn db_type(&self) -> DatabaseType {
        match self {
            DbPool::MySql(_) => DatabaseType::MySQL,
            DbPool::Postgres(_) => DatabaseType::PostgreSQL,
            DbPool::SQLite(_) => DatabaseType::SQLite,
        }
    }

    /// Check a connection out of the pool.
    pub async fn acquire(&self) -> Result<PooledConnection, sqlx::Error> {
        Ok(impl_db_dispatch!(self, {
            MySql(pool) => PooledConnection::MySql(pool.acquire().await?),
            Postgres(pool) => PooledConnection::Postgres(pool.acquire().await?),
            SQLite(pool) => PooledConnection::SQLite(pool.acquire().await?),
        }))
    }
}

/// A connection checked out of a [`DbPool`].
#[derive(Debug)]
pub enum PooledConnection {
    MySql(PoolConnection<MySql>),
    Postgres(PoolConnection<Postgres>),
    SQLite(PoolConnection<Sqlite>),
}

impl PooledConnection {
    pub fn db_type(&self) -> DatabaseType {
        match self {
            PooledConnection::MySql(_) => DatabaseType::MySQL,
            PooledConnection::Postgres(_) => DatabaseType::PostgreSQL,
            PooledConnection::SQLite(_) => DatabaseType::SQLite,
        }
    }
}

/// [`DataSource`] backed by a sqlx pool.
#[derive(Debug, Clone)]
pub struct SqlxDataSource {
    pool: DbPool,
    runtime: Handle,
}

impl SqlxDataSource {
    pub fn new(pool: DbPool, runtime: Handle) -> Self {
        Self { pool, runtime }
    }

    /// Create a lazily connecting pool for `config`.
    ///
    /// No connection is opened until the first `connect`.
    pub fn connect_lazy(config: &DatabaseConfig, runtime: Handle) -> DbResult<Self> {
        let url = config.connection_string.as_str();
        let invalid = |e: sqlx::Error| {
            DbError::configuration(format!("Invalid {} connection string: {}", config.db_type, e))
        };

        // Lazy pools spawn their maintenance tasks on the current runtime.
        let guard = runtime.enter();
        let pool = match config.db_type {
            DatabaseType::MySQL => {
                let options = MySqlConnectOptions::from_str(url)
                    .map_err(invalid)?
                    .charset("utf8mb4");
                DbPool::MySql(pool_options::<MySql>(config).connect_lazy_with(options))
            }
            DatabaseType::PostgreSQL => {
                let options = PgConnectOptions::from_str(url).map_err(invalid)?;
                DbPool::Postgres(pool_options::<Postgres>(config).connect_lazy_with(options))
            }
            DatabaseType::SQLite => {
                let options = SqliteConnectOptions::from_str(url)
                    .map_err(invalid)?
                    .create_if_missing(true);
                DbPool::SQLite(pool_options::<Sqlite>(config).connect_lazy_with(options))
            }
        };
        drop(guard);

        debug!(id = ?config.id, db_type = %config.db_type, "Created lazy connection pool");
        Ok(Self::new(pool, runtime))
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn db_type(&self) -> DatabaseType {
        self.pool.db_type()
    }

    /// Close the pool. Connections still checked out are closed when returned.
    pub fn close(&self) {
        self.runtime.block_on(self.pool.close());
    }
}

fn pool_options<DB: sqlx::Database>(config: &DatabaseConfig) -> SqlxPoolOptions<DB> {
    let opts = &config.pool_options;
    SqlxPoolOptions::<DB>::new()
        .min_connections(opts.min_connections())
        .max_connections(opts.max_connections_for(config.db_type))
        .acquire_timeout(opts.acquire_timeout())
        .idle_timeout(Some(opts.idle_timeout()))
        .test_before_acquire(opts.test_before_acquire())
}

impl DataSource for SqlxDataSource {
    fn connect(&self) -> DriverResult<Box<dyn Connection>> {
        let conn = self.runtime.block_on(self.pool.acquire())?;
        let connection = SqlxConnection::open(conn, self.runtime.clone())?;
        Ok(Box::new(connection))
    }
}

/// A pooled sqlx connection with driver-style autocommit handling.
///
/// Closing rolls back any open transaction and puts the session isolation
/// back to the level found at checkout before returning the connection to its
/// pool. A session that cannot be reset is detached from the pool instead.
pub struct SqlxConnection {
    conn: Option<PooledConnection>,
    db_type: DatabaseType,
    runtime: Handle,
    autocommit: bool,
    in_transaction: bool,
    isolation: IsolationLevel,
    /// Isolation the session had when it was checked out.
    session_isolation: IsolationLevel,
}

impl SqlxConnection {
    /// Wrap a checked-out connection, assuming the backend's stock isolation.
    pub fn new(conn: PooledConnection, runtime: Handle) -> Self {
        let db_type = conn.db_type();
        let isolation = db_type.default_isolation();
        Self {
            conn: Some(conn),
            db_type,
            runtime,
            autocommit: true,
            in_transaction: false,
            isolation,
            session_isolation: isolation,
        }
    }

    /// Wrap a checked-out connection and read its current isolation level.
    pub fn open(conn: PooledConnection, runtime: Handle) -> DbResult<Self> {
        let mut connection = Self::new(conn, runtime);
        let isolation = connection.read_session_isolation()?;
        connection.isolation = isolation;
        connection.session_isolation = isolation;
        Ok(connection)
    }

    pub fn db_type(&self) -> DatabaseType {
        self.db_type
    }

    /// Whether a transaction is currently open on the session.
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Execute one or more SQL statements, returning the rows affected.
    pub fn execute(&mut self, sql: &str) -> DbResult<u64> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| DbError::persistence("Connection is closed", None))?;
        let rows = self.runtime.block_on(async {
            dispatch_connection!(conn, c => {
                sqlx::raw_sql(sql).execute(&mut **c).await.map(|r| r.rows_affected())
            })
        })?;
        Ok(rows)
    }

    /// Run a query returning a single integer.
    pub fn query_scalar_i64(&mut self, sql: &str) -> DbResult<i64> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| DbError::persistence("Connection is closed", None))?;
        let value = self.runtime.block_on(async {
            dispatch_connection!(conn, c => {
                sqlx::query_scalar::<_, i64>(sql).fetch_one(&mut **c).await
            })
        })?;
        Ok(value)
    }

    fn fetch_text(&mut self, sql: &str) -> DbResult<String> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| DbError::persistence("Connection is closed", None))?;
        let value = self.runtime.block_on(async {
            dispatch_connection!(conn, c => {
                sqlx::query_scalar::<_, String>(sql).fetch_one(&mut **c).await
            })
        })?;
        Ok(value)
    }

    /// Ask the server which isolation level the session runs at.
    fn read_session_isolation(&mut self) -> DbResult<IsolationLevel> {
        let text = match self.db_type {
            DatabaseType::SQLite => {
                let read_uncommitted = self.query_scalar_i64("PRAGMA read_uncommitted")?;
                return Ok(if read_uncommitted != 0 {
                    IsolationLevel::ReadUncommitted
                } else {
                    IsolationLevel::Serializable
                });
            }
            DatabaseType::PostgreSQL => {
                self.fetch_text("SELECT current_setting('transaction_isolation')")?
            }
            // transaction_isolation replaced tx_isolation in MySQL 8 and MariaDB 11.1
            DatabaseType::MySQL => self
                .fetch_text("SELECT CAST(@@SESSION.transaction_isolation AS CHAR)")
                .or_else(|_| self.fetch_text("SELECT CAST(@@SESSION.tx_isolation AS CHAR)"))?,
        };
        text.parse().map_err(|e: String| {
            DbError::persistence(format!("Unrecognized session isolation level: {}", e), None)
        })
    }

    fn isolation_statement(&self, level: IsolationLevel) -> Option<String> {
        let keyword = level.to_sql()?;
        Some(match self.db_type {
            DatabaseType::MySQL => format!("SET SESSION TRANSACTION ISOLATION LEVEL {}", keyword),
            DatabaseType::PostgreSQL => format!(
                "SET SESSION CHARACTERISTICS AS TRANSACTION ISOLATION LEVEL {}",
                keyword
            ),
            DatabaseType::SQLite => format!(
                "PRAGMA read_uncommitted = {}",
                u8::from(level == IsolationLevel::ReadUncommitted)
            ),
        })
    }

    /// Hand `conn` back to its pool, or detach it when its session is dirty.
    fn return_to_pool(&self, conn: PooledConnection, reusable: bool) {
        // Returning a connection to its pool spawns onto the runtime.
        let _guard = self.runtime.enter();
        if reusable {
            drop(conn);
        } else {
            dispatch_connection!(conn, c => drop(c.detach()));
        }
    }

    fn require_transaction(&self, operation: &str) -> DriverResult<()> {
        if self.autocommit {
            return Err(format!("Cannot {} while autocommit is enabled", operation).into());
        }
        Ok(())
    }
}

impl Connection for SqlxConnection {
    fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    fn autocommit(&self) -> DriverResult<bool> {
        Ok(self.autocommit)
    }

    fn set_autocommit(&mut self, autocommit: bool) -> DriverResult<()> {
        if autocommit == self.autocommit {
            return Ok(());
        }
        if autocommit {
            if self.in_transaction {
                self.execute("COMMIT")?;
                self.in_transaction = false;
            }
        } else {
            self.execute("BEGIN")?;
            self.in_transaction = true;
        }
        self.autocommit = autocommit;
        Ok(())
    }

    fn isolation_level(&self) -> DriverResult<IsolationLevel> {
        Ok(self.isolation)
    }

    fn set_isolation_level(&mut self, level: IsolationLevel) -> DriverResult<()> {
        let Some(statement) = self.isolation_statement(level) else {
            return Ok(());
        };
        self.execute(&statement)?;
        self.isolation = level;
        Ok(())
    }

    fn commit(&mut self) -> DriverResult<()> {
        self.require_transaction("commit")?;
        self.execute("COMMIT")?;
        self.in_transaction = false;
        self.execute("BEGIN")?;
        self.in_transaction = true;
        Ok(())
    }

    fn rollback(&mut self) -> DriverResult<()> {
        self.require_transaction("roll back")?;
        self.execute("ROLLBACK")?;
        self.in_transaction = false;
        self.execute("BEGIN")?;
        self.in_transaction = true;
        Ok(())
    }

    fn close(&mut self) -> DriverResult<()> {
        if self.conn.is_none() {
            return Ok(());
        }

        let mut result = Ok(());
        if self.in_transaction {
            match self.execute("ROLLBACK") {
                Ok(_) => self.in_transaction = false,
                Err(e) => result = Err(e),
            }
        }
        if result.is_ok() && self.isolation != self.session_isolation {
            if let Some(statement) = self.isolation_statement(self.session_isolation) {
                match self.execute(&statement) {
                    Ok(_) => self.isolation = self.session_isolation,
                    Err(e) => result = Err(e),
                }
            }
        }

        if let Some(conn) = self.conn.take() {
            self.return_to_pool(conn, result.is_ok());
        }
        Ok(result?)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Drop for SqlxConnection {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        let reusable = !self.in_transaction && self.isolation == self.session_isolation;
        if !reusable {
            // The pool would hand the next caller an open transaction or a changed session.
            warn!(db_type = %self.db_type, "Connection dropped without close; discarding it");
        }
        self.return_to_pool(conn, reusable);
    }
}

impl std::fmt::Debug for SqlxConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlxConnection")
            .field("db_type", &self.db_type)
            .field("open", &self.conn.is_some())
            .field("autocommit", &self.autocommit)
            .field("in_transaction", &self.in_transaction)
            .field("isolation", &self.isolation)
            .field("session_isolation", &self.session_isolation)
            .finish()
    }
}
