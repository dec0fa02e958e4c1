//! Error types for the SQL director.
//!
//! This module defines all error types using `thiserror`. Errors fall into
//! configuration problems, persistence (driver / I/O) failures and failures at
//! transaction boundaries.

use thiserror::Error;

/// Error reported by a data source or connection implementation.
///
/// Drivers are free to return any error type; the coordinator wraps it into a
/// [`DbError`] naming the failing operation.
pub type DriverError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type returned by data source and connection implementations.
pub type DriverResult<T> = Result<T, DriverError>;

#[derive(Error, Debug)]
pub enum DbError {
    /// Routing cannot determine a data source, or the director was set up incorrectly.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Obtaining, inspecting or closing a connection failed.
    #[error("Persistence error: {message}")]
    Persistence {
        message: String,
        #[source]
        source: Option<DriverError>,
    },

    /// Isolation / autocommit configuration or begin/commit/rollback failed.
    #[error("Transaction error: {message}")]
    Transaction {
        message: String,
        #[source]
        source: Option<DriverError>,
    },
}

impl DbError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a persistence error, appending the cause to the message when present.
    pub fn persistence(message: impl Into<String>, cause: impl Into<Option<DriverError>>) -> Self {
        let (message, source) = with_cause(message.into(), cause.into());
        Self::Persistence { message, source }
    }

    /// Create a transaction error, appending the cause to the message when present.
    pub fn transaction(message: impl Into<String>, cause: impl Into<Option<DriverError>>) -> Self {
        let (message, source) = with_cause(message.into(), cause.into());
        Self::Transaction { message, source }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence { .. })
    }

    pub fn is_transaction(&self) -> bool {
        matches!(self, Self::Transaction { .. })
    }
}

fn with_cause(message: String, cause: Option<DriverError>) -> (String, Option<DriverError>) {
    match cause {
        Some(cause) => (format!("{}. Cause: {}", message, cause), Some(cause)),
        None => (message, None),
    }
}

/// Convert sqlx errors to DbError.
///
/// Everything sqlx reports is a driver-level failure; transaction-boundary
/// errors are classified by the caller that knows which operation failed.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        let message = match &err {
            sqlx::Error::Configuration(_) => "Invalid connection configuration",
            sqlx::Error::Database(_) => "Database error",
            sqlx::Error::PoolTimedOut => "Timed out acquiring a pooled connection",
            sqlx::Error::PoolClosed => "Connection pool is closed",
            sqlx::Error::Io(_) => "I/O error",
            sqlx::Error::Tls(_) => "TLS error",
            sqlx::Error::Protocol(_) => "Protocol error",
            sqlx::Error::WorkerCrashed => "Database worker crashed",
            _ => "Driver error",
        };
        DbError::persistence(message, Some(Box::new(err) as DriverError))
    }
}

/// Result type alias for director operations.
pub type DbResult<T> = Result<T, DbError>;
