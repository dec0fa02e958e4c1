//! Connection-related data models.
//!
//! This module defines the database backends understood by the sqlx data
//! source and the transaction isolation levels the director can enforce.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Supported database types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    PostgreSQL,
    /// Includes MariaDB
    MySQL,
    SQLite,
}

impl DatabaseType {
    /// Parse database type from a connection string.
    pub fn from_connection_string(connection_string: &str) -> Option<Self> {
        let lower = connection_string.to_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Some(Self::PostgreSQL)
        } else if lower.starts_with("mysql://") || lower.starts_with("mariadb://") {
            Some(Self::MySQL)
        } else if lower.starts_with("sqlite://") || lower.starts_with("sqlite:") {
            Some(Self::SQLite)
        } else {
            None
        }
    }

    /// Get the display name for this database type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
        }
    }

    /// Isolation level a fresh session of this backend runs at.
    pub fn default_isolation(&self) -> IsolationLevel {
        match self {
            Self::PostgreSQL => IsolationLevel::ReadCommitted,
            Self::MySQL => IsolationLevel::RepeatableRead,
            Self::SQLite => IsolationLevel::Serializable,
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Transaction isolation levels.
///
/// Each level maps 1:1 onto the standard SQL isolation constants (the values
/// JDBC and ODBC drivers agree on). `None` means "leave the connection as the
/// data source configured it" and is never applied to a connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IsolationLevel {
    #[default]
    None,
    /// Dirty reads possible
    ReadUncommitted,
    /// No dirty reads (PostgreSQL default)
    ReadCommitted,
    /// No non-repeatable reads (MySQL default)
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// Standard numeric isolation constant.
    pub fn level(&self) -> i32 {
        match self {
            Self::None => 0,
            Self::ReadUncommitted => 1,
            Self::ReadCommitted => 2,
            Self::RepeatableRead => 4,
            Self::Serializable => 8,
        }
    }

    /// Look up a level by its numeric constant.
    pub fn from_level(level: i32) -> Option<Self> {
        match level {
            0 => Some(Self::None),
            1 => Some(Self::ReadUncommitted),
            2 => Some(Self::ReadCommitted),
            4 => Some(Self::RepeatableRead),
            8 => Some(Self::Serializable),
            _ => None,
        }
    }

    /// SQL keyword form used in `SET TRANSACTION ISOLATION LEVEL`.
    ///
    /// Returns `None` for [`IsolationLevel::None`].
    pub fn to_sql(&self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::ReadUncommitted => Some("READ UNCOMMITTED"),
            Self::ReadCommitted => Some("READ COMMITTED"),
            Self::RepeatableRead => Some("REPEATABLE READ"),
            Self::Serializable => Some("SERIALIZABLE"),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl std::fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::ReadUncommitted => write!(f, "read-uncommitted"),
            Self::ReadCommitted => write!(f, "read-committed"),
            Self::RepeatableRead => write!(f, "repeatable-read"),
            Self::Serializable => write!(f, "serializable"),
        }
    }
}

impl FromStr for IsolationLevel {
    type Err = String;

    /// Accepts kebab, snake or SQL spelling, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        match normalized.as_str() {
            "none" => Ok(Self::None),
            "read-uncommitted" => Ok(Self::ReadUncommitted),
            "read-committed" => Ok(Self::ReadCommitted),
            "repeatable-read" => Ok(Self::RepeatableRead),
            "serializable" => Ok(Self::Serializable),
            _ => Err(format!(
                "Unknown isolation level '{}'. Expected one of: none, read-uncommitted, read-committed, repeatable-read, serializable",
                s
            )),
        }
    }
}
