//! Database error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::sql::ParseError;

/// Result type for database operations.
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Errors raised by the database engine, the connection pool or the task pool.
///
/// Errors produced by a unit of work are never wrapped in this type; they
/// reach the caller unchanged.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Error from SQLite.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// No connection became available before the acquire timeout.
    #[error("timed out after {waited_ms}ms waiting for one of {max_connections} connections")]
    PoolTimeout {
        waited_ms: u64,
        max_connections: usize,
    },

    /// Units of work may not open or close transactions themselves.
    #[error("transaction control is not allowed inside a unit of work: {0}")]
    TransactionControl(String),

    /// The asynchronous task ended without producing a result, usually
    /// because the unit of work panicked.
    #[error("task {0} ended without a result")]
    TaskAborted(String),

    #[error("database not found: {0}")]
    NotFound(PathBuf),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
