//! Database configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{DatabaseError, DatabaseResult};
use crate::transaction::TransactionBehavior;

/// Database configuration options.
///
/// Deserializable so it can sit inside an application's own config file;
/// missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the SQLite file. `None` means a private in-memory database.
    pub path: Option<PathBuf>,
    /// Create the file if it doesn't exist.
    pub create_if_missing: bool,
    /// Upper bound on open connections.
    pub max_connections: usize,
    /// How long to wait for a free connection, in milliseconds.
    pub acquire_timeout_ms: u64,
    /// SQLite busy timeout per connection, in milliseconds.
    pub busy_timeout_ms: u64,
    /// How transactions begin.
    pub behavior: TransactionBehavior,
    /// Worker threads of an owned task pool.
    pub worker_threads: usize,
    /// Put file databases in write-ahead-log mode.
    pub wal: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: Some(PathBuf::from("dbm.sqlite3")),
            create_if_missing: true,
            max_connections: 8,
            acquire_timeout_ms: 30_000,
            busy_timeout_ms: 5_000,
            behavior: TransactionBehavior::default(),
            worker_threads: 4,
            wal: true,
        }
    }
}

impl DatabaseConfig {
    /// Create a new configuration for the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Default::default()
        }
    }

    /// Configuration for an in-memory database.
    ///
    /// An in-memory database lives inside a single connection, so the pool
    /// never grows beyond one.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            max_connections: 1,
            wal: false,
            ..Default::default()
        }
    }

    /// Point the configuration at a file.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set create_if_missing flag.
    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Set the connection limit.
    pub fn max_connections(mut self, value: usize) -> Self {
        self.max_connections = value;
        self
    }

    /// Set the connection acquire timeout.
    pub fn acquire_timeout(mut self, value: Duration) -> Self {
        self.acquire_timeout_ms = value.as_millis() as u64;
        self
    }

    /// Set the SQLite busy timeout.
    pub fn busy_timeout(mut self, value: Duration) -> Self {
        self.busy_timeout_ms = value.as_millis() as u64;
        self
    }

    /// Set the transaction begin behaviour.
    pub fn behavior(mut self, value: TransactionBehavior) -> Self {
        self.behavior = value;
        self
    }

    /// Set the worker thread count of an owned task pool.
    pub fn worker_threads(mut self, value: usize) -> Self {
        self.worker_threads = value;
        self
    }

    /// Set the WAL flag.
    pub fn wal(mut self, value: bool) -> Self {
        self.wal = value;
        self
    }

    /// The database file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_in_memory(&self) -> bool {
        self.path.is_none()
    }

    pub fn acquire_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn busy_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Connection limit after accounting for in-memory databases.
    pub fn connection_limit(&self) -> usize {
        if self.is_in_memory() {
            1
        } else {
            self.max_connections
        }
    }

    /// Check the configuration for values the backend cannot work with.
    pub fn validate(&self) -> DatabaseResult<()> {
        if self.max_connections == 0 {
            return Err(DatabaseError::InvalidConfig(
                "max_connections must be at least 1".into(),
            ));
        }
        if self.worker_threads == 0 {
            return Err(DatabaseError::InvalidConfig(
                "worker_threads must be at least 1".into(),
            ));
        }
        if let Some(path) = &self.path {
            if path.as_os_str().is_empty() {
                return Err(DatabaseError::InvalidConfig("path is empty".into()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = DatabaseConfig::new("/tmp/test.db")
            .max_connections(2)
            .acquire_timeout(Duration::from_millis(250))
            .behavior(TransactionBehavior::Deferred)
            .wal(false);

        assert_eq!(config.path(), Some(Path::new("/tmp/test.db")));
        assert_eq!(config.connection_limit(), 2);
        assert_eq!(config.acquire_timeout_duration(), Duration::from_millis(250));
        assert_eq!(config.behavior, TransactionBehavior::Deferred);
        assert!(!config.wal);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_in_memory_limits_pool() {
        let config = DatabaseConfig::in_memory().max_connections(16);
        assert!(config.is_in_memory());
        assert_eq!(config.connection_limit(), 1);
    }

    #[test]
    fn test_validate_rejects_zero() {
        assert!(matches!(
            DatabaseConfig::in_memory().max_connections(0).validate(),
            Err(DatabaseError::InvalidConfig(_))
        ));
        assert!(matches!(
            DatabaseConfig::in_memory().worker_threads(0).validate(),
            Err(DatabaseError::InvalidConfig(_))
        ));
        assert!(DatabaseConfig::new("").validate().is_err());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: DatabaseConfig =
            serde_json::from_str(r#"{"path": "app.db", "max_connections": 3, "behavior": "exclusive"}"#)
                .unwrap();

        assert_eq!(config.path(), Some(Path::new("app.db")));
        assert_eq!(config.max_connections, 3);
        assert_eq!(config.behavior, TransactionBehavior::Exclusive);
        assert_eq!(config.busy_timeout_ms, DatabaseConfig::default().busy_timeout_ms);
    }
}
