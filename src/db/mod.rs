//! The stock SQLite backend.
//!
//! This module provides the configuration, the connection pool and the
//! worker pool behind [`Database`], the ready-to-use façade.

mod backend;
mod config;
mod connection;
mod error;

pub use backend::{Database, SqliteBackend, WorkerPool};
pub use config::DatabaseConfig;
pub use connection::{ConnectionPool, PooledConnection};
pub use error::{DatabaseError, DatabaseResult};
