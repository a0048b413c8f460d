//! dbm - transactional units of work over SQLite
//!
//! This crate runs closures inside database transactions. A unit of work
//! gets a transaction context, does its reads and writes, and returns a
//! value; the transaction commits if it returned `Ok` and rolls back
//! otherwise. Units of work can run on the calling thread or be submitted
//! to a task pool and awaited later.
//!
//! # Example
//!
//! ```no_run
//! use dbm::{Database, DatabaseConfig, DatabaseError};
//!
//! let db = Database::open(DatabaseConfig::new("./app.sqlite3")).unwrap();
//!
//! db.run(|tx| {
//!     tx.execute("CREATE TABLE IF NOT EXISTS users (id INTEGER PRIMARY KEY, name TEXT)", [])?;
//!     tx.execute("INSERT INTO users (name) VALUES (?1)", ["Alice"])?;
//!     Ok::<_, DatabaseError>(())
//! })
//! .unwrap();
//!
//! let count: i64 = db
//!     .call_dsl(|dsl| dsl.count("users"))
//!     .unwrap();
//!
//! let pending = db.call_async(|tx| {
//!     let name: String = tx.query_row("SELECT name FROM users LIMIT 1", [], |r| r.get(0))?;
//!     Ok::<_, DatabaseError>(name)
//! });
//! let name = pending.wait().unwrap();
//! ```

pub mod db;
pub mod dsl;
pub mod interface;
pub mod sql;
pub mod transaction;

pub use db::{Database, DatabaseConfig, DatabaseError, DatabaseResult, SqliteBackend};
pub use dsl::{Dsl, QueryResult, ResultSet, Row};
pub use interface::{Backend, DatabaseInterface, QueryHandle, TaskPool};
pub use transaction::{TransactionBehavior, TxContext};
