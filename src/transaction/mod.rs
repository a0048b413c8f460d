//! Transaction management for dbm.
//!
//! Every unit of work runs inside exactly one SQLite transaction. The
//! [`TransactionManager`] opens it with the configured
//! [`TransactionBehavior`], hands the unit of work a [`TxContext`], and
//! commits or rolls back depending on the result.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   TransactionManager                        │
//! │     (begin / commit / rollback, tracks active tx ids)       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               ┌──────────────┴──────────────┐
//!               │                             │
//!               ▼                             ▼
//!        ┌─────────────┐               ┌─────────────┐
//!        │  TxContext  │               │  Behavior   │
//!        │ (unit of    │               │ (DEFERRED / │
//!        │  work view) │               │  IMMEDIATE) │
//!        └─────────────┘               └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use dbm::transaction::{TransactionBehavior, TransactionManager};
//!
//! let manager = TransactionManager::new();
//! let id = manager.with_transaction(&mut conn, TransactionBehavior::Immediate, |tx| {
//!     tx.execute("INSERT INTO users (name) VALUES ('Alice')", [])?;
//!     Ok::<_, dbm::DatabaseError>(tx.last_insert_rowid())
//! })?;
//! ```

mod behavior;
mod context;
mod manager;

pub use behavior::TransactionBehavior;
pub use context::{TransactionInfo, TxContext};
pub use manager::TransactionManager;
