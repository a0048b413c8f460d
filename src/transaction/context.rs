//! Transaction context handed to units of work.

use std::ops::Deref;

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::dsl::Dsl;
use crate::transaction::behavior::TransactionBehavior;

/// Metadata about a running transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionInfo {
    /// Unique transaction ID.
    pub tx_id: String,
    /// How the transaction began.
    pub behavior: TransactionBehavior,
    /// When the transaction started.
    pub started_at: DateTime<Utc>,
}

/// The execution context of one transaction.
///
/// Dereferences to [`rusqlite::Connection`], so every statement issued
/// through it runs inside the transaction. The context only lives for the
/// duration of the unit of work; commit and rollback are decided by the
/// [`TransactionManager`](super::TransactionManager) from the unit of work's
/// result.
///
/// Do not issue `COMMIT`, `ROLLBACK` or `END` through the connection. The
/// manager notices a transaction that was ended early and reports
/// [`DatabaseError::TransactionControl`](crate::DatabaseError::TransactionControl),
/// but whatever was committed stays committed.
pub struct TxContext<'conn> {
    pub(crate) tx: rusqlite::Transaction<'conn>,
    pub(crate) info: TransactionInfo,
}

impl<'conn> TxContext<'conn> {
    pub(crate) fn new(tx: rusqlite::Transaction<'conn>, info: TransactionInfo) -> Self {
        Self { tx, info }
    }

    /// Get the transaction ID.
    pub fn id(&self) -> &str {
        &self.info.tx_id
    }

    /// Get the begin behaviour.
    pub fn behavior(&self) -> TransactionBehavior {
        self.info.behavior
    }

    /// When the transaction started.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.info.started_at
    }

    /// Metadata for this transaction.
    pub fn info(&self) -> &TransactionInfo {
        &self.info
    }

    /// The query-building view over this transaction.
    pub fn dsl(&self) -> Dsl<'_> {
        Dsl::using(self)
    }
}

impl Deref for TxContext<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.tx
    }
}

impl std::fmt::Debug for TxContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxContext")
            .field("tx_id", &self.info.tx_id)
            .field("behavior", &self.info.behavior)
            .field("started_at", &self.info.started_at)
            .finish()
    }
}
