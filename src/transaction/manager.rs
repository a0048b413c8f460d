//! Transaction manager - owns the begin/commit/rollback boundary.
//!
//! The TransactionManager is the only place transactions are opened or
//! closed. It handles:
//! - Beginning a transaction with the configured behaviour
//! - Committing when the unit of work succeeds
//! - Rolling back when it fails or panics
//! - Tracking active transactions

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use log::{debug, warn};
use parking_lot::RwLock;
use rusqlite::Connection;
use ulid::Ulid;

use crate::db::{DatabaseError, DatabaseResult};
use crate::transaction::behavior::TransactionBehavior;
use crate::transaction::context::{TransactionInfo, TxContext};

/// Transaction manager.
///
/// Thread-safe: can be shared across threads via Clone (uses Arc internally).
#[derive(Clone, Default)]
pub struct TransactionManager {
    inner: Arc<TransactionManagerInner>,
}

#[derive(Default)]
struct TransactionManagerInner {
    /// Active transactions tracked by ID.
    active: RwLock<HashMap<String, TransactionInfo>>,
}

/// Removes a transaction from the active set however the unit of work ends.
struct ActiveEntry<'a> {
    manager: &'a TransactionManager,
    tx_id: String,
}

impl Drop for ActiveEntry<'_> {
    fn drop(&mut self) {
        self.manager.inner.active.write().remove(&self.tx_id);
    }
}

impl TransactionManager {
    /// Create a new transaction manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` inside one transaction on `conn`.
    ///
    /// If `f` returns Ok, the transaction is committed and the value
    /// returned. If `f` returns Err, the transaction is rolled back and the
    /// error returned unchanged. If `f` panics, the transaction is rolled
    /// back while unwinding.
    ///
    /// Failures to begin or commit are converted into `E`. If `f` ended the
    /// transaction itself (for example with a raw `COMMIT`), the result of
    /// `f` is discarded and `DatabaseError::TransactionControl` is returned,
    /// since neither commit nor rollback can be honoured any more.
    pub fn with_transaction<F, T, E>(
        &self,
        conn: &mut Connection,
        behavior: TransactionBehavior,
        f: F,
    ) -> Result<T, E>
    where
        F: FnOnce(&TxContext<'_>) -> Result<T, E>,
        E: From<DatabaseError>,
    {
        let ctx = self.begin(conn, behavior).map_err(E::from)?;
        let _entry = ActiveEntry {
            manager: self,
            tx_id: ctx.id().to_string(),
        };

        let result = f(&ctx);

        if ctx.is_autocommit() {
            warn!("transaction {} was ended by its unit of work", ctx.id());
            return Err(E::from(DatabaseError::TransactionControl(format!(
                "transaction {} was ended by its unit of work",
                ctx.id()
            ))));
        }

        match result {
            Ok(value) => {
                self.commit(ctx).map_err(E::from)?;
                Ok(value)
            }
            Err(e) => {
                self.rollback(ctx);
                Err(e)
            }
        }
    }

    fn begin<'conn>(
        &self,
        conn: &'conn mut Connection,
        behavior: TransactionBehavior,
    ) -> DatabaseResult<TxContext<'conn>> {
        let tx = conn.transaction_with_behavior(behavior.into())?;

        let info = TransactionInfo {
            tx_id: Ulid::new().to_string().to_lowercase(),
            behavior,
            started_at: Utc::now(),
        };
        debug!("begin {} transaction {}", behavior, info.tx_id);

        self.inner
            .active
            .write()
            .insert(info.tx_id.clone(), info.clone());

        Ok(TxContext::new(tx, info))
    }

    fn commit(&self, ctx: TxContext<'_>) -> DatabaseResult<()> {
        let TxContext { tx, info } = ctx;
        let elapsed = Utc::now() - info.started_at;

        match tx.commit() {
            Ok(()) => {
                debug!(
                    "committed transaction {} after {}ms",
                    info.tx_id,
                    elapsed.num_milliseconds()
                );
                Ok(())
            }
            Err(e) => {
                debug!("commit of transaction {} failed: {}", info.tx_id, e);
                Err(e.into())
            }
        }
    }

    fn rollback(&self, ctx: TxContext<'_>) {
        let TxContext { tx, info } = ctx;

        // The unit of work's error wins; a failed rollback is only logged.
        match tx.rollback() {
            Ok(()) => debug!("rolled back transaction {}", info.tx_id),
            Err(e) => warn!("rollback of transaction {} failed: {}", info.tx_id, e),
        }
    }

    /// Get the number of active transactions.
    pub fn active_count(&self) -> usize {
        self.inner.active.read().len()
    }

    /// List all active transaction IDs.
    pub fn active_transactions(&self) -> Vec<String> {
        self.inner.active.read().keys().cloned().collect()
    }

    /// Check if a transaction is active.
    pub fn is_active(&self, tx_id: &str) -> bool {
        self.inner.active.read().contains_key(tx_id)
    }

    /// Get metadata for an active transaction.
    pub fn get_transaction_info(&self, tx_id: &str) -> Option<TransactionInfo> {
        self.inner.active.read().get(tx_id).cloned()
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("active_count", &self.active_count())
            .finish()
    }
}
