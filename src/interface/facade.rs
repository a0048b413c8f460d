//! The transaction façade.

use std::sync::Arc;

use log::{debug, trace};
use tokio::sync::oneshot;
use ulid::Ulid;

use super::handle::QueryHandle;
use super::provider::{Backend, TaskPool};
use crate::db::DatabaseError;
use crate::dsl::Dsl;
use crate::transaction::{TransactionManager, TxContext};

/// Runs units of work inside database transactions.
///
/// Each call takes one connection from the backend, opens exactly one
/// transaction on it, runs the unit of work, and commits if it returned
/// `Ok` or rolls back if it returned `Err` (or panicked). Calls are never
/// batched or nested: a unit of work that calls back into the interface
/// gets a second, independent transaction on another connection.
///
/// The error type `E` belongs to the caller. Errors from the unit of work
/// come back unchanged; failures of the engine itself (acquiring a
/// connection, BEGIN, COMMIT) are converted with `E::from(DatabaseError)`.
///
/// Do not run long computations inside a unit of work. The connection and
/// its transaction are held for as long as the closure runs, which starves
/// other callers of pooled connections and, for writers, of the database
/// lock.
///
/// Apart from the backend, the interface holds one piece of state: a
/// [`TransactionManager`] listing the transactions currently open through
/// it. It is diagnostic only and never affects how a call runs.
///
/// Cloning is cheap and shares both.
pub struct DatabaseInterface<B> {
    backend: Arc<B>,
    transactions: TransactionManager,
}

impl<B> Clone for DatabaseInterface<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            transactions: self.transactions.clone(),
        }
    }
}

impl<B: Backend> DatabaseInterface<B> {
    /// Wrap a backend.
    pub fn new(backend: B) -> Self {
        Self::from_arc(Arc::new(backend))
    }

    /// Wrap a backend that is already shared.
    pub fn from_arc(backend: Arc<B>) -> Self {
        Self {
            backend,
            transactions: TransactionManager::new(),
        }
    }

    /// Get the backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Get the transaction manager, e.g. to inspect active transactions.
    pub fn transactions(&self) -> &TransactionManager {
        &self.transactions
    }

    /// Run a unit of work in one transaction and return its value.
    ///
    /// Blocks the calling thread until the transaction has committed or
    /// rolled back.
    pub fn call<T, E, F>(&self, unit: F) -> Result<T, E>
    where
        F: FnOnce(&TxContext<'_>) -> Result<T, E>,
        E: From<DatabaseError>,
    {
        let mut conn = self.backend.connection().map_err(E::from)?;
        let behavior = self.backend.configuration().behavior;

        self.transactions.with_transaction(&mut conn, behavior, unit)
    }

    /// Run a unit of work in one transaction, without a return value.
    pub fn run<E, F>(&self, unit: F) -> Result<(), E>
    where
        F: FnOnce(&TxContext<'_>) -> Result<(), E>,
        E: From<DatabaseError>,
    {
        self.call(unit)
    }

    /// Submit a unit of work to the backend's task pool.
    ///
    /// Returns immediately. The transaction runs on a pool thread and the
    /// handle resolves once it has committed or rolled back. Handles of
    /// separate calls may resolve in any order.
    pub fn call_async<T, E, F>(&self, unit: F) -> QueryHandle<T, E>
    where
        F: FnOnce(&TxContext<'_>) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<DatabaseError> + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let task_id = Ulid::new().to_string().to_lowercase();

        let this = self.clone();
        let id = task_id.clone();
        self.backend.task_pool().execute(Box::new(move || {
            trace!("task {} started", id);
            let result = this.call(unit);
            if sender.send(result).is_err() {
                debug!("task {} finished after its handle was dropped", id);
            }
        }));

        QueryHandle::new(task_id, receiver)
    }

    /// Submit a unit of work without a return value.
    pub fn run_async<E, F>(&self, unit: F) -> QueryHandle<(), E>
    where
        F: FnOnce(&TxContext<'_>) -> Result<(), E> + Send + 'static,
        E: From<DatabaseError> + Send + 'static,
    {
        self.call_async(unit)
    }

    /// [`call`](Self::call) with the query-building view.
    pub fn call_dsl<T, E, F>(&self, unit: F) -> Result<T, E>
    where
        F: FnOnce(Dsl<'_>) -> Result<T, E>,
        E: From<DatabaseError>,
    {
        self.call(|tx| unit(Dsl::using(tx)))
    }

    /// [`run`](Self::run) with the query-building view.
    pub fn run_dsl<E, F>(&self, unit: F) -> Result<(), E>
    where
        F: FnOnce(Dsl<'_>) -> Result<(), E>,
        E: From<DatabaseError>,
    {
        self.call_dsl(unit)
    }

    /// [`call_async`](Self::call_async) with the query-building view.
    pub fn call_dsl_async<T, E, F>(&self, unit: F) -> QueryHandle<T, E>
    where
        F: FnOnce(Dsl<'_>) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<DatabaseError> + Send + 'static,
    {
        self.call_async(move |tx| unit(Dsl::using(tx)))
    }

    /// [`run_async`](Self::run_async) with the query-building view.
    pub fn run_dsl_async<E, F>(&self, unit: F) -> QueryHandle<(), E>
    where
        F: FnOnce(Dsl<'_>) -> Result<(), E> + Send + 'static,
        E: From<DatabaseError> + Send + 'static,
    {
        self.call_dsl_async(unit)
    }

    // Short hands

    /// Shorthand for [`call`](Self::call).
    #[inline]
    pub fn cq<T, E, F>(&self, unit: F) -> Result<T, E>
    where
        F: FnOnce(&TxContext<'_>) -> Result<T, E>,
        E: From<DatabaseError>,
    {
        self.call(unit)
    }

    /// Shorthand for [`run`](Self::run).
    #[inline]
    pub fn rq<E, F>(&self, unit: F) -> Result<(), E>
    where
        F: FnOnce(&TxContext<'_>) -> Result<(), E>,
        E: From<DatabaseError>,
    {
        self.run(unit)
    }

    /// Shorthand for [`call_async`](Self::call_async).
    #[inline]
    pub fn acq<T, E, F>(&self, unit: F) -> QueryHandle<T, E>
    where
        F: FnOnce(&TxContext<'_>) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<DatabaseError> + Send + 'static,
    {
        self.call_async(unit)
    }

    /// Shorthand for [`run_async`](Self::run_async).
    #[inline]
    pub fn arq<E, F>(&self, unit: F) -> QueryHandle<(), E>
    where
        F: FnOnce(&TxContext<'_>) -> Result<(), E> + Send + 'static,
        E: From<DatabaseError> + Send + 'static,
    {
        self.run_async(unit)
    }

    /// Shorthand for [`call_dsl`](Self::call_dsl).
    #[inline]
    pub fn cqd<T, E, F>(&self, unit: F) -> Result<T, E>
    where
        F: FnOnce(Dsl<'_>) -> Result<T, E>,
        E: From<DatabaseError>,
    {
        self.call_dsl(unit)
    }

    /// Shorthand for [`run_dsl`](Self::run_dsl).
    #[inline]
    pub fn rqd<E, F>(&self, unit: F) -> Result<(), E>
    where
        F: FnOnce(Dsl<'_>) -> Result<(), E>,
        E: From<DatabaseError>,
    {
        self.run_dsl(unit)
    }

    /// Shorthand for [`call_dsl_async`](Self::call_dsl_async).
    #[inline]
    pub fn acqd<T, E, F>(&self, unit: F) -> QueryHandle<T, E>
    where
        F: FnOnce(Dsl<'_>) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<DatabaseError> + Send + 'static,
    {
        self.call_dsl_async(unit)
    }

    /// Shorthand for [`run_dsl_async`](Self::run_dsl_async).
    #[inline]
    pub fn arqd<E, F>(&self, unit: F) -> QueryHandle<(), E>
    where
        F: FnOnce(Dsl<'_>) -> Result<(), E> + Send + 'static,
        E: From<DatabaseError> + Send + 'static,
    {
        self.run_dsl_async(unit)
    }
}

impl<B> std::fmt::Debug for DatabaseInterface<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseInterface")
            .field("transactions", &self.transactions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::time::Duration;

    use thiserror::Error;

    use super::*;
    use crate::db::{Database, DatabaseConfig, SqliteBackend};
    use crate::transaction::TransactionBehavior;

    #[derive(Debug, Error)]
    enum AppError {
        #[error(transparent)]
        Db(#[from] DatabaseError),
        #[error("rejected: {0}")]
        Rejected(String),
    }

    impl From<rusqlite::Error> for AppError {
        fn from(e: rusqlite::Error) -> Self {
            AppError::Db(e.into())
        }
    }

    fn setup() -> Database {
        setup_with(|config| config)
    }

    fn setup_with(configure: impl FnOnce(DatabaseConfig) -> DatabaseConfig) -> Database {
        let db = Database::new(SqliteBackend::temporary_with(configure).unwrap());
        db.run(|tx| {
            tx.execute_batch(
                "CREATE TABLE accounts (id INTEGER PRIMARY KEY, owner TEXT NOT NULL, balance INTEGER NOT NULL)",
            )?;
            Ok::<_, DatabaseError>(())
        })
        .unwrap();
        db
    }

    fn count(db: &Database) -> i64 {
        db.call_dsl(|dsl| dsl.count("accounts")).unwrap()
    }

    fn insert(tx: &TxContext<'_>, owner: &str, balance: i64) -> Result<i64, AppError> {
        tx.execute(
            "INSERT INTO accounts (owner, balance) VALUES (?1, ?2)",
            rusqlite::params![owner, balance],
        )?;
        Ok(tx.last_insert_rowid())
    }

    #[test]
    fn test_call_returns_callback_value() {
        let db = setup();

        let id = db.call(|tx| insert(tx, "alice", 100)).unwrap();
        let balance: i64 = db
            .call(|tx| {
                tx.query_row("SELECT balance FROM accounts WHERE id = ?1", [id], |r| r.get(0))
                    .map_err(DatabaseError::from)
            })
            .unwrap();

        assert_eq!(balance, 100);
        assert_eq!(db.transactions().active_count(), 0);
    }

    #[test]
    fn test_failing_call_returns_error_and_commits_nothing() {
        let db = setup();

        let result: Result<(), AppError> = db.run(|tx| {
            insert(tx, "bob", 5)?;
            Err(AppError::Rejected("insufficient funds".into()))
        });

        assert!(matches!(result, Err(AppError::Rejected(msg)) if msg == "insufficient funds"));
        assert_eq!(count(&db), 0);
    }

    #[test]
    fn test_sql_error_inside_unit_rolls_back() {
        let db = setup();

        let result: Result<(), AppError> = db.run(|tx| {
            insert(tx, "carol", 1)?;
            tx.execute("INSERT INTO missing_table VALUES (1)", [])?;
            Ok(())
        });

        assert!(matches!(result, Err(AppError::Db(DatabaseError::Sqlite(_)))));
        assert_eq!(count(&db), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_call_async_does_not_block_caller() {
        let db = setup();
        let (release, gate) = mpsc::channel::<()>();

        // The unit of work waits for the caller, so this would deadlock if
        // call_async ran it inline.
        let handle = db.call_async(move |tx| {
            gate.recv().map_err(|e| AppError::Rejected(e.to_string()))?;
            insert(tx, "dave", 42)
        });

        release.send(()).unwrap();
        let id = handle.await.unwrap();

        assert_eq!(id, 1);
        assert_eq!(count(&db), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_call_async_failure_resolves_to_original_error() {
        let db = setup();

        let handle = db.call_async(|tx| {
            insert(tx, "erin", 7)?;
            Err::<i64, _>(AppError::Rejected("audit failed".into()))
        });

        assert!(matches!(handle.await, Err(AppError::Rejected(msg)) if msg == "audit failed"));
        assert_eq!(count(&db), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_async_calls_all_complete() {
        let db = setup();

        let first = db.acq(|tx| insert(tx, "frank", 1));
        let second = db.acq(|tx| insert(tx, "grace", 2));
        let (a, b) = tokio::join!(first, second);

        let mut ids = vec![a.unwrap(), b.unwrap()];
        ids.sort();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(count(&db), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_panicking_unit_aborts_handle() {
        let db = setup();

        let handle: QueryHandle<(), AppError> = db.run_async(|tx| {
            insert(tx, "mallory", 0)?;
            panic!("unit of work panicked");
        });

        assert!(matches!(
            handle.await,
            Err(AppError::Db(DatabaseError::TaskAborted(_)))
        ));
        assert_eq!(count(&db), 0);
        assert_eq!(db.transactions().active_count(), 0);
    }

    #[test]
    fn test_dsl_and_raw_are_interchangeable() {
        let raw_db = setup();
        let dsl_db = setup();

        let raw = raw_db
            .call(|tx| {
                insert(tx, "heidi", 10)?;
                let total: i64 =
                    tx.query_row("SELECT SUM(balance) FROM accounts", [], |r| r.get(0))?;
                Ok::<_, AppError>(total)
            })
            .unwrap();

        let dsl = dsl_db
            .call_dsl(|dsl| {
                dsl.execute(
                    "INSERT INTO accounts (owner, balance) VALUES (?1, ?2)",
                    rusqlite::params!["heidi", 10],
                )?;
                let total: i64 = dsl.fetch_value("SELECT SUM(balance) FROM accounts", [])?;
                Ok::<_, AppError>(total)
            })
            .unwrap();

        assert_eq!(raw, dsl);

        // Same rollback behaviour on failure.
        let raw_err: Result<(), AppError> = raw_db.rq(|tx| {
            insert(tx, "ivan", 1)?;
            Err(AppError::Rejected("raw".into()))
        });
        let dsl_err: Result<(), AppError> = dsl_db.rqd(|dsl| {
            dsl.execute("INSERT INTO accounts (owner, balance) VALUES ('ivan', 1)", [])?;
            Err(AppError::Rejected("dsl".into()))
        });

        assert!(raw_err.is_err() && dsl_err.is_err());
        assert_eq!(count(&raw_db), count(&dsl_db));
    }

    #[test]
    fn test_dsl_async_variants() {
        let db = setup();

        db.arqd(|dsl| {
            dsl.execute("INSERT INTO accounts (owner, balance) VALUES ('judy', 3)", [])?;
            Ok::<_, DatabaseError>(())
        })
        .wait()
        .unwrap();

        let owner = db
            .acqd(|dsl| dsl.fetch_value::<String, _>("SELECT owner FROM accounts", []))
            .wait()
            .unwrap();

        assert_eq!(owner, "judy");
    }

    #[test]
    fn test_shorthands_match_primaries() {
        let db = setup();

        let id = db.cq(|tx| insert(tx, "ken", 1)).unwrap();
        db.rq(|tx| insert(tx, "lena", 2).map(|_| ())).unwrap();
        db.arq(|tx| insert(tx, "mike", 3).map(|_| ())).wait().unwrap();
        let owners = db
            .cqd(|dsl| {
                let rows = dsl.fetch("SELECT owner FROM accounts ORDER BY id", [])?;
                let owners: Vec<String> = rows
                    .column("owner")
                    .into_iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect();
                Ok::<_, DatabaseError>(owners)
            })
            .unwrap();

        assert_eq!(id, 1);
        assert_eq!(owners, vec!["ken", "lena", "mike"]);
    }

    #[test]
    fn test_nested_call_is_a_separate_transaction() {
        // Deferred so the outer writer doesn't block the inner reader.
        let db = setup_with(|c| c.behavior(TransactionBehavior::Deferred));
        let inner_db = db.clone();

        let result: Result<(), AppError> = db.run(|tx| {
            insert(tx, "outer", 1)?;
            let seen = inner_db.call_dsl(|dsl| dsl.count("accounts"))?;
            assert_eq!(seen, 0);
            assert_eq!(inner_db.transactions().active_count(), 1);
            Err(AppError::Rejected("outer fails".into()))
        });

        assert!(result.is_err());
        assert_eq!(count(&db), 0);
    }

    #[test]
    fn test_clones_share_transaction_registry() {
        let db = setup();
        let observer = db.clone();

        let (inside, id) = db
            .call(|tx| {
                Ok::<_, DatabaseError>((
                    observer.transactions().is_active(tx.id()),
                    tx.id().to_string(),
                ))
            })
            .unwrap();

        assert!(inside);
        assert!(!observer.transactions().is_active(&id));
    }

    #[test]
    fn test_pool_exhaustion_surfaces_through_caller_error() {
        let backend = SqliteBackend::temporary_with(|c| {
            c.max_connections(1)
                .acquire_timeout(Duration::from_millis(50))
        })
        .unwrap();
        let db = Database::new(backend);
        let inner_db = db.clone();

        let result: Result<(), AppError> = db.run(|_| inner_db.run(|_| Ok(())));

        assert!(matches!(
            result,
            Err(AppError::Db(DatabaseError::PoolTimeout { .. }))
        ));
    }

    #[test]
    fn test_behavior_comes_from_configuration() {
        let backend = SqliteBackend::temporary_with(|c| {
            c.behavior(TransactionBehavior::Deferred)
        })
        .unwrap();
        let db = Database::new(backend);

        let behavior = db
            .call(|tx| Ok::<_, DatabaseError>(tx.behavior()))
            .unwrap();
        assert_eq!(behavior, TransactionBehavior::Deferred);
    }

    #[test]
    fn test_in_memory_database() {
        let db = Database::open(DatabaseConfig::in_memory()).unwrap();

        db.run(|tx| {
            tx.execute_batch("CREATE TABLE t (v TEXT); INSERT INTO t VALUES ('x');")?;
            Ok::<_, DatabaseError>(())
        })
        .unwrap();

        let v: String = db
            .call_async(|tx| {
                tx.query_row("SELECT v FROM t", [], |r| r.get(0))
                    .map_err(DatabaseError::from)
            })
            .wait()
            .unwrap();
        assert_eq!(v, "x");
    }
}
