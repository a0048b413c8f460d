//! SQLite backend: a connection pool plus a worker pool.

use tempfile::TempDir;
use tokio::runtime::{Builder, Handle, Runtime};

use super::config::DatabaseConfig;
use super::connection::{ConnectionPool, PooledConnection};
use super::error::DatabaseResult;
use crate::interface::{Backend, DatabaseInterface, Job, TaskPool};

/// Task pool for asynchronous units of work.
///
/// Either owns a Tokio runtime or borrows the handle of one that the
/// application already runs. Units of work block on SQLite, so they run on
/// the runtime's blocking threads.
pub struct WorkerPool {
    handle: Handle,
    runtime: Option<Runtime>,
}

impl WorkerPool {
    /// Start a dedicated runtime with `threads` threads for units of work.
    pub fn new(threads: usize) -> DatabaseResult<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(threads.max(1))
            .thread_name("dbm-worker")
            .enable_all()
            .build()?;

        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Some(runtime),
        })
    }

    /// Use an existing runtime.
    pub fn from_handle(handle: Handle) -> Self {
        Self {
            handle,
            runtime: None,
        }
    }

    /// Get the runtime handle jobs are spawned on.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Whether this pool owns its runtime.
    pub fn is_owned(&self) -> bool {
        self.runtime.is_some()
    }
}

impl TaskPool for WorkerPool {
    fn execute(&self, job: Job) {
        self.handle.execute(job);
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Jobs already running finish on their own threads; queued jobs are
        // dropped and their handles resolve as aborted.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("owned", &self.is_owned())
            .finish()
    }
}

/// The stock [`Backend`]: pooled SQLite connections and a [`WorkerPool`].
#[derive(Debug)]
pub struct SqliteBackend {
    pool: ConnectionPool,
    workers: WorkerPool,
    // Dropped last, after every connection is closed.
    dir: Option<TempDir>,
}

impl SqliteBackend {
    /// Open a backend with its own worker runtime.
    pub fn open(config: DatabaseConfig) -> DatabaseResult<Self> {
        config.validate()?;
        let workers = WorkerPool::new(config.worker_threads)?;
        Self::with_workers(config, workers)
    }

    /// Open a backend that runs asynchronous work on an existing runtime.
    pub fn with_handle(config: DatabaseConfig, handle: Handle) -> DatabaseResult<Self> {
        Self::with_workers(config, WorkerPool::from_handle(handle))
    }

    /// Open a backend with the given worker pool.
    pub fn with_workers(config: DatabaseConfig, workers: WorkerPool) -> DatabaseResult<Self> {
        Ok(Self {
            pool: ConnectionPool::new(config)?,
            workers,
            dir: None,
        })
    }

    /// A private in-memory database on a single connection.
    pub fn in_memory() -> DatabaseResult<Self> {
        Self::open(DatabaseConfig::in_memory())
    }

    /// A file database in a temporary directory, removed on drop.
    ///
    /// Unlike [`in_memory`](Self::in_memory) this supports concurrent
    /// transactions on separate connections.
    pub fn temporary() -> DatabaseResult<Self> {
        Self::temporary_with(|config| config)
    }

    /// Like [`temporary`](Self::temporary), with a chance to adjust the
    /// configuration first.
    pub fn temporary_with(
        configure: impl FnOnce(DatabaseConfig) -> DatabaseConfig,
    ) -> DatabaseResult<Self> {
        let dir = TempDir::new()?;
        let config =
            configure(DatabaseConfig::default()).with_path(dir.path().join("dbm.sqlite3"));

        let mut backend = Self::open(config)?;
        backend.dir = Some(dir);
        Ok(backend)
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Get the worker pool.
    pub fn workers(&self) -> &WorkerPool {
        &self.workers
    }
}

impl Backend for SqliteBackend {
    type Pool = WorkerPool;

    fn connection(&self) -> DatabaseResult<PooledConnection> {
        self.pool.get()
    }

    fn task_pool(&self) -> &WorkerPool {
        &self.workers
    }

    fn configuration(&self) -> &DatabaseConfig {
        self.pool.config()
    }
}

/// The façade over the stock SQLite backend.
pub type Database = DatabaseInterface<SqliteBackend>;

impl DatabaseInterface<SqliteBackend> {
    /// Open a database with the given configuration.
    pub fn open(config: DatabaseConfig) -> DatabaseResult<Self> {
        Ok(Self::new(SqliteBackend::open(config)?))
    }

    /// Open a private in-memory database.
    pub fn in_memory() -> DatabaseResult<Self> {
        Ok(Self::new(SqliteBackend::in_memory()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let backend = SqliteBackend::in_memory().unwrap();
        assert!(backend.configuration().is_in_memory());
        assert!(backend.workers().is_owned());
        assert_eq!(backend.pool().created(), 1);
    }

    #[test]
    fn test_temporary_cleans_up() {
        let backend = SqliteBackend::temporary_with(|c| c.max_connections(2)).unwrap();
        let path = backend.configuration().path().unwrap().to_path_buf();
        assert!(path.exists());
        assert_eq!(backend.configuration().max_connections, 2);

        drop(backend);
        assert!(!path.exists());
    }

    #[test]
    fn test_open_rejects_invalid_config() {
        let config = DatabaseConfig::in_memory().worker_threads(0);
        assert!(SqliteBackend::open(config).is_err());
    }

    #[test]
    fn test_worker_pool_runs_jobs() {
        let workers = WorkerPool::new(2).unwrap();
        let (sender, receiver) = std::sync::mpsc::channel();

        for i in 0..4 {
            let sender = sender.clone();
            workers.execute(Box::new(move || sender.send(i).unwrap()));
        }
        drop(sender);

        let mut seen: Vec<i32> = receiver.iter().collect();
        seen.sort();
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_borrowed_handle() {
        let backend =
            SqliteBackend::with_handle(DatabaseConfig::in_memory(), Handle::current()).unwrap();
        assert!(!backend.workers().is_owned());
    }
}
