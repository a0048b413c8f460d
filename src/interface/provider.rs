//! Capabilities a backend supplies to the façade.

use tokio::runtime::Handle;

use crate::db::{DatabaseConfig, DatabaseResult, PooledConnection};

/// A unit of blocking work submitted to a [`TaskPool`].
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Somewhere to run units of work off the calling thread.
///
/// Thread count and queueing are entirely up to the implementation.
pub trait TaskPool: Send + Sync {
    /// Submit a job. Must not block the caller.
    fn execute(&self, job: Job);
}

/// Runs jobs on the runtime's blocking pool.
impl TaskPool for Handle {
    fn execute(&self, job: Job) {
        // Detached; the job reports through its own channel.
        drop(self.spawn_blocking(job));
    }
}

/// Everything the façade needs from the system that embeds it.
///
/// These three hooks are the only extension points. Besides the backend the
/// façade only keeps a registry of active transactions for diagnostics.
pub trait Backend: Send + Sync + 'static {
    /// Where asynchronous units of work run.
    type Pool: TaskPool;

    /// Produce a connection for one transaction.
    fn connection(&self) -> DatabaseResult<PooledConnection>;

    /// Produce the task pool for asynchronous calls.
    fn task_pool(&self) -> &Self::Pool;

    /// The configuration currently in effect.
    fn configuration(&self) -> &DatabaseConfig;
}
