//! Handle to the result of an asynchronous unit of work.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

use crate::db::DatabaseError;

/// Eventual result of [`DatabaseInterface::call_async`](super::DatabaseInterface::call_async).
///
/// Await it from async code, or [`wait`](Self::wait) for it from a plain
/// thread. Dropping the handle does not cancel the unit of work; it still
/// runs and commits, only the result is discarded.
///
/// If the unit of work panics, or the task pool drops the job, the handle
/// resolves to [`DatabaseError::TaskAborted`] converted into `E`.
pub struct QueryHandle<T, E> {
    task_id: String,
    receiver: oneshot::Receiver<Result<T, E>>,
}

impl<T, E> QueryHandle<T, E>
where
    E: From<DatabaseError>,
{
    pub(crate) fn new(task_id: String, receiver: oneshot::Receiver<Result<T, E>>) -> Self {
        Self { task_id, receiver }
    }

    /// ID used for this task in log output.
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Block the current thread until the result is available.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context;
    /// `.await` the handle there instead.
    pub fn wait(self) -> Result<T, E> {
        let task_id = self.task_id;
        self.receiver
            .blocking_recv()
            .unwrap_or_else(|_| Err(DatabaseError::TaskAborted(task_id).into()))
    }

    /// Take the result if the unit of work has already finished.
    pub fn try_result(&mut self) -> Option<Result<T, E>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => {
                Some(Err(DatabaseError::TaskAborted(self.task_id.clone()).into()))
            }
        }
    }
}

impl<T, E> Future for QueryHandle<T, E>
where
    E: From<DatabaseError>,
{
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(
                DatabaseError::TaskAborted(this.task_id.clone()).into(),
            )),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T, E> std::fmt::Debug for QueryHandle<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryHandle")
            .field("task_id", &self.task_id)
            .finish()
    }
}
