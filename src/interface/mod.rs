//! The transaction façade and the capabilities it is built on.
//!
//! [`DatabaseInterface`] turns a closure into one database transaction,
//! either on the calling thread or on the backend's task pool. Anything
//! implementing [`Backend`] can sit underneath it.

mod facade;
mod handle;
mod provider;

pub use facade::DatabaseInterface;
pub use handle::QueryHandle;
pub use provider::{Backend, Job, TaskPool};
