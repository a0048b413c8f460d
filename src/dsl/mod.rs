//! Query-building view over a running transaction.
//!
//! A [`Dsl`] is derived from a [`TxContext`](crate::transaction::TxContext)
//! and adds row mapping to JSON, batch execution and a few table helpers.
//! It never changes transactional behaviour: anything done through it is
//! the same as doing it through the context directly.

mod query;
mod result;
mod value;

pub use query::Dsl;
pub use result::{QueryResult, ResultSet, Row};
pub use value::{to_json, to_sql};
