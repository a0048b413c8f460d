//! SQL statement inspection.
//!
//! Uses the `sqlparser` crate (SQLite dialect) to classify statements and
//! split batches. Execution is always left to SQLite.

mod error;
mod statement;

pub use error::{ParseError, ParseResult};
pub use statement::{split_statements, StatementKind};
