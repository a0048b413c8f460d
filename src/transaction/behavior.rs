//! Transaction begin behaviour.
//!
//! SQLite decides when a transaction takes its locks:
//! - Deferred: no lock until the first read or write
//! - Immediate: the write lock is taken at BEGIN
//! - Exclusive: like Immediate, and readers are locked out in rollback-journal mode

use std::fmt;

use serde::{Deserialize, Serialize};

/// How a transaction acquires its locks when it begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionBehavior {
    /// Locks are taken lazily.
    ///
    /// Cheapest for read-only units of work. A deferred transaction that
    /// reads and later writes can fail with `SQLITE_BUSY` if another writer
    /// committed in between.
    Deferred,

    /// The write lock is taken at BEGIN.
    ///
    /// Concurrent writers queue on the busy timeout instead of failing
    /// halfway through a unit of work.
    #[default]
    Immediate,

    /// Exclusive lock at BEGIN.
    Exclusive,
}

impl TransactionBehavior {
    /// Whether the transaction holds the write lock from the start.
    pub fn locks_on_begin(&self) -> bool {
        !matches!(self, TransactionBehavior::Deferred)
    }
}

impl From<TransactionBehavior> for rusqlite::TransactionBehavior {
    fn from(behavior: TransactionBehavior) -> Self {
        match behavior {
            TransactionBehavior::Deferred => rusqlite::TransactionBehavior::Deferred,
            TransactionBehavior::Immediate => rusqlite::TransactionBehavior::Immediate,
            TransactionBehavior::Exclusive => rusqlite::TransactionBehavior::Exclusive,
        }
    }
}

impl fmt::Display for TransactionBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionBehavior::Deferred => write!(f, "DEFERRED"),
            TransactionBehavior::Immediate => write!(f, "IMMEDIATE"),
            TransactionBehavior::Exclusive => write!(f, "EXCLUSIVE"),
        }
    }
}

/// Parse behaviour from its SQL spelling.
impl std::str::FromStr for TransactionBehavior {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "DEFERRED" => Ok(TransactionBehavior::Deferred),
            "IMMEDIATE" => Ok(TransactionBehavior::Immediate),
            "EXCLUSIVE" => Ok(TransactionBehavior::Exclusive),
            _ => Err(format!("unknown transaction behavior: {}", s)),
        }
    }
}
