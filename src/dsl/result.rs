//! Query result types.

use serde_json::Value;
use std::collections::BTreeMap;

/// A row as a map of column name to value.
pub type Row = BTreeMap<String, Value>;

/// Result of running a statement through [`Dsl::run`](super::Dsl::run).
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    /// Rows returned from SELECT (or any statement producing columns).
    Select(ResultSet),
    /// Number of rows affected by INSERT/UPDATE/DELETE.
    Modified { rows_affected: usize },
    /// DDL or other statement executed.
    Success { message: String },
}

impl QueryResult {
    /// Create a success result.
    pub fn success(message: impl Into<String>) -> Self {
        QueryResult::Success {
            message: message.into(),
        }
    }

    /// Create a modified result.
    pub fn modified(rows: usize) -> Self {
        QueryResult::Modified {
            rows_affected: rows,
        }
    }

    /// The result set, if this was a query.
    pub fn rows(&self) -> Option<&ResultSet> {
        match self {
            QueryResult::Select(rs) => Some(rs),
            _ => None,
        }
    }

    /// Rows affected, if this was a mutation.
    pub fn rows_affected(&self) -> Option<usize> {
        match self {
            QueryResult::Modified { rows_affected } => Some(*rows_affected),
            _ => None,
        }
    }
}

/// A set of rows from a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    /// Column names in statement order.
    pub columns: Vec<String>,
    /// Rows as maps of column name to value.
    pub rows: Vec<Row>,
}

impl ResultSet {
    /// Create a new empty result set.
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Add a row.
    pub fn push(&mut self, row: Row) {
        self.rows.push(row);
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Get a row by index.
    pub fn get(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    /// Iterate over rows.
    pub fn iter(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter()
    }

    /// All values of one column, in row order.
    pub fn column(&self, name: &str) -> Vec<&Value> {
        self.rows.iter().filter_map(|row| row.get(name)).collect()
    }
}

impl IntoIterator for ResultSet {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}
