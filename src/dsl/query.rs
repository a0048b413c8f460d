//! The query-building view over a transaction.

use log::trace;
use rusqlite::types::FromSql;
use rusqlite::{params_from_iter, Connection, Params, Statement};

use super::result::{QueryResult, ResultSet, Row};
use super::value::{to_json, to_sql};
use crate::db::{DatabaseError, DatabaseResult};
use crate::sql::{split_statements, StatementKind};
use crate::transaction::TxContext;

/// Convenience view over a [`TxContext`].
///
/// Everything issued through a `Dsl` runs inside the transaction it was
/// derived from. Statements that would open or close a transaction are
/// rejected, because the boundary belongs to the caller of the unit of work.
#[derive(Clone, Copy)]
pub struct Dsl<'a> {
    conn: &'a Connection,
    tx_id: &'a str,
}

impl<'a> Dsl<'a> {
    /// Build the view for a transaction.
    pub fn using(tx: &'a TxContext<'_>) -> Self {
        Self {
            conn: tx,
            tx_id: tx.id(),
        }
    }

    /// The raw connection, still inside the transaction.
    pub fn connection(&self) -> &'a Connection {
        self.conn
    }

    /// ID of the transaction this view belongs to.
    pub fn tx_id(&self) -> &'a str {
        self.tx_id
    }

    /// Run a query and collect every row.
    pub fn fetch<P: Params>(&self, sql: &str, params: P) -> DatabaseResult<ResultSet> {
        self.check(sql)?;
        let mut stmt = self.conn.prepare(sql)?;
        read_rows(&mut stmt, params)
    }

    /// Run a query and return its first row, if any.
    pub fn fetch_one<P: Params>(&self, sql: &str, params: P) -> DatabaseResult<Option<Row>> {
        Ok(self.fetch(sql, params)?.into_iter().next())
    }

    /// Run a query and read the first column of its first row.
    ///
    /// Fails with `QueryReturnedNoRows` when the query is empty.
    pub fn fetch_value<T: FromSql, P: Params>(&self, sql: &str, params: P) -> DatabaseResult<T> {
        self.check(sql)?;
        Ok(self.conn.query_row(sql, params, |row| row.get(0))?)
    }

    /// Execute a statement and return the number of rows it changed.
    pub fn execute<P: Params>(&self, sql: &str, params: P) -> DatabaseResult<usize> {
        self.check(sql)?;
        Ok(self.conn.execute(sql, params)?)
    }

    /// Run one statement without parameters and describe its outcome.
    pub fn run(&self, sql: &str) -> DatabaseResult<QueryResult> {
        let kind = self.check(sql)?;
        let mut stmt = self.conn.prepare(sql)?;

        if stmt.column_count() > 0 {
            return Ok(QueryResult::Select(read_rows(&mut stmt, [])?));
        }

        let changed = stmt.execute([])?;
        Ok(match kind {
            StatementKind::Mutation => QueryResult::modified(changed),
            kind => QueryResult::success(format!("{} statement executed", kind)),
        })
    }

    /// Run several `;`-separated statements in order.
    ///
    /// Each statement runs as written, so SQLite-only syntax such as
    /// triggers works. Nothing runs if any statement is transaction control.
    pub fn run_batch(&self, sql: &str) -> DatabaseResult<Vec<QueryResult>> {
        let statements = split_statements(sql)?;

        if let Some((_, text)) = statements
            .iter()
            .find(|(kind, _)| kind.is_transaction_control())
        {
            return Err(DatabaseError::TransactionControl(text.clone()));
        }

        statements
            .iter()
            .map(|(_, text)| self.run(text))
            .collect()
    }

    /// Insert a row built from JSON values.
    pub fn insert_into(&self, table: &str, row: &Row) -> DatabaseResult<usize> {
        if row.is_empty() {
            let sql = format!("INSERT INTO {} DEFAULT VALUES", quote_ident(table));
            return self.execute(&sql, []);
        }

        let columns: Vec<String> = row.keys().map(|c| quote_ident(c)).collect();
        let placeholders: Vec<String> = (1..=row.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table),
            columns.join(", "),
            placeholders.join(", ")
        );

        let values: Vec<_> = row.values().map(to_sql).collect();
        self.execute(&sql, params_from_iter(values.iter()))
    }

    /// Number of rows in a table.
    pub fn count(&self, table: &str) -> DatabaseResult<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        self.fetch_value(&sql, [])
    }

    /// Check if a table exists.
    pub fn table_exists(&self, name: &str) -> DatabaseResult<bool> {
        self.fetch_value(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            [name],
        )
    }

    /// Rowid of the last successful insert on this connection.
    pub fn last_insert_rowid(&self) -> i64 {
        self.conn.last_insert_rowid()
    }

    fn check(&self, sql: &str) -> DatabaseResult<StatementKind> {
        trace!("[{}] {}", self.tx_id, sql);

        let kind = StatementKind::classify(sql);
        if kind.is_transaction_control() {
            return Err(DatabaseError::TransactionControl(sql.trim().to_string()));
        }
        Ok(kind)
    }
}

impl std::fmt::Debug for Dsl<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dsl").field("tx_id", &self.tx_id).finish()
    }
}

fn read_rows<P: Params>(stmt: &mut Statement<'_>, params: P) -> DatabaseResult<ResultSet> {
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut result = ResultSet::new(columns.clone());

    let mut rows = stmt.query(params)?;
    while let Some(row) = rows.next()? {
        let mut out = Row::new();
        for (i, name) in columns.iter().enumerate() {
            out.insert(name.clone(), to_json(row.get_ref(i)?));
        }
        result.push(out);
    }

    Ok(result)
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
