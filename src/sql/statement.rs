//! Statement classification.
//!
//! SQLite is the authority on whether a statement is valid. The parser is
//! only consulted to decide what kind of result a statement produces and to
//! keep transaction control out of units of work.

use std::fmt;

use sqlparser::ast::Statement;
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, TokenWithSpan, Tokenizer};

use super::error::{ParseError, ParseResult};

/// Broad category of a SQL statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// Produces rows (SELECT, WITH, VALUES).
    Query,
    /// INSERT, UPDATE, DELETE or REPLACE.
    Mutation,
    /// Schema changes (CREATE, DROP, ALTER).
    Definition,
    /// BEGIN, COMMIT, ROLLBACK, SAVEPOINT and friends.
    TransactionControl,
    /// Anything else, e.g. PRAGMA.
    Other,
}

impl StatementKind {
    /// Classify a single SQL statement.
    ///
    /// Falls back to the leading keyword when the parser does not understand
    /// the statement, so SQLite-only syntax is still classified.
    pub fn classify(sql: &str) -> Self {
        let dialect = SQLiteDialect {};
        match Parser::parse_sql(&dialect, sql) {
            Ok(statements) => match statements.as_slice() {
                [stmt] => Self::of(stmt),
                _ => Self::from_keyword(sql),
            },
            Err(_) => Self::from_keyword(sql),
        }
    }

    /// Classify a parsed statement.
    pub fn of(stmt: &Statement) -> Self {
        match stmt {
            Statement::Query { .. } => StatementKind::Query,
            Statement::Insert { .. } | Statement::Update { .. } | Statement::Delete { .. } => {
                StatementKind::Mutation
            }
            Statement::CreateTable { .. }
            | Statement::CreateVirtualTable { .. }
            | Statement::CreateIndex { .. }
            | Statement::CreateView { .. }
            | Statement::AlterTable { .. }
            | Statement::Drop { .. } => StatementKind::Definition,
            Statement::StartTransaction { .. }
            | Statement::Commit { .. }
            | Statement::Rollback { .. }
            | Statement::Savepoint { .. }
            | Statement::ReleaseSavepoint { .. } => StatementKind::TransactionControl,
            _ => StatementKind::Other,
        }
    }

    fn from_keyword(sql: &str) -> Self {
        let keyword = sql
            .trim_start()
            .split(|c: char| c.is_whitespace() || c == ';' || c == '(')
            .next()
            .unwrap_or_default()
            .to_uppercase();

        match keyword.as_str() {
            "SELECT" | "WITH" | "VALUES" => StatementKind::Query,
            "INSERT" | "UPDATE" | "DELETE" | "REPLACE" => StatementKind::Mutation,
            "CREATE" | "DROP" | "ALTER" => StatementKind::Definition,
            "BEGIN" | "COMMIT" | "END" | "ROLLBACK" | "SAVEPOINT" | "RELEASE" => {
                StatementKind::TransactionControl
            }
            _ => StatementKind::Other,
        }
    }

    /// Whether the statement would open or close a transaction.
    pub fn is_transaction_control(&self) -> bool {
        matches!(self, StatementKind::TransactionControl)
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatementKind::Query => write!(f, "query"),
            StatementKind::Mutation => write!(f, "mutation"),
            StatementKind::Definition => write!(f, "definition"),
            StatementKind::TransactionControl => write!(f, "transaction control"),
            StatementKind::Other => write!(f, "other"),
        }
    }
}

/// Split a batch of `;`-separated statements.
///
/// Only the tokenizer is used, so statements the parser does not support
/// (`CREATE TRIGGER`, `ANALYZE`, `ATTACH`, ...) are still split correctly and
/// handed back verbatim for SQLite to judge. Semicolons inside strings,
/// comments and trigger bodies do not end a statement.
pub fn split_statements(sql: &str) -> ParseResult<Vec<(StatementKind, String)>> {
    let dialect = SQLiteDialect {};
    let tokens = Tokenizer::new(&dialect, sql).tokenize_with_location()?;

    let mut statements = Vec::new();
    let mut start = 0;
    // Significant tokens of the current statement, uppercased words or ";".
    let mut seen: Vec<String> = Vec::new();

    for TokenWithSpan { token, span } in &tokens {
        match token {
            Token::Whitespace(_) => continue,
            Token::SemiColon => {
                // Inside a trigger body only "; END ;" closes the statement.
                let in_trigger = seen.first().is_some_and(|w| w == "CREATE")
                    && seen.iter().take(4).any(|w| w == "TRIGGER");
                let closes_trigger = matches!(
                    seen.as_slice(),
                    [.., semi, end] if semi == ";" && end == "END"
                );

                if in_trigger && !closes_trigger {
                    seen.push(";".into());
                    continue;
                }

                let end = byte_offset(sql, span.start.line, span.start.column);
                push_statement(&mut statements, &sql[start..end]);
                start = end + 1;
                seen.clear();
            }
            Token::Word(word) => seen.push(word.value.to_uppercase()),
            other => seen.push(other.to_string()),
        }
    }
    push_statement(&mut statements, &sql[start.min(sql.len())..]);

    if statements.is_empty() {
        return Err(ParseError::EmptyQuery);
    }
    Ok(statements)
}

fn push_statement(statements: &mut Vec<(StatementKind, String)>, text: &str) {
    let text = text.trim();
    if !text.is_empty() {
        statements.push((StatementKind::classify(text), text.to_string()));
    }
}

/// Byte offset of a 1-based tokenizer location.
fn byte_offset(sql: &str, line: u64, column: u64) -> usize {
    let line_start: usize = sql
        .split_inclusive('\n')
        .take(line.saturating_sub(1) as usize)
        .map(str::len)
        .sum();

    sql[line_start..]
        .char_indices()
        .nth(column.saturating_sub(1) as usize)
        .map_or(sql.len(), |(i, _)| line_start + i)
}
