//! SQL dialects
//!
//! A dialect captures everything that differs between engines when the record
//! layer writes SQL: identifier quoting, literal escaping, which declared types
//! take quoted values, how the column metadata is fetched and decoded, and how
//! the identity value of a fresh insert is read back. The statement builders
//! and the record store never branch on the engine themselves.

mod mysql;
mod postgres;
mod sqlite;
mod sqlserver;

pub use mysql::MysqlDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;
pub use sqlserver::SqlServerDialect;

use crate::core::schema::ColumnSpec;
use crate::core::value::{DatabaseRow, DatabaseValue};

/// Column alias carrying the identity value in a trailing identity SELECT
pub const IDENTITY_ALIAS: &str = "AddedIdentity";

/// Column alias carrying an affected-row count read back with a SELECT
pub const AFFECTED_ALIAS: &str = "AffectedRows";

/// How a dialect reads back the identity value assigned by an INSERT
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityRetrieval {
    /// Ask the connection after the statement ran (`insert_id`, `last_insert_rowid`)
    LastInsertId,
    /// Send the INSERT and this SELECT in one batch and read [`IDENTITY_ALIAS`]
    TrailingSelect(&'static str),
    /// Append `RETURNING <identity column>` to the INSERT
    Returning,
}

/// Engine-specific SQL syntax
pub trait SqlDialect: Send + Sync + std::fmt::Debug {
    /// Short engine name, matching [`DatabaseType::to_str`](crate::core::DatabaseType::to_str)
    fn name(&self) -> &'static str;

    /// Quote an identifier, doubling any embedded closing quote character
    fn quote_ident(&self, ident: &str) -> String;

    /// Escape text for use inside a single-quoted literal
    fn escape_literal(&self, raw: &str) -> String;

    /// Declared types (normalized) whose values are written as quoted literals
    fn quoted_types(&self) -> &'static [&'static str];

    /// Statement returning one row per column of `table`
    fn column_info_query(&self, table: &str) -> String;

    /// Decode the rows of [`column_info_query`](Self::column_info_query)
    fn parse_columns(&self, rows: &[DatabaseRow]) -> Vec<ColumnSpec>;

    /// Identity read-back mechanism
    fn identity_retrieval(&self) -> IdentityRetrieval;

    /// Whether INSERT/UPDATE/DELETE name columns as `table.column`
    fn qualifies_columns(&self) -> bool;

    /// Marker for the `index`-th bound parameter, counting from 1
    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    /// Whether one failed statement poisons the rest of a transaction, so each
    /// statement of a batch has to run under its own savepoint
    fn isolates_statement_failures(&self) -> bool {
        false
    }

    /// INSERT for a row where every column takes its default
    fn empty_insert(&self, table: &str) -> String {
        format!("INSERT INTO {} DEFAULT VALUES", self.quote_ident(table))
    }

    /// True when values for `declared_type` are quoted
    fn quotes_type(&self, declared_type: &str) -> bool {
        let normalized = normalize_type(declared_type);
        self.quoted_types().contains(&normalized.as_str())
    }

    /// Column reference used in data-modifying statements
    fn column_ref(&self, table: &str, column: &str) -> String {
        if self.qualifies_columns() {
            format!("{}.{}", self.quote_ident(table), self.quote_ident(column))
        } else {
            self.quote_ident(column)
        }
    }

    /// Escape and single-quote a text literal
    fn quote_literal(&self, raw: &str) -> String {
        format!("'{}'", self.escape_literal(raw))
    }
}

/// Lower-case a declared type and drop length/precision qualifiers
///
/// `VARCHAR(255)` becomes `varchar`, `int(11) unsigned` becomes `int unsigned`.
pub fn normalize_type(declared: &str) -> String {
    let mut out = String::with_capacity(declared.len());
    let mut depth = 0usize;
    for ch in declared.chars() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(ch),
            _ => {}
        }
    }
    out.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// True when the opening parenthesis is matched by the final character
fn encloses_whole(value: &str) -> bool {
    if !value.starts_with('(') || !value.ends_with(')') {
        return false;
    }
    let mut depth = 0usize;
    let mut quoted = false;
    for (idx, ch) in value.char_indices() {
        match ch {
            '\'' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted => {
                depth -= 1;
                if depth == 0 {
                    return idx == value.len() - 1;
                }
            }
            _ => {}
        }
    }
    false
}

/// Strip the decoration engines put around declared defaults
///
/// Handles SQL Server's `((0))` / `('abc')`, PostgreSQL's `'abc'::character varying`
/// and MariaDB's quoted literals. A bare `NULL` default means no default.
pub fn unquote_default(raw: &str) -> Option<String> {
    let mut value = raw.trim();
    while encloses_whole(value) {
        value = value[1..value.len() - 1].trim();
    }

    if let Some(rest) = value.strip_prefix('\'') {
        let mut literal = String::new();
        let mut chars = rest.chars().peekable();
        while let Some(ch) = chars.next() {
            if ch == '\'' {
                if chars.peek() == Some(&'\'') {
                    chars.next();
                    literal.push('\'');
                    continue;
                }
                break;
            }
            literal.push(ch);
        }
        return Some(literal);
    }

    let value = match value.find("::") {
        Some(idx) => value[..idx].trim(),
        None => value,
    };

    if value.is_empty() || value.eq_ignore_ascii_case("null") {
        None
    } else {
        Some(value.to_string())
    }
}

/// Wrap `ident` in `open`/`close`, doubling every embedded `close`
pub(crate) fn wrap_ident(ident: &str, open: char, close: char) -> String {
    let mut out = String::with_capacity(ident.len() + 2);
    out.push(open);
    for ch in ident.chars() {
        if ch == close {
            out.push(close);
        }
        out.push(ch);
    }
    out.push(close);
    out
}

fn lookup<'a>(row: &'a DatabaseRow, key: &str) -> Option<&'a DatabaseValue> {
    row.get(key).or_else(|| {
        row.iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value)
    })
}

/// Text value of a metadata column, `None` when missing or NULL
pub(crate) fn text(row: &DatabaseRow, key: &str) -> Option<String> {
    lookup(row, key).and_then(DatabaseValue::to_raw_text)
}

/// Boolean metadata flag; accepts `1`, `true` and `YES`
pub(crate) fn flag(row: &DatabaseRow, key: &str) -> bool {
    match lookup(row, key) {
        Some(DatabaseValue::String(s)) => {
            matches!(s.trim().to_lowercase().as_str(), "1" | "true" | "yes")
        }
        Some(other) => other.as_bool().unwrap_or(false),
        None => false,
    }
}
