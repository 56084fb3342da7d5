//! Statement execution
//!
//! One primitive runs a statement and shapes its outcome into a
//! [`QueryResult`]: rows for reads, the identity value for inserts, an
//! affected-row count otherwise. CRUD operations, raw queries and
//! transaction batches all go through it. Statements carrying parameters go
//! to the `*_with_params` entry points of the connection.

use super::database::Database;
use super::envelope::QueryResult;
use super::error::Result;
use super::query_builder::BoundStatement;
use super::value::{DatabaseResult, DatabaseValue};
use crate::dialect::{IdentityRetrieval, SqlDialect, AFFECTED_ALIAS, IDENTITY_ALIAS};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static INSERT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\s*INSERT\s").expect("valid pattern"));
static ROW_RETURNING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*\(?\s*(SELECT|WITH|SHOW|PRAGMA|EXEC|EXECUTE|VALUES|DESCRIBE|DESC|EXPLAIN)\b")
        .expect("valid pattern")
});
static RETURNING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bRETURNING\b").expect("valid pattern"));

/// True for statements that start with `INSERT`
pub fn is_insert(sql: &str) -> bool {
    INSERT.is_match(sql)
}

/// True for statements expected to produce a result set
pub fn returns_rows(sql: &str) -> bool {
    ROW_RETURNING.is_match(sql) || RETURNING.is_match(sql)
}

/// What the caller knows about the identity column of an INSERT's table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityHint<'a> {
    /// Unknown; raw statement text
    Infer,
    /// The table has no identity column
    Absent,
    /// The table's identity column; the INSERT already carries
    /// `RETURNING` for it where the dialect needs that
    Column(&'a str),
}

/// Runs statements on one open connection
pub struct StatementRunner<'a> {
    db: &'a dyn Database,
    dialect: &'static dyn SqlDialect,
}

impl<'a> StatementRunner<'a> {
    /// Create a runner over an open connection
    pub fn new(db: &'a dyn Database, dialect: &'static dyn SqlDialect) -> Self {
        Self { db, dialect }
    }

    /// Connection the runner executes on
    pub fn database(&self) -> &'a dyn Database {
        self.db
    }

    /// Run one statement of unknown shape
    ///
    /// Reads yield their rows when `result_as_array` is set and their row
    /// count otherwise.
    pub async fn run(&self, sql: &str, result_as_array: bool) -> Result<QueryResult> {
        let statement = BoundStatement::raw(sql);
        if is_insert(sql) {
            return self.run_insert(&statement, IdentityHint::Infer).await;
        }
        if returns_rows(sql) {
            let rows = self.query(&statement).await?;
            return Ok(if result_as_array {
                QueryResult::Rows(rows)
            } else {
                QueryResult::Count(rows.len() as u64)
            });
        }
        debug!(sql, "executing statement");
        Ok(QueryResult::Count(self.execute(&statement).await?))
    }

    /// Run a SELECT and return its rows
    pub async fn query(&self, statement: &BoundStatement) -> Result<DatabaseResult> {
        debug!(sql = %statement.sql, params = statement.params.len(), "running query");
        self.fetch(&statement.sql, &statement.params).await
    }

    /// Run a statement that returns no rows and report the affected row count
    pub async fn execute(&self, statement: &BoundStatement) -> Result<u64> {
        debug!(sql = %statement.sql, params = statement.params.len(), "executing statement");
        if statement.is_bound() {
            self.db.execute_with_params(&statement.sql, &statement.params).await
        } else {
            self.db.execute(&statement.sql).await
        }
    }

    async fn fetch(&self, sql: &str, params: &[DatabaseValue]) -> Result<DatabaseResult> {
        if params.is_empty() {
            self.db.query(sql).await
        } else {
            self.db.query_with_params(sql, params).await
        }
    }

    /// Run an INSERT and read back the identity it produced
    pub async fn run_insert(&self, statement: &BoundStatement, hint: IdentityHint<'_>) -> Result<QueryResult> {
        let sql = statement.sql.as_str();
        debug!(sql, params = statement.params.len(), "executing insert");

        if hint == IdentityHint::Absent {
            return Ok(QueryResult::Count(self.execute(statement).await?));
        }

        match self.dialect.identity_retrieval() {
            IdentityRetrieval::LastInsertId => {
                let affected = self.execute(statement).await?;
                match self.db.last_insert_id().await? {
                    Some(id) if id > 0 && affected > 0 => {
                        Ok(QueryResult::Identity(DatabaseValue::Long(id)))
                    }
                    _ => Ok(QueryResult::Count(affected)),
                }
            }
            IdentityRetrieval::TrailingSelect(select) => {
                let rows = self
                    .fetch(&format!("{sql}; {select}"), &statement.params)
                    .await?;
                let row = rows.iter().find(|row| row.contains_key(IDENTITY_ALIAS));
                match row.and_then(|row| row.get(IDENTITY_ALIAS)) {
                    Some(id) if !id.is_null() => Ok(QueryResult::Identity(id.clone())),
                    _ => Ok(QueryResult::Count(
                        row.and_then(|row| row.get(AFFECTED_ALIAS))
                            .and_then(DatabaseValue::as_long)
                            .map_or(0, |n| n.max(0) as u64),
                    )),
                }
            }
            IdentityRetrieval::Returning if RETURNING.is_match(sql) => {
                let mut rows = self.query(statement).await?;
                if rows.len() != 1 {
                    return Ok(QueryResult::Rows(rows));
                }
                let mut row = rows.remove(0);
                let value = match hint {
                    IdentityHint::Column(column) => row.remove(column),
                    _ if row.len() == 1 => row.into_values().next(),
                    _ => return Ok(QueryResult::Rows(vec![row])),
                };
                Ok(value.map_or(QueryResult::Count(1), QueryResult::Identity))
            }
            IdentityRetrieval::Returning => Ok(QueryResult::Count(self.execute(statement).await?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_classification() {
        assert!(is_insert("  insert into t values (1)"));
        assert!(!is_insert("SELECT 'INSERT INTO' AS x"));

        assert!(returns_rows("select 1"));
        assert!(returns_rows("WITH x AS (SELECT 1) SELECT * FROM x"));
        assert!(returns_rows("PRAGMA table_info(\"t\")"));
        assert!(returns_rows("SHOW COLUMNS FROM `t`"));
        assert!(returns_rows("DELETE FROM t RETURNING id"));
        assert!(!returns_rows("UPDATE t SET a = 1"));
        assert!(!returns_rows("DELETE FROM t WHERE returning_customer = 1"));
    }
}
