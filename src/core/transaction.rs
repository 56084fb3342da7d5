//! Grouped statement execution
//!
//! A batch runs inside one transaction on one connection. Every statement is
//! attempted even after an earlier one failed, so the caller learns about all
//! bad statements at once; any failure rolls the whole batch back.

use super::database::Database;
use super::envelope::{QueryResult, TransactionBatch};
use super::error::{DatabaseError, Result};
use super::executor::StatementRunner;
use crate::dialect::SqlDialect;
use tracing::{debug, warn};

/// Ordered statements of one batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Statements(Vec<String>);

impl Statements {
    /// Statement texts in order
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Number of statements
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when there is nothing to run
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Take the statement texts
    pub fn into_inner(self) -> Vec<String> {
        self.0
    }
}

impl From<&str> for Statements {
    fn from(sql: &str) -> Self {
        Statements(vec![sql.to_string()])
    }
}

impl From<String> for Statements {
    fn from(sql: String) -> Self {
        Statements(vec![sql])
    }
}

impl From<Vec<String>> for Statements {
    fn from(sql: Vec<String>) -> Self {
        Statements(sql)
    }
}

impl From<Vec<&str>> for Statements {
    fn from(sql: Vec<&str>) -> Self {
        Statements(sql.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for Statements {
    fn from(sql: &[&str]) -> Self {
        Statements(sql.iter().map(|s| s.to_string()).collect())
    }
}

impl From<&[String]> for Statements {
    fn from(sql: &[String]) -> Self {
        Statements(sql.to_vec())
    }
}

impl<const N: usize> From<[&str; N]> for Statements {
    fn from(sql: [&str; N]) -> Self {
        Statements(sql.iter().map(|s| s.to_string()).collect())
    }
}

/// Runs statement batches atomically on an open connection
pub struct TransactionExecutor<'a> {
    runner: StatementRunner<'a>,
    dialect: &'static dyn SqlDialect,
}

impl<'a> TransactionExecutor<'a> {
    /// Create an executor over an open connection
    pub fn new(db: &'a dyn Database, dialect: &'static dyn SqlDialect) -> Self {
        Self {
            runner: StatementRunner::new(db, dialect),
            dialect,
        }
    }

    /// Run `statements` as one unit
    ///
    /// On success the batch carries one result per statement. On failure it
    /// carries the texts of the statements that failed and nothing was
    /// committed.
    pub async fn run(&self, statements: Statements, result_as_array: bool) -> TransactionBatch {
        let queries = statements.into_inner();
        match self.run_inner(&queries, result_as_array).await {
            Ok(Ok(results)) => TransactionBatch::committed(queries, results),
            Ok(Err(failed)) => TransactionBatch::rolled_back(queries, failed),
            Err(err) => TransactionBatch::failure(queries, &err),
        }
    }

    async fn run_inner(
        &self,
        queries: &[String],
        result_as_array: bool,
    ) -> Result<std::result::Result<Vec<QueryResult>, Vec<String>>> {
        let db = self.runner.database();
        db.begin_transaction().await?;

        let mut results = Vec::with_capacity(queries.len());
        let mut failed = Vec::new();

        for (index, sql) in queries.iter().enumerate() {
            match self.attempt(index, sql, result_as_array).await {
                Ok(result) => results.push(result),
                Err(err) => {
                    warn!(sql = %sql, error = %err, "statement failed inside transaction");
                    failed.push(sql.clone());
                }
            }
        }

        if failed.is_empty() {
            db.commit().await?;
            debug!(statements = queries.len(), "transaction committed");
            Ok(Ok(results))
        } else {
            if let Err(err) = db.rollback().await {
                return Err(DatabaseError::transaction(format!(
                    "rollback after {} failed statement(s) did not complete: {}",
                    failed.len(),
                    err
                )));
            }
            warn!(failed = failed.len(), "transaction rolled back");
            Ok(Err(failed))
        }
    }

    /// Run one statement, fencing it with a savepoint where the engine
    /// aborts the whole transaction on the first error
    async fn attempt(&self, index: usize, sql: &str, result_as_array: bool) -> Result<QueryResult> {
        if !self.dialect.isolates_statement_failures() {
            return self.runner.run(sql, result_as_array).await;
        }

        let db = self.runner.database();
        let savepoint = format!("batch_stmt_{}", index + 1);
        db.execute(&format!("SAVEPOINT {savepoint}")).await?;
        match self.runner.run(sql, result_as_array).await {
            Ok(result) => {
                db.execute(&format!("RELEASE SAVEPOINT {savepoint}")).await?;
                Ok(result)
            }
            Err(err) => {
                db.execute(&format!("ROLLBACK TO SAVEPOINT {savepoint}")).await?;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_conversions() {
        assert_eq!(Statements::from("SELECT 1").len(), 1);
        assert_eq!(Statements::from(["a", "b", "c"]).len(), 3);
        assert_eq!(
            Statements::from(vec!["a".to_string(), "b".to_string()]).as_slice(),
            &["a".to_string(), "b".to_string()]
        );
        assert!(Statements::default().is_empty());
    }
}
