//! Uniform operation results
//!
//! Callers never get a bare `Result` from the record store. Every operation
//! answers with a [`ResultEnvelope`] (or a [`TransactionBatch`] for grouped
//! statements) whose JSON shape is stable across engines.

use super::error::{DatabaseError, ErrorKind};
use super::value::{DatabaseResult, DatabaseValue};
use serde::{Deserialize, Serialize};

/// Outcome of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Status {
    /// Statement ran
    Success,
    /// Statement was rejected or never built
    Error,
    /// Statement was built and returned without running
    QueryOnly,
}

/// Payload of a successful operation
///
/// Serialized untagged, so counts and numeric identities share one JSON
/// form; the envelopes are written, never read back.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(untagged)]
pub enum QueryResult {
    /// Nothing to report (errors, query-only runs)
    #[default]
    None,
    /// Rows of a read
    Rows(DatabaseResult),
    /// Identity value assigned by an insert
    Identity(DatabaseValue),
    /// Affected rows, or the row count when rows were not requested
    Count(u64),
}

impl QueryResult {
    /// Rows, if this result carries any
    pub fn rows(&self) -> Option<&DatabaseResult> {
        match self {
            QueryResult::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    /// Identity value, if this result carries one
    pub fn identity(&self) -> Option<&DatabaseValue> {
        match self {
            QueryResult::Identity(value) => Some(value),
            _ => None,
        }
    }

    /// Count, if this result carries one
    pub fn count(&self) -> Option<u64> {
        match self {
            QueryResult::Count(n) => Some(*n),
            _ => None,
        }
    }
}

/// Result of one CRUD operation or raw query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultEnvelope {
    /// Statement text, empty when the operation failed before building one
    pub query: String,
    /// Outcome
    pub status: Status,
    /// Human-readable problems
    pub errors: Vec<String>,
    /// Payload
    pub result: QueryResult,
    #[serde(skip)]
    error_kind: Option<ErrorKind>,
}

impl ResultEnvelope {
    /// Successful run of `query`
    pub fn success(query: impl Into<String>, result: QueryResult) -> Self {
        Self {
            query: query.into(),
            status: Status::Success,
            errors: Vec::new(),
            result,
            error_kind: None,
        }
    }

    /// `query` was built but not sent
    pub fn query_only(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            status: Status::QueryOnly,
            errors: Vec::new(),
            result: QueryResult::None,
            error_kind: None,
        }
    }

    /// Failure while building or running `query`
    pub fn failure(query: impl Into<String>, error: &DatabaseError) -> Self {
        Self {
            query: query.into(),
            status: Status::Error,
            errors: error.messages(),
            result: QueryResult::None,
            error_kind: Some(error.kind()),
        }
    }

    /// True when the statement ran
    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// Classification of the failure, `None` unless `status` is `Error`
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error_kind
    }

    /// Rows of a successful read
    pub fn rows(&self) -> Option<&DatabaseResult> {
        self.result.rows()
    }
}

/// Result of a statement batch run as one transaction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionBatch {
    /// Statements in the order they were attempted
    pub queries: Vec<String>,
    /// `Success` only if every statement ran and the batch committed
    pub status: Status,
    /// Failing statement texts, or the bookkeeping error
    pub errors: Vec<String>,
    /// One result per statement after a commit
    pub results: Vec<QueryResult>,
    #[serde(skip)]
    error_kind: Option<ErrorKind>,
}

impl TransactionBatch {
    /// Committed batch
    pub fn committed(queries: Vec<String>, results: Vec<QueryResult>) -> Self {
        Self {
            queries,
            status: Status::Success,
            errors: Vec::new(),
            results,
            error_kind: None,
        }
    }

    /// Rolled back because of the listed statements
    pub fn rolled_back(queries: Vec<String>, failed: Vec<String>) -> Self {
        Self {
            queries,
            status: Status::Error,
            errors: failed,
            results: Vec::new(),
            error_kind: Some(ErrorKind::Execution),
        }
    }

    /// The batch could not be run at all
    pub fn failure(queries: Vec<String>, error: &DatabaseError) -> Self {
        Self {
            queries,
            status: Status::Error,
            errors: error.messages(),
            results: Vec::new(),
            error_kind: Some(error.kind()),
        }
    }

    /// True when the batch committed
    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// Classification of the failure
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error_kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_json_shape() {
        let env = ResultEnvelope::success("INSERT ...", QueryResult::Identity(DatabaseValue::Long(12)));
        assert_eq!(
            serde_json::to_value(&env).unwrap(),
            json!({"query": "INSERT ...", "status": "success", "errors": [], "result": 12})
        );

        let env = ResultEnvelope::query_only("DELETE ...");
        assert_eq!(serde_json::to_value(&env).unwrap()["status"], "queryOnly");
        assert_eq!(serde_json::to_value(&env).unwrap()["result"], json!(null));
    }

    #[test]
    fn test_counts_and_identities_share_json_form() {
        let count = serde_json::to_value(QueryResult::Count(1)).unwrap();
        let identity = serde_json::to_value(QueryResult::Identity(DatabaseValue::Long(1))).unwrap();
        assert_eq!(count, json!(1));
        assert_eq!(identity, count);
        assert_ne!(QueryResult::Count(1), QueryResult::Identity(DatabaseValue::Long(1)));
    }

    #[test]
    fn test_failure_carries_kind_and_messages() {
        let err = DatabaseError::validation(vec!["a".into(), "b".into()]);
        let env = ResultEnvelope::failure("", &err);
        assert_eq!(env.status, Status::Error);
        assert_eq!(env.errors, vec!["a", "b"]);
        assert_eq!(env.error_kind(), Some(ErrorKind::Validation));
        assert!(!env.is_success());
    }

    #[test]
    fn test_batch_json_shape() {
        let batch = TransactionBatch::rolled_back(
            vec!["ok".into(), "bad".into()],
            vec!["bad".into()],
        );
        assert_eq!(
            serde_json::to_value(&batch).unwrap(),
            json!({"queries": ["ok", "bad"], "status": "error", "errors": ["bad"], "results": []})
        );
    }
}
