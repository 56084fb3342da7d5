//! Error types for the record access layer
//!
//! Every failure a CRUD operation can hit is one of these variants. Operations
//! never return them directly to callers; they are folded into the
//! [`ResultEnvelope`](super::envelope::ResultEnvelope) `errors` list together
//! with their [`ErrorKind`].

use serde::{Deserialize, Serialize};

/// Result type alias for database operations
pub type Result<T> = std::result::Result<T, DatabaseError>;

/// Broad classification of a failure, stable across drivers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// The store could not be reached
    Connection,
    /// Unknown table, table without columns, or no resolvable key
    Schema,
    /// One or more field values were rejected by the value formatter
    Validation,
    /// A statement was sent and the store rejected it
    Execution,
    /// BEGIN/COMMIT/ROLLBACK bookkeeping failed
    Transaction,
    /// Invalid or incomplete configuration
    Configuration,
}

/// Error types for database operations
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// Connection error
    #[error("Connect Error: {0}")]
    ConnectionError(String),

    /// Schema lookup or key resolution failed
    #[error("{0}")]
    SchemaError(String),

    /// Field validation failed; every offending field is listed
    #[error("{}", .0.join(" "))]
    ValidationError(Vec<String>),

    /// Statement rejected by the store
    #[error("Query execution failed: {0}")]
    ExecutionError(String),

    /// Transaction error
    #[error("Transaction error: {0}")]
    TransactionError(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unsupported operation
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Several independent failures found while preparing one statement
    #[error("{}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join(" "))]
    Multiple(Vec<DatabaseError>),
}

impl DatabaseError {
    /// Create a new connection error
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        DatabaseError::ConnectionError(msg.into())
    }

    /// Create a new schema error
    pub fn schema<S: Into<String>>(msg: S) -> Self {
        DatabaseError::SchemaError(msg.into())
    }

    /// Create a validation error from the collected field messages
    pub fn validation(messages: Vec<String>) -> Self {
        DatabaseError::ValidationError(messages)
    }

    /// Create a new execution error
    pub fn execution<S: Into<String>>(msg: S) -> Self {
        DatabaseError::ExecutionError(msg.into())
    }

    /// Create a new transaction error
    pub fn transaction<S: Into<String>>(msg: S) -> Self {
        DatabaseError::TransactionError(msg.into())
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        DatabaseError::InvalidConfig(msg.into())
    }

    /// Create a new unsupported operation error
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        DatabaseError::UnsupportedOperation(msg.into())
    }

    /// Combine two errors, keeping `self` as the leading one
    pub fn merge(self, other: DatabaseError) -> Self {
        let mut errors = match self {
            DatabaseError::Multiple(errors) => errors,
            single => vec![single],
        };
        match other {
            DatabaseError::Multiple(more) => errors.extend(more),
            single => errors.push(single),
        }
        DatabaseError::Multiple(errors)
    }

    /// Classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            DatabaseError::ConnectionError(_) => ErrorKind::Connection,
            DatabaseError::SchemaError(_) => ErrorKind::Schema,
            DatabaseError::ValidationError(_) => ErrorKind::Validation,
            DatabaseError::ExecutionError(_) => ErrorKind::Execution,
            DatabaseError::TransactionError(_) => ErrorKind::Transaction,
            DatabaseError::InvalidConfig(_) | DatabaseError::UnsupportedOperation(_) => {
                ErrorKind::Configuration
            }
            DatabaseError::Multiple(errors) => errors
                .first()
                .map(DatabaseError::kind)
                .unwrap_or(ErrorKind::Execution),
        }
    }

    /// Human-readable messages, one per underlying problem
    pub fn messages(&self) -> Vec<String> {
        match self {
            DatabaseError::ValidationError(messages) => messages.clone(),
            DatabaseError::Multiple(errors) => {
                errors.iter().flat_map(DatabaseError::messages).collect()
            }
            other => vec![other.to_string()],
        }
    }
}
