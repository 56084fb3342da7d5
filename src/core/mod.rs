//! Core record access types and traits
//!
//! Everything engine-independent lives here: configuration, the connection
//! traits, schema discovery, value formatting, statement building and the
//! [`RecordStore`] that ties them together.

pub mod config;
pub mod database;
pub mod database_types;
pub mod envelope;
pub mod error;
pub mod executor;
pub mod formatter;
pub mod query_builder;
pub mod record;
pub mod schema;
pub mod store;
pub mod transaction;
pub mod value;

// Re-export commonly used types
pub use config::{ConnectionBuilder, DatabaseConfig};
pub use database::{Connector, Database};
pub use database_types::DatabaseType;
pub use envelope::{QueryResult, ResultEnvelope, Status, TransactionBatch};
pub use error::{DatabaseError, ErrorKind, Result};
pub use formatter::{FormattedValue, TypeClass, ValueFormatter};
pub use query_builder::{
    BoundStatement, DeleteBuilder, InsertBuilder, OrderDirection, SelectBuilder, SqlValue,
    UpdateBuilder,
};
pub use record::RecordBuilder;
pub use schema::{ColumnSpec, SchemaCatalog, TableSchema};
pub use store::{KeyValue, OrderBy, QueryOptions, RecordStore, TableModel};
pub use transaction::{Statements, TransactionExecutor};
pub use value::{DatabaseResult, DatabaseRow, DatabaseValue, RecordPayload};
