//! # Rust Record Access
//!
//! A schema-driven record access layer. Callers hand over a table name and a
//! map of field values; the crate reads the table's column metadata, checks
//! and formats every value against its declared type, writes the statement
//! for the configured engine and reports the outcome in a uniform
//! [`ResultEnvelope`].
//!
//! ## Features
//!
//! - **No hand-written SQL**: get, list, add, edit and delete by table name
//! - **Validation before execution**: invalid values are reported per field
//!   and nothing is sent to the database
//! - **Engine dialects**: quoting, escaping, metadata queries and identity
//!   retrieval per engine
//! - **Atomic batches**: several raw statements in one transaction
//! - **Query-only mode**: build a statement without running it
//! - **Bound values**: validated values are sent as statement parameters while
//!   the envelope reports the statement with its literals written out
//!
//! ## Supported Databases
//!
//! | Database | Cargo feature | Driver |
//! |----------|---------------|--------|
//! | SQLite | `sqlite` (default) | rusqlite, bundled |
//! | PostgreSQL | `postgres` | tokio-postgres |
//! | MySQL/MariaDB | `mysql` | mysql_async |
//! | SQL Server | `mssql` | tiberius |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rust_record_access::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let store = RecordStore::new(DatabaseConfig::sqlite("listings.db"))?;
//!
//!     let mut listing = RecordPayload::new();
//!     listing.insert("title".into(), "Corner lot".into());
//!     listing.insert("listed_on".into(), "12/31/2020".into());
//!
//!     let added = store.add_record("listings", &listing, false).await;
//!     if let Some(id) = added.result.identity().cloned() {
//!         let found = store.get_specific("listings", id, &QueryOptions::new()).await;
//!         println!("{}", serde_json::to_string(&found).unwrap_or_default());
//!     } else {
//!         eprintln!("{:?}", added.errors);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Project Structure
//!
//! ```text
//! src/
//! ├── core/            # Engine-independent record layer
//! │   ├── config.rs    # DatabaseConfig, connection strings
//! │   ├── schema.rs    # Column metadata and the schema catalog
//! │   ├── formatter.rs # Per-type value validation and literals
//! │   ├── record.rs    # INSERT/UPDATE value lists
//! │   ├── store.rs     # RecordStore CRUD operations
//! │   └── ...
//! ├── dialect/         # Per-engine SQL syntax
//! └── backends/        # Driver implementations of Database
//! ```

/// Core record access types and traits
pub mod core;

/// Database backend implementations
pub mod backends;

/// Per-engine SQL syntax
pub mod dialect;

/// Prelude for convenient imports
///
/// ```rust
/// use rust_record_access::prelude::*;
///
/// let config = DatabaseConfig::new(DatabaseType::Mysql).host("localhost");
/// assert!(config.validate().is_ok());
/// ```
pub mod prelude {
    pub use crate::core::{
        Database, DatabaseConfig, DatabaseError, DatabaseResult, DatabaseRow, DatabaseType,
        DatabaseValue, ErrorKind, KeyValue, OrderDirection, QueryOptions, QueryResult,
        RecordPayload, RecordStore, Result, ResultEnvelope, Status, TableModel, TransactionBatch,
    };

    #[cfg(feature = "sqlite")]
    pub use crate::backends::SqliteDatabase;
}

// Re-export at root level for convenience
pub use core::{
    Database, DatabaseConfig, DatabaseError, DatabaseResult, DatabaseRow, DatabaseType,
    DatabaseValue, ErrorKind, KeyValue, QueryOptions, RecordPayload, RecordStore, Result,
    ResultEnvelope, Status, TransactionBatch,
};

#[cfg(feature = "sqlite")]
pub use backends::SqliteDatabase;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prelude_imports() {
        use prelude::*;

        let db_type = DatabaseType::Sqlite;
        assert_eq!(db_type.to_str(), "sqlite");
        assert_eq!(db_type.dialect().name(), "sqlite");
    }

    #[test]
    fn test_value_conversions() {
        use prelude::*;

        let val: DatabaseValue = 42.into();
        assert_eq!(val.as_long(), Some(42));

        let val: DatabaseValue = "test".into();
        assert_eq!(val.as_string(), "test");

        let val: DatabaseValue = true.into();
        assert_eq!(val.as_bool(), Some(true));
    }
}
