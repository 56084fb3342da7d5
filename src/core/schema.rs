//! Table metadata
//!
//! [`SchemaCatalog`] asks the live database which columns a table has. Results
//! are fresh on every call unless the store was configured with
//! `cache_schema`, in which case each table is looked up once and kept until
//! [`SchemaCatalog::invalidate`] or [`SchemaCatalog::clear`] drops it.

use super::database::Database;
use super::error::{DatabaseError, Result};
use crate::dialect::{normalize_type, SqlDialect};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// One column as reported by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Column name, as the engine spells it
    pub name: String,
    /// Lower-cased type name without length/precision qualifiers
    pub declared_type: String,
    /// Whether NULL is accepted
    pub nullable: bool,
    /// Whether the engine assigns the value (auto increment, IDENTITY, serial)
    pub is_identity: bool,
    /// Whether the column belongs to the primary key
    pub is_primary_key: bool,
    /// Declared default with engine decoration removed
    pub default_value: Option<String>,
}

impl ColumnSpec {
    /// Create a nullable, non-key column without default
    pub fn new(name: impl Into<String>, declared_type: &str) -> Self {
        Self {
            name: name.into(),
            declared_type: normalize_type(declared_type),
            nullable: true,
            is_identity: false,
            is_primary_key: false,
            default_value: None,
        }
    }

    /// Set nullability
    #[must_use]
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Mark the column as engine-assigned
    #[must_use]
    pub fn identity(mut self, is_identity: bool) -> Self {
        self.is_identity = is_identity;
        self
    }

    /// Mark the column as part of the primary key
    #[must_use]
    pub fn primary_key(mut self, is_primary_key: bool) -> Self {
        self.is_primary_key = is_primary_key;
        self
    }

    /// Set the declared default
    #[must_use]
    pub fn default_value(mut self, default_value: Option<String>) -> Self {
        self.default_value = default_value;
        self
    }
}

/// Ordered column list of one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name
    pub table: String,
    /// Columns in declaration order
    pub columns: Vec<ColumnSpec>,
}

impl TableSchema {
    /// Create a schema from already-decoded columns
    pub fn new(table: impl Into<String>, columns: Vec<ColumnSpec>) -> Self {
        Self {
            table: table.into(),
            columns,
        }
    }

    /// Look up a column by exact name
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Column names in declaration order
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Columns that identify a row when the caller names none:
    /// the primary key, else the identity columns
    pub fn key_columns(&self) -> Vec<&ColumnSpec> {
        let primary: Vec<&ColumnSpec> = self.columns.iter().filter(|c| c.is_primary_key).collect();
        if !primary.is_empty() {
            return primary;
        }
        self.columns.iter().filter(|c| c.is_identity).collect()
    }

    /// First engine-assigned column, if any
    pub fn identity_column(&self) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.is_identity)
    }
}

/// Message used whenever a table cannot be described
pub(crate) fn missing_table_message(table: &str) -> String {
    format!(
        "Error calling function in database.  Most likely wrong table name passed ({table}), \
         or that table doesn't exist, or the table exists and has no fields."
    )
}

/// Live column introspection with an optional per-table cache
#[derive(Debug)]
pub struct SchemaCatalog {
    dialect: &'static dyn SqlDialect,
    cache: Option<Mutex<HashMap<String, TableSchema>>>,
}

impl SchemaCatalog {
    /// Create a catalog; `cache_schema` turns on memoization
    pub fn new(dialect: &'static dyn SqlDialect, cache_schema: bool) -> Self {
        Self {
            dialect,
            cache: cache_schema.then(|| Mutex::new(HashMap::new())),
        }
    }

    /// Whether lookups are memoized
    pub fn is_caching(&self) -> bool {
        self.cache.is_some()
    }

    /// Describe `table` using the open connection `db`
    pub async fn column_information(&self, db: &dyn Database, table: &str) -> Result<TableSchema> {
        if let Some(cache) = &self.cache {
            if let Some(schema) = cache.lock().get(table) {
                return Ok(schema.clone());
            }
        }

        let sql = self.dialect.column_info_query(table);
        debug!(table, sql = %sql, "loading column metadata");

        let rows = match db.query(&sql).await {
            Ok(rows) => rows,
            Err(DatabaseError::ExecutionError(reason)) => {
                debug!(table, %reason, "metadata query rejected");
                return Err(DatabaseError::schema(missing_table_message(table)));
            }
            Err(other) => return Err(other),
        };

        let columns = self.dialect.parse_columns(&rows);
        if columns.is_empty() {
            return Err(DatabaseError::schema(missing_table_message(table)));
        }

        let schema = TableSchema::new(table, columns);
        if let Some(cache) = &self.cache {
            cache.lock().insert(table.to_string(), schema.clone());
        }
        Ok(schema)
    }

    /// Drop the cached schema of one table
    pub fn invalidate(&self, table: &str) {
        if let Some(cache) = &self.cache {
            cache.lock().remove(table);
        }
    }

    /// Drop every cached schema
    pub fn clear(&self) {
        if let Some(cache) = &self.cache {
            cache.lock().clear();
        }
    }

    /// Number of cached tables
    pub fn cached_tables(&self) -> usize {
        self.cache.as_ref().map_or(0, |cache| cache.lock().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing() -> TableSchema {
        TableSchema::new(
            "listing",
            vec![
                ColumnSpec::new("id", "INT(11)")
                    .nullable(false)
                    .identity(true),
                ColumnSpec::new("mls", "varchar(20)").nullable(false),
            ],
        )
    }

    #[test]
    fn test_identity_is_key_without_primary_key() {
        let schema = listing();
        let keys = schema.key_columns();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].name, "id");
        assert_eq!(schema.columns[0].declared_type, "int");
    }

    #[test]
    fn test_primary_key_wins_over_identity() {
        let mut schema = listing();
        schema.columns[1].is_primary_key = true;
        let keys = schema.key_columns();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].name, "mls");
    }

    #[test]
    fn test_no_key_columns() {
        let schema = TableSchema::new("log", vec![ColumnSpec::new("line", "text")]);
        assert!(schema.key_columns().is_empty());
        assert!(schema.identity_column().is_none());
        assert_eq!(schema.column_names(), vec!["line"]);
    }

    #[test]
    fn test_cache_disabled_by_default() {
        let catalog = SchemaCatalog::new(crate::core::DatabaseType::Sqlite.dialect(), false);
        assert!(!catalog.is_caching());
        catalog.invalidate("anything");
        assert_eq!(catalog.cached_tables(), 0);
    }
}
