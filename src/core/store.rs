//! Record store: the CRUD surface
//!
//! [`RecordStore`] is what calling code talks to. Each operation opens a
//! connection, describes the table, validates the caller's values, builds the
//! statement for the configured dialect, runs it (unless `query_only` is set)
//! and closes the connection again. Every outcome, including failures, comes
//! back as a [`ResultEnvelope`].
//!
//! The envelope reports the statement with its values written out as
//! literals; what reaches the connection is the same statement with the
//! validated values bound as parameters.

use super::config::DatabaseConfig;
use super::database::{Connector, Database};
use super::database_types::DatabaseType;
use super::envelope::{QueryResult, ResultEnvelope, TransactionBatch};
use super::error::{DatabaseError, Result};
use super::executor::{IdentityHint, StatementRunner};
use super::formatter::ValueFormatter;
use super::query_builder::{
    BoundStatement, DeleteBuilder, InsertBuilder, OrderDirection, SelectBuilder, SqlValue, UpdateBuilder,
};
use super::record::{ColumnLiterals, RecordBuilder};
use super::schema::{SchemaCatalog, TableSchema};
use super::transaction::{Statements, TransactionExecutor};
use super::value::{DatabaseValue, RecordPayload};
use crate::backends::DriverConnector;
use crate::dialect::{IdentityRetrieval, SqlDialect};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Single-field sort
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    /// Column to sort by
    pub field: String,
    /// Direction
    pub direction: OrderDirection,
}

/// Optional knobs shared by the read, update and delete operations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Column to match the key value against instead of the table's key
    pub specific_field: Option<String>,
    /// Sort of a read
    pub order_by: Option<OrderBy>,
    /// Projection of a read; empty means every column
    pub fields: Vec<String>,
    /// Raw condition for `get_all`; a leading `WHERE` is optional
    pub where_clause: Option<String>,
    /// Build the statement but do not run it
    pub query_only: bool,
}

impl QueryOptions {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Match the key against `field`
    #[must_use]
    pub fn specific_field(mut self, field: impl Into<String>) -> Self {
        self.specific_field = Some(field.into());
        self
    }

    /// Sort by `field`
    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, direction: OrderDirection) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    /// Select only these columns
    #[must_use]
    pub fn fields<S: AsRef<str>>(mut self, fields: &[S]) -> Self {
        self.fields = fields.iter().map(|f| f.as_ref().to_string()).collect();
        self
    }

    /// Filter `get_all` with a raw condition
    #[must_use]
    pub fn where_clause(mut self, clause: impl Into<String>) -> Self {
        self.where_clause = Some(clause.into());
        self
    }

    /// Only build the statement
    #[must_use]
    pub fn query_only(mut self, query_only: bool) -> Self {
        self.query_only = query_only;
        self
    }
}

/// Value identifying the target row(s) of a get/edit/delete
#[derive(Debug, Clone, PartialEq)]
pub enum KeyValue {
    /// Matched against the first key column
    Single(DatabaseValue),
    /// `(field, value)` pairs for multi-column keys
    Composite(Vec<(String, DatabaseValue)>),
}

impl KeyValue {
    /// Build a composite key
    pub fn composite<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<DatabaseValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        KeyValue::Composite(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl From<DatabaseValue> for KeyValue {
    fn from(v: DatabaseValue) -> Self {
        KeyValue::Single(v)
    }
}

impl From<i32> for KeyValue {
    fn from(v: i32) -> Self {
        KeyValue::Single(v.into())
    }
}

impl From<i64> for KeyValue {
    fn from(v: i64) -> Self {
        KeyValue::Single(v.into())
    }
}

impl From<&str> for KeyValue {
    fn from(v: &str) -> Self {
        KeyValue::Single(v.into())
    }
}

impl From<String> for KeyValue {
    fn from(v: String) -> Self {
        KeyValue::Single(v.into())
    }
}

impl From<HashMap<String, DatabaseValue>> for KeyValue {
    fn from(map: HashMap<String, DatabaseValue>) -> Self {
        let mut pairs: Vec<(String, DatabaseValue)> = map.into_iter().collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        KeyValue::Composite(pairs)
    }
}

#[derive(Debug, Clone, Copy)]
enum KeyPurpose {
    Select,
    Update,
    Delete,
}

impl KeyPurpose {
    fn words(&self) -> (&'static str, &'static str) {
        match self {
            KeyPurpose::Select => ("select", "retrieved"),
            KeyPurpose::Update => ("update", "updated"),
            KeyPurpose::Delete => ("delete", "deleted"),
        }
    }
}

/// Schema-driven CRUD over one configured database
pub struct RecordStore {
    config: DatabaseConfig,
    connector: Arc<dyn Connector>,
    dialect: &'static dyn SqlDialect,
    formatter: ValueFormatter,
    catalog: SchemaCatalog,
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("engine", &self.config.engine)
            .field("database", &self.config.database)
            .field("escape", &self.config.escape)
            .field("catalog", &self.catalog)
            .finish()
    }
}

impl RecordStore {
    /// Create a store that connects with the compiled-in driver for `config.engine`
    pub fn new(config: DatabaseConfig) -> Result<Self> {
        config.validate()?;
        let connector = Arc::new(DriverConnector::new(config.clone()));
        Self::with_connector(config, connector)
    }

    /// Create a store over a custom connection source
    pub fn with_connector(config: DatabaseConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        if connector.database_type() != config.engine {
            return Err(DatabaseError::config(format!(
                "connector produces {} connections but the configuration names {}",
                connector.database_type(),
                config.engine
            )));
        }
        let dialect = config.engine.dialect();
        Ok(Self {
            formatter: ValueFormatter::new(dialect, config.escape),
            catalog: SchemaCatalog::new(dialect, config.cache_schema),
            dialect,
            connector,
            config,
        })
    }

    /// Configured engine
    pub fn database_type(&self) -> DatabaseType {
        self.config.engine
    }

    /// Dialect used to build statements
    pub fn dialect(&self) -> &'static dyn SqlDialect {
        self.dialect
    }

    /// Configuration the store was built from
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Handle for running the CRUD operations on one table
    pub fn table(&self, name: impl Into<String>) -> TableModel<'_> {
        TableModel {
            store: self,
            table: name.into(),
        }
    }

    /// Describe the columns of `table`
    pub async fn column_information(&self, table: &str) -> Result<TableSchema> {
        let db = self.open().await?;
        let schema = self.catalog.column_information(&*db, table).await;
        self.close(db).await;
        schema
    }

    /// Names of the columns of `table`, in declaration order
    pub async fn column_names(&self, table: &str) -> Result<Vec<String>> {
        Ok(self.column_information(table).await?.column_names())
    }

    /// Forget the cached schema of `table`
    pub fn invalidate_schema(&self, table: &str) {
        self.catalog.invalidate(table);
    }

    /// Forget every cached schema
    pub fn clear_schema_cache(&self) {
        self.catalog.clear();
    }

    /// Run caller-written SQL
    ///
    /// Inserts report their identity, reads their rows (or the row count when
    /// `result_as_array` is false), anything else the affected row count.
    pub async fn query(&self, sql: &str, result_as_array: bool, query_only: bool) -> ResultEnvelope {
        if query_only {
            return ResultEnvelope::query_only(sql);
        }
        let db = match self.open().await {
            Ok(db) => db,
            Err(err) => return Self::rejected(&err),
        };
        let outcome = StatementRunner::new(&*db, self.dialect)
            .run(sql, result_as_array)
            .await;
        self.close(db).await;
        Self::finish(sql.to_string(), outcome)
    }

    /// Fetch the row(s) whose key equals `key`
    pub async fn get_specific(
        &self,
        table: &str,
        key: impl Into<KeyValue>,
        options: &QueryOptions,
    ) -> ResultEnvelope {
        let key = key.into();
        let db = match self.open().await {
            Ok(db) => db,
            Err(err) => return Self::rejected(&err),
        };
        let envelope = self.get_specific_on(&*db, table, &key, options).await;
        self.close(db).await;
        envelope
    }

    /// Fetch every row, optionally filtered by `options.where_clause`
    ///
    /// No schema is needed, so a `query_only` call does not connect.
    pub async fn get_all(&self, table: &str, options: &QueryOptions) -> ResultEnvelope {
        let mut select = SelectBuilder::new(self.dialect, table).columns(&options.fields);
        if let Some(clause) = &options.where_clause {
            select = select.where_raw(clause);
        }
        if let Some(order) = &options.order_by {
            select = select.order_by(&order.field, order.direction);
        }
        let sql = select.build();

        if options.query_only {
            return ResultEnvelope::query_only(sql);
        }
        let db = match self.open().await {
            Ok(db) => db,
            Err(err) => return Self::rejected(&err),
        };
        let rows = StatementRunner::new(&*db, self.dialect)
            .query(&BoundStatement::raw(sql.as_str()))
            .await;
        self.close(db).await;
        Self::finish(sql, rows.map(QueryResult::Rows))
    }

    /// Validate `data` against the table and insert it
    ///
    /// The result is the identity assigned by the engine, or the affected row
    /// count for tables without an identity column.
    pub async fn add_record(&self, table: &str, data: &RecordPayload, query_only: bool) -> ResultEnvelope {
        let db = match self.open().await {
            Ok(db) => db,
            Err(err) => return Self::rejected(&err),
        };
        let envelope = self.add_record_on(&*db, table, data, query_only).await;
        self.close(db).await;
        envelope
    }

    /// Update the row(s) whose key equals `key` with the schema fields found in `data`
    pub async fn edit_record(
        &self,
        table: &str,
        key: impl Into<KeyValue>,
        data: &RecordPayload,
        options: &QueryOptions,
    ) -> ResultEnvelope {
        let key = key.into();
        let db = match self.open().await {
            Ok(db) => db,
            Err(err) => return Self::rejected(&err),
        };
        let envelope = self.edit_record_on(&*db, table, &key, data, options).await;
        self.close(db).await;
        envelope
    }

    /// Delete the row(s) whose key equals `key`
    pub async fn delete_record(
        &self,
        table: &str,
        key: impl Into<KeyValue>,
        options: &QueryOptions,
    ) -> ResultEnvelope {
        let key = key.into();
        let db = match self.open().await {
            Ok(db) => db,
            Err(err) => return Self::rejected(&err),
        };
        let envelope = self.delete_record_on(&*db, table, &key, options).await;
        self.close(db).await;
        envelope
    }

    /// Run `statements` atomically on one connection
    pub async fn transaction(&self, statements: impl Into<Statements>, result_as_array: bool) -> TransactionBatch {
        let statements = statements.into();
        let db = match self.open().await {
            Ok(db) => db,
            Err(err) => return TransactionBatch::failure(statements.into_inner(), &err),
        };
        let batch = TransactionExecutor::new(&*db, self.dialect)
            .run(statements, result_as_array)
            .await;
        self.close(db).await;
        batch
    }

    async fn get_specific_on(
        &self,
        db: &dyn Database,
        table: &str,
        key: &KeyValue,
        options: &QueryOptions,
    ) -> ResultEnvelope {
        let schema = match self.catalog.column_information(db, table).await {
            Ok(schema) => schema,
            Err(err) => return Self::rejected(&err),
        };
        let conditions = match self.resolve_key(&schema, key, options, KeyPurpose::Select) {
            Ok(conditions) => conditions,
            Err(err) => return Self::rejected(&err),
        };

        let mut select = SelectBuilder::new(self.dialect, table).columns(&options.fields);
        for (column, value) in conditions {
            select = select.where_eq(&column, value);
        }
        if let Some(order) = &options.order_by {
            select = select.order_by(&order.field, order.direction);
        }
        let sql = select.build();

        if options.query_only {
            return ResultEnvelope::query_only(sql);
        }
        let rows = StatementRunner::new(db, self.dialect)
            .query(&select.build_bound())
            .await;
        Self::finish(sql, rows.map(QueryResult::Rows))
    }

    async fn add_record_on(
        &self,
        db: &dyn Database,
        table: &str,
        data: &RecordPayload,
        query_only: bool,
    ) -> ResultEnvelope {
        let schema = match self.catalog.column_information(db, table).await {
            Ok(schema) => schema,
            Err(err) => return Self::rejected(&err),
        };
        let literals = match RecordBuilder::new(&self.formatter).build_insert(&schema, data) {
            Ok(literals) => literals,
            Err(err) => return Self::rejected(&err),
        };

        let identity = schema.identity_column().map(|c| c.name.as_str());
        let mut insert = InsertBuilder::new(self.dialect, table).values(literals);
        if let (IdentityRetrieval::Returning, Some(column)) =
            (self.dialect.identity_retrieval(), identity)
        {
            insert = insert.returning(column);
        }
        let sql = insert.build();

        if query_only {
            return ResultEnvelope::query_only(sql);
        }
        let hint = identity.map_or(IdentityHint::Absent, IdentityHint::Column);
        let result = StatementRunner::new(db, self.dialect)
            .run_insert(&insert.build_bound(), hint)
            .await;
        Self::finish(sql, result)
    }

    async fn edit_record_on(
        &self,
        db: &dyn Database,
        table: &str,
        key: &KeyValue,
        data: &RecordPayload,
        options: &QueryOptions,
    ) -> ResultEnvelope {
        let schema = match self.catalog.column_information(db, table).await {
            Ok(schema) => schema,
            Err(err) => return Self::rejected(&err),
        };
        let conditions = self.resolve_key(&schema, key, options, KeyPurpose::Update);
        let assignments = RecordBuilder::new(&self.formatter).build_update(&schema, data);
        let (conditions, assignments) = match (conditions, assignments) {
            (Ok(conditions), Ok(assignments)) => (conditions, assignments),
            (Err(key_err), Err(field_err)) => return Self::rejected(&key_err.merge(field_err)),
            (Err(err), _) | (_, Err(err)) => return Self::rejected(&err),
        };

        let mut update = UpdateBuilder::new(self.dialect, table).set_all(assignments);
        for (column, value) in conditions {
            update = update.where_eq(&column, value);
        }
        let sql = update.build();

        if options.query_only {
            return ResultEnvelope::query_only(sql);
        }
        let affected = StatementRunner::new(db, self.dialect)
            .execute(&update.build_bound())
            .await;
        Self::finish(sql, affected.map(QueryResult::Count))
    }

    async fn delete_record_on(
        &self,
        db: &dyn Database,
        table: &str,
        key: &KeyValue,
        options: &QueryOptions,
    ) -> ResultEnvelope {
        let schema = match self.catalog.column_information(db, table).await {
            Ok(schema) => schema,
            Err(err) => return Self::rejected(&err),
        };
        let conditions = match self.resolve_key(&schema, key, options, KeyPurpose::Delete) {
            Ok(conditions) => conditions,
            Err(err) => return Self::rejected(&err),
        };

        let mut delete = DeleteBuilder::new(self.dialect, table);
        for (column, value) in conditions {
            delete = delete.where_eq(&column, value);
        }
        let sql = delete.build();

        if options.query_only {
            return ResultEnvelope::query_only(sql);
        }
        let affected = StatementRunner::new(db, self.dialect)
            .execute(&delete.build_bound())
            .await;
        Self::finish(sql, affected.map(QueryResult::Count))
    }

    /// Map the key value onto the key columns and format each value
    fn resolve_key(
        &self,
        schema: &TableSchema,
        key: &KeyValue,
        options: &QueryOptions,
        purpose: KeyPurpose,
    ) -> Result<ColumnLiterals> {
        let key_columns: Vec<&str> = match &options.specific_field {
            Some(field) => {
                if schema.column(field).is_none() {
                    return Err(DatabaseError::schema(format!(
                        "The field {} identified for specification does not exist in table {}.",
                        field, schema.table
                    )));
                }
                vec![field.as_str()]
            }
            None => schema.key_columns().into_iter().map(|c| c.name.as_str()).collect(),
        };

        let Some(first) = key_columns.first() else {
            let (verb, participle) = purpose.words();
            return Err(DatabaseError::schema(format!(
                "There was no primary key found for this table nor was there a specific field \
                 identified for specification. Therefore the {verb} query can't identify the \
                 record to be {participle}."
            )));
        };

        let pairs: Vec<(&str, &DatabaseValue)> = match key {
            KeyValue::Single(value) => vec![(*first, value)],
            KeyValue::Composite(pairs) => pairs
                .iter()
                .filter(|(field, _)| key_columns.contains(&field.as_str()))
                .map(|(field, value)| (field.as_str(), value))
                .collect(),
        };
        if pairs.is_empty() {
            return Err(DatabaseError::schema(format!(
                "None of the key fields passed match the key of table {} ({}).",
                schema.table,
                key_columns.join(", ")
            )));
        }

        let mut conditions = ColumnLiterals::new();
        let mut errors = Vec::new();
        for (field, value) in pairs {
            let declared = schema
                .column(field)
                .map(|c| c.declared_type.as_str())
                .unwrap_or_default();
            match value.to_raw_text().filter(|t| !t.is_empty()) {
                Some(text) => {
                    let formatted = self.formatter.format(field, declared, &text);
                    match formatted.error.clone() {
                        Some(error) => errors.push(error),
                        None => conditions.push((field.to_string(), SqlValue::from(formatted))),
                    }
                }
                None => errors.push(format!(
                    "There was no data passed for field {field}, but the field requires a value."
                )),
            }
        }

        if errors.is_empty() {
            Ok(conditions)
        } else {
            Err(DatabaseError::validation(errors))
        }
    }

    async fn open(&self) -> Result<Box<dyn Database>> {
        self.connector.connect().await
    }

    async fn close(&self, db: Box<dyn Database>) {
        if let Err(err) = db.disconnect().await {
            warn!(error = %err, "disconnect failed");
        }
    }

    fn rejected(err: &DatabaseError) -> ResultEnvelope {
        debug!(error = %err, "operation rejected before execution");
        ResultEnvelope::failure("", err)
    }

    fn finish(sql: String, outcome: Result<QueryResult>) -> ResultEnvelope {
        match outcome {
            Ok(result) => ResultEnvelope::success(sql, result),
            Err(err) => {
                warn!(sql = %sql, error = %err, "statement rejected");
                ResultEnvelope::failure(sql, &err)
            }
        }
    }
}

/// [`RecordStore`] operations bound to one table
#[derive(Debug, Clone)]
pub struct TableModel<'s> {
    store: &'s RecordStore,
    table: String,
}

impl<'s> TableModel<'s> {
    /// Table name
    pub fn name(&self) -> &str {
        &self.table
    }

    /// Describe the columns of the table
    pub async fn column_information(&self) -> Result<TableSchema> {
        self.store.column_information(&self.table).await
    }

    /// See [`RecordStore::get_specific`]
    pub async fn get_specific(&self, key: impl Into<KeyValue>, options: &QueryOptions) -> ResultEnvelope {
        self.store.get_specific(&self.table, key, options).await
    }

    /// See [`RecordStore::get_all`]
    pub async fn get_all(&self, options: &QueryOptions) -> ResultEnvelope {
        self.store.get_all(&self.table, options).await
    }

    /// See [`RecordStore::add_record`]
    pub async fn add_record(&self, data: &RecordPayload, query_only: bool) -> ResultEnvelope {
        self.store.add_record(&self.table, data, query_only).await
    }

    /// See [`RecordStore::edit_record`]
    pub async fn edit_record(
        &self,
        key: impl Into<KeyValue>,
        data: &RecordPayload,
        options: &QueryOptions,
    ) -> ResultEnvelope {
        self.store.edit_record(&self.table, key, data, options).await
    }

    /// See [`RecordStore::delete_record`]
    pub async fn delete_record(&self, key: impl Into<KeyValue>, options: &QueryOptions) -> ResultEnvelope {
        self.store.delete_record(&self.table, key, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::envelope::Status;
    use crate::core::error::ErrorKind;
    use async_trait::async_trait;

    /// Connector that never connects
    struct Unreachable(DatabaseType);

    #[async_trait]
    impl Connector for Unreachable {
        fn database_type(&self) -> DatabaseType {
            self.0
        }

        async fn connect(&self) -> Result<Box<dyn Database>> {
            Err(DatabaseError::connection("server unreachable"))
        }
    }

    fn store(engine: DatabaseType) -> RecordStore {
        let config = DatabaseConfig::new(engine).host("db.internal").database("app");
        RecordStore::with_connector(config, Arc::new(Unreachable(engine))).unwrap()
    }

    #[test]
    fn test_key_value_conversions() {
        assert_eq!(KeyValue::from(7), KeyValue::Single(DatabaseValue::Int(7)));
        assert_eq!(
            KeyValue::from("abc"),
            KeyValue::Single(DatabaseValue::String("abc".into()))
        );

        let mut map = HashMap::new();
        map.insert("b".to_string(), DatabaseValue::Int(2));
        map.insert("a".to_string(), DatabaseValue::Int(1));
        assert_eq!(
            KeyValue::from(map),
            KeyValue::composite([("a", 1), ("b", 2)])
        );
    }

    #[test]
    fn test_connector_engine_must_match() {
        let config = DatabaseConfig::new(DatabaseType::Mysql).host("db.internal");
        let err = RecordStore::with_connector(config, Arc::new(Unreachable(DatabaseType::Postgres)))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_get_all_query_only_never_connects() {
        let store = store(DatabaseType::SqlServer);
        let options = QueryOptions::new()
            .fields(&["ListingID", "Title"])
            .where_clause("WHERE [Price] > 100")
            .order_by("Title", OrderDirection::Desc)
            .query_only(true);

        let envelope = store.table("Listings").get_all(&options).await;
        assert_eq!(envelope.status, Status::QueryOnly);
        assert_eq!(
            envelope.query,
            "SELECT [ListingID], [Title] FROM [Listings] WHERE [Price] > 100 ORDER BY [Title] DESC"
        );
    }

    #[tokio::test]
    async fn test_connection_failure_becomes_error_envelope() {
        let store = store(DatabaseType::Mysql);
        let envelope = store.get_specific("users", 1, &QueryOptions::new()).await;

        assert_eq!(envelope.status, Status::Error);
        assert_eq!(envelope.error_kind(), Some(ErrorKind::Connection));
        assert_eq!(envelope.errors, vec!["Connect Error: server unreachable".to_string()]);
        assert!(envelope.query.is_empty());

        let batch = store.transaction(["SELECT 1", "SELECT 2"], true).await;
        assert!(!batch.is_success());
        assert_eq!(batch.queries.len(), 2);
    }

    #[tokio::test]
    async fn test_raw_query_only_echoes_statement() {
        let store = store(DatabaseType::Postgres);
        let envelope = store.query("DELETE FROM sessions", false, true).await;
        assert_eq!(envelope.status, Status::QueryOnly);
        assert_eq!(envelope.query, "DELETE FROM sessions");
    }
}
