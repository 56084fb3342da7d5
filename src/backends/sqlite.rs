//! SQLite database backend implementation
//!
//! rusqlite is synchronous, so every call is moved onto the blocking thread
//! pool and takes the connection lock from there.

use crate::core::{
    database::Database, database_types::DatabaseType, error::DatabaseError, error::Result,
    value::DatabaseResult, value::DatabaseRow, value::DatabaseValue,
};
use async_trait::async_trait;
use rusqlite::{params_from_iter, Connection, Row};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// SQLite database implementation
pub struct SqliteDatabase {
    connection: Arc<Mutex<Option<Connection>>>,
    in_transaction: Arc<Mutex<bool>>,
}

impl SqliteDatabase {
    /// Create a new SQLite database instance
    pub fn new() -> Self {
        Self {
            connection: Arc::new(Mutex::new(None)),
            in_transaction: Arc::new(Mutex::new(false)),
        }
    }

    /// Convert a rusqlite Row to a DatabaseRow
    fn row_to_database_row(row: &Row) -> rusqlite::Result<DatabaseRow> {
        let mut db_row = DatabaseRow::new();
        let column_count = row.as_ref().column_count();

        for i in 0..column_count {
            let column_name = row.as_ref().column_name(i)?.to_string();
            let value = match row.get_ref(i)? {
                rusqlite::types::ValueRef::Null => DatabaseValue::Null,
                rusqlite::types::ValueRef::Integer(v) => DatabaseValue::Long(v),
                rusqlite::types::ValueRef::Real(v) => DatabaseValue::Double(v),
                rusqlite::types::ValueRef::Text(v) => {
                    DatabaseValue::String(String::from_utf8_lossy(v).to_string())
                }
                rusqlite::types::ValueRef::Blob(v) => DatabaseValue::Bytes(v.to_vec()),
            };
            db_row.insert(column_name, value);
        }

        Ok(db_row)
    }

    /// Convert a DatabaseValue to a rusqlite parameter
    fn value_to_param(value: &DatabaseValue) -> Box<dyn rusqlite::ToSql + Send> {
        match value {
            DatabaseValue::Null => Box::new(None::<i64>),
            DatabaseValue::Bool(v) => Box::new(*v),
            DatabaseValue::Int(v) => Box::new(*v),
            DatabaseValue::Long(v) => Box::new(*v),
            DatabaseValue::Float(v) => Box::new(f64::from(*v)),
            DatabaseValue::Double(v) => Box::new(*v),
            DatabaseValue::String(v) => Box::new(v.clone()),
            DatabaseValue::Bytes(v) => Box::new(v.clone()),
            DatabaseValue::Timestamp(v) => Box::new(*v),
        }
    }

    /// Run `op` on the open connection from the blocking pool
    async fn with_connection<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let connection_arc = Arc::clone(&self.connection);
        tokio::task::spawn_blocking(move || -> Result<T> {
            let connection = connection_arc.blocking_lock();
            let conn = connection
                .as_ref()
                .ok_or_else(|| DatabaseError::connection("Not connected to database"))?;
            op(conn)
        })
        .await
        .map_err(|e| DatabaseError::execution(format!("Task join error: {}", e)))?
    }

    /// Run a transaction control statement and flip the flag on success
    async fn transaction_control(&self, sql: &'static str, expect_open: bool) -> Result<()> {
        let connection_arc = Arc::clone(&self.connection);
        let in_transaction_arc = Arc::clone(&self.in_transaction);

        tokio::task::spawn_blocking(move || -> Result<()> {
            // Acquire both locks together so the flag tracks the connection state
            let mut in_transaction = in_transaction_arc.blocking_lock();
            let connection = connection_arc.blocking_lock();

            let conn = connection
                .as_ref()
                .ok_or_else(|| DatabaseError::connection("Not connected to database"))?;

            if *in_transaction != expect_open {
                return Err(DatabaseError::transaction(if expect_open {
                    "Not in a transaction"
                } else {
                    "Already in a transaction"
                }));
            }

            conn.execute_batch(sql)
                .map_err(|e| DatabaseError::transaction(e.to_string()))?;
            *in_transaction = !expect_open;

            Ok(())
        })
        .await
        .map_err(|e| DatabaseError::transaction(format!("Task join error: {}", e)))?
    }
}

impl Default for SqliteDatabase {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Sqlite
    }

    async fn connect(&self, connection_string: &str) -> Result<()> {
        // Clean up any existing connection first
        {
            let mut connection = self.connection.lock().await;
            *connection = None;
        }

        // Reset transaction flag to handle failed/aborted attempts
        {
            let mut in_transaction = self.in_transaction.lock().await;
            *in_transaction = false;
        }

        let path = connection_string.to_string();
        let connection_arc = Arc::clone(&self.connection);

        tokio::task::spawn_blocking(move || -> Result<()> {
            let conn = Connection::open(&path)
                .map_err(|e| DatabaseError::connection(e.to_string()))?;

            conn.execute("PRAGMA foreign_keys = ON", [])
                .map_err(|e| DatabaseError::connection(e.to_string()))?;

            let mut connection = connection_arc.blocking_lock();
            *connection = Some(conn);

            Ok(())
        })
        .await
        .map_err(|e| DatabaseError::connection(format!("Task join error: {}", e)))??;

        debug!(path = connection_string, "sqlite connection opened");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connection
            .try_lock()
            .map(|conn| conn.is_some())
            .unwrap_or(false)
    }

    async fn disconnect(&self) -> Result<()> {
        // Clear transaction flag to prevent stale state after reconnect
        {
            let mut in_transaction = self.in_transaction.lock().await;
            *in_transaction = false;
        }

        let mut connection = self.connection.lock().await;
        *connection = None;
        Ok(())
    }

    async fn execute(&self, query: &str) -> Result<u64> {
        let query = query.to_string();
        self.with_connection(move |conn| {
            let affected = conn
                .execute(&query, [])
                .map_err(|e| DatabaseError::execution(e.to_string()))?;
            Ok(affected as u64)
        })
        .await
    }

    async fn query(&self, query: &str) -> Result<DatabaseResult> {
        let query = query.to_string();
        self.with_connection(move |conn| {
            let mut stmt = conn
                .prepare(&query)
                .map_err(|e| DatabaseError::execution(e.to_string()))?;
            let rows = stmt
                .query_map([], Self::row_to_database_row)
                .map_err(|e| DatabaseError::execution(e.to_string()))?;

            let mut results = Vec::new();
            for row_result in rows {
                results.push(row_result.map_err(|e| DatabaseError::execution(e.to_string()))?);
            }

            Ok(results)
        })
        .await
    }

    async fn query_with_params(
        &self,
        query: &str,
        params: &[DatabaseValue],
    ) -> Result<DatabaseResult> {
        let query = query.to_string();
        let params: Vec<_> = params.iter().map(Self::value_to_param).collect();
        self.with_connection(move |conn| {
            let mut stmt = conn
                .prepare(&query)
                .map_err(|e| DatabaseError::execution(e.to_string()))?;
            let rows = stmt
                .query_map(params_from_iter(params.iter()), Self::row_to_database_row)
                .map_err(|e| DatabaseError::execution(e.to_string()))?;

            let mut results = Vec::new();
            for row_result in rows {
                results.push(row_result.map_err(|e| DatabaseError::execution(e.to_string()))?);
            }

            Ok(results)
        })
        .await
    }

    async fn execute_with_params(&self, query: &str, params: &[DatabaseValue]) -> Result<u64> {
        let query = query.to_string();
        let params: Vec<_> = params.iter().map(Self::value_to_param).collect();
        self.with_connection(move |conn| {
            let mut stmt = conn
                .prepare(&query)
                .map_err(|e| DatabaseError::execution(e.to_string()))?;
            let affected = stmt
                .execute(params_from_iter(params.iter()))
                .map_err(|e| DatabaseError::execution(e.to_string()))?;
            Ok(affected as u64)
        })
        .await
    }

    async fn last_insert_id(&self) -> Result<Option<i64>> {
        self.with_connection(|conn| Ok(Some(conn.last_insert_rowid())))
            .await
    }

    async fn begin_transaction(&self) -> Result<()> {
        self.transaction_control("BEGIN TRANSACTION", false).await
    }

    async fn commit(&self) -> Result<()> {
        self.transaction_control("COMMIT", true).await
    }

    async fn rollback(&self) -> Result<()> {
        self.transaction_control("ROLLBACK", true).await
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
            .try_lock()
            .map(|guard| *guard)
            .unwrap_or(false)
    }
}

impl Drop for SqliteDatabase {
    fn drop(&mut self) {
        // Best-effort rollback since Drop cannot be async
        if let Ok(in_trans) = self.in_transaction.try_lock() {
            if *in_trans {
                if let Ok(connection) = self.connection.try_lock() {
                    if let Some(conn) = connection.as_ref() {
                        let _ = conn.execute_batch("ROLLBACK");
                    }
                }
            }
        }
    }
}
