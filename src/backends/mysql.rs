//! MySQL/MariaDB database backend implementation
//!
//! Plain statements go over the text protocol (`COM_QUERY`), so values arrive
//! as raw bytes and are handed on as strings. Statements with parameters are
//! prepared and use the binary protocol, which returns typed values.

use crate::core::{
    database::Database, database_types::DatabaseType, error::DatabaseError, error::Result,
    value::DatabaseResult, value::DatabaseRow, value::DatabaseValue,
};
use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{Conn, Opts, Row, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// MySQL database implementation
pub struct MysqlDatabase {
    conn: Arc<Mutex<Option<Conn>>>,
    in_transaction: Arc<Mutex<bool>>,
}

impl MysqlDatabase {
    /// Create a new MySQL database instance
    pub fn new() -> Self {
        Self {
            conn: Arc::new(Mutex::new(None)),
            in_transaction: Arc::new(Mutex::new(false)),
        }
    }

    fn convert_value(value: &Value) -> DatabaseValue {
        match value {
            Value::NULL => DatabaseValue::Null,
            Value::Bytes(bytes) => DatabaseValue::String(String::from_utf8_lossy(bytes).into_owned()),
            Value::Int(v) => DatabaseValue::Long(*v),
            Value::UInt(v) => i64::try_from(*v)
                .map(DatabaseValue::Long)
                .unwrap_or_else(|_| DatabaseValue::String(v.to_string())),
            Value::Float(v) => DatabaseValue::Float(*v),
            Value::Double(v) => DatabaseValue::Double(*v),
            Value::Date(year, month, day, hour, minute, second, micros) => {
                let mut text = format!(
                    "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                    year, month, day, hour, minute, second
                );
                if *micros > 0 {
                    text.push_str(&format!(".{:06}", micros));
                }
                DatabaseValue::String(text)
            }
            Value::Time(negative, days, hours, minutes, seconds, _) => {
                let hours = u32::from(*hours) + days * 24;
                DatabaseValue::String(format!(
                    "{}{:02}:{:02}:{:02}",
                    if *negative { "-" } else { "" },
                    hours,
                    minutes,
                    seconds
                ))
            }
        }
    }

    fn to_param(value: &DatabaseValue) -> Value {
        match value {
            DatabaseValue::Null => Value::NULL,
            DatabaseValue::Bool(v) => Value::Int(i64::from(*v)),
            DatabaseValue::Int(v) => Value::Int(i64::from(*v)),
            DatabaseValue::Long(v) => Value::Int(*v),
            DatabaseValue::Float(v) => Value::Float(*v),
            DatabaseValue::Double(v) => Value::Double(*v),
            DatabaseValue::String(v) => Value::Bytes(v.clone().into_bytes()),
            DatabaseValue::Bytes(v) => Value::Bytes(v.clone()),
            DatabaseValue::Timestamp(_) => {
                Value::Bytes(value.to_raw_text().unwrap_or_default().into_bytes())
            }
        }
    }

    fn row_to_database_row(row: &Row) -> DatabaseRow {
        let mut db_row = DatabaseRow::new();
        for (idx, column) in row.columns_ref().iter().enumerate() {
            let value = row
                .as_ref(idx)
                .map(Self::convert_value)
                .unwrap_or(DatabaseValue::Null);
            db_row.insert(column.name_str().into_owned(), value);
        }
        db_row
    }

    async fn control(&self, sql: &'static str, expect_open: bool) -> Result<()> {
        let mut in_transaction = self.in_transaction.lock().await;

        if *in_transaction != expect_open {
            return Err(DatabaseError::transaction(if expect_open {
                "Not in a transaction"
            } else {
                "Already in a transaction"
            }));
        }

        let mut conn = self.conn.lock().await;
        let conn = conn
            .as_mut()
            .ok_or_else(|| DatabaseError::connection("Not connected to database"))?;

        conn.query_drop(sql)
            .await
            .map_err(|e| DatabaseError::transaction(e.to_string()))?;

        *in_transaction = !expect_open;
        Ok(())
    }
}

impl Default for MysqlDatabase {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Database for MysqlDatabase {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Mysql
    }

    async fn connect(&self, connection_string: &str) -> Result<()> {
        self.disconnect().await?;

        let opts = Opts::from_url(connection_string)
            .map_err(|e| DatabaseError::connection(e.to_string()))?;
        let conn = Conn::new(opts)
            .await
            .map_err(|e| DatabaseError::connection(e.to_string()))?;

        let mut guard = self.conn.lock().await;
        *guard = Some(conn);
        debug!("mysql connection opened");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.conn
            .try_lock()
            .map(|conn| conn.is_some())
            .unwrap_or(false)
    }

    async fn disconnect(&self) -> Result<()> {
        {
            let mut in_transaction = self.in_transaction.lock().await;
            *in_transaction = false;
        }

        let conn = self.conn.lock().await.take();
        if let Some(conn) = conn {
            if let Err(e) = conn.disconnect().await {
                warn!(error = %e, "mysql disconnect did not complete cleanly");
            }
        }
        Ok(())
    }

    async fn execute(&self, query: &str) -> Result<u64> {
        let mut conn = self.conn.lock().await;
        let conn = conn
            .as_mut()
            .ok_or_else(|| DatabaseError::connection("Not connected to database"))?;

        conn.query_drop(query)
            .await
            .map_err(|e| DatabaseError::execution(e.to_string()))?;
        Ok(conn.affected_rows())
    }

    async fn query(&self, query: &str) -> Result<DatabaseResult> {
        let mut conn = self.conn.lock().await;
        let conn = conn
            .as_mut()
            .ok_or_else(|| DatabaseError::connection("Not connected to database"))?;

        let rows: Vec<Row> = conn
            .query(query)
            .await
            .map_err(|e| DatabaseError::execution(e.to_string()))?;

        Ok(rows.iter().map(Self::row_to_database_row).collect())
    }

    async fn query_with_params(
        &self,
        query: &str,
        params: &[DatabaseValue],
    ) -> Result<DatabaseResult> {
        let mut conn = self.conn.lock().await;
        let conn = conn
            .as_mut()
            .ok_or_else(|| DatabaseError::connection("Not connected to database"))?;

        let values: Vec<Value> = params.iter().map(Self::to_param).collect();
        let rows: Vec<Row> = conn
            .exec(query, values)
            .await
            .map_err(|e| DatabaseError::execution(e.to_string()))?;

        Ok(rows.iter().map(Self::row_to_database_row).collect())
    }

    async fn execute_with_params(&self, query: &str, params: &[DatabaseValue]) -> Result<u64> {
        let mut conn = self.conn.lock().await;
        let conn = conn
            .as_mut()
            .ok_or_else(|| DatabaseError::connection("Not connected to database"))?;

        let values: Vec<Value> = params.iter().map(Self::to_param).collect();
        conn.exec_drop(query, values)
            .await
            .map_err(|e| DatabaseError::execution(e.to_string()))?;
        Ok(conn.affected_rows())
    }

    async fn last_insert_id(&self) -> Result<Option<i64>> {
        let conn = self.conn.lock().await;
        let conn = conn
            .as_ref()
            .ok_or_else(|| DatabaseError::connection("Not connected to database"))?;
        Ok(conn.last_insert_id().and_then(|id| i64::try_from(id).ok()))
    }

    async fn begin_transaction(&self) -> Result<()> {
        self.control("START TRANSACTION", false).await
    }

    async fn commit(&self) -> Result<()> {
        self.control("COMMIT", true).await
    }

    async fn rollback(&self) -> Result<()> {
        self.control("ROLLBACK", true).await
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
            .try_lock()
            .map(|guard| *guard)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_conversion() {
        assert_eq!(
            MysqlDatabase::convert_value(&Value::Bytes(b"PRI".to_vec())),
            DatabaseValue::String("PRI".into())
        );
        assert_eq!(MysqlDatabase::convert_value(&Value::NULL), DatabaseValue::Null);
        assert_eq!(MysqlDatabase::convert_value(&Value::UInt(7)), DatabaseValue::Long(7));
        assert_eq!(
            MysqlDatabase::convert_value(&Value::Date(2020, 12, 31, 8, 5, 0, 0)),
            DatabaseValue::String("2020-12-31 08:05:00".into())
        );
        assert_eq!(
            MysqlDatabase::convert_value(&Value::Time(false, 1, 2, 3, 4, 0)),
            DatabaseValue::String("26:03:04".into())
        );
    }

    #[test]
    fn test_parameter_conversion() {
        assert_eq!(MysqlDatabase::to_param(&DatabaseValue::Null), Value::NULL);
        assert_eq!(MysqlDatabase::to_param(&DatabaseValue::Bool(true)), Value::Int(1));
        assert_eq!(MysqlDatabase::to_param(&DatabaseValue::Int(-4)), Value::Int(-4));
        assert_eq!(
            MysqlDatabase::to_param(&DatabaseValue::from("O'Brien")),
            Value::Bytes(b"O'Brien".to_vec())
        );
        assert_eq!(
            MysqlDatabase::to_param(&DatabaseValue::Timestamp(0)),
            Value::Bytes(b"1970-01-01 00:00:00".to_vec())
        );
    }

    #[tokio::test]
    async fn test_requires_connection() {
        let db = MysqlDatabase::new();
        assert!(!db.is_connected());
        let err = db.execute("SELECT 1").await.unwrap_err();
        assert!(matches!(err, DatabaseError::ConnectionError(_)));
    }

    #[tokio::test]
    #[ignore] // Run with: MYSQL_URL=... cargo test --features mysql -- --ignored
    async fn test_mysql_insert_id_and_transaction() -> Result<()> {
        let Ok(url) = std::env::var("MYSQL_URL") else {
            return Ok(());
        };

        let db = MysqlDatabase::new();
        db.connect(&url).await?;
        db.execute("DROP TABLE IF EXISTS test_records").await?;
        db.execute("CREATE TABLE test_records (id INT AUTO_INCREMENT PRIMARY KEY, name VARCHAR(20))")
            .await?;

        assert_eq!(db.execute("INSERT INTO test_records (name) VALUES ('Alice')").await?, 1);
        assert_eq!(db.last_insert_id().await?, Some(1));

        let affected = db
            .execute_with_params(
                "UPDATE test_records SET name = ? WHERE id = ?",
                &[DatabaseValue::from("O'Brien"), DatabaseValue::Long(1)],
            )
            .await?;
        assert_eq!(affected, 1);
        let rows = db
            .query_with_params("SELECT id, name FROM test_records WHERE id = ?", &[DatabaseValue::Long(1)])
            .await?;
        assert_eq!(rows[0].get("id"), Some(&DatabaseValue::Long(1)));
        assert_eq!(rows[0].get("name"), Some(&DatabaseValue::from("O'Brien")));

        db.begin_transaction().await?;
        db.execute("INSERT INTO test_records (name) VALUES ('Bob')").await?;
        db.rollback().await?;

        let rows = db.query("SELECT name FROM test_records").await?;
        assert_eq!(rows.len(), 1);

        db.execute("DROP TABLE test_records").await?;
        db.disconnect().await
    }
}
