//! PostgreSQL database backend implementation
//!
//! This module provides a PostgreSQL implementation of the Database trait using tokio-postgres.
//!
//! Bound values are encoded for whatever type the server inferred for their
//! placeholder, so a value validated as text can fill a DATE or NUMERIC column.

use crate::core::{
    database::Database, database_types::DatabaseType, error::DatabaseError, error::Result,
    value::DatabaseResult, value::DatabaseRow, value::DatabaseValue,
};
use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use std::error::Error;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};
use tokio_postgres::{Client, NoTls, Row};
use tracing::{debug, error, warn};

/// PostgreSQL database implementation
pub struct PostgresDatabase {
    client: Arc<Mutex<Option<Client>>>,
    in_transaction: Arc<Mutex<bool>>,
}

type BoxError = Box<dyn Error + Sync + Send>;

/// Parameter encoded for the type of the placeholder it fills
#[derive(Debug)]
struct BindValue<'a>(&'a DatabaseValue);

impl BindValue<'_> {
    fn text(&self) -> String {
        self.0.to_raw_text().unwrap_or_default()
    }

    fn long(&self, ty: &Type) -> std::result::Result<i64, BoxError> {
        self.0
            .as_long()
            .ok_or_else(|| format!("cannot bind {} to {}", self.0.type_name(), ty).into())
    }

    fn double(&self, ty: &Type) -> std::result::Result<f64, BoxError> {
        self.0
            .as_double()
            .ok_or_else(|| format!("cannot bind {} to {}", self.0.type_name(), ty).into())
    }

    fn timestamp(&self) -> std::result::Result<NaiveDateTime, BoxError> {
        if let DatabaseValue::Timestamp(micros) = self.0 {
            return DateTime::from_timestamp_micros(*micros)
                .map(|dt| dt.naive_utc())
                .ok_or_else(|| format!("timestamp {micros} out of range").into());
        }
        let text = self.text();
        NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M:%S%.f"))
            .or_else(|_| {
                NaiveDate::parse_from_str(&text, "%Y-%m-%d")
                    .map(|d| d.and_time(NaiveTime::MIN))
            })
            .map_err(|e| format!("cannot read {text} as a timestamp: {e}").into())
    }
}

impl ToSql for BindValue<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
        if self.0.is_null() {
            return Ok(IsNull::Yes);
        }
        match *ty {
            Type::BOOL => self
                .0
                .as_bool()
                .ok_or_else(|| format!("cannot bind {} to bool", self.text()))?
                .to_sql(ty, out),
            Type::INT2 => i16::try_from(self.long(ty)?)?.to_sql(ty, out),
            Type::INT4 => i32::try_from(self.long(ty)?)?.to_sql(ty, out),
            Type::INT8 => self.long(ty)?.to_sql(ty, out),
            Type::FLOAT4 => (self.double(ty)? as f32).to_sql(ty, out),
            Type::FLOAT8 => self.double(ty)?.to_sql(ty, out),
            Type::NUMERIC => Decimal::from_str(self.text().trim())?.to_sql(ty, out),
            Type::DATE => NaiveDate::parse_from_str(&self.text(), "%Y-%m-%d")?.to_sql(ty, out),
            Type::TIME => NaiveTime::parse_from_str(&self.text(), "%H:%M:%S%.f")?.to_sql(ty, out),
            Type::TIMESTAMP => self.timestamp()?.to_sql(ty, out),
            Type::TIMESTAMPTZ => self.timestamp()?.and_utc().to_sql(ty, out),
            Type::BYTEA => match self.0 {
                DatabaseValue::Bytes(bytes) => bytes.as_slice().to_sql(ty, out),
                _ => self.text().as_bytes().to_sql(ty, out),
            },
            Type::JSONB => {
                out.put_u8(1);
                out.put_slice(self.text().as_bytes());
                Ok(IsNull::No)
            }
            // text-like types share the plain UTF-8 wire form
            _ => {
                out.put_slice(self.text().as_bytes());
                Ok(IsNull::No)
            }
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// Collect bound values as driver parameters
fn bind_all(params: &[DatabaseValue]) -> Vec<BindValue<'_>> {
    params.iter().map(BindValue).collect()
}

impl PostgresDatabase {
    /// Create a new PostgreSQL database instance
    pub fn new() -> Self {
        Self {
            client: Arc::new(Mutex::new(None)),
            in_transaction: Arc::new(Mutex::new(false)),
        }
    }

    /// Convert a tokio_postgres Row to a DatabaseRow
    fn row_to_database_row(row: &Row) -> DatabaseRow {
        let mut db_row = DatabaseRow::new();

        for (idx, column) in row.columns().iter().enumerate() {
            let column_name = column.name().to_string();
            let value = match column.type_().name() {
                "bool" => row
                    .try_get::<_, Option<bool>>(idx)
                    .ok()
                    .flatten()
                    .map(DatabaseValue::Bool),
                "int2" => row
                    .try_get::<_, Option<i16>>(idx)
                    .ok()
                    .flatten()
                    .map(|v| DatabaseValue::Int(i32::from(v))),
                "int4" => row
                    .try_get::<_, Option<i32>>(idx)
                    .ok()
                    .flatten()
                    .map(DatabaseValue::Int),
                "int8" => row
                    .try_get::<_, Option<i64>>(idx)
                    .ok()
                    .flatten()
                    .map(DatabaseValue::Long),
                "float4" => row
                    .try_get::<_, Option<f32>>(idx)
                    .ok()
                    .flatten()
                    .map(DatabaseValue::Float),
                "float8" => row
                    .try_get::<_, Option<f64>>(idx)
                    .ok()
                    .flatten()
                    .map(DatabaseValue::Double),
                "numeric" => match row.try_get::<_, Option<Decimal>>(idx) {
                    Ok(value) => value.map(|d| DatabaseValue::String(d.to_string())),
                    Err(e) => {
                        warn!(column = %column_name, error = %e, "numeric value outside decimal range");
                        None
                    }
                },
                "bytea" => row
                    .try_get::<_, Option<Vec<u8>>>(idx)
                    .ok()
                    .flatten()
                    .map(DatabaseValue::Bytes),
                "timestamp" => row
                    .try_get::<_, Option<NaiveDateTime>>(idx)
                    .ok()
                    .flatten()
                    .map(|v| DatabaseValue::Timestamp(v.and_utc().timestamp_micros())),
                "timestamptz" => row
                    .try_get::<_, Option<DateTime<Utc>>>(idx)
                    .ok()
                    .flatten()
                    .map(|v| DatabaseValue::Timestamp(v.timestamp_micros())),
                "date" => row
                    .try_get::<_, Option<NaiveDate>>(idx)
                    .ok()
                    .flatten()
                    .map(|v| DatabaseValue::String(v.format("%Y-%m-%d").to_string())),
                "time" => row
                    .try_get::<_, Option<NaiveTime>>(idx)
                    .ok()
                    .flatten()
                    .map(|v| DatabaseValue::String(v.format("%H:%M:%S").to_string())),
                // text, varchar, bpchar, name and anything else with a text form
                _ => row.try_get::<_, Option<String>>(idx).ok().flatten().map(DatabaseValue::String),
            };
            db_row.insert(column_name, value.unwrap_or(DatabaseValue::Null));
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

        let client = self.client.lock().await;
        let client = client
            .as_ref()
            .ok_or_else(|| DatabaseError::connection("Not connected to database"))?;

        client
            .batch_execute(sql)
            .await
            .map_err(|e| DatabaseError::transaction(e.to_string()))?;

        *in_transaction = !expect_open;
        Ok(())
    }
}

impl Default for PostgresDatabase {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Database for PostgresDatabase {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Postgres
    }

    async fn connect(&self, connection_string: &str) -> Result<()> {
        // Clean up any existing connection first
        {
            let mut client = self.client.lock().await;
            *client = None;
        }

        {
            let mut in_transaction = self.in_transaction.lock().await;
            *in_transaction = false;
        }

        let (client, connection) = tokio_postgres::connect(connection_string, NoTls)
            .await
            .map_err(|e| DatabaseError::connection(e.to_string()))?;

        // The connection object drives the socket; it ends when the client is dropped
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "postgres connection closed with error");
            }
        });

        let mut client_guard = self.client.lock().await;
        *client_guard = Some(client);
        debug!("postgres connection opened");

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.client
            .try_lock()
            .map(|client| client.as_ref().is_some_and(|c| !c.is_closed()))
            .unwrap_or(false)
    }

    async fn disconnect(&self) -> Result<()> {
        {
            let mut in_transaction = self.in_transaction.lock().await;
            *in_transaction = false;
        }

        let mut client = self.client.lock().await;
        *client = None;
        Ok(())
    }

    async fn execute(&self, query: &str) -> Result<u64> {
        let client = self.client.lock().await;
        let client = client
            .as_ref()
            .ok_or_else(|| DatabaseError::connection("Not connected to database"))?;

        client
            .execute(query, &[])
            .await
            .map_err(|e| DatabaseError::execution(describe(&e)))
    }

    async fn query(&self, query: &str) -> Result<DatabaseResult> {
        let client = self.client.lock().await;
        let client = client
            .as_ref()
            .ok_or_else(|| DatabaseError::connection("Not connected to database"))?;

        let rows = client
            .query(query, &[])
            .await
            .map_err(|e| DatabaseError::execution(describe(&e)))?;

        Ok(rows.iter().map(Self::row_to_database_row).collect())
    }

    async fn query_with_params(
        &self,
        query: &str,
        params: &[DatabaseValue],
    ) -> Result<DatabaseResult> {
        let client = self.client.lock().await;
        let client = client
            .as_ref()
            .ok_or_else(|| DatabaseError::connection("Not connected to database"))?;

        let bound = bind_all(params);
        let param_refs: Vec<&(dyn ToSql + Sync)> =
            bound.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        let rows = client
            .query(query, &param_refs)
            .await
            .map_err(|e| DatabaseError::execution(describe(&e)))?;

        Ok(rows.iter().map(Self::row_to_database_row).collect())
    }

    async fn execute_with_params(&self, query: &str, params: &[DatabaseValue]) -> Result<u64> {
        let client = self.client.lock().await;
        let client = client
            .as_ref()
            .ok_or_else(|| DatabaseError::connection("Not connected to database"))?;

        let bound = bind_all(params);
        let param_refs: Vec<&(dyn ToSql + Sync)> =
            bound.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        client
            .execute(query, &param_refs)
            .await
            .map_err(|e| DatabaseError::execution(describe(&e)))
    }

    async fn begin_transaction(&self) -> Result<()> {
        self.control("BEGIN", false).await
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

/// Server message when there is one, driver text otherwise
fn describe(err: &tokio_postgres::Error) -> String {
    err.as_db_error()
        .map(|db| db.message().to_string())
        .unwrap_or_else(|| err.to_string())
}
