//! Microsoft SQL Server database backend implementation
//!
//! Uses tiberius over a tokio TCP stream. Reads go through `simple_query`, or
//! `query` when parameters are bound, and collect every result set, so a batch
//! such as `INSERT ...; SELECT SCOPE_IDENTITY() ...` returns the rows of every
//! statement in it.

use crate::core::{
    database::Database, database_types::DatabaseType, error::DatabaseError, error::Result,
    value::DatabaseResult, value::DatabaseRow, value::DatabaseValue,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::sync::Arc;
use tiberius::{Client, ColumnData, Config, FromSql, QueryStream, Row, ToSql};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::debug;

type TdsClient = Client<Compat<TcpStream>>;

/// SQL Server database implementation
pub struct MssqlDatabase {
    client: Arc<Mutex<Option<TdsClient>>>,
    in_transaction: Arc<Mutex<bool>>,
}

impl MssqlDatabase {
    /// Create a new SQL Server database instance
    pub fn new() -> Self {
        Self {
            client: Arc::new(Mutex::new(None)),
            in_transaction: Arc::new(Mutex::new(false)),
        }
    }

    fn convert_value(data: &ColumnData<'static>) -> DatabaseValue {
        let value = match data {
            ColumnData::U8(v) => v.map(|v| DatabaseValue::Int(i32::from(v))),
            ColumnData::I16(v) => v.map(|v| DatabaseValue::Int(i32::from(v))),
            ColumnData::I32(v) => v.map(DatabaseValue::Int),
            ColumnData::I64(v) => v.map(DatabaseValue::Long),
            ColumnData::F32(v) => v.map(DatabaseValue::Float),
            ColumnData::F64(v) => v.map(DatabaseValue::Double),
            ColumnData::Bit(v) => v.map(DatabaseValue::Bool),
            ColumnData::String(v) => v.as_ref().map(|s| DatabaseValue::String(s.to_string())),
            ColumnData::Guid(v) => v.map(|g| DatabaseValue::String(g.to_string())),
            ColumnData::Binary(v) => v.as_ref().map(|b| DatabaseValue::Bytes(b.to_vec())),
            ColumnData::Xml(v) => v
                .as_ref()
                .map(|x| DatabaseValue::String(x.as_ref().clone().into_string())),
            // SCOPE_IDENTITY() is numeric(38,0); whole numbers become integers
            ColumnData::Numeric(v) => v.map(|n| {
                match (n.scale(), i64::try_from(n.value())) {
                    (0, Ok(whole)) => DatabaseValue::Long(whole),
                    _ => DatabaseValue::String(n.to_string()),
                }
            }),
            ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
                NaiveDateTime::from_sql(data)
                    .ok()
                    .flatten()
                    .map(|dt| DatabaseValue::Timestamp(dt.and_utc().timestamp_micros()))
            }
            ColumnData::DateTimeOffset(_) => DateTime::<Utc>::from_sql(data)
                .ok()
                .flatten()
                .map(|dt| DatabaseValue::Timestamp(dt.timestamp_micros())),
            ColumnData::Date(_) => NaiveDate::from_sql(data)
                .ok()
                .flatten()
                .map(|d| DatabaseValue::String(d.format("%Y-%m-%d").to_string())),
            ColumnData::Time(_) => NaiveTime::from_sql(data)
                .ok()
                .flatten()
                .map(|t| DatabaseValue::String(t.format("%H:%M:%S").to_string())),
        };
        value.unwrap_or(DatabaseValue::Null)
    }

    fn to_param(value: &DatabaseValue) -> Box<dyn ToSql> {
        match value {
            DatabaseValue::Null => Box::new(Option::<String>::None),
            DatabaseValue::Bool(v) => Box::new(*v),
            DatabaseValue::Int(v) => Box::new(*v),
            DatabaseValue::Long(v) => Box::new(*v),
            DatabaseValue::Float(v) => Box::new(*v),
            DatabaseValue::Double(v) => Box::new(*v),
            DatabaseValue::String(v) => Box::new(v.clone()),
            DatabaseValue::Bytes(v) => Box::new(v.clone()),
            DatabaseValue::Timestamp(micros) => match DateTime::from_timestamp_micros(*micros) {
                Some(dt) => Box::new(dt.naive_utc()),
                None => Box::new(micros.to_string()),
            },
        }
    }

    async fn collect_rows(stream: QueryStream<'_>) -> Result<DatabaseResult> {
        let result_sets = stream
            .into_results()
            .await
            .map_err(|e| DatabaseError::execution(e.to_string()))?;

        Ok(result_sets
            .into_iter()
            .flatten()
            .map(Self::row_to_database_row)
            .collect())
    }

    fn row_to_database_row(row: Row) -> DatabaseRow {
        let names: Vec<String> = row.columns().iter().map(|c| c.name().to_string()).collect();
        names
            .into_iter()
            .zip(row)
            .map(|(name, data)| (name, Self::convert_value(&data)))
            .collect()
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

        let mut client = self.client.lock().await;
        let client = client
            .as_mut()
            .ok_or_else(|| DatabaseError::connection("Not connected to database"))?;

        client
            .simple_query(sql)
            .await
            .map_err(|e| DatabaseError::transaction(e.to_string()))?
            .into_results()
            .await
            .map_err(|e| DatabaseError::transaction(e.to_string()))?;

        *in_transaction = !expect_open;
        Ok(())
    }
}

impl Default for MssqlDatabase {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Database for MssqlDatabase {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::SqlServer
    }

    async fn connect(&self, connection_string: &str) -> Result<()> {
        {
            let mut client = self.client.lock().await;
            *client = None;
        }
        {
            let mut in_transaction = self.in_transaction.lock().await;
            *in_transaction = false;
        }

        let config = Config::from_ado_string(connection_string)
            .map_err(|e| DatabaseError::connection(e.to_string()))?;
        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| DatabaseError::connection(e.to_string()))?;
        tcp.set_nodelay(true).ok();

        let client = Client::connect(config, tcp.compat_write())
            .await
            .map_err(|e| DatabaseError::connection(e.to_string()))?;

        let mut guard = self.client.lock().await;
        *guard = Some(client);
        debug!("sql server connection opened");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.client
            .try_lock()
            .map(|client| client.is_some())
            .unwrap_or(false)
    }

    async fn disconnect(&self) -> Result<()> {
        {
            let mut in_transaction = self.in_transaction.lock().await;
            *in_transaction = false;
        }

        let client = self.client.lock().await.take();
        if let Some(client) = client {
            client
                .close()
                .await
                .map_err(|e| DatabaseError::connection(e.to_string()))?;
        }
        Ok(())
    }

    async fn execute(&self, query: &str) -> Result<u64> {
        let mut client = self.client.lock().await;
        let client = client
            .as_mut()
            .ok_or_else(|| DatabaseError::connection("Not connected to database"))?;

        let result = client
            .execute(query, &[])
            .await
            .map_err(|e| DatabaseError::execution(e.to_string()))?;
        Ok(result.total())
    }

    async fn query(&self, query: &str) -> Result<DatabaseResult> {
        let mut client = self.client.lock().await;
        let client = client
            .as_mut()
            .ok_or_else(|| DatabaseError::connection("Not connected to database"))?;

        let stream = client
            .simple_query(query)
            .await
            .map_err(|e| DatabaseError::execution(e.to_string()))?;
        Self::collect_rows(stream).await
    }

    async fn query_with_params(
        &self,
        query: &str,
        params: &[DatabaseValue],
    ) -> Result<DatabaseResult> {
        let mut client = self.client.lock().await;
        let client = client
            .as_mut()
            .ok_or_else(|| DatabaseError::connection("Not connected to database"))?;

        let params: Vec<Box<dyn ToSql>> = params.iter().map(Self::to_param).collect();
        let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let stream = client
            .query(query, &param_refs)
            .await
            .map_err(|e| DatabaseError::execution(e.to_string()))?;
        Self::collect_rows(stream).await
    }

    async fn execute_with_params(&self, query: &str, params: &[DatabaseValue]) -> Result<u64> {
        let mut client = self.client.lock().await;
        let client = client
            .as_mut()
            .ok_or_else(|| DatabaseError::connection("Not connected to database"))?;

        let params: Vec<Box<dyn ToSql>> = params.iter().map(Self::to_param).collect();
        let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let result = client
            .execute(query, &param_refs)
            .await
            .map_err(|e| DatabaseError::execution(e.to_string()))?;
        Ok(result.total())
    }

    async fn begin_transaction(&self) -> Result<()> {
        self.control("BEGIN TRANSACTION", false).await
    }

    async fn commit(&self) -> Result<()> {
        self.control("COMMIT TRANSACTION", true).await
    }

    async fn rollback(&self) -> Result<()> {
        self.control("ROLLBACK TRANSACTION", true).await
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
            .try_lock()
            .map(|guard| *guard)
            .unwrap_or(false)
    }
}
