//! Database trait and connection factory
//!
//! [`Database`] is the per-engine connection every backend implements.
//! [`Connector`] hands out fresh, already connected instances; the record
//! store opens one per operation and disconnects when the operation is done.

use super::database_types::DatabaseType;
use super::error::Result;
use super::value::{DatabaseResult, DatabaseValue};
use async_trait::async_trait;

/// Core database trait that all database backends must implement
#[async_trait]
pub trait Database: Send + Sync {
    /// Get the database type
    fn database_type(&self) -> DatabaseType;

    /// Connect to the database with the given connection string
    async fn connect(&self, connection_string: &str) -> Result<()>;

    /// Check if connected to the database
    fn is_connected(&self) -> bool;

    /// Disconnect from the database
    async fn disconnect(&self) -> Result<()>;

    /// Execute a statement that doesn't return rows; returns the affected row count
    ///
    /// The text is sent as written. Use [`execute_with_params`](Self::execute_with_params)
    /// when the statement carries caller input.
    async fn execute(&self, query: &str) -> Result<u64>;

    /// Execute a statement and return its rows
    async fn query(&self, query: &str) -> Result<DatabaseResult>;

    /// Execute a query with parameters (prepared statement)
    ///
    /// Placeholders follow the engine's own syntax (`?`, `$1`, `@P1`) and are
    /// numbered in the order of `params`.
    async fn query_with_params(
        &self,
        query: &str,
        params: &[DatabaseValue],
    ) -> Result<DatabaseResult>;

    /// Execute a statement with parameters that doesn't return rows
    async fn execute_with_params(&self, query: &str, params: &[DatabaseValue]) -> Result<u64>;

    /// Identity assigned by the most recent INSERT on this connection
    ///
    /// Engines that report identities through the statement itself
    /// (`RETURNING`, a trailing `SELECT`) keep the default.
    async fn last_insert_id(&self) -> Result<Option<i64>> {
        Ok(None)
    }

    /// Begin a transaction
    async fn begin_transaction(&self) -> Result<()>;

    /// Commit the current transaction
    async fn commit(&self) -> Result<()>;

    /// Rollback the current transaction
    async fn rollback(&self) -> Result<()>;

    /// Check if currently in a transaction
    fn in_transaction(&self) -> bool;
}

/// Source of connected [`Database`] handles
///
/// The default implementation is
/// [`DriverConnector`](crate::backends::DriverConnector); tests substitute
/// scripted connections through
/// [`RecordStore::with_connector`](super::store::RecordStore::with_connector).
#[async_trait]
pub trait Connector: Send + Sync {
    /// Engine of the handles this connector produces
    fn database_type(&self) -> DatabaseType;

    /// Open a new connection
    async fn connect(&self) -> Result<Box<dyn Database>>;
}
