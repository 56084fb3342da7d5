//! Database backend implementations
//!
//! This module contains concrete implementations of the Database trait
//! for various database systems, and the [`DriverConnector`] that picks one
//! from a [`DatabaseConfig`].

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "mysql")]
pub mod mysql;

#[cfg(feature = "mssql")]
pub mod mssql;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;

#[cfg(feature = "postgres")]
pub use postgres::PostgresDatabase;

#[cfg(feature = "mysql")]
pub use mysql::MysqlDatabase;

#[cfg(feature = "mssql")]
pub use mssql::MssqlDatabase;

use crate::core::config::DatabaseConfig;
use crate::core::database::{Connector, Database};
use crate::core::database_types::DatabaseType;
use crate::core::error::{DatabaseError, Result};
use async_trait::async_trait;
use tracing::info;

/// Opens connections with the driver compiled in for the configured engine
#[derive(Debug, Clone)]
pub struct DriverConnector {
    config: DatabaseConfig,
}

impl DriverConnector {
    /// Create a connector for `config`
    pub fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }

    fn backend(&self) -> Result<Box<dyn Database>> {
        match self.config.engine {
            #[cfg(feature = "sqlite")]
            DatabaseType::Sqlite => Ok(Box::new(SqliteDatabase::new())),
            #[cfg(feature = "postgres")]
            DatabaseType::Postgres => Ok(Box::new(PostgresDatabase::new())),
            #[cfg(feature = "mysql")]
            DatabaseType::Mysql => Ok(Box::new(MysqlDatabase::new())),
            #[cfg(feature = "mssql")]
            DatabaseType::SqlServer => Ok(Box::new(MssqlDatabase::new())),
            #[allow(unreachable_patterns)]
            other => Err(DatabaseError::connection(format!(
                "{} support requires the `{}` feature",
                other,
                other.feature_name()
            ))),
        }
    }
}

#[async_trait]
impl Connector for DriverConnector {
    fn database_type(&self) -> DatabaseType {
        self.config.engine
    }

    async fn connect(&self) -> Result<Box<dyn Database>> {
        let db = self.backend()?;
        db.connect(&self.config.connection_string()).await?;
        info!(
            engine = %self.config.engine,
            host = %self.config.host,
            database = %self.config.database,
            "connected"
        );
        Ok(db)
    }
}
