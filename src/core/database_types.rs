//! Database type definitions
//!
//! The closed set of engines the record layer can talk to. Picking a dialect
//! is an exhaustive `match` on this enum; there is no string-driven dispatch
//! past [`FromStr`].

use crate::dialect::{MysqlDialect, PostgresDialect, SqlDialect, SqlServerDialect, SqliteDialect};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

static MYSQL: MysqlDialect = MysqlDialect;
static SQL_SERVER: SqlServerDialect = SqlServerDialect;
static SQLITE: SqliteDialect = SqliteDialect;
static POSTGRES: PostgresDialect = PostgresDialect;

/// Supported database engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    /// MySQL/MariaDB
    #[serde(alias = "mysqli", alias = "mariadb")]
    Mysql,
    /// Microsoft SQL Server
    #[serde(alias = "sqlsrv", alias = "mssql")]
    SqlServer,
    /// SQLite
    #[serde(alias = "sqlite3")]
    Sqlite,
    /// PostgreSQL
    #[serde(alias = "postgresql")]
    Postgres,
}

impl DatabaseType {
    /// Convert database type to string representation
    pub fn to_str(&self) -> &'static str {
        match self {
            DatabaseType::Mysql => "mysql",
            DatabaseType::SqlServer => "sqlserver",
            DatabaseType::Sqlite => "sqlite",
            DatabaseType::Postgres => "postgres",
        }
    }

    /// The SQL dialect used to build statements for this engine
    pub fn dialect(&self) -> &'static dyn SqlDialect {
        match self {
            DatabaseType::Mysql => &MYSQL,
            DatabaseType::SqlServer => &SQL_SERVER,
            DatabaseType::Sqlite => &SQLITE,
            DatabaseType::Postgres => &POSTGRES,
        }
    }

    /// Port used when the configuration does not name one
    pub fn default_port(&self) -> Option<u16> {
        match self {
            DatabaseType::Mysql => Some(3306),
            DatabaseType::SqlServer => Some(1433),
            DatabaseType::Postgres => Some(5432),
            DatabaseType::Sqlite => None,
        }
    }

    /// Cargo feature that compiles the driver for this engine
    pub fn feature_name(&self) -> &'static str {
        match self {
            DatabaseType::Mysql => "mysql",
            DatabaseType::SqlServer => "mssql",
            DatabaseType::Sqlite => "sqlite",
            DatabaseType::Postgres => "postgres",
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

impl FromStr for DatabaseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mysql" | "mysqli" | "mariadb" => Ok(DatabaseType::Mysql),
            "sqlsrv" | "mssql" | "sqlserver" => Ok(DatabaseType::SqlServer),
            "sqlite" | "sqlite3" => Ok(DatabaseType::Sqlite),
            "postgres" | "postgresql" => Ok(DatabaseType::Postgres),
            _ => Err(format!("{} is not a valid database type.", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_type_from_str() {
        assert_eq!("MYSQLI".parse::<DatabaseType>().ok(), Some(DatabaseType::Mysql));
        assert_eq!("mysql".parse::<DatabaseType>().ok(), Some(DatabaseType::Mysql));
        assert_eq!(
            "SQLSRV".parse::<DatabaseType>().ok(),
            Some(DatabaseType::SqlServer)
        );
        assert_eq!(
            "mssql".parse::<DatabaseType>().ok(),
            Some(DatabaseType::SqlServer)
        );
        assert_eq!(
            "sqlite3".parse::<DatabaseType>().ok(),
            Some(DatabaseType::Sqlite)
        );
        assert_eq!(
            "postgresql".parse::<DatabaseType>().ok(),
            Some(DatabaseType::Postgres)
        );
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let err = "oracle".parse::<DatabaseType>().unwrap_err();
        assert_eq!(err, "oracle is not a valid database type.");
    }

    #[test]
    fn test_dialect_dispatch() {
        assert_eq!(DatabaseType::Mysql.dialect().name(), "mysql");
        assert_eq!(DatabaseType::SqlServer.dialect().name(), "sqlserver");
        assert_eq!(DatabaseType::Sqlite.dialect().name(), "sqlite");
        assert_eq!(DatabaseType::Postgres.dialect().name(), "postgres");
    }

    #[test]
    fn test_serde_aliases() {
        let t: DatabaseType = serde_json::from_str("\"sqlsrv\"").unwrap();
        assert_eq!(t, DatabaseType::SqlServer);
        assert_eq!(serde_json::to_string(&DatabaseType::Mysql).unwrap(), "\"mysql\"");
    }
}
