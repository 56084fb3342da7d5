//! Connection configuration
//!
//! [`DatabaseConfig`] is the single value a [`RecordStore`](super::store::RecordStore)
//! is built from. It can be written by hand, deserialized with serde, or read
//! from `DB_*` environment variables.

use super::database_types::DatabaseType;
use super::error::{DatabaseError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything needed to reach one database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Engine
    pub engine: DatabaseType,
    /// Server host; unused for SQLite
    #[serde(default)]
    pub host: String,
    /// Server port; the engine default when absent
    #[serde(default)]
    pub port: Option<u16>,
    /// Login user
    #[serde(default)]
    pub user: String,
    /// Login password
    #[serde(default)]
    pub password: String,
    /// Database name, or the file path for SQLite
    #[serde(default)]
    pub database: String,
    /// Escape text values with the dialect's escaping rules
    #[serde(default)]
    pub escape: bool,
    /// Memoize table metadata per store
    #[serde(default)]
    pub cache_schema: bool,
}

impl DatabaseConfig {
    /// Configuration for `engine` with every other field empty
    pub fn new(engine: DatabaseType) -> Self {
        Self {
            engine,
            host: String::new(),
            port: None,
            user: String::new(),
            password: String::new(),
            database: String::new(),
            escape: false,
            cache_schema: false,
        }
    }

    /// SQLite database at `path`
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self::new(DatabaseType::Sqlite).database(path)
    }

    /// Set the host
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the port
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set user and password
    #[must_use]
    pub fn credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }

    /// Set the database name or file
    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Enable or disable text escaping
    #[must_use]
    pub fn escape(mut self, escape: bool) -> Self {
        self.escape = escape;
        self
    }

    /// Enable or disable the schema cache
    #[must_use]
    pub fn cache_schema(mut self, cache_schema: bool) -> Self {
        self.cache_schema = cache_schema;
        self
    }

    /// Read `DB_TYPE`, `DB_HOSTNAME`, `DB_PORT`, `DB_USER`, `DB_PASSWORD`,
    /// `DB_DATABASE`, `DB_ESCAPE_DATA` and `DB_CACHE_SCHEMA`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let engine = lookup("DB_TYPE")
            .ok_or_else(|| DatabaseError::config("DB_TYPE is not set"))?
            .parse::<DatabaseType>()
            .map_err(DatabaseError::config)?;

        let port = match lookup("DB_PORT").filter(|p| !p.trim().is_empty()) {
            Some(raw) => Some(
                raw.trim()
                    .parse::<u16>()
                    .map_err(|_| DatabaseError::config(format!("DB_PORT {raw} is not a port number")))?,
            ),
            None => None,
        };

        let switch = |key: &str| {
            lookup(key)
                .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
                .unwrap_or(false)
        };

        let config = Self {
            engine,
            host: lookup("DB_HOSTNAME").unwrap_or_default(),
            port,
            user: lookup("DB_USER").unwrap_or_default(),
            password: lookup("DB_PASSWORD").unwrap_or_default(),
            database: lookup("DB_DATABASE").unwrap_or_default(),
            escape: switch("DB_ESCAPE_DATA"),
            cache_schema: switch("DB_CACHE_SCHEMA"),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that the fields the engine needs are present
    pub fn validate(&self) -> Result<()> {
        match self.engine {
            DatabaseType::Sqlite if self.database.trim().is_empty() => Err(DatabaseError::config(
                "a SQLite configuration needs a database path",
            )),
            DatabaseType::Sqlite => Ok(()),
            _ if self.host.trim().is_empty() => Err(DatabaseError::config(format!(
                "a {} configuration needs a host",
                self.engine
            ))),
            _ => Ok(()),
        }
    }

    /// Driver connection string for this configuration
    pub fn connection_string(&self) -> String {
        let mut builder = ConnectionBuilder::new(self.engine)
            .host(&self.host)
            .database(&self.database)
            .username(&self.user)
            .password(&self.password);
        if let Some(port) = self.port {
            builder = builder.port(port);
        }
        builder.build_connection_string()
    }
}

/// Database connection string builder
#[derive(Debug, Clone)]
pub struct ConnectionBuilder {
    db_type: DatabaseType,
    host: Option<String>,
    port: Option<u16>,
    database: Option<String>,
    username: Option<String>,
    password: Option<String>,
    options: BTreeMap<String, String>,
}

impl ConnectionBuilder {
    /// Create a new connection builder for the specified database type
    pub fn new(db_type: DatabaseType) -> Self {
        Self {
            db_type,
            host: None,
            port: None,
            database: None,
            username: None,
            password: None,
            options: BTreeMap::new(),
        }
    }

    fn non_empty(value: &str) -> Option<String> {
        (!value.is_empty()).then(|| value.to_string())
    }

    /// Set the database host
    #[must_use]
    pub fn host(mut self, host: &str) -> Self {
        self.host = Self::non_empty(host);
        self
    }

    /// Set the database port
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the database name
    #[must_use]
    pub fn database(mut self, database: &str) -> Self {
        self.database = Self::non_empty(database);
        self
    }

    /// Set the username
    #[must_use]
    pub fn username(mut self, username: &str) -> Self {
        self.username = Self::non_empty(username);
        self
    }

    /// Set the password
    #[must_use]
    pub fn password(mut self, password: &str) -> Self {
        self.password = Self::non_empty(password);
        self
    }

    /// Add a driver-specific option
    #[must_use]
    pub fn option<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    fn resolved_port(&self) -> u16 {
        self.port
            .or_else(|| self.db_type.default_port())
            .unwrap_or_default()
    }

    /// Build the connection string
    pub fn build_connection_string(&self) -> String {
        match self.db_type {
            DatabaseType::Sqlite => self
                .database
                .clone()
                .unwrap_or_else(|| ":memory:".to_string()),
            DatabaseType::Postgres => {
                let mut parts = Vec::new();
                if let Some(host) = &self.host {
                    parts.push(format!("host={}", keyword_value(host)));
                }
                parts.push(format!("port={}", self.resolved_port()));
                if let Some(database) = &self.database {
                    parts.push(format!("dbname={}", keyword_value(database)));
                }
                if let Some(username) = &self.username {
                    parts.push(format!("user={}", keyword_value(username)));
                }
                if let Some(password) = &self.password {
                    parts.push(format!("password={}", keyword_value(password)));
                }
                for (key, value) in &self.options {
                    parts.push(format!("{}={}", key, keyword_value(value)));
                }
                parts.join(" ")
            }
            DatabaseType::Mysql => {
                let host = self.host.as_deref().unwrap_or("localhost");
                let database = self.database.as_deref().unwrap_or("");
                let username = self.username.as_deref().unwrap_or("root");
                let password = self.password.as_deref().unwrap_or("");
                let mut url = format!(
                    "mysql://{}:{}@{}:{}/{}",
                    urlencoding::encode(username),
                    urlencoding::encode(password),
                    host,
                    self.resolved_port(),
                    urlencoding::encode(database)
                );
                if !self.options.is_empty() {
                    let query: Vec<String> = self
                        .options
                        .iter()
                        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
                        .collect();
                    url.push('?');
                    url.push_str(&query.join("&"));
                }
                url
            }
            DatabaseType::SqlServer => {
                let host = self.host.as_deref().unwrap_or("localhost");
                let mut parts = vec![format!("server=tcp:{},{}", host, self.resolved_port())];
                if let Some(database) = &self.database {
                    parts.push(format!("database={}", ado_value(database)));
                }
                if let Some(username) = &self.username {
                    parts.push(format!("user id={}", ado_value(username)));
                }
                if let Some(password) = &self.password {
                    parts.push(format!("password={}", ado_value(password)));
                }
                if !self.options.contains_key("TrustServerCertificate") {
                    parts.push("TrustServerCertificate=true".to_string());
                }
                for (key, value) in &self.options {
                    parts.push(format!("{}={}", key, ado_value(value)));
                }
                parts.join(";")
            }
        }
    }
}

/// Value for a libpq keyword/value string; quoted when it holds spaces, quotes or backslashes
fn keyword_value(value: &str) -> String {
    if value.chars().any(|c| c.is_whitespace() || c == '\'' || c == '\\') {
        format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
    } else {
        value.to_string()
    }
}

/// Value for an ADO.NET string; double-quoted when it holds a delimiter
fn ado_value(value: &str) -> String {
    let delimited = value.contains([';', '=', '\'', '"'])
        || value.starts_with(char::is_whitespace)
        || value.ends_with(char::is_whitespace);
    if delimited {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
