//! # Database Module
//!
//! Async database access with SQLx for PostgreSQL, MySQL and SQLite.
//!
//! [`DbHandler`] offers table-level helpers (`find`, `create`, `update`,
//! `delete`) plus `raw` statements. Every value travels as a bound
//! parameter; identifiers are quoted for the backend dialect.
//!
//! Statement failures (bad SQL, missing table, constraint violation) are
//! logged and reported as `None`/`false`. Connection-level failures are
//! returned as `Error::Database`.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, MySql, Postgres, Row, Sqlite, TypeInfo};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// One fetched row, column name to value
pub type Record = HashMap<String, DbValue>;

/// Default pool size
const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Supported database backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// PostgreSQL
    Postgres,
    /// MySQL / MariaDB
    MySql,
    /// SQLite file or in-memory database
    Sqlite,
}

impl FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pgsql" => Ok(Self::Postgres),
            "mysql" | "mariadb" => Ok(Self::MySql),
            "sqlite" => Ok(Self::Sqlite),
            _ => Err(Error::InvalidDbHandler {
                handler: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Postgres => write!(f, "postgres"),
            Self::MySql => write!(f, "mysql"),
            Self::Sqlite => write!(f, "sqlite"),
        }
    }
}

impl Backend {
    /// Whether the backend is a network server needing host and login
    #[must_use]
    pub const fn requires_server(self) -> bool {
        !matches!(self, Self::Sqlite)
    }

    /// Quote an identifier
    #[must_use]
    pub fn quote(self, ident: &str) -> String {
        match self {
            Self::MySql => format!("`{}`", ident.replace('`', "``")),
            Self::Postgres | Self::Sqlite => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    /// Placeholder for the `n`th (1-based) bound parameter
    #[must_use]
    pub fn placeholder(self, n: usize) -> String {
        match self {
            Self::Postgres => format!("${n}"),
            Self::MySql | Self::Sqlite => "?".to_string(),
        }
    }

    /// `SELECT` of the first row whose `key` equals the single parameter
    #[must_use]
    pub fn find_statement(self, table: &str, key: &str) -> String {
        format!(
            "SELECT * FROM {} WHERE {} = {} LIMIT 1",
            self.quote(table),
            self.quote(key),
            self.placeholder(1)
        )
    }

    /// `INSERT` binding one parameter per column
    #[must_use]
    pub fn insert_statement(self, table: &str, columns: &[&str]) -> String {
        let names: Vec<String> = columns.iter().map(|c| self.quote(c)).collect();
        let values: Vec<String> = (1..=columns.len()).map(|n| self.placeholder(n)).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.quote(table),
            names.join(", "),
            values.join(", ")
        )
    }

    /// `UPDATE` of `columns`; the key is bound last
    #[must_use]
    pub fn update_statement(self, table: &str, key: &str, columns: &[&str]) -> String {
        let assignments: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} = {}", self.quote(c), self.placeholder(i + 1)))
            .collect();
        format!(
            "UPDATE {} SET {} WHERE {} = {}",
            self.quote(table),
            assignments.join(", "),
            self.quote(key),
            self.placeholder(columns.len() + 1)
        )
    }

    /// `DELETE` of rows whose `key` equals the single parameter
    #[must_use]
    pub fn delete_statement(self, table: &str, key: &str) -> String {
        format!(
            "DELETE FROM {} WHERE {} = {}",
            self.quote(table),
            self.quote(key),
            self.placeholder(1)
        )
    }
}

/// Connection credentials
///
/// Explicit values win over the `DB_*` environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    /// Server host
    pub host: Option<String>,
    /// Server port
    pub port: Option<u16>,
    /// Login user
    pub user: Option<String>,
    /// Login password
    pub password: Option<String>,
    /// Database name, or file path for SQLite
    pub database: Option<String>,
    /// Pool size
    pub max_connections: Option<u32>,
}

impl Credentials {
    /// Fill gaps from the process environment
    #[must_use]
    pub fn resolve(explicit: Self) -> Self {
        Self::resolve_with(explicit, |name| std::env::var(name).ok())
    }

    /// Fill gaps from a variable lookup
    #[must_use]
    pub fn resolve_with<F>(explicit: Self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let pick = |value: Option<String>, var: &str| {
            value
                .filter(|v| !v.is_empty())
                .or_else(|| lookup(var).filter(|v| !v.is_empty()))
        };

        Self {
            host: pick(explicit.host, "DB_HOST"),
            port: explicit
                .port
                .or_else(|| lookup("DB_PORT").and_then(|p| p.parse().ok())),
            user: pick(explicit.user, "DB_USER"),
            password: pick(explicit.password, "DB_PASSWORD"),
            database: pick(explicit.database, "DB_DATABASE"),
            max_connections: explicit.max_connections,
        }
    }

    /// Check the fields `backend` needs
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidDbCredentials` listing missing login fields,
    /// then `Error::InvalidDbCredentialMissingDatabase` if the database name
    /// is missing.
    pub fn validate(&self, backend: Backend) -> Result<()> {
        if backend.requires_server() {
            let missing: Vec<&str> = [
                ("host", &self.host),
                ("user", &self.user),
                ("password", &self.password),
            ]
            .iter()
            .filter(|(_, value)| is_blank(value))
            .map(|(name, _)| *name)
            .collect();

            if !missing.is_empty() {
                return Err(Error::InvalidDbCredentials {
                    missing: missing.join(", "),
                });
            }
        }

        if is_blank(&self.database) {
            return Err(Error::InvalidDbCredentialMissingDatabase);
        }
        Ok(())
    }

    fn field(value: &Option<String>) -> &str {
        value.as_deref().unwrap_or_default()
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, str::is_empty)
}

/// Database value types
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DbValue {
    /// Null value
    Null,
    /// Integer value
    Int(i64),
    /// Float value
    Float(f64),
    /// String value
    String(String),
    /// Boolean value
    Bool(bool),
    /// Binary data
    Bytes(Vec<u8>),
}

impl DbValue {
    /// Integer content, if any
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// String content, if any
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }
}

impl From<i64> for DbValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for DbValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for DbValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for DbValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for DbValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for DbValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<u8>> for DbValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl<T: Into<Self>> From<Option<T>> for DbValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Bind every value of `$params` onto a fresh query for `$db`
macro_rules! bind_values {
    ($db:ty, $statement:expr, $params:expr) => {{
        let mut query = sqlx::query::<$db>($statement);
        for param in $params {
            query = match param {
                DbValue::Null => query.bind(None::<String>),
                DbValue::Int(v) => query.bind(*v),
                DbValue::Float(v) => query.bind(*v),
                DbValue::String(v) => query.bind(v.clone()),
                DbValue::Bool(v) => query.bind(*v),
                DbValue::Bytes(v) => query.bind(v.clone()),
            };
        }
        query
    }};
}

/// Database connection pool supporting multiple backends
#[derive(Clone)]
pub enum DbHandler {
    /// SQLite connection pool
    Sqlite(SqlitePool),
    /// PostgreSQL connection pool
    Postgres(PgPool),
    /// MySQL connection pool
    MySql(MySqlPool),
}

impl fmt::Debug for DbHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DbHandler({})", self.backend())
    }
}

impl DbHandler {
    /// Validate credentials and open a pool for `backend`
    ///
    /// # Errors
    ///
    /// Returns the credential errors of [`Credentials::validate`], or
    /// `Error::Database` if the connection fails.
    pub async fn connect(backend: Backend, credentials: &Credentials) -> Result<Self> {
        credentials.validate(backend)?;
        let pool_size = credentials.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS);
        let database = Credentials::field(&credentials.database);
        info!(backend = %backend, database = %database, "Connecting to database");

        match backend {
            Backend::Postgres => {
                let mut options = PgConnectOptions::new()
                    .host(Credentials::field(&credentials.host))
                    .username(Credentials::field(&credentials.user))
                    .password(Credentials::field(&credentials.password))
                    .database(database);
                if let Some(port) = credentials.port {
                    options = options.port(port);
                }
                let pool = PgPoolOptions::new()
                    .max_connections(pool_size)
                    .connect_with(options)
                    .await
                    .map_err(|e| Error::Database {
                        message: format!("PostgreSQL connection failed: {e}"),
                    })?;
                Ok(Self::Postgres(pool))
            }
            Backend::MySql => {
                let mut options = MySqlConnectOptions::new()
                    .host(Credentials::field(&credentials.host))
                    .username(Credentials::field(&credentials.user))
                    .password(Credentials::field(&credentials.password))
                    .database(database);
                if let Some(port) = credentials.port {
                    options = options.port(port);
                }
                let pool = MySqlPoolOptions::new()
                    .max_connections(pool_size)
                    .connect_with(options)
                    .await
                    .map_err(|e| Error::Database {
                        message: format!("MySQL connection failed: {e}"),
                    })?;
                Ok(Self::MySql(pool))
            }
            Backend::Sqlite => Self::connect_sqlite(database, Some(pool_size)).await,
        }
    }

    /// Connect to a SQLite database
    ///
    /// # Arguments
    ///
    /// * `database` - File path, `sqlite:` URL, or `:memory:`
    /// * `max_connections` - Maximum pool size (default: 10, always 1 in memory)
    ///
    /// # Errors
    ///
    /// Returns `Error::Database` if the file cannot be opened or created.
    pub async fn connect_sqlite(database: &str, max_connections: Option<u32>) -> Result<Self> {
        let in_memory = database == ":memory:" || database == "sqlite::memory:";
        let url = if in_memory {
            "sqlite::memory:".to_string()
        } else if database.starts_with("sqlite:") {
            database.to_string()
        } else {
            format!("sqlite:{database}")
        };

        let options = SqliteConnectOptions::from_str(&url)
            .map_err(|e| Error::Database {
                message: format!("Invalid SQLite database '{database}': {e}"),
            })?
            .create_if_missing(true);

        let mut pool_options = SqlitePoolOptions::new();
        pool_options = if in_memory {
            // Each connection would get its own private database.
            pool_options.max_connections(1).idle_timeout(None).max_lifetime(None)
        } else {
            pool_options.max_connections(max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS))
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| Error::Database {
                message: format!("SQLite connection failed: {e}"),
            })?;

        Ok(Self::Sqlite(pool))
    }

    /// Backend of this pool
    #[must_use]
    pub const fn backend(&self) -> Backend {
        match self {
            Self::Sqlite(_) => Backend::Sqlite,
            Self::Postgres(_) => Backend::Postgres,
            Self::MySql(_) => Backend::MySql,
        }
    }

    /// First row of `table` whose `key` equals `value`
    ///
    /// # Errors
    ///
    /// Returns `Error::Database` on connection failures only.
    pub async fn find(&self, table: &str, key: &str, value: impl Into<DbValue>) -> Result<Option<Record>> {
        let statement = self.backend().find_statement(table, key);
        let rows = settle(&statement, self.fetch(&statement, &[value.into()]).await)?;
        Ok(rows.and_then(|rows| rows.into_iter().next()))
    }

    /// Insert one row
    ///
    /// # Errors
    ///
    /// Returns `Error::Database` on connection failures only.
    pub async fn create(&self, table: &str, fields: &[(&str, DbValue)]) -> Result<bool> {
        let columns: Vec<&str> = fields.iter().map(|(c, _)| *c).collect();
        let values: Vec<DbValue> = fields.iter().map(|(_, v)| v.clone()).collect();
        let statement = self.backend().insert_statement(table, &columns);
        Ok(settle(&statement, self.execute(&statement, &values).await)?.is_some())
    }

    /// Update the row identified by the `key` entry of `fields`, then
    /// return it as stored
    ///
    /// # Errors
    ///
    /// Returns `Error::Database` on connection failures only.
    pub async fn update(&self, table: &str, key: &str, fields: &[(&str, DbValue)]) -> Result<Option<Record>> {
        let Some(id) = fields.iter().find(|(c, _)| *c == key).map(|(_, v)| v.clone()) else {
            warn!(table = %table, key = %key, "Update without a value for the key column");
            return Ok(None);
        };

        let changes: Vec<&(&str, DbValue)> = fields.iter().filter(|(c, _)| *c != key).collect();
        if !changes.is_empty() {
            let columns: Vec<&str> = changes.iter().map(|(c, _)| *c).collect();
            let mut values: Vec<DbValue> = changes.iter().map(|(_, v)| v.clone()).collect();
            values.push(id.clone());

            let statement = self.backend().update_statement(table, key, &columns);
            if settle(&statement, self.execute(&statement, &values).await)?.is_none() {
                return Ok(None);
            }
        }

        self.find(table, key, id).await
    }

    /// Delete rows of `table` whose `key` equals `value`
    ///
    /// # Errors
    ///
    /// Returns `Error::Database` on connection failures only.
    pub async fn delete(&self, table: &str, key: &str, value: impl Into<DbValue>) -> Result<bool> {
        let statement = self.backend().delete_statement(table, key);
        Ok(settle(&statement, self.execute(&statement, &[value.into()]).await)?.is_some())
    }

    /// Run an arbitrary statement with bound parameters
    ///
    /// Returns the fetched rows (empty for statements producing none), or
    /// `None` if the statement failed.
    ///
    /// # Errors
    ///
    /// Returns `Error::Database` on connection failures only.
    pub async fn raw(&self, statement: &str, params: &[DbValue]) -> Result<Option<Vec<Record>>> {
        settle(statement, self.fetch(statement, params).await)
    }

    /// Close the database connection pool
    pub async fn close(&self) {
        match self {
            Self::Sqlite(pool) => pool.close().await,
            Self::Postgres(pool) => pool.close().await,
            Self::MySql(pool) => pool.close().await,
        }
    }

    async fn fetch(&self, statement: &str, params: &[DbValue]) -> std::result::Result<Vec<Record>, sqlx::Error> {
        debug!(statement = %statement, params = params.len(), "Fetching");
        match self {
            Self::Sqlite(pool) => {
                let rows: Vec<SqliteRow> = bind_values!(Sqlite, statement, params).fetch_all(pool).await?;
                Ok(rows.iter().map(sqlite_row_to_map).collect())
            }
            Self::Postgres(pool) => {
                let rows: Vec<PgRow> = bind_values!(Postgres, statement, params).fetch_all(pool).await?;
                Ok(rows.iter().map(pg_row_to_map).collect())
            }
            Self::MySql(pool) => {
                let rows: Vec<MySqlRow> = bind_values!(MySql, statement, params).fetch_all(pool).await?;
                Ok(rows.iter().map(mysql_row_to_map).collect())
            }
        }
    }

    async fn execute(&self, statement: &str, params: &[DbValue]) -> std::result::Result<u64, sqlx::Error> {
        debug!(statement = %statement, params = params.len(), "Executing");
        let affected = match self {
            Self::Sqlite(pool) => bind_values!(Sqlite, statement, params).execute(pool).await?.rows_affected(),
            Self::Postgres(pool) => bind_values!(Postgres, statement, params).execute(pool).await?.rows_affected(),
            Self::MySql(pool) => bind_values!(MySql, statement, params).execute(pool).await?.rows_affected(),
        };
        Ok(affected)
    }
}

/// Statement errors become `None`; anything else is a connection problem
fn settle<T>(statement: &str, result: std::result::Result<T, sqlx::Error>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(sqlx::Error::Database(e)) => {
            warn!(statement = %statement, error = %e, "Statement failed");
            Ok(None)
        }
        Err(e) => Err(Error::Database {
            message: format!("Query error: {e}"),
        }),
    }
}

/// Convert SQLite row to HashMap
fn sqlite_row_to_map(row: &SqliteRow) -> Record {
    let mut map = HashMap::new();

    for (i, column) in row.columns().iter().enumerate() {
        let name = column.name().to_string();
        let type_name = column.type_info().name();

        let value = match type_name {
            "INTEGER" | "INT8" | "BIGINT" => row
                .try_get::<i64, _>(i)
                .map(DbValue::Int)
                .unwrap_or(DbValue::Null),
            "REAL" => row
                .try_get::<f64, _>(i)
                .map(DbValue::Float)
                .unwrap_or(DbValue::Null),
            "BOOLEAN" => row
                .try_get::<bool, _>(i)
                .map(DbValue::Bool)
                .unwrap_or(DbValue::Null),
            "BLOB" => row
                .try_get::<Vec<u8>, _>(i)
                .map(DbValue::Bytes)
                .unwrap_or(DbValue::Null),
            _ => row
                .try_get::<String, _>(i)
                .map(DbValue::String)
                .unwrap_or(DbValue::Null),
        };

        map.insert(name, value);
    }

    map
}

/// Convert PostgreSQL row to HashMap
fn pg_row_to_map(row: &PgRow) -> Record {
    let mut map = HashMap::new();

    for (i, column) in row.columns().iter().enumerate() {
        let name = column.name().to_string();
        let type_name = column.type_info().name();

        let value = match type_name {
            "INT2" => row
                .try_get::<i16, _>(i)
                .map(|v| DbValue::Int(i64::from(v)))
                .unwrap_or(DbValue::Null),
            "INT4" => row
                .try_get::<i32, _>(i)
                .map(|v| DbValue::Int(i64::from(v)))
                .unwrap_or(DbValue::Null),
            "INT8" => row
                .try_get::<i64, _>(i)
                .map(DbValue::Int)
                .unwrap_or(DbValue::Null),
            "FLOAT4" => row
                .try_get::<f32, _>(i)
                .map(|v| DbValue::Float(f64::from(v)))
                .unwrap_or(DbValue::Null),
            "FLOAT8" => row
                .try_get::<f64, _>(i)
                .map(DbValue::Float)
                .unwrap_or(DbValue::Null),
            "BOOL" => row
                .try_get::<bool, _>(i)
                .map(DbValue::Bool)
                .unwrap_or(DbValue::Null),
            "BYTEA" => row
                .try_get::<Vec<u8>, _>(i)
                .map(DbValue::Bytes)
                .unwrap_or(DbValue::Null),
            _ => row
                .try_get::<String, _>(i)
                .map(DbValue::String)
                .unwrap_or(DbValue::Null),
        };

        map.insert(name, value);
    }

    map
}

/// Convert MySQL row to HashMap
fn mysql_row_to_map(row: &MySqlRow) -> Record {
    let mut map = HashMap::new();

    for (i, column) in row.columns().iter().enumerate() {
        let name = column.name().to_string();
        let type_name = column.type_info().name();

        let value = match type_name {
            "BOOLEAN" => row
                .try_get::<bool, _>(i)
                .map(DbValue::Bool)
                .unwrap_or(DbValue::Null),
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => row
                .try_get::<i64, _>(i)
                .map(DbValue::Int)
                .unwrap_or(DbValue::Null),
            t if t.ends_with("UNSIGNED") => row
                .try_get::<u64, _>(i)
                .ok()
                .and_then(|v| i64::try_from(v).ok())
                .map_or(DbValue::Null, DbValue::Int),
            "FLOAT" | "DOUBLE" => row
                .try_get::<f64, _>(i)
                .map(DbValue::Float)
                .unwrap_or(DbValue::Null),
            "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BINARY" | "VARBINARY" => row
                .try_get::<Vec<u8>, _>(i)
                .map(DbValue::Bytes)
                .unwrap_or(DbValue::Null),
            _ => row
                .try_get::<String, _>(i)
                .map(DbValue::String)
                .unwrap_or(DbValue::Null),
        };

        map.insert(name, value);
    }

    map
}
