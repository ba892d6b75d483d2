//! Database connection settings
//!
//! Resolved from `DB_*` environment variables with local-development
//! defaults. `DATABASE_URL` overrides the individual parts.

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgSslMode};
use url::Url;

use crate::backends::PostgresPool;
use crate::error::{MigrateError, MigrateResult};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5432;
pub const DEFAULT_USERNAME: &str = "postgres";
pub const DEFAULT_PASSWORD: &str = "password";
pub const DEFAULT_DATABASE: &str = "homeaccounting";

/// PostgreSQL connection settings
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    /// Full connection URL; takes precedence over the fields above
    pub url: Option<String>,
    /// Require TLS
    pub ssl: bool,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            username: DEFAULT_USERNAME.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            url: None,
            ssl: false,
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"****")
            .field("database", &self.database)
            .field("url", &self.url.as_deref().map(mask_database_url))
            .field("ssl", &self.ssl)
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout", &self.acquire_timeout)
            .finish()
    }
}

impl DatabaseConfig {
    /// Settings from the process environment
    pub fn from_env() -> MigrateResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Settings from an arbitrary variable source
    ///
    /// Reads `DB_HOST`, `DB_PORT`, `DB_USERNAME`, `DB_PASSWORD`, `DB_NAME`,
    /// `DATABASE_URL`, and requires SSL when `APP_ENV=production`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> MigrateResult<Self> {
        let defaults = Self::default();

        let port = match lookup("DB_PORT") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| MigrateError::Configuration(format!("Invalid DB_PORT: '{}'", raw)))?,
            None => defaults.port,
        };

        Ok(Self {
            host: lookup("DB_HOST").unwrap_or(defaults.host),
            port,
            username: lookup("DB_USERNAME").unwrap_or(defaults.username),
            password: lookup("DB_PASSWORD").unwrap_or(defaults.password),
            database: lookup("DB_NAME").unwrap_or(defaults.database),
            url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            ssl: lookup("APP_ENV").as_deref() == Some("production"),
            ..defaults
        })
    }

    /// sqlx connect options for these settings
    pub fn connect_options(&self) -> MigrateResult<PgConnectOptions> {
        let options = match &self.url {
            Some(url) => PgConnectOptions::from_str(url).map_err(|e| {
                MigrateError::Configuration(format!("Invalid database URL {}: {}", mask_database_url(url), e))
            })?,
            None => PgConnectOptions::new()
                .host(&self.host)
                .port(self.port)
                .username(&self.username)
                .password(&self.password)
                .database(&self.database),
        };

        Ok(if self.ssl {
            options.ssl_mode(PgSslMode::Require)
        } else {
            options
        })
    }

    /// Open a pool with these settings
    pub async fn connect(&self) -> MigrateResult<PostgresPool> {
        tracing::info!("Connecting to database: {}", self.display_target());
        PostgresPool::connect(self.connect_options()?, self.max_connections, self.acquire_timeout).await
    }

    /// Human readable connection target without credentials
    pub fn display_target(&self) -> String {
        match &self.url {
            Some(url) => mask_database_url(url),
            None => format!("{}:{}/{}", self.host, self.port, self.database),
        }
    }
}

/// Replace the password of a connection URL with `****`
pub fn mask_database_url(url_str: &str) -> String {
    match Url::parse(url_str) {
        Ok(mut url) => {
            if url.password().is_some() && url.set_password(Some("****")).is_err() {
                return "****".to_string();
            }
            url.to_string()
        }
        Err(_) => url_str.to_string(),
    }
}
