//! Error types for the migration core
//!
//! Migrations are fail-fast: every variant here aborts the requested
//! operation. Seed failures never surface as a `MigrateError`; the seed
//! runner logs them and moves on.

use std::path::PathBuf;

/// Result type alias for migration operations
pub type MigrateResult<T> = Result<T, MigrateError>;

/// Errors raised by the migration core
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// Invalid or missing configuration (paths, names, options)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Rollback requested for a file that has no `-- DOWN` marker
    #[error("No DOWN section found in migration: {migration}")]
    MissingDownSection { migration: String },

    /// Rollback requested for a file whose `-- DOWN` section holds no SQL
    #[error("Empty DOWN section in migration: {migration}")]
    EmptyDownSection { migration: String },

    /// Reading or writing a migration/seed file failed
    #[error("I/O error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not establish or acquire a database connection
    #[error("Connection error: {0}")]
    Connection(String),

    /// A query issued by the core itself failed
    #[error("Database error: {0}")]
    Database(String),

    /// Begin, commit or rollback failed
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// A statement from a migration file failed to execute
    #[error("Statement failed in {file}: {message}")]
    Statement { file: String, message: String },

    /// The ledger table rejected a read or write
    #[error("Ledger error: {0}")]
    Ledger(String),
}

impl MigrateError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MigrateError::Io {
            path: path.into(),
            source,
        }
    }

    /// True for errors caused by configuration rather than the database
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            MigrateError::Configuration(_)
                | MigrateError::MissingDownSection { .. }
                | MigrateError::EmptyDownSection { .. }
        )
    }
}

impl From<sqlx::Error> for MigrateError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                MigrateError::Connection(err.to_string())
            }
            other => MigrateError::Database(other.to_string()),
        }
    }
}
