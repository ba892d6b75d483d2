//! Migration Definitions - Core types and structures for migrations
//!
//! Defines the configuration handed to the runner and the records and
//! reports it produces.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::logger::{MigrationLogger, TracingLogger};
use crate::error::{MigrateError, MigrateResult};

/// File extension of migration and seed scripts
pub const SQL_EXTENSION: &str = ".sql";

/// Default name of the ledger table
pub const DEFAULT_LEDGER_TABLE: &str = "migrations";

/// Configuration for the migration system
///
/// Every field has a default; build with struct update syntax or the
/// `with_*` helpers.
#[derive(Clone)]
pub struct MigrationConfig {
    /// Directory holding `NNN_slug.sql` migration files
    pub migrations_dir: PathBuf,
    /// Directory holding `NNN_slug_seed.sql` seed files; may be absent
    pub seeds_dir: PathBuf,
    /// Table recording applied migrations
    pub ledger_table: String,
    /// Serialize runners across processes with `pg_advisory_lock(key)`
    pub advisory_lock_key: Option<i64>,
    /// Progress logger; `None` falls back to [`TracingLogger`]
    pub logger: Option<Arc<dyn MigrationLogger>>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            migrations_dir: PathBuf::from("database/migrations"),
            seeds_dir: PathBuf::from("database/seeds"),
            ledger_table: DEFAULT_LEDGER_TABLE.to_string(),
            advisory_lock_key: None,
            logger: None,
        }
    }
}

impl fmt::Debug for MigrationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationConfig")
            .field("migrations_dir", &self.migrations_dir)
            .field("seeds_dir", &self.seeds_dir)
            .field("ledger_table", &self.ledger_table)
            .field("advisory_lock_key", &self.advisory_lock_key)
            .field("logger", &self.logger.as_ref().map(|_| "custom"))
            .finish()
    }
}

impl MigrationConfig {
    pub fn new(migrations_dir: impl Into<PathBuf>, seeds_dir: impl Into<PathBuf>) -> Self {
        Self {
            migrations_dir: migrations_dir.into(),
            seeds_dir: seeds_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn MigrationLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn with_ledger_table(mut self, table: impl Into<String>) -> Self {
        self.ledger_table = table.into();
        self
    }

    pub fn with_advisory_lock(mut self, key: i64) -> Self {
        self.advisory_lock_key = Some(key);
        self
    }

    /// The configured logger, or the tracing-backed default
    pub fn logger(&self) -> Arc<dyn MigrationLogger> {
        self.logger
            .clone()
            .unwrap_or_else(|| Arc::new(TracingLogger))
    }

    /// Check the settings that cannot be tolerated at run time
    ///
    /// The migrations directory must exist; a missing seeds directory is a
    /// normal configuration and is not checked here.
    pub fn validate(&self) -> MigrateResult<()> {
        if !self.migrations_dir.is_dir() {
            return Err(MigrateError::Configuration(format!(
                "Migrations path does not exist: {}",
                self.migrations_dir.display()
            )));
        }
        validate_identifier(&self.ledger_table)
    }
}

/// Ledger table names are interpolated into SQL, so only plain identifiers pass
pub(crate) fn validate_identifier(name: &str) -> MigrateResult<()> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(MigrateError::Configuration(format!("Invalid ledger table name: '{}'", name)))
    }
}

/// One row of the ledger table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationRecord {
    /// Insertion order
    pub id: i64,
    /// Migration file name
    pub name: String,
    /// When the migration was applied
    pub executed_at: DateTime<Utc>,
}

/// Derived view of the migrations directory against the ledger
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStatus {
    /// Every migration file on disk, sorted
    pub all_migrations: Vec<String>,
    /// Ledger contents, in application order
    pub executed_migrations: Vec<String>,
    /// Files on disk that are not in the ledger, in directory order
    pub pending_migrations: Vec<String>,
}

impl MigrationStatus {
    pub fn new(all_migrations: Vec<String>, executed_migrations: Vec<String>) -> Self {
        let pending_migrations = all_migrations
            .iter()
            .filter(|file| !executed_migrations.contains(file))
            .cloned()
            .collect();

        Self {
            all_migrations,
            executed_migrations,
            pending_migrations,
        }
    }

    pub fn is_up_to_date(&self) -> bool {
        self.pending_migrations.is_empty()
    }
}

/// Result of running migrations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationRunResult {
    /// Migrations applied by this run, in order
    pub applied_migrations: Vec<String>,
    /// Migrations that were already in the ledger
    pub skipped_count: usize,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

impl MigrationRunResult {
    pub fn applied_count(&self) -> usize {
        self.applied_migrations.len()
    }
}

/// Outcome of a single seed file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeedFailure {
    pub file: String,
    pub message: String,
}

/// Result of running seeds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedRunResult {
    /// Seed files that ran to completion
    pub completed: Vec<String>,
    /// Seed files that failed and were skipped
    pub failed: Vec<SeedFailure>,
}

impl SeedRunResult {
    pub fn attempted(&self) -> usize {
        self.completed.len() + self.failed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_status_pending_is_set_difference_in_directory_order() {
        let status = MigrationStatus::new(
            names(&["001_a.sql", "002_b.sql", "003_c.sql", "004_d.sql"]),
            names(&["003_c.sql", "001_a.sql"]),
        );

        assert_eq!(status.pending_migrations, names(&["002_b.sql", "004_d.sql"]));
        assert_eq!(status.executed_migrations, names(&["003_c.sql", "001_a.sql"]));
        assert!(!status.is_up_to_date());
    }

    #[test]
    fn test_status_serializes_with_field_names() {
        let status = MigrationStatus::new(names(&["001_a.sql"]), names(&["001_a.sql"]));
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["all_migrations"][0], "001_a.sql");
        assert_eq!(json["pending_migrations"].as_array().unwrap().len(), 0);
        assert!(status.is_up_to_date());
    }

    #[test]
    fn test_default_config() {
        let config = MigrationConfig::default();
        assert_eq!(config.migrations_dir, PathBuf::from("database/migrations"));
        assert_eq!(config.seeds_dir, PathBuf::from("database/seeds"));
        assert_eq!(config.ledger_table, "migrations");
        assert_eq!(config.advisory_lock_key, None);
        assert!(config.logger.is_none());
    }

    #[test]
    fn test_validate_requires_migrations_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = MigrationConfig::new(dir.path(), dir.path().join("missing-seeds"));
        assert!(config.validate().is_ok());

        let config = MigrationConfig::new(dir.path().join("nope"), dir.path());
        let err = config.validate().unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("Migrations path does not exist"));
    }

    #[test]
    fn test_ledger_table_name_must_be_identifier() {
        assert!(validate_identifier("migrations").is_ok());
        assert!(validate_identifier("_schema_v2").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("2fast").is_err());
        assert!(validate_identifier("migrations; DROP TABLE x").is_err());
    }
}
