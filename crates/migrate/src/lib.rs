//! # homeacct-migrate: SQL migrations for the homeacct expense tracker
//!
//! Applies numbered `.sql` migration files to PostgreSQL in order, records
//! each applied file in a ledger table, rolls single files back through their
//! `-- DOWN` section, and runs untracked seed scripts.
//!
//! ```no_run
//! use std::sync::Arc;
//! use homeacct_migrate::{DatabaseConfig, MigrationConfig, MigrationRunner};
//!
//! # async fn demo() -> homeacct_migrate::MigrateResult<()> {
//! let pool = DatabaseConfig::from_env()?.connect().await?;
//! let runner = MigrationRunner::new(Arc::new(pool), MigrationConfig::default())?;
//! runner.run_pending().await?;
//! runner.run_seeds().await;
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod migrations;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use backends::{AdvisoryLock, DatabasePool, DatabaseRow, DatabaseTransaction, DatabaseValue, PostgresPool};
pub use bootstrap::{run_on_startup, StartupPolicy, StartupReport};
pub use config::{mask_database_url, DatabaseConfig};
pub use error::{MigrateError, MigrateResult};
pub use migrations::{
    split_statements, CreatedMigration, MigrationConfig, MigrationLedger, MigrationLogger, MigrationManager,
    MigrationRecord, MigrationRunResult, MigrationRunner, MigrationScript, MigrationStatus, SeedFailure,
    SeedRunResult, SeedRunner, TracingLogger,
};
