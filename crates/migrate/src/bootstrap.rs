//! Startup hook for the backend
//!
//! Decides from the environment whether migrations and seeds run when the
//! application boots, then runs them in that order.

use std::env;

use crate::error::MigrateResult;
use crate::migrations::{MigrationRunResult, MigrationRunner, SeedRunResult};

pub const APP_ENV_VAR: &str = "APP_ENV";
pub const RUN_MIGRATIONS_VAR: &str = "RUN_MIGRATIONS";
pub const RUN_SEEDS_VAR: &str = "RUN_SEEDS";

/// What to run at startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartupPolicy {
    pub run_migrations: bool,
    pub run_seeds: bool,
}

impl StartupPolicy {
    /// Read `APP_ENV`, `RUN_MIGRATIONS` and `RUN_SEEDS`
    pub fn from_env() -> Self {
        Self::from_vars(
            env::var(APP_ENV_VAR).ok().as_deref(),
            env::var(RUN_MIGRATIONS_VAR).ok().as_deref(),
            env::var(RUN_SEEDS_VAR).ok().as_deref(),
        )
    }

    /// Migrations run in development or when `RUN_MIGRATIONS=true`; seeds run
    /// when `RUN_SEEDS=true`, or in development unless `RUN_SEEDS=false`.
    pub fn from_vars(app_env: Option<&str>, run_migrations: Option<&str>, run_seeds: Option<&str>) -> Self {
        let development = app_env == Some("development");
        Self {
            run_migrations: development || run_migrations == Some("true"),
            run_seeds: run_seeds == Some("true") || (development && run_seeds != Some("false")),
        }
    }
}

/// Outcome of [`run_on_startup`]; `None` for steps the policy skipped
#[derive(Debug, Clone, Default)]
pub struct StartupReport {
    pub migrations: Option<MigrationRunResult>,
    pub seeds: Option<SeedRunResult>,
}

/// Run migrations then seeds according to `policy`
///
/// A migration failure is returned so the application can refuse to start;
/// seeds never fail.
pub async fn run_on_startup(runner: &MigrationRunner, policy: &StartupPolicy) -> MigrateResult<StartupReport> {
    let mut report = StartupReport::default();

    if policy.run_migrations {
        report.migrations = Some(runner.run_pending().await?);
    } else {
        tracing::debug!("Skipping migrations at startup");
    }

    if policy.run_seeds {
        report.seeds = Some(runner.run_seeds().await);
    }

    Ok(report)
}
