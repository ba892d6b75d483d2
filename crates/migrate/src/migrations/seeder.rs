//! Seed Runner - best-effort sample data
//!
//! Seeds are not tracked: every run executes every seed file again. Each
//! statement runs directly on the pool, outside any transaction, and a failing
//! file is reported and skipped.

use std::path::PathBuf;
use std::sync::Arc;

use super::definitions::{SeedFailure, SeedRunResult, SQL_EXTENSION};
use super::logger::{error_chain, MigrationLogger};
use super::runner::MigrationRunner;
use super::scanner::list_files;
use super::splitter::split_statements;
use crate::backends::DatabasePool;
use crate::error::{MigrateError, MigrateResult};

/// Executes the seed scripts of a seeds directory
pub struct SeedRunner {
    pool: Arc<dyn DatabasePool>,
    seeds_dir: PathBuf,
    logger: Arc<dyn MigrationLogger>,
}

impl SeedRunner {
    pub fn new(pool: Arc<dyn DatabasePool>, seeds_dir: impl Into<PathBuf>, logger: Arc<dyn MigrationLogger>) -> Self {
        Self {
            pool,
            seeds_dir: seeds_dir.into(),
            logger,
        }
    }

    /// Run every seed file in order; never fails
    pub async fn run(&self) -> SeedRunResult {
        self.logger.log("Starting seed execution...");

        let files = list_files(&self.seeds_dir, SQL_EXTENSION, self.logger.as_ref()).await;
        if files.is_empty() {
            self.logger.log("No seed files found");
            return SeedRunResult::default();
        }

        self.logger.log(&format!("Found {} seed files", files.len()));

        let mut result = SeedRunResult::default();
        for file in files {
            self.logger.log(&format!("Executing seed: {}", file));
            match self.execute_seed(&file).await {
                Ok(()) => {
                    self.logger.log(&format!("Seed completed: {}", file));
                    result.completed.push(file);
                }
                Err(err) => {
                    self.logger
                        .warn(&format!("Seed failed (continuing): {}", file), Some(&err));
                    result.failed.push(SeedFailure {
                        file,
                        message: error_chain(&err),
                    });
                }
            }
        }

        if result.failed.is_empty() {
            self.logger.log("All seeds completed successfully");
        } else {
            self.logger.log(&format!(
                "Seeds finished: {} completed, {} failed",
                result.completed.len(),
                result.failed.len()
            ));
        }
        result
    }

    async fn execute_seed(&self, file: &str) -> MigrateResult<()> {
        let path = self.seeds_dir.join(file);
        let sql = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| MigrateError::io(&path, e))?;

        for statement in split_statements(&sql) {
            tracing::debug!("seed {}: {}", file, statement);
            self.pool
                .execute(&statement, &[])
                .await
                .map_err(|e| MigrateError::Statement {
                    file: file.to_string(),
                    message: e.to_string(),
                })?;
        }
        Ok(())
    }
}

impl MigrationRunner {
    /// Run all seed files from the configured seeds directory
    pub async fn run_seeds(&self) -> SeedRunResult {
        SeedRunner::new(Arc::clone(self.pool()), &self.config().seeds_dir, self.shared_logger())
            .run()
            .await
    }
}
