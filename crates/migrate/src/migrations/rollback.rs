//! Migration Rollback - Reverses a single applied migration
//!
//! Rolling back executes the file's `-- DOWN` section and deletes its ledger
//! row in one transaction. Files without a usable down-section cannot be
//! rolled back.

use super::runner::{LedgerWrite, MigrationRunner};
use super::script::MigrationScript;
use super::splitter::split_statements;
use crate::error::{MigrateError, MigrateResult};

impl MigrationRunner {
    /// Rollback a specific migration by file name
    pub async fn rollback(&self, file: &str) -> MigrateResult<()> {
        self.logger().log(&format!("Rolling back migration: {}", file));

        let result = match self.acquire_lock().await {
            Ok(lock) => {
                let result = self.rollback_locked(file).await;
                self.release_lock(lock).await;
                result
            }
            Err(err) => Err(err),
        };

        match &result {
            Ok(()) => self.logger().log(&format!("Migration rolled back: {}", file)),
            Err(err) => self.logger().error(&format!("Rollback failed: {}", file), Some(err)),
        }
        result
    }

    async fn rollback_locked(&self, file: &str) -> MigrateResult<()> {
        let content = self.read_migration(file).await?;
        let down_sql = MigrationScript::parse(&content)
            .down_sql
            .ok_or_else(|| MigrateError::MissingDownSection {
                migration: file.to_string(),
            })?;

        // Comment-only sections split to nothing
        let statements = split_statements(&down_sql);
        if statements.is_empty() {
            return Err(MigrateError::EmptyDownSection {
                migration: file.to_string(),
            });
        }

        self.execute_in_transaction(file, &statements, LedgerWrite::Remove)
            .await
    }
}
