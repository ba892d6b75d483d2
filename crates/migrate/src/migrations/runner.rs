//! Migration Runner - Executes migrations against the database
//!
//! Applies pending migration files in file-name order, one transaction per
//! file. The ledger row for a file is written in the same transaction as its
//! statements, so a file is either fully applied and recorded or not at all.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use super::definitions::{MigrationConfig, MigrationRecord, MigrationRunResult, MigrationStatus, SQL_EXTENSION};
use super::ledger::MigrationLedger;
use super::logger::MigrationLogger;
use super::scanner::list_files;
use super::script::MigrationScript;
use super::splitter::split_statements;
use crate::backends::{AdvisoryLock, DatabasePool, DatabaseTransaction};
use crate::error::{MigrateError, MigrateResult};

/// Ledger change committed together with a file's statements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LedgerWrite {
    Record,
    Remove,
}

/// Migration runner that executes migrations against a database
pub struct MigrationRunner {
    pool: Arc<dyn DatabasePool>,
    config: MigrationConfig,
    ledger: MigrationLedger,
    logger: Arc<dyn MigrationLogger>,
}

impl MigrationRunner {
    /// Create a new migration runner
    ///
    /// Fails only if the configured ledger table name is not a plain identifier.
    pub fn new(pool: Arc<dyn DatabasePool>, config: MigrationConfig) -> MigrateResult<Self> {
        let ledger = MigrationLedger::new(config.ledger_table.clone())?;
        let logger = config.logger();
        Ok(Self {
            pool,
            config,
            ledger,
            logger,
        })
    }

    pub fn pool(&self) -> &Arc<dyn DatabasePool> {
        &self.pool
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    pub(crate) fn logger(&self) -> &dyn MigrationLogger {
        self.logger.as_ref()
    }

    pub(crate) fn shared_logger(&self) -> Arc<dyn MigrationLogger> {
        Arc::clone(&self.logger)
    }

    /// Every migration file in the migrations directory, sorted
    pub async fn migration_files(&self) -> Vec<String> {
        list_files(&self.config.migrations_dir, SQL_EXTENSION, self.logger()).await
    }

    /// Ledger rows, oldest first
    pub async fn executed_records(&self) -> MigrateResult<Vec<MigrationRecord>> {
        self.ledger.list_records(self.pool.as_ref()).await
    }

    /// Get migration status for all migrations (applied and pending)
    pub async fn status(&self) -> MigrateResult<MigrationStatus> {
        let all_migrations = self.migration_files().await;
        let executed_migrations = self.ledger.list_executed(self.pool.as_ref()).await?;
        Ok(MigrationStatus::new(all_migrations, executed_migrations))
    }

    /// Run all pending migrations
    ///
    /// Stops at the first failing file; files before it stay applied.
    pub async fn run_pending(&self) -> MigrateResult<MigrationRunResult> {
        let lock = self.acquire_lock().await?;
        let result = self.run_pending_locked().await;
        self.release_lock(lock).await;
        result
    }

    async fn run_pending_locked(&self) -> MigrateResult<MigrationRunResult> {
        let start_time = Instant::now();
        self.logger.log("Starting SQL migrations...");

        let status = self.status().await?;

        if status.all_migrations.is_empty() {
            self.logger.log("No migration files found");
            return Ok(MigrationRunResult {
                execution_time_ms: start_time.elapsed().as_millis(),
                ..MigrationRunResult::default()
            });
        }

        if status.pending_migrations.is_empty() {
            self.logger.log("No pending migrations found");
            return Ok(MigrationRunResult {
                applied_migrations: Vec::new(),
                skipped_count: status.executed_migrations.len(),
                execution_time_ms: start_time.elapsed().as_millis(),
            });
        }

        self.logger
            .log(&format!("Found {} pending migrations", status.pending_migrations.len()));

        let mut applied_migrations = Vec::with_capacity(status.pending_migrations.len());
        for file in &status.pending_migrations {
            self.apply_migration(file).await?;
            applied_migrations.push(file.clone());
        }

        self.logger.log("All migrations completed successfully");

        Ok(MigrationRunResult {
            applied_migrations,
            skipped_count: status.executed_migrations.len(),
            execution_time_ms: start_time.elapsed().as_millis(),
        })
    }

    /// Run a specific migration by file name
    ///
    /// There is no "already applied" pre-check: the ledger's unique
    /// constraint rejects a second application and the error propagates.
    pub async fn run_migration(&self, file: &str) -> MigrateResult<()> {
        let lock = self.acquire_lock().await?;
        let result = async {
            self.ledger.ensure_table(self.pool.as_ref()).await?;
            self.apply_migration(file).await
        }
        .await;
        self.release_lock(lock).await;
        result
    }

    /// Apply a single migration file
    async fn apply_migration(&self, file: &str) -> MigrateResult<()> {
        self.logger.log(&format!("Executing migration: {}", file));

        let result = async {
            let content = self.read_migration(file).await?;
            let script = MigrationScript::parse(&content);
            let statements = split_statements(&script.up_sql);
            self.execute_in_transaction(file, &statements, LedgerWrite::Record).await
        }
        .await;

        match &result {
            Ok(()) => self.logger.log(&format!("Migration completed: {}", file)),
            Err(err) => self.logger.error(&format!("Migration failed: {}", file), Some(err)),
        }
        result
    }

    /// Resolve `file` inside the migrations directory
    pub(crate) fn migration_path(&self, file: &str) -> MigrateResult<PathBuf> {
        let is_plain_name = !file.is_empty()
            && !file.contains(['/', '\\'])
            && file != "."
            && file != "..";
        if !is_plain_name {
            return Err(MigrateError::Configuration(format!(
                "Migration name must be a file name, got '{}'",
                file
            )));
        }
        Ok(self.config.migrations_dir.join(file))
    }

    pub(crate) async fn read_migration(&self, file: &str) -> MigrateResult<String> {
        let path = self.migration_path(file)?;
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| MigrateError::io(path, e))
    }

    /// Run `statements` plus one ledger write inside a single transaction
    pub(crate) async fn execute_in_transaction(
        &self,
        file: &str,
        statements: &[String],
        ledger_write: LedgerWrite,
    ) -> MigrateResult<()> {
        let mut transaction = self.pool.begin_transaction().await?;

        match self
            .execute_statements(transaction.as_mut(), file, statements, ledger_write)
            .await
        {
            Ok(()) => transaction.commit().await,
            Err(err) => {
                if let Err(rollback_err) = transaction.rollback().await {
                    tracing::warn!("Rollback of {} failed after error: {}", file, rollback_err);
                }
                Err(err)
            }
        }
    }

    async fn execute_statements(
        &self,
        transaction: &mut dyn DatabaseTransaction,
        file: &str,
        statements: &[String],
        ledger_write: LedgerWrite,
    ) -> MigrateResult<()> {
        for (index, statement) in statements.iter().enumerate() {
            tracing::debug!("{} [{}/{}]: {}", file, index + 1, statements.len(), statement);
            transaction
                .execute(statement, &[])
                .await
                .map_err(|e| MigrateError::Statement {
                    file: file.to_string(),
                    message: e.to_string(),
                })?;
        }

        match ledger_write {
            LedgerWrite::Record => self.ledger.record_executed(transaction, file).await,
            LedgerWrite::Remove => self.ledger.remove_executed(transaction, file).await,
        }
    }

    pub(crate) async fn acquire_lock(&self) -> MigrateResult<Option<Box<dyn AdvisoryLock>>> {
        match self.config.advisory_lock_key {
            Some(key) => {
                tracing::debug!("Waiting for advisory lock {}", key);
                Ok(Some(self.pool.advisory_lock(key).await?))
            }
            None => Ok(None),
        }
    }

    pub(crate) async fn release_lock(&self, lock: Option<Box<dyn AdvisoryLock>>) {
        if let Some(lock) = lock {
            let key = lock.key();
            if let Err(err) = lock.release().await {
                self.logger
                    .warn(&format!("Failed to release advisory lock {}", key), Some(&err));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{LockEvent, MemoryPool, RecordingLogger};
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        pool: MemoryPool,
        logger: Arc<RecordingLogger>,
        runner: MigrationRunner,
    }

    fn fixture(files: &[(&str, &str)]) -> Fixture {
        fixture_with(files, |config| config)
    }

    fn fixture_with(files: &[(&str, &str)], tweak: impl FnOnce(MigrationConfig) -> MigrationConfig) -> Fixture {
        let dir = TempDir::new().unwrap();
        let migrations = dir.path().join("migrations");
        fs::create_dir(&migrations).unwrap();
        for (name, content) in files {
            fs::write(migrations.join(name), content).unwrap();
        }

        let pool = MemoryPool::new();
        let logger = Arc::new(RecordingLogger::default());
        let config = tweak(MigrationConfig::new(&migrations, dir.path().join("seeds")).with_logger(logger.clone()));
        let runner = MigrationRunner::new(Arc::new(pool.clone()), config).unwrap();

        Fixture {
            dir,
            pool,
            logger,
            runner,
        }
    }

    #[tokio::test]
    async fn test_status_on_empty_ledger() {
        let f = fixture(&[("002_b.sql", "CREATE TABLE b (id int);"), ("001_a.sql", "CREATE TABLE a (id int);")]);

        let status = f.runner.status().await.unwrap();
        assert_eq!(status.all_migrations, vec!["001_a.sql", "002_b.sql"]);
        assert!(status.executed_migrations.is_empty());
        assert_eq!(status.pending_migrations, vec!["001_a.sql", "002_b.sql"]);
        assert!(f.pool.ledger_table_exists());
    }

    #[tokio::test]
    async fn test_run_pending_applies_in_order_and_records() {
        let f = fixture(&[
            ("001_a.sql", "CREATE TABLE a (id int);\nCREATE INDEX idx_a ON a(id);\n"),
            ("002_b.sql", "CREATE TABLE b (id int);"),
        ]);

        let result = f.runner.run_pending().await.unwrap();

        assert_eq!(result.applied_migrations, vec!["001_a.sql", "002_b.sql"]);
        assert_eq!(result.skipped_count, 0);
        assert_eq!(f.pool.ledger_names(), vec!["001_a.sql", "002_b.sql"]);
        assert_eq!(
            f.pool.executed_statements(),
            vec!["CREATE TABLE a (id int);", "CREATE INDEX idx_a ON a(id);", "CREATE TABLE b (id int);"]
        );
        assert_eq!(f.pool.commit_count(), 2);
        assert!(f.logger.contains("Found 2 pending migrations"));
        assert!(f.logger.contains("Migration completed: 002_b.sql"));
        assert!(f.logger.contains("All migrations completed successfully"));
    }

    #[tokio::test]
    async fn test_run_pending_twice_is_idempotent() {
        let f = fixture(&[("001_a.sql", "CREATE TABLE a (id int);")]);

        f.runner.run_pending().await.unwrap();
        let records_before = f.pool.ledger_records();

        let second = f.runner.run_pending().await.unwrap();
        assert_eq!(second.applied_count(), 0);
        assert_eq!(second.skipped_count, 1);
        assert_eq!(f.pool.ledger_records(), records_before);
        assert_eq!(f.pool.executed_statements().len(), 1);
        assert!(f.logger.contains("No pending migrations found"));
    }

    #[tokio::test]
    async fn test_no_migration_files() {
        let f = fixture(&[]);

        let result = f.runner.run_pending().await.unwrap();
        assert_eq!(result.applied_count(), 0);
        assert!(f.logger.contains("No migration files found"));
        assert_eq!(f.pool.commit_count(), 0);
    }

    #[tokio::test]
    async fn test_failing_statement_rolls_back_file_and_halts_batch() {
        let f = fixture(&[
            ("001_a.sql", "CREATE TABLE a (id int);"),
            ("002_b.sql", "CREATE TABLE b (id int);\nINSERT INTO b VALUES ('bad');\n"),
            ("003_c.sql", "CREATE TABLE c (id int);"),
        ]);
        f.pool.fail_on("'bad'");

        let err = f.runner.run_pending().await.unwrap_err();

        match &err {
            MigrateError::Statement { file, message } => {
                assert_eq!(file, "002_b.sql");
                assert!(message.contains("simulated failure"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(f.pool.ledger_names(), vec!["001_a.sql"]);
        assert_eq!(f.pool.executed_statements(), vec!["CREATE TABLE a (id int);"]);
        assert_eq!(f.pool.rollback_count(), 1);
        assert!(f.logger.errors().iter().any(|e| e.starts_with("Migration failed: 002_b.sql")));
        assert!(!f.logger.contains("003_c.sql"));
    }

    #[tokio::test]
    async fn test_ledger_insert_failure_rolls_back_statements() {
        let f = fixture(&[("001_a.sql", "CREATE TABLE a (id int);")]);
        f.pool.fail_on("INSERT INTO migrations");

        let err = f.runner.run_pending().await.unwrap_err();

        assert!(matches!(err, MigrateError::Ledger(_)));
        assert!(f.pool.executed_statements().is_empty());
        assert!(f.pool.ledger_names().is_empty());
    }

    #[tokio::test]
    async fn test_forward_run_skips_down_section() {
        let f = fixture(&[("003_c.sql", "CREATE TABLE c (id int);\n\n-- DOWN\nDROP TABLE c;\n")]);

        f.runner.run_pending().await.unwrap();
        assert_eq!(f.pool.executed_statements(), vec!["CREATE TABLE c (id int);"]);
    }

    #[tokio::test]
    async fn test_run_migration_applies_single_file() {
        let f = fixture(&[("001_a.sql", "CREATE TABLE a (id int);"), ("002_b.sql", "CREATE TABLE b (id int);")]);

        f.runner.run_migration("002_b.sql").await.unwrap();

        assert_eq!(f.pool.ledger_names(), vec!["002_b.sql"]);
        let status = f.runner.status().await.unwrap();
        assert_eq!(status.pending_migrations, vec!["001_a.sql"]);
    }

    #[tokio::test]
    async fn test_run_migration_twice_fails_on_ledger() {
        let f = fixture(&[("001_a.sql", "CREATE TABLE a (id int);")]);

        f.runner.run_migration("001_a.sql").await.unwrap();
        let err = f.runner.run_migration("001_a.sql").await.unwrap_err();

        assert!(matches!(err, MigrateError::Ledger(_)));
        assert_eq!(f.pool.ledger_names(), vec!["001_a.sql"]);
        assert_eq!(f.pool.executed_statements().len(), 1);
    }

    #[tokio::test]
    async fn test_run_migration_rejects_paths() {
        let f = fixture(&[]);

        let err = f.runner.run_migration("../secret.sql").await.unwrap_err();
        assert!(err.is_configuration());

        let err = f.runner.run_migration("404_missing.sql").await.unwrap_err();
        assert!(matches!(err, MigrateError::Io { .. }));
    }

    #[tokio::test]
    async fn test_missing_migrations_dir_warns_and_reports_nothing() {
        let f = fixture(&[]);
        fs::remove_dir(f.dir.path().join("migrations")).unwrap();

        let status = f.runner.status().await.unwrap();
        assert!(status.all_migrations.is_empty());
        assert_eq!(f.logger.warnings().len(), 1);
    }

    #[tokio::test]
    async fn test_advisory_lock_wraps_run_even_on_failure() {
        let f = fixture_with(&[("001_a.sql", "SELECT broken;")], |c| c.with_advisory_lock(42));
        f.pool.fail_on("broken");

        assert!(f.runner.run_pending().await.is_err());
        assert_eq!(f.pool.lock_events(), vec![LockEvent::Acquired(42), LockEvent::Released(42)]);
    }

    #[tokio::test]
    async fn test_no_lock_by_default() {
        let f = fixture(&[("001_a.sql", "SELECT 1;")]);

        f.runner.run_pending().await.unwrap();
        assert!(f.pool.lock_events().is_empty());
    }

    #[tokio::test]
    async fn test_custom_ledger_table() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("001_a.sql"), "SELECT 1;").unwrap();
        let pool = MemoryPool::with_ledger_table("schema_history");
        let config = MigrationConfig::new(dir.path(), dir.path().join("seeds"))
            .with_ledger_table("schema_history")
            .with_logger(Arc::new(RecordingLogger::default()));
        let runner = MigrationRunner::new(Arc::new(pool.clone()), config).unwrap();

        runner.run_pending().await.unwrap();
        assert_eq!(pool.ledger_names(), vec!["001_a.sql"]);
    }
}
