//! Migration Ledger - the table of applied migrations
//!
//! The ledger is the only durable state the core owns. Writes always happen
//! inside the caller's transaction so a migration and its ledger row commit
//! or roll back together.

use super::definitions::{validate_identifier, MigrationRecord};
use crate::backends::{DatabasePool, DatabaseTransaction, DatabaseValue};
use crate::error::{MigrateError, MigrateResult};

/// Reads and writes the ledger table
#[derive(Debug, Clone)]
pub struct MigrationLedger {
    table: String,
}

impl MigrationLedger {
    pub fn new(table: impl Into<String>) -> MigrateResult<Self> {
        let table = table.into();
        validate_identifier(&table)?;
        Ok(Self { table })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// SQL to create the ledger table
    pub fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    \
                id SERIAL PRIMARY KEY,\n    \
                name VARCHAR(255) NOT NULL UNIQUE,\n    \
                executed_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP\n\
            )",
            self.table
        )
    }

    /// SQL to list applied migrations in application order
    pub fn select_sql(&self) -> String {
        format!("SELECT id, name, executed_at FROM {} ORDER BY id", self.table)
    }

    /// SQL to record a migration as applied
    pub fn insert_sql(&self) -> String {
        format!("INSERT INTO {} (name) VALUES ($1)", self.table)
    }

    /// SQL to remove a migration record (for rollback)
    pub fn delete_sql(&self) -> String {
        format!("DELETE FROM {} WHERE name = $1", self.table)
    }

    /// Create the ledger table if it does not exist
    pub async fn ensure_table(&self, pool: &dyn DatabasePool) -> MigrateResult<()> {
        pool.execute(&self.create_table_sql(), &[])
            .await
            .map_err(|e| MigrateError::Ledger(format!("Failed to create {} table: {}", self.table, e)))?;
        Ok(())
    }

    /// Applied migrations, oldest first
    pub async fn list_records(&self, pool: &dyn DatabasePool) -> MigrateResult<Vec<MigrationRecord>> {
        self.ensure_table(pool).await?;

        let rows = pool
            .fetch_all(&self.select_sql(), &[])
            .await
            .map_err(|e| MigrateError::Ledger(format!("Failed to query applied migrations: {}", e)))?;

        rows.iter()
            .map(|row| {
                Ok(MigrationRecord {
                    id: row.get_i64("id")?,
                    name: row.get_string("name")?,
                    executed_at: row.get_datetime("executed_at")?,
                })
            })
            .collect()
    }

    /// Names of applied migrations, oldest first
    pub async fn list_executed(&self, pool: &dyn DatabasePool) -> MigrateResult<Vec<String>> {
        Ok(self
            .list_records(pool)
            .await?
            .into_iter()
            .map(|record| record.name)
            .collect())
    }

    /// Insert the ledger row for `name` inside `tx`
    pub async fn record_executed(&self, tx: &mut dyn DatabaseTransaction, name: &str) -> MigrateResult<()> {
        tx.execute(&self.insert_sql(), &[DatabaseValue::from(name)])
            .await
            .map_err(|e| MigrateError::Ledger(format!("Failed to record migration {}: {}", name, e)))?;
        Ok(())
    }

    /// Delete the ledger row for `name` inside `tx`
    pub async fn remove_executed(&self, tx: &mut dyn DatabaseTransaction, name: &str) -> MigrateResult<()> {
        tx.execute(&self.delete_sql(), &[DatabaseValue::from(name)])
            .await
            .map_err(|e| MigrateError::Ledger(format!("Failed to remove migration record {}: {}", name, e)))?;
        Ok(())
    }
}
