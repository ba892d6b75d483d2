use std::fmt::Write as _;

use anyhow::Context;
use homeacct_migrate::{MigrationConfig, MigrationManager, MigrationRecord, MigrationRunner, MigrationStatus};
use serde_json::json;

pub fn create(config: MigrationConfig, name: &str) -> anyhow::Result<()> {
    let created = MigrationManager::new(config)
        .create_migration(name)
        .with_context(|| format!("Failed to create migration '{}'", name))?;

    println!("Migration files created successfully:");
    println!("   {}", created.migration_path.display());
    println!("   {}", created.seed_path.display());
    println!();
    println!("Next steps:");
    println!("1. Edit the migration file to add your SQL statements");
    println!("2. Edit the seed file to add sample data (optional)");
    println!("3. Run `homeacct run` to apply the migration");
    Ok(())
}

pub async fn run(runner: &MigrationRunner) -> anyhow::Result<()> {
    let result = runner.run_pending().await?;
    println!(
        "Applied {} migration(s), {} already up to date ({} ms)",
        result.applied_count(),
        result.skipped_count,
        result.execution_time_ms
    );
    Ok(())
}

pub async fn rollback(runner: &MigrationRunner, migration: &str) -> anyhow::Result<()> {
    runner.rollback(migration).await?;
    println!("Rolled back {}", migration);
    Ok(())
}

pub async fn seeds(runner: &MigrationRunner) -> anyhow::Result<()> {
    let result = runner.run_seeds().await;
    println!(
        "Seeds: {} completed, {} failed",
        result.completed.len(),
        result.failed.len()
    );
    for failure in &result.failed {
        println!("   {}: {}", failure.file, failure.message);
    }
    Ok(())
}

pub async fn status(runner: &MigrationRunner, json: bool) -> anyhow::Result<()> {
    let status = runner.status().await?;
    let records = runner.executed_records().await?;

    if json {
        println!("{}", render_status_json(&status, &records)?);
    } else {
        print!("{}", render_status(&status, &records));
    }
    Ok(())
}

pub fn render_status(status: &MigrationStatus, records: &[MigrationRecord]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Migration Status:");
    let _ = writeln!(out, "   Total migrations: {}", status.all_migrations.len());
    let _ = writeln!(out, "   Executed: {}", status.executed_migrations.len());
    let _ = writeln!(out, "   Pending: {}", status.pending_migrations.len());
    out.push('\n');

    if !status.executed_migrations.is_empty() {
        let _ = writeln!(out, "Executed migrations:");
        for name in &status.executed_migrations {
            match records.iter().find(|record| &record.name == name) {
                Some(record) => {
                    let _ = writeln!(out, "   + {} ({})", name, record.executed_at.format("%Y-%m-%d %H:%M:%S"));
                }
                None => {
                    let _ = writeln!(out, "   + {}", name);
                }
            }
        }
        out.push('\n');
    }

    if !status.pending_migrations.is_empty() {
        let _ = writeln!(out, "Pending migrations:");
        for name in &status.pending_migrations {
            let _ = writeln!(out, "   - {}", name);
        }
        out.push('\n');
    }

    // ledger rows whose file has been deleted from disk
    let orphaned: Vec<&String> = status
        .executed_migrations
        .iter()
        .filter(|name| !status.all_migrations.contains(name))
        .collect();
    if !orphaned.is_empty() {
        let _ = writeln!(out, "Applied but missing on disk:");
        for name in orphaned {
            let _ = writeln!(out, "   ! {}", name);
        }
        out.push('\n');
    }

    out
}

pub fn render_status_json(status: &MigrationStatus, records: &[MigrationRecord]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&json!({
        "all_migrations": status.all_migrations,
        "executed_migrations": status.executed_migrations,
        "pending_migrations": status.pending_migrations,
        "records": records,
    }))
}
