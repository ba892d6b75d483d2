//! Migration Manager - File system operations for migrations
//!
//! Creates the numbered migration and seed file pair for a new schema change.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;

use super::definitions::{MigrationConfig, SQL_EXTENSION};
use crate::error::{MigrateError, MigrateResult};

/// Highest ordinal a three-digit prefix can hold
const MAX_MIGRATION_NUMBER: u32 = 999;

/// Paths of a freshly generated migration pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedMigration {
    pub number: u32,
    pub migration_path: PathBuf,
    pub seed_path: PathBuf,
}

impl CreatedMigration {
    pub fn migration_file_name(&self) -> String {
        file_name(&self.migration_path)
    }

    pub fn seed_file_name(&self) -> String {
        file_name(&self.seed_path)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Migration manager for creating migration files
pub struct MigrationManager {
    config: MigrationConfig,
}

impl MigrationManager {
    pub fn new(config: MigrationConfig) -> Self {
        Self { config }
    }

    /// Create `NNN_name.sql` and `NNN_name_seed.sql` from templates
    pub fn create_migration(&self, name: &str) -> MigrateResult<CreatedMigration> {
        let slug = normalize_name(name);
        if slug.is_empty() {
            return Err(MigrateError::Configuration(format!(
                "Migration name must contain letters or digits, got '{}'",
                name
            )));
        }

        let migrations_dir = &self.config.migrations_dir;
        let seeds_dir = &self.config.seeds_dir;
        fs::create_dir_all(migrations_dir).map_err(|e| MigrateError::io(migrations_dir, e))?;
        fs::create_dir_all(seeds_dir).map_err(|e| MigrateError::io(seeds_dir, e))?;

        let number = self.next_number()?;
        let migration_file = format!("{:03}_{}{}", number, slug, SQL_EXTENSION);
        let seed_file = format!("{:03}_{}_seed{}", number, slug, SQL_EXTENSION);
        let migration_path = migrations_dir.join(&migration_file);
        let seed_path = seeds_dir.join(&seed_file);

        for path in [&migration_path, &seed_path] {
            if path.exists() {
                return Err(MigrateError::Configuration(format!(
                    "Refusing to overwrite existing file: {}",
                    path.display()
                )));
            }
        }

        let date = Utc::now().format("%Y-%m-%d").to_string();
        write_new(&migration_path, &migration_template(&slug, &date))?;
        write_new(&seed_path, &seed_template(&slug, &migration_file))?;

        tracing::info!("Created migration {} and seed {}", migration_file, seed_file);

        Ok(CreatedMigration {
            number,
            migration_path,
            seed_path,
        })
    }

    /// One past the highest numeric prefix in the migrations directory
    fn next_number(&self) -> MigrateResult<u32> {
        let dir = &self.config.migrations_dir;
        let entries = fs::read_dir(dir).map_err(|e| MigrateError::io(dir, e))?;

        let mut highest = 0;
        for entry in entries {
            let entry = entry.map_err(|e| MigrateError::io(dir, e))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.ends_with(SQL_EXTENSION) {
                continue;
            }
            if let Some(number) = leading_number(&name) {
                highest = highest.max(number);
            }
        }

        if highest >= MAX_MIGRATION_NUMBER {
            return Err(MigrateError::Configuration(format!(
                "Migration numbers are exhausted (last is {})",
                highest
            )));
        }
        Ok(highest + 1)
    }
}

fn leading_number(file: &str) -> Option<u32> {
    let digits: String = file.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Lowercase snake case: `AddUsers`, `add users` and `add-users` become `add_users`
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;

    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            if c.is_ascii_uppercase() && prev_lower {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        } else {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            prev_lower = false;
        }
    }

    out.trim_end_matches('_').to_string()
}

fn write_new(path: &Path, content: &str) -> MigrateResult<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| MigrateError::io(path, e))?;
    file.write_all(content.as_bytes())
        .map_err(|e| MigrateError::io(path, e))
}

fn migration_template(name: &str, date: &str) -> String {
    format!(
        "-- Migration: {name}\n\
         -- Created: {date}\n\
         -- Description: [Add your migration description here]\n\
         \n\
         -- Add your SQL statements here\n\
         -- Example:\n\
         -- CREATE TABLE example (\n\
         --     id SERIAL PRIMARY KEY,\n\
         --     name VARCHAR(255) NOT NULL,\n\
         --     created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP\n\
         -- );\n\
         \n\
         -- CREATE INDEX IF NOT EXISTS idx_example_name ON example(name);\n\
         \n\
         -- To make this migration reversible, add a line reading \"-- DOWN\" after\n\
         -- the statements above, followed by the SQL that undoes them, e.g.\n\
         -- DROP TABLE example;\n"
    )
}

fn seed_template(name: &str, migration_file: &str) -> String {
    format!(
        "-- Seed: {name} sample data\n\
         -- Migration: {migration_file}\n\
         -- Description: [Add your seed description here]\n\
         \n\
         -- Seeds run on every invocation; keep them idempotent.\n\
         -- Example:\n\
         -- INSERT INTO example (name)\n\
         -- SELECT * FROM (VALUES\n\
         --     ('Sample 1'),\n\
         --     ('Sample 2')\n\
         -- ) AS v(name)\n\
         -- WHERE NOT EXISTS (SELECT 1 FROM example);\n"
    )
}
