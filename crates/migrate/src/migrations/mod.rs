//! Migration System
//!
//! Forward-only numbered SQL migrations with optional `-- DOWN` sections,
//! a ledger table of applied files, and best-effort seed scripts.

pub mod definitions;
pub mod ledger;
pub mod logger;
pub mod manager;
pub mod rollback;
pub mod runner;
pub mod scanner;
pub mod script;
pub mod seeder;
pub mod splitter;

pub use definitions::*;
pub use ledger::MigrationLedger;
pub use logger::{error_chain, MigrationLogger, TracingLogger};
pub use manager::{normalize_name, CreatedMigration, MigrationManager};
pub use runner::MigrationRunner;
pub use scanner::list_files;
pub use script::MigrationScript;
pub use seeder::SeedRunner;
pub use splitter::split_statements;
