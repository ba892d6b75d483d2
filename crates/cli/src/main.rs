mod commands;
mod logging;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use homeacct_migrate::{DatabaseConfig, DatabasePool, MigrationConfig, MigrationRunner};

use commands::migrate;
use logging::{init_logging, LoggingConfig};

#[derive(Parser, Debug)]
#[command(name = "homeacct")]
#[command(version, about = "Database migrations and seeds for homeacct")]
struct Cli {
    #[command(flatten)]
    database: DatabaseArgs,

    /// Path to migrations directory
    #[arg(long, short = 'm', global = true, default_value = "database/migrations")]
    migrations_path: PathBuf,

    /// Path to seeds directory
    #[arg(long, short = 's', global = true, default_value = "database/seeds")]
    seeds_path: PathBuf,

    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Machine readable output: JSON logs, and JSON for `status`
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Connection overrides; anything omitted comes from `DB_*` / `DATABASE_URL`
#[derive(Args, Debug, Default)]
struct DatabaseArgs {
    /// Database host
    #[arg(long, global = true)]
    host: Option<String>,

    /// Database port
    #[arg(long, short = 'p', global = true)]
    port: Option<u16>,

    /// Database username
    #[arg(long, short = 'u', global = true)]
    username: Option<String>,

    /// Database password
    #[arg(long, short = 'w', global = true)]
    password: Option<String>,

    /// Database name
    #[arg(long, short = 'd', global = true)]
    database: Option<String>,

    /// Full connection URL, overrides the individual options
    #[arg(long, global = true)]
    database_url: Option<String>,
}

impl DatabaseArgs {
    fn has_parts(&self) -> bool {
        self.host.is_some()
            || self.port.is_some()
            || self.username.is_some()
            || self.password.is_some()
            || self.database.is_some()
    }

    /// Layer command-line values over `base`
    ///
    /// Explicit parts win over an inherited `DATABASE_URL`; an explicit
    /// `--database-url` wins over everything.
    fn apply(&self, mut base: DatabaseConfig) -> DatabaseConfig {
        if self.has_parts() {
            base.url = None;
        }
        if let Some(host) = &self.host {
            base.host = host.clone();
        }
        if let Some(port) = self.port {
            base.port = port;
        }
        if let Some(username) = &self.username {
            base.username = username.clone();
        }
        if let Some(password) = &self.password {
            base.password = password.clone();
        }
        if let Some(database) = &self.database {
            base.database = database.clone();
        }
        if let Some(url) = &self.database_url {
            base.url = Some(url.clone());
        }
        base
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run all pending migrations
    Run,

    /// Show migration status
    Status,

    /// Rollback a specific migration using its DOWN section
    Rollback {
        /// Migration file name, e.g. 003_add_budgets.sql
        #[arg(long)]
        migration: String,
    },

    /// Run all seed files
    Seeds,

    /// Create a new numbered migration and seed file
    Create {
        /// Migration name
        name: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = init_logging(&LoggingConfig::from_flags(cli.verbose, cli.json)) {
        eprintln!("Failed to initialize logging: {}", err);
    }

    match execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{:#}", err);
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = MigrationConfig::new(&cli.migrations_path, &cli.seeds_path);

    if let Commands::Create { name } = &cli.command {
        return migrate::create(config, name);
    }

    config.validate()?;

    let database = cli.database.apply(DatabaseConfig::from_env()?);
    let pool = Arc::new(database.connect().await.context("Could not connect to the database")?);
    tracing::info!("Database connection established");

    let runner = MigrationRunner::new(pool.clone(), config)?;
    let result = match &cli.command {
        Commands::Run => migrate::run(&runner).await,
        Commands::Status => migrate::status(&runner, cli.json).await,
        Commands::Rollback { migration } => migrate::rollback(&runner, migration).await,
        Commands::Seeds => migrate::seeds(&runner).await,
        Commands::Create { .. } => Ok(()),
    };

    pool.close().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::ffi::OsString;
    use tempfile::TempDir;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["homeacct", "run"]).unwrap();
        assert_eq!(cli.migrations_path, PathBuf::from("database/migrations"));
        assert_eq!(cli.seeds_path, PathBuf::from("database/seeds"));
        assert!(!cli.verbose && !cli.json);
        assert!(matches!(cli.command, Commands::Run));
    }

    #[test]
    fn test_global_options_after_subcommand() {
        let cli = Cli::try_parse_from([
            "homeacct", "status", "--json", "-m", "db/m", "-p", "6543", "-d", "books", "-v",
        ])
        .unwrap();

        assert!(cli.json && cli.verbose);
        assert_eq!(cli.migrations_path, PathBuf::from("db/m"));
        assert_eq!(cli.database.port, Some(6543));
        assert_eq!(cli.database.database.as_deref(), Some("books"));
    }

    #[test]
    fn test_rollback_requires_migration_name() {
        assert!(Cli::try_parse_from(["homeacct", "rollback"]).is_err());

        let cli = Cli::try_parse_from(["homeacct", "rollback", "--migration", "003_c.sql"]).unwrap();
        match cli.command {
            Commands::Rollback { migration } => assert_eq!(migration, "003_c.sql"),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_create_takes_a_name() {
        let cli = Cli::try_parse_from(["homeacct", "create", "add_budgets"]).unwrap();
        assert!(matches!(cli.command, Commands::Create { ref name } if name == "add_budgets"));
        assert!(Cli::try_parse_from(["homeacct", "create"]).is_err());
    }

    #[test]
    fn test_explicit_parts_replace_inherited_url() {
        let base = DatabaseConfig {
            url: Some("postgres://env@envhost/envdb".to_string()),
            ..DatabaseConfig::default()
        };

        let untouched = DatabaseArgs::default().apply(base.clone());
        assert_eq!(untouched.url, base.url);

        let parts = DatabaseArgs {
            host: Some("db.local".to_string()),
            ..DatabaseArgs::default()
        }
        .apply(base.clone());
        assert_eq!(parts.url, None);
        assert_eq!(parts.host, "db.local");

        let url = DatabaseArgs {
            host: Some("db.local".to_string()),
            database_url: Some("postgres://cli@clihost/clidb".to_string()),
            ..DatabaseArgs::default()
        }
        .apply(base);
        assert_eq!(url.url.as_deref(), Some("postgres://cli@clihost/clidb"));
    }

    #[tokio::test]
    async fn test_missing_migrations_dir_fails_before_connecting() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        let cli = Cli::try_parse_from([
            OsString::from("homeacct"),
            OsString::from("run"),
            OsString::from("--migrations-path"),
            missing.into_os_string(),
        ])
        .unwrap();

        let err = execute(cli).await.unwrap_err();
        assert!(err.to_string().contains("Migrations path does not exist"));
    }

    #[tokio::test]
    async fn test_create_does_not_need_migrations_dir() {
        let dir = TempDir::new().unwrap();
        let migrations = dir.path().join("fresh/migrations");
        let seeds = dir.path().join("fresh/seeds");
        let cli = Cli::try_parse_from([
            OsString::from("homeacct"),
            OsString::from("create"),
            OsString::from("first"),
            OsString::from("-m"),
            migrations.clone().into_os_string(),
            OsString::from("-s"),
            seeds.into_os_string(),
        ])
        .unwrap();

        execute(cli).await.unwrap();
        assert!(migrations.join("001_first.sql").exists());
    }
}
