//! Log output for the CLI
//!
//! Installs a `tracing-subscriber` registry. `RUST_LOG` wins over the
//! configured filter. Logs go to stderr so command output on stdout stays
//! machine readable.

use std::io;

use tracing_subscriber::{fmt::Layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logging configuration for the CLI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "warn")
    pub level: String,
    /// Emit one JSON object per event instead of plain text
    pub json_format: bool,
    /// Environment filter (e.g. "homeacct_migrate=debug,sqlx=warn")
    pub env_filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            env_filter: Some("info,sqlx=warn".to_string()),
        }
    }
}

impl LoggingConfig {
    pub fn from_flags(verbose: bool, json: bool) -> Self {
        if verbose {
            Self {
                level: "debug".to_string(),
                json_format: json,
                env_filter: Some("debug,sqlx=info".to_string()),
            }
        } else {
            Self {
                json_format: json,
                ..Self::default()
            }
        }
    }

    fn filter_directive(&self) -> &str {
        self.env_filter.as_deref().unwrap_or(&self.level)
    }
}

/// Initialize logging for the process
pub fn init_logging(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(config.filter_directive()))?;

    if config.json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stderr).json())
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stderr).with_target(false))
            .try_init()?;
    }

    tracing::debug!(
        "Logging initialized (level: {}, format: {})",
        config.level,
        if config.json_format { "JSON" } else { "text" }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_select_level_and_format() {
        let quiet = LoggingConfig::from_flags(false, false);
        assert_eq!(quiet, LoggingConfig::default());
        assert_eq!(quiet.filter_directive(), "info,sqlx=warn");

        let verbose = LoggingConfig::from_flags(true, true);
        assert_eq!(verbose.level, "debug");
        assert!(verbose.json_format);
        assert_eq!(verbose.filter_directive(), "debug,sqlx=info");
    }

    #[test]
    fn test_filter_falls_back_to_level() {
        let config = LoggingConfig {
            level: "warn".to_string(),
            json_format: false,
            env_filter: None,
        };
        assert_eq!(config.filter_directive(), "warn");
    }
}
