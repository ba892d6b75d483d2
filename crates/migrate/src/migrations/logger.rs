//! Pluggable progress logger
//!
//! The host application may hand the runner its own logger; when none is
//! configured [`TracingLogger`] forwards everything to `tracing`.

use std::error::Error;
use std::fmt::Write as _;

/// Receives progress and failure messages from the runner
pub trait MigrationLogger: Send + Sync {
    fn log(&self, message: &str);
    fn warn(&self, message: &str, error: Option<&(dyn Error + 'static)>);
    fn error(&self, message: &str, error: Option<&(dyn Error + 'static)>);
}

/// Default logger backed by `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl MigrationLogger for TracingLogger {
    fn log(&self, message: &str) {
        tracing::info!(target: "homeacct_migrate", "{}", message);
    }

    fn warn(&self, message: &str, error: Option<&(dyn Error + 'static)>) {
        match error {
            Some(err) => tracing::warn!(target: "homeacct_migrate", error = %error_chain(err), "{}", message),
            None => tracing::warn!(target: "homeacct_migrate", "{}", message),
        }
    }

    fn error(&self, message: &str, error: Option<&(dyn Error + 'static)>) {
        match error {
            Some(err) => tracing::error!(target: "homeacct_migrate", error = %error_chain(err), "{}", message),
            None => tracing::error!(target: "homeacct_migrate", "{}", message),
        }
    }
}

/// Render an error with its `source()` chain, outermost first
pub fn error_chain(err: &(dyn Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let _ = write!(out, ": {}", cause);
        source = cause.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MigrateError;

    #[test]
    fn test_error_chain_walks_sources() {
        let err = MigrateError::Io {
            path: "seeds/001_a_seed.sql".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let rendered = error_chain(&err);
        assert!(rendered.starts_with("I/O error on seeds/001_a_seed.sql"));
        assert!(rendered.ends_with(": denied"));
    }
}
