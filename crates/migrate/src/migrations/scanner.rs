//! Migration directory scanning

use std::path::Path;

use super::logger::MigrationLogger;
use crate::error::MigrateError;

/// List the file names in `dir` ending with `extension`, sorted ascending
///
/// An unreadable or missing directory yields an empty list and a warning.
pub async fn list_files(dir: &Path, extension: &str, logger: &dyn MigrationLogger) -> Vec<String> {
    match read_names(dir).await {
        Ok(mut names) => {
            names.retain(|name| name.ends_with(extension));
            names.sort();
            names
        }
        Err(err) => {
            logger.warn(
                &format!("Directory not found or unreadable: {}", dir.display()),
                Some(&err),
            );
            Vec::new()
        }
    }
}

async fn read_names(dir: &Path) -> Result<Vec<String>, MigrateError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| MigrateError::io(dir, e))?;

    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| MigrateError::io(dir, e))? {
        let is_file = entry
            .file_type()
            .await
            .map(|t| t.is_file() || t.is_symlink())
            .unwrap_or(false);
        if !is_file {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(raw) => tracing::debug!("Skipping non UTF-8 file name {:?}", raw),
        }
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingLogger;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_lists_only_matching_files_sorted() {
        let dir = TempDir::new().unwrap();
        for name in ["010_j.sql", "002_b.sql", "001_a.sql", "README.md", "003_c.sql.bak"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        fs::create_dir(dir.path().join("004_dir.sql")).unwrap();

        let logger = RecordingLogger::default();
        let files = list_files(dir.path(), ".sql", &logger).await;

        assert_eq!(files, vec!["001_a.sql", "002_b.sql", "010_j.sql"]);
        assert!(logger.warnings().is_empty());
    }

    #[tokio::test]
    async fn test_missing_directory_warns_and_returns_empty() {
        let dir = TempDir::new().unwrap();
        let logger = RecordingLogger::default();

        let files = list_files(&dir.path().join("seeds"), ".sql", &logger).await;

        assert!(files.is_empty());
        let warnings = logger.warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("Directory not found or unreadable"));
    }

    #[tokio::test]
    async fn test_ordering_is_lexicographic() {
        let dir = TempDir::new().unwrap();
        for name in ["2_b.sql", "10_a.sql", "001_z.sql"] {
            fs::write(dir.path().join(name), "").unwrap();
        }

        let files = list_files(dir.path(), ".sql", &RecordingLogger::default()).await;
        assert_eq!(files, vec!["001_z.sql", "10_a.sql", "2_b.sql"]);
    }
}
