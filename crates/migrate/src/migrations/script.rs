//! Migration file sections
//!
//! A migration file is forward SQL with an optional rollback section:
//!
//! ```sql
//! CREATE TABLE c (id SERIAL PRIMARY KEY);
//!
//! -- DOWN
//! DROP TABLE c;
//! ```
//!
//! The down-section starts after a `-- DOWN` marker line and runs to the next
//! `-- UP` marker or the end of the file. Markers are case-insensitive.

use once_cell::sync::Lazy;
use regex::Regex;

static DOWN_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)--\s*DOWN\s*\n").expect("valid regex"));
static UP_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)--\s*UP").expect("valid regex"));

/// A migration file split into its forward and rollback parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationScript {
    /// SQL applied by a forward run
    pub up_sql: String,
    /// Trimmed rollback SQL; `None` when the file has no `-- DOWN` marker
    pub down_sql: Option<String>,
}

impl MigrationScript {
    pub fn parse(content: &str) -> Self {
        let Some(marker) = DOWN_MARKER.find(content) else {
            return Self {
                up_sql: content.to_string(),
                down_sql: None,
            };
        };

        let after = &content[marker.end()..];
        let (down, resume) = match UP_MARKER.find(after) {
            Some(up) => (&after[..up.start()], &after[up.start()..]),
            None => (after, ""),
        };

        let mut up_sql = content[..marker.start()].to_string();
        if !resume.is_empty() {
            up_sql.push('\n');
            up_sql.push_str(resume);
        }

        Self {
            up_sql,
            down_sql: Some(down.trim().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::splitter::split_statements;

    #[test]
    fn test_file_without_down_section_is_all_forward() {
        let content = "CREATE TABLE a (id int);\n";
        let script = MigrationScript::parse(content);
        assert_eq!(script.up_sql, content);
        assert_eq!(script.down_sql, None);
    }

    #[test]
    fn test_down_section_runs_to_end_of_file() {
        let script = MigrationScript::parse("CREATE TABLE c (id int);\n\n-- DOWN\nDROP TABLE c;\n\n");
        assert_eq!(script.down_sql.as_deref(), Some("DROP TABLE c;"));
        assert_eq!(split_statements(&script.up_sql), vec!["CREATE TABLE c (id int);"]);
    }

    #[test]
    fn test_down_section_stops_at_up_marker() {
        let content = "-- down\nDROP TABLE c;\n-- Up\nCREATE TABLE c (id int);\n";
        let script = MigrationScript::parse(content);
        assert_eq!(script.down_sql.as_deref(), Some("DROP TABLE c;"));
        assert_eq!(split_statements(&script.up_sql), vec!["CREATE TABLE c (id int);"]);
    }

    #[test]
    fn test_markers_are_case_insensitive_and_spacing_tolerant() {
        let script = MigrationScript::parse("SELECT 1;\n--Down  \nDROP VIEW v;\n");
        assert_eq!(script.down_sql.as_deref(), Some("DROP VIEW v;"));
    }

    #[test]
    fn test_empty_down_section() {
        let script = MigrationScript::parse("CREATE TABLE c (id int);\n-- DOWN\n   \n");
        assert_eq!(script.down_sql.as_deref(), Some(""));
    }

    #[test]
    fn test_marker_without_trailing_newline_is_not_a_section() {
        let script = MigrationScript::parse("CREATE TABLE c (id int);\n-- DOWN");
        assert_eq!(script.down_sql, None);
    }
}
