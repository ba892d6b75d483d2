//! SQL statement splitting
//!
//! Splits a script into executable statements without breaking PostgreSQL
//! dollar-quoted bodies (`$$ ... $$`, `$tag$ ... $tag$`) at their inner
//! semicolons. This is a line scanner, not a lexer: semicolons inside
//! single-quoted literals are not protected.

use once_cell::sync::Lazy;
use regex::Regex;

static DOLLAR_QUOTE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$([^$]*)\$").expect("valid regex"));

/// Dollar-quote tracking state carried across lines
#[derive(Debug, Default)]
struct DollarQuote {
    /// Tag of the open region, `None` when outside any region
    open_tag: Option<String>,
}

impl DollarQuote {
    fn is_open(&self) -> bool {
        self.open_tag.is_some()
    }

    /// Feed every `$tag$` marker on `line` through the state machine
    fn scan(&mut self, line: &str) {
        for captures in DOLLAR_QUOTE.captures_iter(line) {
            let tag = captures.get(1).map_or("", |m| m.as_str());
            match &self.open_tag {
                None => self.open_tag = Some(tag.to_string()),
                Some(open) if open == tag => self.open_tag = None,
                Some(_) => {}
            }
        }
    }
}

/// Split a SQL script into individual statements
///
/// Blank lines and `--` comment lines are dropped unless they sit inside a
/// dollar-quoted region. A statement ends on a line whose trimmed text ends
/// with `;` while no region is open; whatever remains at the end of the
/// script becomes a final statement.
pub fn split_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut quote = DollarQuote::default();

    for line in sql.split('\n') {
        let trimmed = line.trim();

        if !quote.is_open() && (trimmed.is_empty() || trimmed.starts_with("--")) {
            continue;
        }

        current.push_str(line);
        current.push('\n');

        quote.scan(line);

        if !quote.is_open() && trimmed.ends_with(';') {
            statements.push(current.trim().to_string());
            current.clear();
        }
    }

    let rest = current.trim();
    if !rest.is_empty() {
        statements.push(rest.to_string());
    }

    statements.retain(|s| !s.is_empty());
    statements
}
