//! Append-only audit logs
//!
//! One line per confirmed fresh match, and a separate trail for domains
//! that were already present in the store. Write failures are the caller's
//! to log; audit problems never stop ingestion.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const MATCHED_TERMS_LOG: &str = "matched-terms.log";
const DB_CHECKS_LOG: &str = "db_checks.log";

/// Writers for the matched-terms and duplicate-check logs.
pub struct AuditLog {
    matched_path: PathBuf,
    duplicate_path: PathBuf,
}

impl AuditLog {
    /// Creates the log directory if needed. Failure is startup-fatal.
    pub fn new<P: AsRef<Path>>(dir: P) -> io::Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            matched_path: dir.join(MATCHED_TERMS_LOG),
            duplicate_path: dir.join(DB_CHECKS_LOG),
        })
    }

    /// Appends one line for a confirmed fresh match:
    /// `[timestamp] domain [Matched Term: term]`
    pub fn record_match(&self, timestamp: &str, domain: &str, term: &str) -> io::Result<()> {
        self.append(
            &self.matched_path,
            &format!("[{}] {} [Matched Term: {}]", timestamp, domain, term),
        )
    }

    /// Appends one line for a domain that was already recorded.
    pub fn record_duplicate(&self, timestamp: &str, domain: &str) -> io::Result<()> {
        self.append(
            &self.duplicate_path,
            &format!(
                "[{}] Domain '{}' already exists in the database.",
                timestamp, domain
            ),
        )
    }

    pub fn matched_terms_path(&self) -> &Path {
        &self.matched_path
    }

    pub fn db_checks_path(&self) -> &Path {
        &self.duplicate_path
    }

    fn append(&self, path: &Path, line: &str) -> io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn match_lines_use_expected_format() {
        let dir = tempdir().unwrap();
        let audit = AuditLog::new(dir.path().join("logs")).unwrap();

        audit
            .record_match("01/02/26 10:00:00", "evil-example.com", "example")
            .unwrap();
        audit
            .record_match("01/02/26 10:00:01", "bad.net", "bad")
            .unwrap();

        let content = std::fs::read_to_string(audit.matched_terms_path()).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(
            lines,
            vec![
                "[01/02/26 10:00:00] evil-example.com [Matched Term: example]",
                "[01/02/26 10:00:01] bad.net [Matched Term: bad]",
            ]
        );
    }

    #[test]
    fn duplicate_lines_use_expected_format() {
        let dir = tempdir().unwrap();
        let audit = AuditLog::new(dir.path()).unwrap();

        audit
            .record_duplicate("01/02/26 10:00:00", "evil-example.com")
            .unwrap();

        let content = std::fs::read_to_string(audit.db_checks_path()).unwrap();
        assert_eq!(
            content,
            "[01/02/26 10:00:00] Domain 'evil-example.com' already exists in the database.\n"
        );
    }
}
