//! Durable dedup store for first-seen matches
//!
//! A single SQLite table maps each matched domain to the record of its
//! first match. Uniqueness is enforced by the storage layer: inserts go
//! through `INSERT OR IGNORE` against a UNIQUE domain column, so two
//! concurrent calls for the same domain resolve to exactly one insert
//! instead of racing a separate existence check.

use crate::core::{MatchRecord, RecordOutcome};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

/// Bumped only for incompatible schema changes. On mismatch the table is
/// dropped and recreated; on match, existing records survive restarts.
const SCHEMA_VERSION: i32 = 2;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Handle to the durable match table.
///
/// The connection is mutex-guarded; every operation is a single short
/// statement against local storage.
pub struct MatchStore {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl MatchStore {
    /// Opens (creating if needed) the backing database. Failure here is
    /// fatal at startup: the pipeline must not run without its store.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&path)?;
        Self::migrate(&conn)?;

        info!(db = %path.display(), "Opened match store");
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Creates the table on first use and recreates it only when the stored
    /// schema version is incompatible. Records persist across restarts.
    fn migrate(conn: &Connection) -> Result<(), StoreError> {
        let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

        if version != 0 && version != SCHEMA_VERSION {
            warn!(
                found = version,
                expected = SCHEMA_VERSION,
                "Incompatible match store schema, dropping table"
            );
            conn.execute("DROP TABLE IF EXISTS sent_messages", [])?;
        }

        conn.execute(
            "CREATE TABLE IF NOT EXISTS sent_messages (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 timestamp TEXT NOT NULL,
                 domain TEXT NOT NULL UNIQUE,
                 term TEXT NOT NULL,
                 enrichment TEXT
             )",
            [],
        )?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        Ok(())
    }

    /// Records the domain's first match, or reports that one already
    /// exists. Atomic with respect to concurrent callers for the same
    /// domain: the UNIQUE constraint turns the race into a no-op insert.
    pub fn record_if_absent(
        &self,
        domain: &str,
        term: &str,
        timestamp: &str,
    ) -> Result<RecordOutcome, StoreError> {
        let conn = self.conn.lock().unwrap();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO sent_messages (timestamp, domain, term) VALUES (?1, ?2, ?3)",
            params![timestamp, domain, term],
        )?;

        if inserted == 1 {
            Ok(RecordOutcome::Inserted(MatchRecord {
                id: conn.last_insert_rowid(),
                timestamp: timestamp.to_string(),
                domain: domain.to_string(),
                term: term.to_string(),
                enrichment: None,
            }))
        } else {
            Ok(RecordOutcome::AlreadyPresent)
        }
    }

    /// Whether a record exists for the domain.
    pub fn exists(&self, domain: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sent_messages WHERE domain = ?1",
            params![domain],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Attaches the serialized enrichment outcome to an existing record.
    pub fn set_enrichment(&self, domain: &str, payload: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE sent_messages SET enrichment = ?1 WHERE domain = ?2",
            params![payload, domain],
        )?;
        Ok(())
    }

    /// Fetches a record by domain.
    pub fn get(&self, domain: &str) -> Result<Option<MatchRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let record = conn
            .query_row(
                "SELECT id, timestamp, domain, term, enrichment
                 FROM sent_messages WHERE domain = ?1",
                params![domain],
                |row| {
                    Ok(MatchRecord {
                        id: row.get(0)?,
                        timestamp: row.get(1)?,
                        domain: row.get(2)?,
                        term: row.get(3)?,
                        enrichment: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    /// Number of recorded matches.
    pub fn count(&self) -> Result<u64, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sent_messages", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Path of the backing file; the backup scheduler copies this.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
