//! rollcall-store: SQLite persistence for enrollments and attendance.
//!
//! One [`Store`] owns one connection and is the single writer for both
//! tables. The attendance table is append-only: rows are inserted, never
//! updated or deleted, and `seq` is the authoritative event order. The
//! people table holds one enrollment per person, image payload included,
//! so the template registry can be rebuilt from it at any time.

mod ledger;
mod people;

pub use people::PersonRow;

use chrono::{DateTime, Utc};
use rollcall_core::{EventKind, ParseKindError};
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid person id {0:?}: need 2-20 characters from [A-Za-z0-9_-]")]
    InvalidPersonId(String),
    #[error("invalid display name: need 2-50 non-blank characters")]
    InvalidDisplayName,
    #[error("invalid stored timestamp {0:?}")]
    InvalidTimestamp(String),
    #[error("invalid stored event kind: {0}")]
    InvalidKind(#[from] ParseKindError),
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS people (
        person_id     TEXT PRIMARY KEY,
        display_name  TEXT NOT NULL,
        enrollment_id TEXT NOT NULL,
        enrolled_at   TEXT NOT NULL,
        face_image    BLOB NOT NULL
    );

    CREATE TABLE IF NOT EXISTS attendance (
        seq           INTEGER PRIMARY KEY AUTOINCREMENT,
        recorded_at   TEXT NOT NULL,
        person_id     TEXT NOT NULL,
        display_name  TEXT NOT NULL,
        kind          TEXT NOT NULL CHECK (kind IN ('ENTRY', 'EXIT'))
    );

    CREATE INDEX IF NOT EXISTS idx_attendance_person
    ON attendance (person_id, seq);
";

/// Enrollment and attendance database.
pub struct Store {
    conn: Connection,
    /// Last appended (or last scanned) event kind per person. The ledger
    /// stays authoritative; this only saves the tail scan on the hot path.
    last_kind: HashMap<String, EventKind>,
}

impl Store {
    /// Open (creating if missing) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::initialize(conn)
    }

    /// In-memory database, for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::initialize(Connection::open_in_memory()?)
    }

    fn initialize(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn, last_kind: HashMap::new() })
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StoreError::InvalidTimestamp(raw.to_string()))
}
