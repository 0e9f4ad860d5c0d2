//! Database schema definitions and versioning
//!
//! This module contains all SQL schema definitions for the Folio snapshot
//! database. The schema version lives in SQLite's `user_version` pragma.

use crate::storage::traits::{StorageError, StorageResult};
use rusqlite::Connection;

/// Version written to new databases and required of existing ones
pub const SCHEMA_VERSION: u32 = 1;

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

-- Pending requests, including those in flight when the snapshot was taken
CREATE TABLE IF NOT EXISTS frontier (
    url TEXT PRIMARY KEY,
    priority INTEGER NOT NULL,
    depth INTEGER NOT NULL,
    parent_url TEXT,
    page_type_hint TEXT,
    enqueued_at TEXT NOT NULL,
    sequence INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_frontier_order ON frontier(priority DESC, sequence ASC);

-- Every URL ever enqueued or dispatched
CREATE TABLE IF NOT EXISTS visited (
    url TEXT PRIMARY KEY
);

-- Single-row marker recording that a snapshot exists
CREATE TABLE IF NOT EXISTS snapshot_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    saved_at TEXT NOT NULL
);
"#;

/// Initializes the database schema
///
/// A database with no version is initialized; one with the current version
/// is left as is; anything else is rejected as corrupt.
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized or already current
/// * `Err(StorageError)` - The database belongs to an unknown schema
pub fn initialize_schema(conn: &Connection) -> StorageResult<()> {
    let version = get_schema_version(conn)?;

    if version != 0 && version != SCHEMA_VERSION {
        return Err(StorageError::Corrupt(format!(
            "unsupported schema version {} (expected {})",
            version, SCHEMA_VERSION
        )));
    }

    conn.execute_batch(SCHEMA_SQL)?;

    if version == 0 {
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    }

    Ok(())
}

/// Reads the schema version stored in the database
pub fn get_schema_version(conn: &Connection) -> StorageResult<u32> {
    let version: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}
