//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the SnapshotStore trait.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{SnapshotStore, StorageError, StorageResult};
use crate::storage::{FrontierRecord, FrontierSnapshot, RunRecord, RunStatus};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;

/// SQLite snapshot backend
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Creates a new SqliteStore instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStore)` - Successfully opened/created database
    /// * `Err(StorageError::Corrupt)` - The file exists but is not a usable database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path).map_err(classify_open_error)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )
        .map_err(classify_open_error)?;

        initialize_schema(&conn).map_err(|e| match e {
            StorageError::Sqlite(inner) => classify_open_error(inner),
            other => other,
        })?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn read_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunRecord> {
        Ok(RunRecord {
            id: row.get(0)?,
            started_at: row.get(1)?,
            finished_at: row.get(2)?,
            config_hash: row.get(3)?,
            status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
                .unwrap_or(RunStatus::Interrupted),
        })
    }

    fn check_integrity(&self) -> StorageResult<()> {
        let status: String = self
            .conn
            .query_row("PRAGMA quick_check", [], |row| row.get(0))
            .map_err(classify_open_error)?;

        if status != "ok" {
            return Err(StorageError::Corrupt(format!(
                "integrity check failed: {}",
                status
            )));
        }
        Ok(())
    }

    fn load_pending(&self) -> StorageResult<Vec<FrontierRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT url, priority, depth, parent_url, page_type_hint, enqueued_at, sequence
             FROM frontier ORDER BY sequence",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, i64>(6)?,
            ))
        })?;

        let mut pending = Vec::new();
        for row in rows {
            let (url, priority, depth, parent_url, page_type_hint, enqueued_at, sequence) =
                row.map_err(corrupt_row)?;

            let priority = i32::try_from(priority).map_err(|_| {
                StorageError::Corrupt(format!("priority {} out of range for {}", priority, url))
            })?;
            let depth = u32::try_from(depth).map_err(|_| {
                StorageError::Corrupt(format!("depth {} out of range for {}", depth, url))
            })?;
            let sequence = u64::try_from(sequence).map_err(|_| {
                StorageError::Corrupt(format!("sequence {} out of range for {}", sequence, url))
            })?;
            let enqueued_at = DateTime::parse_from_rfc3339(&enqueued_at)
                .map_err(|e| {
                    StorageError::Corrupt(format!(
                        "bad enqueue timestamp '{}' for {}: {}",
                        enqueued_at, url, e
                    ))
                })?
                .with_timezone(&Utc);

            pending.push(FrontierRecord {
                url,
                priority,
                depth,
                parent_url,
                page_type_hint,
                enqueued_at,
                sequence,
            });
        }

        Ok(pending)
    }

    fn load_visited(&self) -> StorageResult<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT url FROM visited ORDER BY url")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut visited = Vec::new();
        for row in rows {
            visited.push(row.map_err(corrupt_row)?);
        }
        Ok(visited)
    }
}

impl SnapshotStore for SqliteStore {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, started_at, finished_at, config_hash, status FROM runs ORDER BY id DESC LIMIT 1",
        )?;

        let run = stmt.query_row([], Self::read_run).optional()?;
        Ok(run)
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, run_id],
        )?;

        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn count_runs(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM runs", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ===== Frontier Snapshots =====

    fn save_snapshot(&mut self, snapshot: &FrontierSnapshot) -> StorageResult<()> {
        let tx = self.conn.transaction()?;

        tx.execute("DELETE FROM frontier", [])?;
        {
            let mut insert = tx.prepare(
                "INSERT OR REPLACE INTO frontier
                 (url, priority, depth, parent_url, page_type_hint, enqueued_at, sequence)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for record in &snapshot.pending {
                insert.execute(params![
                    record.url,
                    record.priority,
                    record.depth,
                    record.parent_url,
                    record.page_type_hint,
                    record.enqueued_at.to_rfc3339(),
                    record.sequence as i64,
                ])?;
            }
        }

        // The visited set only grows, so existing rows are kept
        {
            let mut insert = tx.prepare("INSERT OR IGNORE INTO visited (url) VALUES (?1)")?;
            for url in &snapshot.visited {
                insert.execute(params![url])?;
            }
        }

        tx.execute(
            "INSERT OR REPLACE INTO snapshot_meta (id, saved_at) VALUES (1, ?1)",
            params![Utc::now().to_rfc3339()],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn load_snapshot(&self) -> StorageResult<Option<FrontierSnapshot>> {
        self.check_integrity()?;

        let saved_at: Option<String> = self
            .conn
            .query_row("SELECT saved_at FROM snapshot_meta WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()
            .map_err(corrupt_row)?;

        if saved_at.is_none() {
            return Ok(None);
        }

        Ok(Some(FrontierSnapshot {
            pending: self.load_pending()?,
            visited: self.load_visited()?,
        }))
    }

    fn clear_snapshot(&mut self) -> StorageResult<()> {
        self.conn.execute_batch(
            "
            DELETE FROM frontier;
            DELETE FROM visited;
            DELETE FROM snapshot_meta;
        ",
        )?;
        Ok(())
    }
}

/// Maps errors that mean "this file is not a healthy database" to corruption
fn classify_open_error(err: rusqlite::Error) -> StorageError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(e.code, ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt) =>
        {
            StorageError::Corrupt(err.to_string())
        }
        _ => StorageError::Sqlite(err),
    }
}

/// Maps row decoding failures to corruption; other errors pass through
fn corrupt_row(err: rusqlite::Error) -> StorageError {
    match err {
        rusqlite::Error::InvalidColumnType(..)
        | rusqlite::Error::FromSqlConversionFailure(..)
        | rusqlite::Error::IntegralValueOutOfRange(..) => {
            StorageError::Corrupt(format!("unreadable snapshot row: {}", err))
        }
        other => classify_open_error(other),
    }
}
