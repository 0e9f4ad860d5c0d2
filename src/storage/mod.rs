//! Storage module for persisting crawl state
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema versioning
//! - Frontier and visited-set snapshots for resumption
//! - Run tracking
//! - Detecting damaged snapshots

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{SnapshotStore, StorageError, StorageResult};

use chrono::{DateTime, Utc};
use std::path::Path;

/// Opens or creates a snapshot database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStore)` - Successfully opened storage
/// * `Err(StorageError)` - Failed to open storage, or the file is not a usable snapshot
pub fn open_storage(path: &Path) -> StorageResult<SqliteStore> {
    SqliteStore::new(path)
}

/// A pending request as stored in a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierRecord {
    pub url: String,
    pub priority: i32,
    pub depth: u32,
    pub parent_url: Option<String>,
    pub page_type_hint: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    /// Insertion order, used to keep FIFO tie-breaking across restarts
    pub sequence: u64,
}

/// Everything needed to resume a crawl without re-dispatching visited URLs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrontierSnapshot {
    pub pending: Vec<FrontierRecord>,
    pub visited: Vec<String>,
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_roundtrip() {
        for status in &[
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::Interrupted,
            RunStatus::Failed,
        ] {
            let db_str = status.to_db_string();
            let parsed = RunStatus::from_db_string(db_str);
            assert_eq!(Some(*status), parsed);
        }
    }

    #[test]
    fn test_run_status_invalid() {
        assert_eq!(RunStatus::from_db_string("invalid"), None);
    }
}
