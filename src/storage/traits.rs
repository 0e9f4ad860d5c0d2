//! Storage traits and error types
//!
//! This module defines the trait interface for snapshot backends and
//! associated error types.

use crate::storage::{FrontierSnapshot, RunRecord, RunStatus};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    /// The stored data cannot be trusted; a crawl must not resume from it
    #[error("Corrupt snapshot: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl StorageError {
    /// Checks whether this error means the persisted state is damaged
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Corrupt(_))
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for snapshot backend implementations
///
/// A backend stores the pending frontier, the visited set, and a record of
/// every crawl run. Only one snapshot is kept; saving replaces the pending
/// queue and adds to the visited set.
pub trait SnapshotStore: Send {
    // ===== Run Management =====

    /// Creates a new crawl run
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Sets the final status of a run and stamps its finish time
    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    /// Counts all recorded runs
    fn count_runs(&self) -> StorageResult<u64>;

    // ===== Frontier Snapshots =====

    /// Persists a snapshot atomically
    fn save_snapshot(&mut self, snapshot: &FrontierSnapshot) -> StorageResult<()>;

    /// Loads the last saved snapshot
    ///
    /// # Returns
    ///
    /// * `Ok(Some(FrontierSnapshot))` - A snapshot exists
    /// * `Ok(None)` - Nothing has been saved yet
    /// * `Err(StorageError::Corrupt)` - The stored rows are unreadable
    fn load_snapshot(&self) -> StorageResult<Option<FrontierSnapshot>>;

    /// Removes the snapshot, keeping run history
    fn clear_snapshot(&mut self) -> StorageResult<()>;
}
