//! Sink traits and summary types
//!
//! This module defines the trait interface for item sinks and the
//! data structure describing a finished crawl.

use crate::extract::Item;
use crate::output::StatsSnapshot;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur while delivering items
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Failed to serialize item: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A caller-supplied sink refused the item
    #[error("Item rejected: {0}")]
    Rejected(String),
}

/// Result type for sink operations
pub type SinkResult<T> = Result<T, SinkError>;

/// Receiver of extracted items
///
/// `emit` is called once per item. The crawl does not interpret a failure
/// beyond logging and counting it.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn emit(&self, item: Item) -> SinkResult<()>;

    /// Makes previously emitted items durable
    async fn flush(&self) -> SinkResult<()> {
        Ok(())
    }
}

/// Summary of a finished crawl
#[derive(Debug, Clone)]
pub struct CrawlSummary {
    // Run metadata
    pub run_id: Option<i64>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub final_state: String,
    pub config_hash: String,
    pub resumed: bool,

    // Counters
    pub stats: StatsSnapshot,

    // Frontier at the end of the run
    pub pending: usize,
    pub visited: usize,

    /// Requests sent to each host, sorted by host
    pub host_requests: Vec<(String, u64)>,
}

impl CrawlSummary {
    pub fn duration_seconds(&self) -> u64 {
        (self.finished_at - self.started_at).num_seconds().max(0) as u64
    }

    /// Percentage of dispatched requests that fetched successfully
    pub fn success_rate(&self) -> f64 {
        percentage(self.stats.succeeded, self.stats.dispatched)
    }

    /// Percentage of dispatched requests that failed permanently
    pub fn error_rate(&self) -> f64 {
        percentage(self.stats.failed_permanently, self.stats.dispatched)
    }
}

fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        (part as f64 / total as f64) * 100.0
    }
}
