//! Output module for items and crawl summaries
//!
//! This module handles:
//! - Delivering extracted items to a sink
//! - Counting what happened during a crawl
//! - Printing and rendering markdown summaries

mod markdown;
mod sinks;
pub mod stats;
mod traits;

pub use markdown::{format_markdown_summary, generate_markdown_summary};
pub use sinks::{JsonLinesSink, MemorySink};
pub use stats::{print_statistics, CrawlStats, StatsSnapshot};
pub use traits::{CrawlSummary, Sink, SinkError, SinkResult};
