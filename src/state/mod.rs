//! State tracking module
//!
//! This module contains the crawl lifecycle state machine and the per-host
//! politeness state mutated by the rate limiter.

mod crawl_state;
mod host_state;

pub use crawl_state::{CrawlState, StopReason};
pub use host_state::HostState;
