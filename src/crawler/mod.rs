//! Crawler module for fetching and dispatch
//!
//! This module contains the core crawling logic, including:
//! - The frontier of pending requests and the visited set
//! - Per-host rate limiting
//! - HTTP fetching with retry logic
//! - Overall crawl coordination

mod coordinator;
mod fetcher;
mod frontier;
mod politeness;

pub use coordinator::{Coordinator, CoordinatorBuilder};
pub use fetcher::{
    backoff_delay, build_http_client, parse_retry_after, Fetch, FetchResult, FetchStatus,
    HttpFetcher,
};
pub use frontier::{Frontier, Request};
pub use politeness::{HostPermit, RateLimiter};
