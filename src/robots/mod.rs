//! Robots.txt handling module
//!
//! This module provides functionality for fetching, parsing, and caching robots.txt files.
//! It respects robots.txt directives when crawling websites.

mod cache;
mod parser;

pub use cache::RobotsCache;
pub use parser::ParsedRobots;

use crate::crawler::{Fetch, FetchStatus, Request};
use crate::url::{normalize, NormalizedUrl};

/// Returns the robots.txt URL for the host of `url`
pub fn robots_url(url: &NormalizedUrl) -> Option<NormalizedUrl> {
    normalize("/robots.txt", Some(url.as_url())).ok()
}

/// Fetches robots.txt for the host of `url`
///
/// Goes through the regular fetcher, so the same timeouts and retries
/// apply. A missing or unreadable robots.txt yields allow-all.
///
/// # Arguments
///
/// * `fetcher` - The fetcher to use
/// * `url` - Any URL on the host in question
pub async fn fetch_robots<F>(fetcher: &F, url: &NormalizedUrl) -> ParsedRobots
where
    F: Fetch + ?Sized,
{
    let Some(target) = robots_url(url) else {
        return ParsedRobots::allow_all();
    };

    let result = fetcher.fetch(&Request::seed(target.clone(), 0)).await;
    match result.status {
        FetchStatus::Ok => match result.text() {
            Some(body) => {
                tracing::debug!("Fetched robots.txt from {}", target);
                ParsedRobots::from_content(&body)
            }
            None => ParsedRobots::allow_all(),
        },
        status => {
            tracing::debug!("No usable robots.txt at {} ({}), allowing all", target, status);
            ParsedRobots::allow_all()
        }
    }
}

/// Checks if a URL is allowed by robots.txt
///
/// # Arguments
///
/// * `robots` - The parsed robots.txt data
/// * `url` - The URL to check
/// * `user_agent` - The crawler's product token
pub fn is_allowed(robots: &ParsedRobots, url: &NormalizedUrl, user_agent: &str) -> bool {
    robots.is_allowed(url.as_str(), user_agent)
}
