//! Crawl counters
//!
//! This module provides the observability counters updated by the workers
//! and a plain snapshot of them for reporting.

use crate::output::CrawlSummary;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// Live counters shared by all workers
#[derive(Debug, Default)]
pub struct CrawlStats {
    dispatched: AtomicU64,
    succeeded: AtomicU64,
    retried: AtomicU64,
    failed_permanently: AtomicU64,
    items_emitted: AtomicU64,
    sink_errors: AtomicU64,
    invalid_urls: AtomicU64,
    offsite: AtomicU64,
    duplicates: AtomicU64,
    robots_denied: AtomicU64,
    unclassified: AtomicU64,
    pages_by_type: Mutex<BTreeMap<String, u64>>,
}

/// Point-in-time copy of [`CrawlStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Requests handed to the fetcher
    pub dispatched: u64,
    /// Fetches that ended with a 2xx response
    pub succeeded: u64,
    /// Extra attempts beyond the first, summed over all requests
    pub retried: u64,
    /// Fetches that ended in failure after any retries
    pub failed_permanently: u64,
    pub items_emitted: u64,
    pub sink_errors: u64,
    /// Derived links that could not be normalized
    pub invalid_urls: u64,
    /// Derived links outside the allowed domains
    pub offsite: u64,
    /// Derived links already in the visited set
    pub duplicates: u64,
    pub robots_denied: u64,
    /// Fetched pages no rule matched
    pub unclassified: u64,
    /// Classified pages per page type
    pub pages_by_type: BTreeMap<String, u64>,
}

impl StatsSnapshot {
    /// Number of pages that matched a page-type rule
    pub fn classified(&self) -> u64 {
        self.pages_by_type.values().sum()
    }
}

impl CrawlStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_dispatch(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a terminal fetch outcome
    ///
    /// # Arguments
    ///
    /// * `ok` - Whether the fetch succeeded
    /// * `attempts` - Attempts made, including the first
    pub fn record_fetch(&self, ok: bool, attempts: u32) {
        if ok {
            self.succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_permanently.fetch_add(1, Ordering::Relaxed);
        }
        self.retried
            .fetch_add(u64::from(attempts.saturating_sub(1)), Ordering::Relaxed);
    }

    pub fn record_classified(&self, page_type: &str) {
        let mut pages = self
            .pages_by_type
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *pages.entry(page_type.to_string()).or_insert(0) += 1;
    }

    pub fn record_unclassified(&self) {
        self.unclassified.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_links(&self, invalid: u64, offsite: u64, duplicates: u64) {
        self.invalid_urls.fetch_add(invalid, Ordering::Relaxed);
        self.offsite.fetch_add(offsite, Ordering::Relaxed);
        self.duplicates.fetch_add(duplicates, Ordering::Relaxed);
    }

    pub fn record_item(&self, delivered: bool) {
        if delivered {
            self.items_emitted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.sink_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_robots_denied(&self) {
        self.robots_denied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            failed_permanently: self.failed_permanently.load(Ordering::Relaxed),
            items_emitted: self.items_emitted.load(Ordering::Relaxed),
            sink_errors: self.sink_errors.load(Ordering::Relaxed),
            invalid_urls: self.invalid_urls.load(Ordering::Relaxed),
            offsite: self.offsite.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            robots_denied: self.robots_denied.load(Ordering::Relaxed),
            unclassified: self.unclassified.load(Ordering::Relaxed),
            pages_by_type: self
                .pages_by_type
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }
}

/// Prints a crawl summary to stdout in a formatted manner
///
/// # Arguments
///
/// * `summary` - The summary to display
pub fn print_statistics(summary: &CrawlSummary) {
    let stats = &summary.stats;

    println!("=== Crawl Statistics ===\n");

    println!("Overview:");
    println!("  Final state: {}", summary.final_state);
    println!("  Duration: {}s", summary.duration_seconds());
    println!("  URLs visited: {}", summary.visited);
    println!("  Still pending: {}", summary.pending);
    println!();

    println!("Requests:");
    println!("  Dispatched: {}", stats.dispatched);
    println!("  Succeeded: {}", stats.succeeded);
    println!("  Retried attempts: {}", stats.retried);
    println!("  Failed permanently: {}", stats.failed_permanently);
    println!("  Denied by robots.txt: {}", stats.robots_denied);
    println!();

    if !stats.pages_by_type.is_empty() || stats.unclassified > 0 {
        println!("Pages by Type:");
        let mut types: Vec<_> = stats.pages_by_type.iter().collect();
        types.sort_by(|a, b| b.1.cmp(a.1));
        for (page_type, count) in types {
            println!("  {}: {}", page_type, count);
        }
        if stats.unclassified > 0 {
            println!("  (unclassified): {}", stats.unclassified);
        }
        println!();
    }

    println!("Links:");
    println!("  Invalid: {}", stats.invalid_urls);
    println!("  Offsite: {}", stats.offsite);
    println!("  Already seen: {}", stats.duplicates);
    println!();

    println!(
        "Items: {} emitted, {} failed",
        stats.items_emitted, stats.sink_errors
    );
    println!(
        "Success Rate: {:.1}% ({} / {} requests)",
        summary.success_rate(),
        stats.succeeded,
        stats.dispatched
    );
}
