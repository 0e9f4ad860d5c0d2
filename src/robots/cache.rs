//! Per-host robots.txt cache
//!
//! Each host's robots.txt is fetched at most once per crawl. Concurrent
//! workers asking for the same host wait on the first fetch.

use crate::robots::ParsedRobots;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;

/// Cache of parsed robots.txt files keyed by host
#[derive(Debug, Default)]
pub struct RobotsCache {
    hosts: Mutex<HashMap<String, Arc<OnceCell<Arc<ParsedRobots>>>>>,
}

impl RobotsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached robots for `host`, running `fetch` if it is the first request
    ///
    /// # Returns
    ///
    /// The parsed robots and whether this call performed the fetch
    pub async fn get_or_fetch<F, Fut>(&self, host: &str, fetch: F) -> (Arc<ParsedRobots>, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ParsedRobots>,
    {
        let cell = {
            let mut hosts = self.hosts.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(hosts.entry(host.to_string()).or_default())
        };

        let mut fetched = false;
        let robots = cell
            .get_or_init(|| {
                fetched = true;
                let pending = fetch();
                async move { Arc::new(pending.await) }
            })
            .await;

        (Arc::clone(robots), fetched)
    }

    /// Returns the cached robots for `host` without fetching
    pub fn get(&self, host: &str) -> Option<Arc<ParsedRobots>> {
        let hosts = self.hosts.lock().unwrap_or_else(PoisonError::into_inner);
        hosts.get(host).and_then(|cell| cell.get().cloned())
    }

    /// Number of hosts whose robots.txt has been fetched
    pub fn len(&self) -> usize {
        let hosts = self.hosts.lock().unwrap_or_else(PoisonError::into_inner);
        hosts.values().filter(|cell| cell.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
