//! Per-host rate limiting
//!
//! This module handles:
//! - Capping the number of in-flight requests per host
//! - Spacing requests to a host by its minimum delay
//! - Raising a host's delay when robots.txt asks for it
//!
//! Slots are handed out as [`HostPermit`] guards. Dropping the guard returns
//! the slot, so every exit path of a fetch releases it.

use crate::state::HostState;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

struct LimiterInner {
    hosts: Mutex<HashMap<String, HostState>>,
    max_concurrent: u32,
    default_min_delay: Duration,
    released: Notify,
}

impl LimiterInner {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, HostState>> {
        self.hosts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Politeness controller shared by all workers
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<LimiterInner>,
}

impl RateLimiter {
    /// Creates a rate limiter
    ///
    /// # Arguments
    ///
    /// * `max_concurrent` - Maximum in-flight requests per host (at least 1)
    /// * `min_delay` - Minimum spacing between requests to the same host
    pub fn new(max_concurrent: u32, min_delay: Duration) -> Self {
        Self {
            inner: Arc::new(LimiterInner {
                hosts: Mutex::new(HashMap::new()),
                max_concurrent: max_concurrent.max(1),
                default_min_delay: min_delay,
                released: Notify::new(),
            }),
        }
    }

    /// Waits until `host` has a free slot and its delay has elapsed
    ///
    /// The host lock is only held while inspecting state, never across the
    /// wait, so acquiring one host cannot block another.
    pub async fn acquire(&self, host: &str) -> HostPermit {
        loop {
            // Register interest before checking so a release between the
            // check and the wait is not missed
            let notified = self.inner.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let delay = {
                let mut hosts = self.inner.lock();
                let state = hosts
                    .entry(host.to_string())
                    .or_insert_with(|| HostState::new(self.inner.default_min_delay));
                let now = Instant::now();

                if state.can_dispatch(self.inner.max_concurrent, now) {
                    state.record_dispatch(now);
                    return HostPermit {
                        limiter: Arc::clone(&self.inner),
                        host: host.to_string(),
                    };
                }

                // A full host waits for a release; otherwise only the delay remains
                if state.in_flight < self.inner.max_concurrent {
                    state.time_until_ready(now)
                } else {
                    None
                }
            };

            match delay {
                Some(delay) => {
                    tracing::trace!("Host {} not ready for {:?}", host, delay);
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = &mut notified => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Raises the minimum delay for a host, never lowering it
    pub fn raise_min_delay(&self, host: &str, delay: Duration) {
        let mut hosts = self.inner.lock();
        let state = hosts
            .entry(host.to_string())
            .or_insert_with(|| HostState::new(self.inner.default_min_delay));
        if delay > state.min_delay {
            tracing::debug!("Raising delay for {} to {:?}", host, delay);
            state.min_delay = delay;
        }
    }

    /// Returns the current minimum delay for a host
    pub fn min_delay(&self, host: &str) -> Duration {
        self.inner
            .lock()
            .get(host)
            .map(|s| s.min_delay)
            .unwrap_or(self.inner.default_min_delay)
    }

    /// Returns the number of requests dispatched to each host so far
    pub fn request_counts(&self) -> Vec<(String, u64)> {
        let mut counts: Vec<(String, u64)> = self
            .inner
            .lock()
            .iter()
            .map(|(host, state)| (host.clone(), state.request_count))
            .collect();
        counts.sort();
        counts
    }
}

/// A held politeness slot for one host
///
/// The slot is released when the permit is dropped.
pub struct HostPermit {
    limiter: Arc<LimiterInner>,
    host: String,
}

impl HostPermit {
    pub fn host(&self) -> &str {
        &self.host
    }
}

impl Drop for HostPermit {
    fn drop(&mut self) {
        {
            let mut hosts = self.limiter.lock();
            if let Some(state) = hosts.get_mut(&self.host) {
                state.record_release(Instant::now());
            }
        }
        self.limiter.released.notify_waiters();
    }
}

impl std::fmt::Debug for HostPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostPermit").field("host", &self.host).finish()
    }
}
