use std::time::Duration;
use tokio::time::Instant;

/// Politeness state for a single host
///
/// Mutated only by the rate limiter and lives for the duration of a crawl run.
#[derive(Debug, Clone)]
pub struct HostState {
    /// Requests currently holding a slot for this host
    pub in_flight: u32,

    /// Later of the last dispatch and the last release for this host
    pub last_request_time: Option<Instant>,

    /// Minimum spacing between requests to this host
    pub min_delay: Duration,

    /// Number of requests dispatched to this host in the current run
    pub request_count: u64,
}

impl HostState {
    /// Creates state for a host that has not been contacted yet
    pub fn new(min_delay: Duration) -> Self {
        Self {
            in_flight: 0,
            last_request_time: None,
            min_delay,
            request_count: 0,
        }
    }

    /// Checks if a new request may be dispatched to this host now
    pub fn can_dispatch(&self, max_concurrent: u32, now: Instant) -> bool {
        self.in_flight < max_concurrent && self.time_until_ready(now).is_none()
    }

    /// Returns how long until the minimum delay has elapsed, or `None` if it has
    pub fn time_until_ready(&self, now: Instant) -> Option<Duration> {
        let last = self.last_request_time?;
        let elapsed = now.saturating_duration_since(last);
        if elapsed < self.min_delay {
            Some(self.min_delay - elapsed)
        } else {
            None
        }
    }

    /// Records that a slot was handed out
    pub fn record_dispatch(&mut self, now: Instant) {
        self.in_flight += 1;
        self.request_count += 1;
        self.last_request_time = Some(now);
    }

    /// Records that a slot was returned
    ///
    /// The delay clock restarts on release so that the spacing is measured
    /// from the end of the previous request, not just its start.
    pub fn record_release(&mut self, now: Instant) {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.last_request_time = Some(now);
    }
}
