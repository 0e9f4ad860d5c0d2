use std::fmt;

/// Lifecycle of a crawl run
///
/// ```text
/// Idle -> Running -> Draining -> Terminated
///            ^           |
///            +-----------+
/// Idle | Running | Draining -> Stopped(reason)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlState {
    /// Seeds loaded, nothing dispatched yet
    Idle,
    /// Dispatching requests from the frontier
    Running,
    /// Frontier empty, waiting for in-flight fetches to finish
    Draining,
    /// Normal completion: frontier empty and no in-flight work
    Terminated,
    /// Cancelled or hit a fatal error
    Stopped(StopReason),
}

/// Why a crawl ended in [`CrawlState::Stopped`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// `cancel()` was called; in-flight work was allowed to finish
    Cancelled,
    /// A fatal condition such as persisted-state corruption
    Fatal(String),
}

impl CrawlState {
    /// Returns true once the crawl can make no further progress
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Terminated | Self::Stopped(_))
    }

    /// Checks whether moving from `self` to `next` is a legal transition
    pub fn can_transition_to(&self, next: &CrawlState) -> bool {
        use CrawlState::*;
        match (self, next) {
            (Idle, Running) => true,
            (Running, Draining) => true,
            (Draining, Running) => true,
            (Draining, Terminated) => true,
            (Idle | Running | Draining, Stopped(_)) => true,
            _ => false,
        }
    }

    /// Status string persisted with the crawl run
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Terminated => "terminated",
            Self::Stopped(StopReason::Cancelled) => "cancelled",
            Self::Stopped(StopReason::Fatal(_)) => "failed",
        }
    }
}

impl fmt::Display for CrawlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped(StopReason::Fatal(message)) => write!(f, "stopped: {}", message),
            other => f.write_str(other.as_str()),
        }
    }
}
