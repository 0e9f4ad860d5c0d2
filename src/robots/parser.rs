//! Robots.txt parser implementation
//!
//! This module provides functionality for parsing robots.txt content using the robotstxt crate.

use robotstxt::DefaultMatcher;
use std::time::Duration;

/// Parsed robots.txt data
///
/// This is a wrapper around the robotstxt crate's matcher, providing a
/// simplified interface for checking if URLs are allowed.
#[derive(Debug, Clone, Default)]
pub struct ParsedRobots {
    /// Raw robots.txt content; empty means allow all
    content: String,
}

impl ParsedRobots {
    /// Creates a new ParsedRobots from raw robots.txt content
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
        }
    }

    /// Creates a permissive ParsedRobots that allows everything
    ///
    /// This is used when robots.txt is missing or cannot be fetched.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Checks whether this instance permits everything
    pub fn is_allow_all(&self) -> bool {
        self.content.trim().is_empty()
    }

    /// Checks if a URL is allowed for the given user agent
    ///
    /// # Arguments
    ///
    /// * `url` - The absolute URL to check
    /// * `user_agent` - The crawler's product token (e.g. `FolioBot`)
    ///
    /// # Returns
    ///
    /// * `true` - If the URL is allowed
    /// * `false` - If the URL is disallowed
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        if self.is_allow_all() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, user_agent, url)
    }

    /// Gets the crawl delay for a specific user agent
    ///
    /// A delay in a group naming the agent wins over one in the `*` group.
    /// Consecutive `User-agent` lines form one group; the group ends at the
    /// next `User-agent` line that follows any other directive.
    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        if self.is_allow_all() {
            return None;
        }

        let agent = user_agent.to_lowercase();
        let mut group: Vec<String> = Vec::new();
        let mut group_has_rules = false;
        let mut wildcard_delay = None;
        let mut agent_delay = None;

        for line in self.content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    if group_has_rules {
                        group.clear();
                        group_has_rules = false;
                    }
                    group.push(value.to_lowercase());
                }
                "crawl-delay" => {
                    group_has_rules = true;
                    let Some(delay) = parse_delay(value) else {
                        continue;
                    };
                    if group.iter().any(|ua| ua != "*" && agent.contains(ua.as_str())) {
                        agent_delay = Some(delay);
                    } else if group.iter().any(|ua| ua == "*") {
                        wildcard_delay = Some(delay);
                    }
                }
                _ => group_has_rules = true,
            }
        }

        agent_delay.or(wildcard_delay)
    }
}

/// Parses a delay in seconds; values that do not fit a `Duration` are ignored
fn parse_delay(value: &str) -> Option<Duration> {
    let seconds = value.parse::<f64>().ok()?;
    Duration::try_from_secs_f64(seconds).ok()
}
