//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with proper user agent strings and timeouts
//! - Retrying transient failures with capped exponential backoff
//! - Honoring `Retry-After` on 429 responses
//! - Error classification
//!
//! All retries happen inside a single call to [`Fetch::fetch`], so the
//! caller's politeness slot covers the whole logical request.

use crate::config::{FetcherConfig, UserAgentConfig};
use crate::crawler::frontier::Request;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{redirect::Policy, Client, StatusCode};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

/// Terminal status of a fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
    /// A 2xx response was received
    Ok,
    /// A non-success response; the code after the last attempt
    HttpError(u16),
    /// Connection, TLS, redirect or body failure
    NetworkError(String),
    /// An attempt exceeded its timeout
    Timeout,
}

impl FetchStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Checks if this outcome is worth another attempt
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Ok => false,
            Self::HttpError(code) => *code == 429 || (500..600).contains(code),
            Self::NetworkError(_) | Self::Timeout => true,
        }
    }
}

impl std::fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::HttpError(code) => write!(f, "HTTP {}", code),
            Self::NetworkError(e) => write!(f, "network error: {}", e),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// Result of fetching one request
///
/// Every dispatched request produces exactly one of these, including when
/// all retries failed.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub request: Request,
    pub status: FetchStatus,
    pub body: Option<Vec<u8>>,
    /// Response headers with lowercase names
    pub headers: HashMap<String, String>,
    /// URL after redirects; the request URL when no response was received
    pub final_url: Url,
    pub fetched_at: DateTime<Utc>,
    /// Attempts made, including the first
    pub attempts: u32,
}

impl FetchResult {
    /// Builds a result for a request that produced no response
    pub fn failed(request: Request, status: FetchStatus, attempts: u32) -> Self {
        let final_url = request.url.as_url().clone();
        Self {
            request,
            status,
            body: None,
            headers: HashMap::new(),
            final_url,
            fetched_at: Utc::now(),
            attempts,
        }
    }

    /// Returns the body decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> Option<String> {
        self.body
            .as_deref()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Checks if the response declares an HTML body
    pub fn is_html(&self) -> bool {
        match self.header("content-type") {
            Some(ct) => ct.contains("text/html") || ct.contains("application/xhtml"),
            // Servers that omit the header are given the benefit of the doubt
            None => true,
        }
    }
}

/// Network retrieval seam used by the coordinator
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Fetches a request, retrying transient failures, and always returns a result
    async fn fetch(&self, request: &Request) -> FetchResult;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `user_agent` - The user agent configuration
/// * `fetcher` - Timeouts and redirect limit
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use folio::config::{FetcherConfig, UserAgentConfig};
/// use folio::crawler::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "FolioBot".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config, &FetcherConfig::default()).unwrap();
/// ```
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    fetcher: &FetcherConfig,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.header_value())
        .timeout(fetcher.timeout())
        .connect_timeout(fetcher.connect_timeout())
        .redirect(Policy::limited(fetcher.max_redirects))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Outcome of a single attempt
struct Attempt {
    status: FetchStatus,
    transient: bool,
    body: Option<Vec<u8>>,
    headers: HashMap<String, String>,
    final_url: Option<Url>,
    retry_after: Option<Duration>,
}

impl Attempt {
    fn error((status, transient): (FetchStatus, bool)) -> Self {
        Self {
            status,
            transient,
            body: None,
            headers: HashMap::new(),
            final_url: None,
            retry_after: None,
        }
    }
}

/// reqwest-backed fetcher with retry and backoff
///
/// # Retry Logic
///
/// | Condition | Action |
/// |-----------|--------|
/// | 2xx | Return body |
/// | 4xx other than 429 | Return immediately |
/// | 429 | Retry after `Retry-After` (capped) or backoff |
/// | 5xx | Retry with backoff |
/// | Timeout / connection failure | Retry with backoff |
/// | Redirect loop or too many hops | Return immediately |
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    config: FetcherConfig,
}

impl HttpFetcher {
    /// Creates a fetcher with its own HTTP client
    pub fn new(user_agent: &UserAgentConfig, config: &FetcherConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(user_agent, config)?,
            config: config.clone(),
        })
    }

    /// Delay before retry number `retry` (1-based)
    fn backoff(&self, retry: u32) -> Duration {
        backoff_delay(self.config.base_backoff(), self.config.max_backoff(), retry)
    }

    async fn attempt(&self, url: &Url) -> Attempt {
        let response = match self.client.get(url.clone()).send().await {
            Ok(response) => response,
            Err(e) => return Attempt::error(classify_error(&e)),
        };

        let status = response.status();
        let final_url = response.url().clone();
        let headers = collect_headers(response.headers());
        let retry_after = if status == StatusCode::TOO_MANY_REQUESTS
            || status == StatusCode::SERVICE_UNAVAILABLE
        {
            parse_retry_after(response.headers(), Utc::now())
        } else {
            None
        };

        if !status.is_success() {
            let status = FetchStatus::HttpError(status.as_u16());
            return Attempt {
                transient: status.is_transient(),
                status,
                body: None,
                headers,
                final_url: Some(final_url),
                retry_after,
            };
        }

        match response.bytes().await {
            Ok(bytes) => Attempt {
                status: FetchStatus::Ok,
                transient: false,
                body: Some(bytes.to_vec()),
                headers,
                final_url: Some(final_url),
                retry_after: None,
            },
            Err(e) => Attempt {
                final_url: Some(final_url),
                ..Attempt::error(classify_error(&e))
            },
        }
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, request: &Request) -> FetchResult {
        let mut attempts = 0;

        loop {
            attempts += 1;
            let attempt = self.attempt(request.url.as_url()).await;

            let retries_used = attempts - 1;
            if attempt.transient && retries_used < self.config.max_retries {
                let delay = match attempt.retry_after {
                    Some(requested) => requested.min(self.config.max_retry_after()),
                    None => self.backoff(attempts),
                };
                tracing::debug!(
                    "Transient failure for {} ({}), retry {}/{} in {:?}",
                    request.url,
                    attempt.status,
                    attempts,
                    self.config.max_retries,
                    delay
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            if !attempt.status.is_ok() {
                tracing::debug!(
                    "Giving up on {} after {} attempt(s): {}",
                    request.url,
                    attempts,
                    attempt.status
                );
            }

            return FetchResult {
                request: request.clone(),
                status: attempt.status,
                body: attempt.body,
                headers: attempt.headers,
                final_url: attempt
                    .final_url
                    .unwrap_or_else(|| request.url.as_url().clone()),
                fetched_at: Utc::now(),
                attempts,
            };
        }
    }
}

/// Exponential backoff: `base * 2^(retry - 1)`, capped at `max`
pub fn backoff_delay(base: Duration, max: Duration, retry: u32) -> Duration {
    let exponent = retry.saturating_sub(1).min(31);
    base.checked_mul(1u32 << exponent)
        .map(|d| d.min(max))
        .unwrap_or(max)
}

/// Parses a `Retry-After` header given either as seconds or as an HTTP date
pub fn parse_retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let date = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((date - now).to_std().unwrap_or(Duration::ZERO))
}

fn collect_headers(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

/// Maps a client error to a status and whether retrying may help
fn classify_error(e: &reqwest::Error) -> (FetchStatus, bool) {
    if e.is_timeout() {
        (FetchStatus::Timeout, true)
    } else if e.is_redirect() {
        (FetchStatus::NetworkError(format!("redirect failed: {}", e)), false)
    } else if e.is_decode() || e.is_builder() {
        (FetchStatus::NetworkError(format!("malformed response: {}", e)), false)
    } else if e.is_connect() {
        (FetchStatus::NetworkError(format!("connection failed: {}", e)), true)
    } else {
        (FetchStatus::NetworkError(e.to_string()), true)
    }
}
