use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Folio
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub politeness: PolitenessConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub seeds: Vec<SeedEntry>,
    #[serde(default)]
    pub page_types: Vec<PageTypeConfig>,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Number of concurrent fetch workers
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// Maximum link depth from the seeds; deeper requests are rejected
    #[serde(default)]
    pub max_depth: Option<u32>,

    /// Stop dispatching after this many requests
    #[serde(default)]
    pub max_pages: Option<u64>,

    /// Number of processed pages between snapshots
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: u64,

    /// Whether robots.txt directives are honored
    #[serde(default = "default_true")]
    pub respect_robots: bool,

    /// Domain patterns derived links must match (empty allows all)
    #[serde(default)]
    pub allowed_domains: Vec<String>,

    /// Whether utm_* and similar parameters are dropped during normalization
    #[serde(default)]
    pub strip_tracking_params: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_depth: None,
            max_pages: None,
            checkpoint_interval: default_checkpoint_interval(),
            respect_robots: true,
            allowed_domains: Vec::new(),
            strip_tracking_params: false,
        }
    }
}

/// Per-host politeness configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PolitenessConfig {
    /// Maximum in-flight requests per host
    #[serde(default = "default_max_concurrent_per_host")]
    pub max_concurrent_per_host: u32,

    /// Minimum time between requests to the same host (milliseconds)
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,

    /// Upper bound on a robots.txt `Crawl-delay` (milliseconds)
    #[serde(default = "default_max_crawl_delay_ms")]
    pub max_crawl_delay_ms: u64,
}

impl PolitenessConfig {
    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }

    pub fn max_crawl_delay(&self) -> Duration {
        Duration::from_millis(self.max_crawl_delay_ms)
    }
}

impl Default for PolitenessConfig {
    fn default() -> Self {
        Self {
            max_concurrent_per_host: default_max_concurrent_per_host(),
            min_delay_ms: default_min_delay_ms(),
            max_crawl_delay_ms: default_max_crawl_delay_ms(),
        }
    }
}

/// Fetcher timeouts and retry policy
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FetcherConfig {
    /// Total time allowed for one attempt (milliseconds)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Time allowed to establish a connection (milliseconds)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Retries after the initial attempt for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First backoff delay; doubles on each retry (milliseconds)
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    /// Upper bound on the exponential backoff (milliseconds)
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Upper bound on a server-supplied Retry-After (milliseconds)
    #[serde(default = "default_max_retry_after_ms")]
    pub max_retry_after_ms: u64,

    /// Redirect hops followed before giving up
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

impl FetcherConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.base_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn max_retry_after(&self) -> Duration {
        Duration::from_millis(self.max_retry_after_ms)
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            max_retries: default_max_retries(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_retry_after_ms: default_max_retry_after_ms(),
            max_redirects: default_max_redirects(),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UserAgentConfig {
    /// Name of the crawler
    pub crawler_name: String,

    /// Version of the crawler
    pub crawler_version: String,

    /// URL with information about the crawler
    pub contact_url: String,

    /// Email address for crawler-related contact
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the header value: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Path of the JSON-lines file receiving extracted items
    pub items_path: String,

    /// Path of the SQLite file holding the resumable frontier snapshot
    #[serde(default)]
    pub state_path: Option<String>,

    /// Path of the markdown summary written when the crawl ends
    #[serde(default)]
    pub summary_path: Option<String>,
}

/// A crawl starting point
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SeedEntry {
    pub url: String,

    #[serde(default)]
    pub priority: i32,

    /// Page type the seed is expected to be
    #[serde(default)]
    pub page_type: Option<String>,
}

/// One classification rule and the extraction attached to it
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PageTypeConfig {
    pub name: String,

    /// Used when no other rule matches
    #[serde(default)]
    pub fallback: bool,

    #[serde(default, rename = "match")]
    pub matcher: MatchConfig,

    #[serde(default)]
    pub links: Vec<LinkComponentConfig>,

    #[serde(default)]
    pub item: Vec<ItemFieldConfig>,
}

/// Classification criteria; every criterion given must hold
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MatchConfig {
    /// The request's page-type hint equals this value
    #[serde(default)]
    pub hint: Option<String>,

    /// The URL contains this substring
    #[serde(default)]
    pub url_contains: Option<String>,

    /// The URL path matches this pattern (`*` wildcard, trailing `$` anchor)
    #[serde(default)]
    pub path_pattern: Option<String>,

    /// The document contains at least one element matching this CSS selector
    #[serde(default)]
    pub has_selector: Option<String>,
}

impl MatchConfig {
    pub fn is_empty(&self) -> bool {
        self.hint.is_none()
            && self.url_contains.is_none()
            && self.path_pattern.is_none()
            && self.has_selector.is_none()
    }
}

/// A named link-extraction component
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LinkComponentConfig {
    pub name: String,

    /// CSS selector of the link elements
    pub selector: String,

    /// Attribute holding the URL
    #[serde(default = "default_link_attribute")]
    pub attribute: String,

    /// Priority given to requests derived from this component
    #[serde(default)]
    pub priority: i32,

    /// Page-type hint attached to derived requests
    #[serde(default)]
    pub follow_as: Option<String>,
}

/// One field of the item built from a page
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ItemFieldConfig {
    pub name: String,

    /// Built-in value: `"url"` or `"page-type"`
    #[serde(default)]
    pub value: Option<String>,

    /// CSS selector; the first match's text is used unless `attribute` is set
    #[serde(default)]
    pub selector: Option<String>,

    #[serde(default)]
    pub attribute: Option<String>,

    /// Collect every match into an array instead of taking the first
    #[serde(default)]
    pub all: bool,
}

fn default_workers() -> u32 {
    4
}

fn default_checkpoint_interval() -> u64 {
    50
}

fn default_true() -> bool {
    true
}

fn default_max_concurrent_per_host() -> u32 {
    1
}

fn default_min_delay_ms() -> u64 {
    1000
}

fn default_max_crawl_delay_ms() -> u64 {
    60_000
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_max_retry_after_ms() -> u64 {
    120_000
}

fn default_max_redirects() -> usize {
    10
}

fn default_link_attribute() -> String {
    "href".to_string()
}
