//! Folio: a polite, resumable page-object crawler
//!
//! This crate implements a deduplicating web crawler engine. Callers describe
//! page types (how to recognise a page, which links to follow from it, and how
//! to turn it into an item); the engine owns scheduling, politeness, retries,
//! persistence and the worker pool.

pub mod config;
pub mod crawler;
pub mod extract;
pub mod output;
pub mod robots;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Folio operations
#[derive(Debug, Error)]
pub enum FolioError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Storage error: {0}")]
    Storage(storage::StorageError),

    #[error("Persisted crawl state is corrupt: {0}")]
    PersistenceCorruption(String),

    #[error("No page-type rule matched {url}")]
    UnclassifiedPage { url: String },

    #[error("No page-type rule matched any of the {pages} fetched pages and no fallback is configured")]
    NoRuleMatched { pages: u64 },

    #[error("Sink error: {0}")]
    Sink(#[from] output::SinkError),

    #[error("Crawl has already been started")]
    AlreadyStarted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<storage::StorageError> for FolioError {
    fn from(err: storage::StorageError) -> Self {
        match err {
            storage::StorageError::Corrupt(msg) => Self::PersistenceCorruption(msg),
            other => Self::Storage(other),
        }
    }
}

impl FolioError {
    /// Checks whether this error must stop the crawl
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::PersistenceCorruption(_) | Self::NoRuleMatched { .. } | Self::Config(_)
        )
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),

    #[error("Invalid CSS selector '{selector}' in page type '{page_type}'")]
    InvalidSelector { page_type: String, selector: String },
}

/// URL-specific errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,

    #[error("URL is not in normalized form: {0}")]
    NotNormalized(String),
}

/// Result type alias for Folio operations
pub type Result<T> = std::result::Result<T, FolioError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Coordinator, Request};
pub use extract::{Extractor, Item, PageView};
pub use state::CrawlState;
pub use url::{normalize, NormalizedUrl};
