//! Configuration module for Folio
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use folio::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("books.toml")).unwrap();
//! println!("Crawler will use {} workers", config.crawler.workers);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, CrawlerConfig, FetcherConfig, ItemFieldConfig, LinkComponentConfig, MatchConfig,
    OutputConfig, PageTypeConfig, PolitenessConfig, SeedEntry, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
