//! Page classification and extraction
//!
//! The extractor owns the ordered rule list. For each fetched document it:
//! 1. Classifies the page (first matching rule wins, fallback last)
//! 2. Runs every link component and normalizes the results
//! 3. Drops links that fail normalization or leave the allowed domains
//! 4. Builds the item, if the page type has a builder
//!
//! All of this is synchronous: the parsed document never crosses an await.

use crate::config::Config;
use crate::crawler::{FetchResult, Request};
use crate::extract::{Item, PageRule, PageView};
use crate::url::{is_allowed_domain, Normalizer};
use crate::{ConfigError, FolioError};
use scraper::Html;
use std::collections::HashSet;

/// Everything extracted from one page
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Name of the page type the document was classified as
    pub page_type: String,
    /// Derived requests, in component order then document order
    pub requests: Vec<Request>,
    pub item: Option<Item>,
    /// Links dropped because they could not be normalized
    pub invalid_links: u64,
    /// Links dropped for leaving the allowed domains
    pub offsite_links: u64,
}

/// Ordered page-type rules plus link normalization policy
#[derive(Debug, Default)]
pub struct Extractor {
    rules: Vec<PageRule>,
    fallback: Option<PageRule>,
    normalizer: Normalizer,
    allowed_domains: Vec<String>,
}

impl Extractor {
    /// Creates an extractor from ordered rules and an optional fallback
    pub fn new(rules: Vec<PageRule>, fallback: Option<PageRule>) -> Self {
        Self {
            rules,
            fallback,
            ..Self::default()
        }
    }

    /// Builds the rule set declared under `[[page-types]]`
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let mut rules = Vec::new();
        let mut fallback = None;

        for page_type in &config.page_types {
            let rule = PageRule::from_config(page_type)?;
            if page_type.fallback {
                fallback = Some(rule);
            } else {
                rules.push(rule);
            }
        }

        Ok(Self::new(rules, fallback)
            .with_normalizer(Normalizer::new(config.crawler.strip_tracking_params))
            .with_allowed_domains(config.crawler.allowed_domains.clone()))
    }

    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Restricts derived links to these domain patterns; empty allows all
    pub fn with_allowed_domains(mut self, allowed_domains: Vec<String>) -> Self {
        self.allowed_domains = allowed_domains;
        self
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    /// Names of all rules in match order, fallback last
    pub fn rule_names(&self) -> Vec<&str> {
        self.rules
            .iter()
            .chain(self.fallback.iter())
            .map(PageRule::name)
            .collect()
    }

    /// Finds the rule for a fetched document
    ///
    /// # Returns
    ///
    /// * `Ok(&PageRule)` - The first matching rule, or the fallback
    /// * `Err(FolioError::UnclassifiedPage)` - Nothing matched and there is no fallback
    pub fn classify(&self, result: &FetchResult, document: &Html) -> Result<&PageRule, FolioError> {
        self.rules
            .iter()
            .find(|rule| {
                rule.predicate()
                    .matches(&result.request, &result.final_url, document)
            })
            .or(self.fallback.as_ref())
            .ok_or_else(|| FolioError::UnclassifiedPage {
                url: result.request.url.to_string(),
            })
    }

    /// Classifies and extracts a successfully fetched document
    pub fn process(&self, result: &FetchResult) -> Result<Extraction, FolioError> {
        let document = match result.text() {
            Some(body) if result.is_html() => Html::parse_document(&body),
            _ => Html::new_document(),
        };

        let rule = self.classify(result, &document)?;
        let page = PageView::new(result, &document, rule.name(), rule.components());

        let mut extraction = Extraction {
            page_type: rule.name().to_string(),
            ..Extraction::default()
        };

        let mut seen = HashSet::new();
        for component in rule.components() {
            for raw in component.raw_urls(&document) {
                let url = match self.normalizer.normalize(raw, Some(&result.final_url)) {
                    Ok(url) => url,
                    Err(e) => {
                        tracing::debug!("Dropping link '{}' on {}: {}", raw, result.request.url, e);
                        extraction.invalid_links += 1;
                        continue;
                    }
                };

                if !is_allowed_domain(url.as_url(), &self.allowed_domains) {
                    tracing::trace!("Dropping offsite link {}", url);
                    extraction.offsite_links += 1;
                    continue;
                }

                if !seen.insert(url.clone()) {
                    continue;
                }

                extraction.requests.push(
                    Request::derived(&result.request, url, component.priority())
                        .with_hint(component.follow_as().map(String::from)),
                );
            }
        }

        extraction.item = rule.builder().and_then(|builder| builder.build(&page));

        Ok(extraction)
    }
}
