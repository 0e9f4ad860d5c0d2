//! Named link-extraction components

use crate::config::LinkComponentConfig;
use scraper::{Html, Selector};

/// A named rule that yields raw link strings from a document
///
/// A component whose selector failed to parse yields nothing.
#[derive(Debug, Clone)]
pub struct LinkComponent {
    name: String,
    selector: Option<Selector>,
    attribute: String,
    priority: i32,
    follow_as: Option<String>,
}

impl LinkComponent {
    /// Creates a component reading `href` from elements matching `css`
    pub fn new(name: &str, css: &str) -> Self {
        let selector = match Selector::parse(css) {
            Ok(selector) => Some(selector),
            Err(e) => {
                tracing::warn!(
                    "Link component '{}' has an invalid selector '{}': {}; it will yield no links",
                    name,
                    css,
                    e
                );
                None
            }
        };

        Self {
            name: name.to_string(),
            selector,
            attribute: "href".to_string(),
            priority: 0,
            follow_as: None,
        }
    }

    pub fn from_config(config: &LinkComponentConfig) -> Self {
        Self::new(&config.name, &config.selector)
            .with_attribute(&config.attribute)
            .with_priority(config.priority)
            .with_follow_as(config.follow_as.clone())
    }

    pub fn with_attribute(mut self, attribute: &str) -> Self {
        self.attribute = attribute.to_string();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_follow_as(mut self, follow_as: Option<String>) -> Self {
        self.follow_as = follow_as;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Priority assigned to requests derived from this component
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Page-type hint attached to derived requests
    pub fn follow_as(&self) -> Option<&str> {
        self.follow_as.as_deref()
    }

    /// Lazily yields the raw attribute values of matching elements
    ///
    /// Calling this again restarts from the first match.
    pub fn raw_urls<'a>(&'a self, document: &'a Html) -> impl Iterator<Item = &'a str> + 'a {
        let attribute = self.attribute.as_str();
        self.selector
            .iter()
            .flat_map(move |selector| document.select(selector))
            .filter_map(move |element| element.value().attr(attribute))
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
    }
}
