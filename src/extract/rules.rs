//! Page-type classification rules

use crate::config::{MatchConfig, PageTypeConfig};
use crate::crawler::Request;
use crate::extract::{FieldItemBuilder, ItemBuilder, LinkComponent};
use crate::ConfigError;
use scraper::{Html, Selector};
use url::Url;

/// Classification criteria; all that are set must hold
#[derive(Debug, Clone, Default)]
pub struct Predicate {
    hint: Option<String>,
    url_contains: Option<String>,
    path_pattern: Option<String>,
    has_selector: Option<Selector>,
}

impl Predicate {
    /// A predicate that matches every page
    pub fn any() -> Self {
        Self::default()
    }

    pub fn from_config(page_type: &str, config: &MatchConfig) -> Result<Self, ConfigError> {
        let has_selector = config
            .has_selector
            .as_deref()
            .map(|css| {
                Selector::parse(css).map_err(|_| ConfigError::InvalidSelector {
                    page_type: page_type.to_string(),
                    selector: css.to_string(),
                })
            })
            .transpose()?;

        Ok(Self {
            hint: config.hint.clone(),
            url_contains: config.url_contains.clone(),
            path_pattern: config.path_pattern.clone(),
            has_selector,
        })
    }

    /// Requires the request's page-type hint to equal `hint`
    pub fn hint(mut self, hint: &str) -> Self {
        self.hint = Some(hint.to_string());
        self
    }

    pub fn url_contains(mut self, needle: &str) -> Self {
        self.url_contains = Some(needle.to_string());
        self
    }

    /// Requires the URL path to match a `*`-wildcard pattern, `$` anchoring the end
    pub fn path_pattern(mut self, pattern: &str) -> Self {
        self.path_pattern = Some(pattern.to_string());
        self
    }

    /// Requires at least one element matching `css`
    pub fn has_selector(mut self, css: &str) -> Result<Self, ConfigError> {
        let selector = Selector::parse(css).map_err(|_| ConfigError::InvalidSelector {
            page_type: String::new(),
            selector: css.to_string(),
        })?;
        self.has_selector = Some(selector);
        Ok(self)
    }

    pub fn matches(&self, request: &Request, url: &Url, document: &Html) -> bool {
        if let Some(hint) = &self.hint {
            if request.page_type_hint.as_deref() != Some(hint.as_str()) {
                return false;
            }
        }

        if let Some(needle) = &self.url_contains {
            if !url.as_str().contains(needle.as_str()) {
                return false;
            }
        }

        if let Some(pattern) = &self.path_pattern {
            if !path_matches(url.path(), pattern) {
                return false;
            }
        }

        if let Some(selector) = &self.has_selector {
            if document.select(selector).next().is_none() {
                return false;
            }
        }

        true
    }
}

/// Matches a path against a pattern with `*` wildcards and an optional `$` end anchor
///
/// Without `$` the pattern is a prefix match.
pub fn path_matches(path: &str, pattern: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }

    let (pattern, anchored) = match pattern.strip_suffix('$') {
        Some(stripped) => (stripped, true),
        None => (pattern, false),
    };

    let mut parts: Vec<&str> = pattern.split('*').collect();
    let mut haystack = path;

    // With an anchor the last literal part must sit at the very end
    if anchored {
        let tail = parts.pop().unwrap_or("");
        if !haystack.ends_with(tail) {
            return false;
        }
        haystack = &haystack[..haystack.len() - tail.len()];
        if parts.is_empty() {
            return haystack.is_empty();
        }
    }

    let mut pos = 0;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        match haystack[pos..].find(part) {
            Some(found) => {
                if i == 0 && found != 0 {
                    return false;
                }
                pos += found + part.len();
            }
            None => return false,
        }
    }

    true
}

/// One page type: how to recognise it, which links to follow, and its item
pub struct PageRule {
    name: String,
    predicate: Predicate,
    components: Vec<LinkComponent>,
    item_builder: Option<Box<dyn ItemBuilder>>,
}

impl PageRule {
    pub fn new(name: &str, predicate: Predicate) -> Self {
        Self {
            name: name.to_string(),
            predicate,
            components: Vec::new(),
            item_builder: None,
        }
    }

    pub fn from_config(config: &PageTypeConfig) -> Result<Self, ConfigError> {
        let predicate = Predicate::from_config(&config.name, &config.matcher)?;
        let mut rule = Self::new(&config.name, predicate);

        for link in &config.links {
            rule = rule.link(LinkComponent::from_config(link));
        }

        if !config.item.is_empty() {
            rule = rule.item_builder(FieldItemBuilder::from_config(&config.name, &config.item));
        }

        Ok(rule)
    }

    pub fn link(mut self, component: LinkComponent) -> Self {
        self.components.push(component);
        self
    }

    pub fn item_builder(mut self, builder: impl ItemBuilder + 'static) -> Self {
        self.item_builder = Some(Box::new(builder));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    pub fn components(&self) -> &[LinkComponent] {
        &self.components
    }

    pub(crate) fn builder(&self) -> Option<&dyn ItemBuilder> {
        self.item_builder.as_deref()
    }
}

impl std::fmt::Debug for PageRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageRule")
            .field("name", &self.name)
            .field("predicate", &self.predicate)
            .field("components", &self.components.len())
            .field("item_builder", &self.item_builder.is_some())
            .finish()
    }
}
