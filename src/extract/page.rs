//! Typed view over a classified page

use crate::crawler::{FetchResult, FetchStatus, Request};
use crate::extract::LinkComponent;
use scraper::{Html, Selector};
use url::Url;

/// A fetched document classified as one page type
///
/// Exposes selector-based queries over the document and the named link
/// components that page type declares.
pub struct PageView<'a> {
    result: &'a FetchResult,
    document: &'a Html,
    page_type: &'a str,
    components: &'a [LinkComponent],
}

impl<'a> PageView<'a> {
    pub fn new(
        result: &'a FetchResult,
        document: &'a Html,
        page_type: &'a str,
        components: &'a [LinkComponent],
    ) -> Self {
        Self {
            result,
            document,
            page_type,
            components,
        }
    }

    /// URL the document was served from, after redirects
    pub fn url(&self) -> &'a Url {
        &self.result.final_url
    }

    pub fn request(&self) -> &'a Request {
        &self.result.request
    }

    pub fn page_type(&self) -> &'a str {
        self.page_type
    }

    pub fn status(&self) -> &'a FetchStatus {
        &self.result.status
    }

    pub fn header(&self, name: &str) -> Option<&'a str> {
        self.result.header(name)
    }

    pub fn document(&self) -> &'a Html {
        self.document
    }

    /// Trimmed text of every element matching `css`
    ///
    /// An invalid selector yields an empty list.
    pub fn select_text(&self, css: &str) -> Vec<String> {
        match Selector::parse(css) {
            Ok(selector) => select_text_with(self.document, &selector),
            Err(_) => Vec::new(),
        }
    }

    /// Text of the first element matching `css`
    pub fn first_text(&self, css: &str) -> Option<String> {
        self.select_text(css).into_iter().next()
    }

    /// Attribute values of every element matching `css`
    pub fn select_attr(&self, css: &str, attribute: &str) -> Vec<String> {
        match Selector::parse(css) {
            Ok(selector) => select_attr_with(self.document, &selector, attribute),
            Err(_) => Vec::new(),
        }
    }

    pub fn components(&self) -> &'a [LinkComponent] {
        self.components
    }

    /// Raw link strings from the named component
    ///
    /// Unknown component names yield an empty sequence.
    pub fn component_urls(&self, name: &str) -> impl Iterator<Item = &'a str> + 'a {
        let document = self.document;
        let components: &'a [LinkComponent] = self.components;
        components
            .iter()
            .find(|c| c.name() == name)
            .into_iter()
            .flat_map(move |component| component.raw_urls(document))
    }
}

pub(crate) fn select_text_with(document: &Html, selector: &Selector) -> Vec<String> {
    document
        .select(selector)
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|text| !text.is_empty())
        .collect()
}

pub(crate) fn select_attr_with(document: &Html, selector: &Selector, attribute: &str) -> Vec<String> {
    document
        .select(selector)
        .filter_map(|element| element.value().attr(attribute))
        .map(|value| value.trim().to_string())
        .collect()
}
