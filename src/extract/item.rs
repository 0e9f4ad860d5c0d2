//! Items and item builders

use crate::config::ItemFieldConfig;
use crate::extract::page::{select_attr_with, select_text_with};
use crate::extract::PageView;
use scraper::Selector;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A key/value record extracted from a page
///
/// Serializes as a flat JSON object with keys in sorted order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Item {
    fields: BTreeMap<String, Value>,
}

impl Item {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Builder-style [`Item::insert`]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }
}

/// Turns a classified page into an item
///
/// Implemented for plain functions and closures, so callers can supply
/// extraction logic directly.
pub trait ItemBuilder: Send + Sync {
    /// Returns `None` when the page should not produce an item
    fn build(&self, page: &PageView<'_>) -> Option<Item>;
}

impl<F> ItemBuilder for F
where
    F: Fn(&PageView<'_>) -> Option<Item> + Send + Sync,
{
    fn build(&self, page: &PageView<'_>) -> Option<Item> {
        self(page)
    }
}

#[derive(Debug)]
enum FieldSource {
    Url,
    PageType,
    Css {
        selector: Option<Selector>,
        attribute: Option<String>,
        all: bool,
    },
}

#[derive(Debug)]
struct FieldSpec {
    name: String,
    source: FieldSource,
}

/// Item builder assembled from `[[page-types.item]]` entries
///
/// Fields whose selector matches nothing are written as `null`.
#[derive(Debug)]
pub struct FieldItemBuilder {
    fields: Vec<FieldSpec>,
}

impl FieldItemBuilder {
    pub fn from_config(page_type: &str, fields: &[ItemFieldConfig]) -> Self {
        let fields = fields
            .iter()
            .map(|field| FieldSpec {
                name: field.name.clone(),
                source: field_source(page_type, field),
            })
            .collect();
        Self { fields }
    }
}

fn field_source(page_type: &str, field: &ItemFieldConfig) -> FieldSource {
    match (field.value.as_deref(), field.selector.as_deref()) {
        (Some("page-type"), _) => FieldSource::PageType,
        (Some(_), _) | (None, None) => FieldSource::Url,
        (None, Some(css)) => {
            let selector = match Selector::parse(css) {
                Ok(selector) => Some(selector),
                Err(e) => {
                    tracing::warn!(
                        "Item field '{}' of page type '{}' has an invalid selector '{}': {}",
                        field.name,
                        page_type,
                        css,
                        e
                    );
                    None
                }
            };
            FieldSource::Css {
                selector,
                attribute: field.attribute.clone(),
                all: field.all,
            }
        }
    }
}

impl ItemBuilder for FieldItemBuilder {
    fn build(&self, page: &PageView<'_>) -> Option<Item> {
        let mut item = Item::new();

        for field in &self.fields {
            let value = match &field.source {
                FieldSource::Url => Value::from(page.url().as_str()),
                FieldSource::PageType => Value::from(page.page_type()),
                FieldSource::Css {
                    selector,
                    attribute,
                    all,
                } => {
                    let values = match (selector, attribute) {
                        (Some(selector), Some(attr)) => {
                            select_attr_with(page.document(), selector, attr)
                        }
                        (Some(selector), None) => select_text_with(page.document(), selector),
                        (None, _) => Vec::new(),
                    };
                    if *all {
                        Value::from(values)
                    } else {
                        values.into_iter().next().map(Value::from).unwrap_or(Value::Null)
                    }
                }
            };
            item.insert(field.name.clone(), value);
        }

        Some(item)
    }
}
