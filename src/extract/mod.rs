//! Page classification and extraction
//!
//! This module contains:
//! - Classification rules matched in declaration order
//! - Named link components that yield raw URLs from a document
//! - The page view handed to item builders
//! - Items and the builders that produce them

mod component;
mod extractor;
mod item;
mod page;
mod rules;

pub use component::LinkComponent;
pub use extractor::{Extraction, Extractor};
pub use item::{FieldItemBuilder, Item, ItemBuilder};
pub use page::PageView;
pub use rules::{path_matches, PageRule, Predicate};
