//! URL handling for Folio
//!
//! This module provides the canonical URL type used as the deduplication key,
//! the normalizer that produces it, host keys for politeness accounting, and
//! wildcard domain matching for offsite filtering.

mod domain;
mod normalize;

use crate::{UrlError, UrlResult};
use std::fmt;
use url::Url;

pub use domain::{extract_domain, host_key, is_allowed_domain, matches_wildcard};
pub use normalize::{normalize, Normalizer};

/// A URL in canonical form
///
/// Values of this type are only produced by [`Normalizer`], so two
/// `NormalizedUrl`s compare equal exactly when they denote the same page for
/// deduplication purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NormalizedUrl(Url);

impl NormalizedUrl {
    /// Parses a string that is expected to already be in normalized form
    ///
    /// Used when restoring persisted state: a stored URL that does not
    /// survive normalization unchanged indicates a damaged snapshot.
    pub fn parse_normalized(s: &str) -> UrlResult<Self> {
        let normalized = normalize(s, None)?;
        if normalized.as_str() != s {
            return Err(UrlError::NotNormalized(s.to_string()));
        }
        Ok(normalized)
    }

    /// Returns the canonical string form
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns the underlying parsed URL
    pub fn as_url(&self) -> &Url {
        &self.0
    }

    /// Returns the politeness key (host plus explicit port) of this URL
    pub fn host_key(&self) -> String {
        host_key(&self.0)
    }

    pub(crate) fn from_canonical(url: Url) -> Self {
        Self(url)
    }
}

impl fmt::Display for NormalizedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl AsRef<str> for NormalizedUrl {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}
