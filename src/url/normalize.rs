use crate::url::NormalizedUrl;
use crate::{UrlError, UrlResult};
use url::{form_urlencoded, Url};

/// Tracking query parameters removed when tracking stripping is enabled
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "dclid", "msclkid", "mc_cid", "mc_eid", "_ga", "yclid",
];

/// Normalizes a raw URL, resolving it against `base` when given
///
/// This is [`Normalizer::default`] applied to the input; see
/// [`Normalizer::normalize`] for the rules.
///
/// # Examples
///
/// ```
/// use folio::url::normalize;
/// use url::Url;
///
/// let base = Url::parse("http://books.toscrape.com/catalogue/page-1.html").unwrap();
/// let url = normalize("page-2.html#top", Some(&base)).unwrap();
/// assert_eq!(url.as_str(), "http://books.toscrape.com/catalogue/page-2.html");
/// ```
pub fn normalize(raw: &str, base: Option<&Url>) -> UrlResult<NormalizedUrl> {
    Normalizer::default().normalize(raw, base)
}

/// URL canonicalizer
///
/// # Normalization Steps
///
/// 1. Trim whitespace and resolve the reference against the base URL
/// 2. Reject anything that is not `http` or `https`, or has no host
/// 3. Lowercase scheme and host, drop the default port
/// 4. Collapse `.` and `..` path segments; an empty path becomes `/`
/// 5. Remove the fragment
/// 6. Optionally remove tracking parameters, keeping the order of the rest
/// 7. Drop an empty query string (trailing `?`)
///
/// The path is otherwise kept verbatim, trailing slash included. The result
/// is stable: normalizing a normalized URL returns it unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer {
    strip_tracking_params: bool,
}

impl Normalizer {
    /// Creates a normalizer
    ///
    /// # Arguments
    ///
    /// * `strip_tracking_params` - Whether `utm_*` and similar parameters are removed
    pub fn new(strip_tracking_params: bool) -> Self {
        Self {
            strip_tracking_params,
        }
    }

    /// Normalizes `raw`, resolving relative references against `base`
    ///
    /// # Returns
    ///
    /// * `Ok(NormalizedUrl)` - The canonical URL
    /// * `Err(UrlError)` - The reference is malformed or not a crawlable URL
    pub fn normalize(&self, raw: &str, base: Option<&Url>) -> UrlResult<NormalizedUrl> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(UrlError::Parse("empty URL".to_string()));
        }

        // Url::parse and Url::join already lowercase the scheme and host of
        // special schemes, strip default ports and collapse dot segments.
        let parsed = match base {
            Some(base) => base.join(raw),
            None => Url::parse(raw),
        }
        .map_err(|e| UrlError::Parse(format!("{}: {}", raw, e)))?;

        self.canonicalize(parsed)
    }

    fn canonicalize(&self, mut url: Url) -> UrlResult<NormalizedUrl> {
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(UrlError::InvalidScheme(url.scheme().to_string()));
        }

        let host = url.host_str().ok_or(UrlError::MissingHost)?;
        if host.is_empty() {
            return Err(UrlError::MissingHost);
        }
        let lowered = host.to_lowercase();
        if lowered != host {
            url.set_host(Some(&lowered))
                .map_err(|e| UrlError::Parse(format!("invalid host {}: {}", lowered, e)))?;
        }

        url.set_fragment(None);

        if self.strip_tracking_params && url.query().is_some() {
            strip_tracking(&mut url);
        }

        if url.query() == Some("") {
            url.set_query(None);
        }

        Ok(NormalizedUrl::from_canonical(url))
    }
}

/// Removes tracking parameters while keeping the remaining ones in order
///
/// Kept parameters are copied byte for byte, so stripping never changes
/// how the rest of the query is encoded.
fn strip_tracking(url: &mut Url) {
    let Some(query) = url.query() else {
        return;
    };

    let segments: Vec<&str> = query.split('&').collect();
    let kept: Vec<&str> = segments
        .iter()
        .copied()
        .filter(|segment| !segment_is_tracking(segment))
        .collect();
    if kept.len() == segments.len() {
        return;
    }

    let kept = kept.join("&");
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.set_query(Some(&kept));
    }
}

fn segment_is_tracking(segment: &str) -> bool {
    let raw_key = segment.split('=').next().unwrap_or("");
    form_urlencoded::parse(raw_key.as_bytes())
        .next()
        .is_some_and(|(key, _)| is_tracking_param(&key))
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}
