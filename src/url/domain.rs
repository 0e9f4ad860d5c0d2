use url::Url;

/// Extracts the lowercase host from a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use folio::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM:8080/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns the key under which politeness state for this URL is tracked
///
/// The key is the lowercase host, followed by `:port` when the URL carries a
/// non-default port. Two servers on the same machine but different ports are
/// treated as different hosts.
pub fn host_key(url: &Url) -> String {
    let host = extract_domain(url).unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    }
}

/// Checks if a domain matches a wildcard pattern
///
/// `"example.com"` matches only itself; `"*.example.com"` matches the bare
/// domain and any subdomain at any depth.
///
/// ```
/// use folio::url::matches_wildcard;
///
/// assert!(matches_wildcard("*.toscrape.com", "books.toscrape.com"));
/// assert!(!matches_wildcard("toscrape.com", "books.toscrape.com"));
/// ```
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    if let Some(base) = pattern.strip_prefix("*.") {
        candidate == base || candidate.ends_with(&format!(".{}", base))
    } else {
        candidate == pattern
    }
}

/// Checks a URL against an allow-list of domain patterns
///
/// An empty allow-list permits every domain.
pub fn is_allowed_domain(url: &Url, patterns: &[String]) -> bool {
    if patterns.is_empty() {
        return true;
    }
    match extract_domain(url) {
        Some(domain) => patterns.iter().any(|p| matches_wildcard(p, &domain)),
        None => false,
    }
}
