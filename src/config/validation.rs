use crate::config::types::{
    Config, CrawlerConfig, FetcherConfig, OutputConfig, PageTypeConfig, PolitenessConfig,
    SeedEntry, UserAgentConfig,
};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_politeness_config(&config.politeness)?;
    validate_fetcher_config(&config.fetcher)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    validate_page_types(&config.page_types)?;
    validate_seeds(&config.seeds, &config.page_types)?;
    Ok(())
}

fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > 256 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 256, got {}",
            config.workers
        )));
    }

    if config.checkpoint_interval < 1 {
        return Err(ConfigError::Validation(
            "checkpoint-interval must be >= 1".to_string(),
        ));
    }

    if config.max_pages == Some(0) {
        return Err(ConfigError::Validation(
            "max-pages must be >= 1 when set".to_string(),
        ));
    }

    for pattern in &config.allowed_domains {
        validate_domain_pattern(pattern)?;
    }

    Ok(())
}

fn validate_politeness_config(config: &PolitenessConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_per_host < 1 {
        return Err(ConfigError::Validation(
            "max-concurrent-per-host must be >= 1".to_string(),
        ));
    }
    Ok(())
}

fn validate_fetcher_config(config: &FetcherConfig) -> Result<(), ConfigError> {
    if config.timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "timeout-ms must be greater than zero".to_string(),
        ));
    }

    if config.base_backoff_ms > config.max_backoff_ms {
        return Err(ConfigError::Validation(format!(
            "base-backoff-ms ({}) cannot exceed max-backoff-ms ({})",
            config.base_backoff_ms, config.max_backoff_ms
        )));
    }

    Ok(())
}

fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler-name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler-name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact-url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.items_path.is_empty() {
        return Err(ConfigError::Validation(
            "items-path cannot be empty".to_string(),
        ));
    }

    if config.state_path.as_deref() == Some("") {
        return Err(ConfigError::Validation(
            "state-path cannot be empty when set".to_string(),
        ));
    }

    Ok(())
}

fn validate_seeds(seeds: &[SeedEntry], page_types: &[PageTypeConfig]) -> Result<(), ConfigError> {
    if seeds.is_empty() {
        return Err(ConfigError::Validation(
            "at least one seed URL is required".to_string(),
        ));
    }

    for seed in seeds {
        let url = Url::parse(&seed.url)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed.url, e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "Seed URL '{}' must use http or https",
                seed.url
            )));
        }

        if let Some(hint) = &seed.page_type {
            require_known_page_type(hint, page_types, &format!("seed '{}'", seed.url))?;
        }
    }

    Ok(())
}

fn validate_page_types(page_types: &[PageTypeConfig]) -> Result<(), ConfigError> {
    if page_types.is_empty() {
        return Err(ConfigError::Validation(
            "at least one page type is required".to_string(),
        ));
    }

    let mut names = HashSet::new();
    for page_type in page_types {
        if page_type.name.is_empty() {
            return Err(ConfigError::Validation(
                "page type name cannot be empty".to_string(),
            ));
        }
        if !names.insert(page_type.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate page type '{}'",
                page_type.name
            )));
        }
    }

    let fallbacks = page_types.iter().filter(|p| p.fallback).count();
    if fallbacks > 1 {
        return Err(ConfigError::Validation(format!(
            "at most one fallback page type is allowed, found {}",
            fallbacks
        )));
    }

    for page_type in page_types {
        for link in &page_type.links {
            if link.name.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "link component in page type '{}' needs a name",
                    page_type.name
                )));
            }
            if let Some(hint) = &link.follow_as {
                require_known_page_type(
                    hint,
                    page_types,
                    &format!("link '{}' of page type '{}'", link.name, page_type.name),
                )?;
            }
        }

        for field in &page_type.item {
            match (&field.value, &field.selector) {
                (Some(value), None) => {
                    if value != "url" && value != "page-type" {
                        return Err(ConfigError::Validation(format!(
                            "item field '{}' has unknown value '{}' (expected \"url\" or \"page-type\")",
                            field.name, value
                        )));
                    }
                }
                (None, Some(_)) => {}
                _ => {
                    return Err(ConfigError::Validation(format!(
                        "item field '{}' of page type '{}' needs exactly one of value or selector",
                        field.name, page_type.name
                    )));
                }
            }
        }
    }

    Ok(())
}

fn require_known_page_type(
    hint: &str,
    page_types: &[PageTypeConfig],
    context: &str,
) -> Result<(), ConfigError> {
    if page_types.iter().any(|p| p.name == hint) {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!(
            "{} refers to unknown page type '{}'",
            context, hint
        )))
    }
}

/// Validates a domain pattern (supports `*.` wildcards)
fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain pattern cannot be empty".to_string(),
        ));
    }

    let domain = pattern.strip_prefix("*.").unwrap_or(pattern);

    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain pattern '{}' has no domain",
            pattern
        )));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
        || domain.contains("..")
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' is malformed",
            domain
        )));
    }

    Ok(())
}

fn validate_email(email: &str) -> Result<(), ConfigError> {
    let mut parts = email.split('@');
    let valid = match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty() && !domain.is_empty() && domain.contains('.')
        }
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!(
            "Invalid contact-email: '{}'",
            email
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{LinkComponentConfig, MatchConfig};

    fn page_type(name: &str, fallback: bool) -> PageTypeConfig {
        PageTypeConfig {
            name: name.to_string(),
            fallback,
            matcher: MatchConfig::default(),
            links: vec![],
            item: vec![],
        }
    }

    #[test]
    fn test_validate_domain_pattern() {
        assert!(validate_domain_pattern("example.com").is_ok());
        assert!(validate_domain_pattern("*.example.com").is_ok());
        assert!(validate_domain_pattern("localhost").is_ok());

        assert!(validate_domain_pattern("").is_err());
        assert!(validate_domain_pattern("*.").is_err());
        assert!(validate_domain_pattern(".example.com").is_err());
        assert!(validate_domain_pattern("example..com").is_err());
        assert!(validate_domain_pattern("exa mple.com").is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("invalid").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@domain").is_err());
        assert!(validate_email("a@b@c.com").is_err());
    }

    #[test]
    fn test_page_types_required() {
        assert!(validate_page_types(&[]).is_err());
    }

    #[test]
    fn test_duplicate_page_types_rejected() {
        let types = vec![page_type("listing", false), page_type("listing", true)];
        assert!(validate_page_types(&types).is_err());
    }

    #[test]
    fn test_single_fallback_only() {
        let types = vec![page_type("a", true), page_type("b", true)];
        assert!(validate_page_types(&types).is_err());

        let types = vec![page_type("a", false), page_type("b", true)];
        assert!(validate_page_types(&types).is_ok());
    }

    #[test]
    fn test_follow_as_must_name_known_type() {
        let mut listing = page_type("listing", true);
        listing.links.push(LinkComponentConfig {
            name: "book-list".to_string(),
            selector: ".image_container a".to_string(),
            attribute: "href".to_string(),
            priority: 0,
            follow_as: Some("book".to_string()),
        });

        assert!(validate_page_types(&[listing.clone()]).is_err());
        assert!(validate_page_types(&[listing, page_type("book", false)]).is_ok());
    }

    #[test]
    fn test_seed_scheme_and_hint() {
        let types = vec![page_type("listing", true)];
        let ok = SeedEntry {
            url: "http://books.toscrape.com/".to_string(),
            priority: 0,
            page_type: Some("listing".to_string()),
        };
        assert!(validate_seeds(&[ok.clone()], &types).is_ok());

        let ftp = SeedEntry {
            url: "ftp://books.toscrape.com/".to_string(),
            ..ok.clone()
        };
        assert!(validate_seeds(&[ftp], &types).is_err());

        let unknown_hint = SeedEntry {
            page_type: Some("book".to_string()),
            ..ok
        };
        assert!(validate_seeds(&[unknown_hint], &types).is_err());
        assert!(validate_seeds(&[], &types).is_err());
    }
}
