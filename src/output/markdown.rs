//! Markdown summary generation
//!
//! This module renders a human-readable markdown summary of a finished
//! crawl: run metadata, request outcomes, page types and per-host load.

use crate::output::CrawlSummary;
use std::path::Path;

/// Writes the markdown summary of a crawl to a file
///
/// # Arguments
///
/// * `summary` - The crawl summary data
/// * `output_path` - Path where the markdown file should be written
pub fn generate_markdown_summary(summary: &CrawlSummary, output_path: &Path) -> std::io::Result<()> {
    std::fs::write(output_path, format_markdown_summary(summary))
}

/// Formats a crawl summary as markdown
pub fn format_markdown_summary(summary: &CrawlSummary) -> String {
    let stats = &summary.stats;
    let mut md = String::new();

    md.push_str("# Folio Crawl Summary\n\n");

    md.push_str("## Run Information\n\n");
    if let Some(run_id) = summary.run_id {
        md.push_str(&format!("- **Run ID**: {}\n", run_id));
    }
    md.push_str(&format!("- **Started**: {}\n", summary.started_at.to_rfc3339()));
    md.push_str(&format!("- **Finished**: {}\n", summary.finished_at.to_rfc3339()));
    md.push_str(&format!(
        "- **Duration**: {} seconds\n",
        summary.duration_seconds()
    ));
    md.push_str(&format!("- **Final State**: {}\n", summary.final_state));
    if summary.resumed {
        md.push_str("- **Resumed**: yes\n");
    }
    if !summary.config_hash.is_empty() {
        md.push_str(&format!("- **Config Hash**: {}\n", summary.config_hash));
    }
    md.push('\n');

    md.push_str("## Requests\n\n");
    md.push_str("| Outcome | Count |\n");
    md.push_str("|---------|-------|\n");
    md.push_str(&format!("| Dispatched | {} |\n", stats.dispatched));
    md.push_str(&format!("| Succeeded | {} |\n", stats.succeeded));
    md.push_str(&format!("| Retried attempts | {} |\n", stats.retried));
    md.push_str(&format!(
        "| Failed permanently | {} |\n",
        stats.failed_permanently
    ));
    md.push_str(&format!("| Denied by robots.txt | {} |\n\n", stats.robots_denied));
    md.push_str(&format!(
        "Success rate {:.2}%, error rate {:.2}%.\n\n",
        summary.success_rate(),
        summary.error_rate()
    ));

    md.push_str("## Frontier\n\n");
    md.push_str(&format!("- **Visited URLs**: {}\n", summary.visited));
    md.push_str(&format!("- **Still Pending**: {}\n", summary.pending));
    md.push_str(&format!("- **Invalid Links**: {}\n", stats.invalid_urls));
    md.push_str(&format!("- **Offsite Links**: {}\n", stats.offsite));
    md.push_str(&format!("- **Already Seen**: {}\n\n", stats.duplicates));

    if !stats.pages_by_type.is_empty() || stats.unclassified > 0 {
        md.push_str("## Page Types\n\n");
        md.push_str("| Page Type | Pages |\n");
        md.push_str("|-----------|-------|\n");
        for (page_type, count) in &stats.pages_by_type {
            md.push_str(&format!("| {} | {} |\n", page_type, count));
        }
        if stats.unclassified > 0 {
            md.push_str(&format!("| *(unclassified)* | {} |\n", stats.unclassified));
        }
        md.push('\n');
    }

    md.push_str("## Items\n\n");
    md.push_str(&format!("- **Emitted**: {}\n", stats.items_emitted));
    md.push_str(&format!("- **Sink Errors**: {}\n\n", stats.sink_errors));

    if !summary.host_requests.is_empty() {
        md.push_str("## Hosts\n\n");
        md.push_str("| Host | Requests |\n");
        md.push_str("|------|----------|\n");

        let mut hosts: Vec<_> = summary.host_requests.iter().collect();
        hosts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        for (host, count) in hosts.iter().take(20) {
            md.push_str(&format!("| {} | {} |\n", host, count));
        }
        if hosts.len() > 20 {
            md.push_str(&format!("\n... and {} more\n", hosts.len() - 20));
        }
        md.push('\n');
    }

    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::StatsSnapshot;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn create_test_summary() -> CrawlSummary {
        let mut pages_by_type = BTreeMap::new();
        pages_by_type.insert("book".to_string(), 1000);
        pages_by_type.insert("listing".to_string(), 50);

        CrawlSummary {
            run_id: Some(1),
            started_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            finished_at: Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap(),
            final_state: "terminated".to_string(),
            config_hash: "abc123".to_string(),
            resumed: false,
            stats: StatsSnapshot {
                dispatched: 1060,
                succeeded: 1050,
                failed_permanently: 10,
                items_emitted: 1000,
                pages_by_type,
                ..StatsSnapshot::default()
            },
            pending: 0,
            visited: 1060,
            host_requests: vec![("books.toscrape.com".to_string(), 1061)],
        }
    }

    #[test]
    fn test_format_markdown_summary() {
        let markdown = format_markdown_summary(&create_test_summary());

        assert!(markdown.contains("# Folio Crawl Summary"));
        assert!(markdown.contains("- **Run ID**: 1"));
        assert!(markdown.contains("- **Duration**: 3600 seconds"));
        assert!(markdown.contains("- **Config Hash**: abc123"));
        assert!(markdown.contains("| Dispatched | 1060 |"));
        assert!(markdown.contains("| book | 1000 |"));
        assert!(markdown.contains("| books.toscrape.com | 1061 |"));
        assert!(!markdown.contains("unclassified"));
    }

    #[test]
    fn test_markdown_lists_unclassified() {
        let mut summary = create_test_summary();
        summary.stats.unclassified = 7;
        summary.resumed = true;

        let markdown = format_markdown_summary(&summary);
        assert!(markdown.contains("| *(unclassified)* | 7 |"));
        assert!(markdown.contains("- **Resumed**: yes"));
    }

    #[test]
    fn test_generate_writes_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("summary.md");
        generate_markdown_summary(&create_test_summary(), &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# Folio Crawl Summary"));
    }
}
