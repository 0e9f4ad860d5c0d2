//! Folio main entry point
//!
//! This is the command-line interface for the Folio crawler.

use anyhow::{Context, Result};
use clap::Parser;
use folio::config::{load_config_with_hash, Config};
use folio::crawler::{Coordinator, HttpFetcher};
use folio::output::{generate_markdown_summary, print_statistics, JsonLinesSink, Sink};
use folio::storage::{open_storage, SnapshotStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Folio: a polite, resumable page-object crawler
///
/// Folio crawls the pages reachable from a set of seeds, classifies each
/// page by configured rules, follows the links those rules name and writes
/// the extracted items as JSON lines.
#[derive(Parser, Debug)]
#[command(name = "folio")]
#[command(version)]
#[command(about = "A polite, resumable page-object crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Discard persisted crawl state and start from the seeds
    #[arg(long)]
    fresh: bool,

    /// Validate config and show what would be crawled without crawling
    #[arg(long, conflicts_with_all = ["stats", "fresh"])]
    dry_run: bool,

    /// Show the persisted crawl state and exit
    #[arg(long, conflicts_with_all = ["dry_run", "fresh"])]
    stats: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config)
    } else if cli.stats {
        handle_stats(&config)
    } else {
        handle_crawl(config, config_hash, cli.fresh).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("folio=info,warn"),
            1 => EnvFilter::new("folio=debug,info"),
            2 => EnvFilter::new("folio=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows the crawl plan
fn handle_dry_run(config: &Config) -> Result<()> {
    println!("=== Folio Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Workers: {}", config.crawler.workers);
    match config.crawler.max_depth {
        Some(depth) => println!("  Max depth: {}", depth),
        None => println!("  Max depth: unlimited"),
    }
    match config.crawler.max_pages {
        Some(pages) => println!("  Max pages: {}", pages),
        None => println!("  Max pages: unlimited"),
    }
    println!("  Respect robots.txt: {}", config.crawler.respect_robots);
    if !config.crawler.allowed_domains.is_empty() {
        println!("  Allowed domains: {}", config.crawler.allowed_domains.join(", "));
    }

    println!("\nPoliteness:");
    println!(
        "  Max concurrent per host: {}",
        config.politeness.max_concurrent_per_host
    );
    println!("  Min delay: {}ms", config.politeness.min_delay_ms);
    println!(
        "  Max robots crawl-delay: {}ms",
        config.politeness.max_crawl_delay_ms
    );

    println!("\nUser Agent: {}", config.user_agent.header_value());

    println!("\nOutput:");
    println!("  Items: {}", config.output.items_path);
    if let Some(state) = &config.output.state_path {
        println!("  State: {}", state);
    }
    if let Some(summary) = &config.output.summary_path {
        println!("  Summary: {}", summary);
    }

    println!("\nPage Types ({}):", config.page_types.len());
    for page_type in &config.page_types {
        let marker = if page_type.fallback { " (fallback)" } else { "" };
        println!("  - {}{}", page_type.name, marker);
        for link in &page_type.links {
            println!(
                "    * follows '{}' via {} (priority {})",
                link.name, link.selector, link.priority
            );
        }
        if !page_type.item.is_empty() {
            println!("    * builds items with {} field(s)", page_type.item.len());
        }
    }

    println!("\nSeeds ({}):", config.seeds.len());
    for seed in &config.seeds {
        println!("  - {} (priority {})", seed.url, seed.priority);
    }

    println!("\n✓ Configuration is valid");

    Ok(())
}

/// Handles the --stats mode: shows the persisted runs and snapshot
fn handle_stats(config: &Config) -> Result<()> {
    let Some(state_path) = &config.output.state_path else {
        println!("No state-path configured; nothing is persisted.");
        return Ok(());
    };

    println!("Database: {}\n", state_path);
    let store = open_storage(Path::new(state_path))
        .with_context(|| format!("Failed to open {}", state_path))?;

    println!("Runs recorded: {}", store.count_runs()?);
    if let Some(run) = store.get_latest_run()? {
        println!("Latest run: #{} ({})", run.id, run.status.to_db_string());
        println!("  Started: {}", run.started_at);
        if let Some(finished) = &run.finished_at {
            println!("  Finished: {}", finished);
        }
        println!("  Config hash: {}", run.config_hash);
    }

    match store.load_snapshot()? {
        Some(snapshot) => {
            println!("\nSnapshot:");
            println!("  Pending requests: {}", snapshot.pending.len());
            println!("  Visited URLs: {}", snapshot.visited.len());
        }
        None => println!("\nNo snapshot saved."),
    }

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: String, fresh: bool) -> Result<()> {
    let fetcher = HttpFetcher::new(&config.user_agent, &config.fetcher)
        .context("Failed to build HTTP client")?;

    let items_path = Path::new(&config.output.items_path);
    let resuming = config.output.state_path.is_some() && !fresh;
    let sink = if resuming {
        JsonLinesSink::append(items_path).await
    } else {
        JsonLinesSink::create(items_path).await
    }
    .with_context(|| format!("Failed to open {}", items_path.display()))?;
    let sink: Arc<dyn Sink> = Arc::new(sink);

    let mut builder = Coordinator::from_config(&config, Arc::new(fetcher), sink)?
        .config_hash(&config_hash)
        .fresh(fresh);

    if let Some(state_path) = &config.output.state_path {
        let store = open_storage(Path::new(state_path))
            .with_context(|| format!("Failed to open {}", state_path))?;
        builder = builder.store(Box::new(store));
    }

    let coordinator = builder.build();

    let cancel = coordinator.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, stopping after in-flight requests");
            cancel.cancel();
        }
    });

    let outcome = coordinator.run().await;

    if let Some(summary) = coordinator.summary() {
        print_statistics(&summary);
        if let Some(path) = &config.output.summary_path {
            generate_markdown_summary(&summary, Path::new(path))
                .with_context(|| format!("Failed to write {}", path))?;
            tracing::info!("Summary written to {}", path);
        }
    }

    outcome?;
    Ok(())
}
