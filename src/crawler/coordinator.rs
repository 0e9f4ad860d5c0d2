//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the crawl loop that ties the other components
//! together, including:
//! - Restoring persisted state and seeding the frontier
//! - Dispatching requests to a bounded pool of workers
//! - Robots.txt checks and politeness for each request
//! - Feeding fetched pages to the extractor, derived requests back to the
//!   frontier and items to the sink
//! - Periodic snapshots, cooperative cancellation and run bookkeeping

use crate::config::Config;
use crate::crawler::{Fetch, Frontier, RateLimiter, Request};
use crate::extract::Extractor;
use crate::output::{CrawlStats, CrawlSummary, Sink, StatsSnapshot};
use crate::robots::{fetch_robots, is_allowed, RobotsCache};
use crate::state::{CrawlState, StopReason};
use crate::storage::{RunStatus, SnapshotStore};
use crate::url::{NormalizedUrl, Normalizer};
use crate::FolioError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::{Id, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

/// Unclassified pages tolerated before concluding that no rule can ever match
const MAX_UNCLASSIFIED_WITHOUT_MATCH: u64 = 20;

/// Longest robots.txt `Crawl-delay` honored unless configured otherwise
const DEFAULT_MAX_CRAWL_DELAY: Duration = Duration::from_secs(60);

/// State shared between the dispatcher and the workers
struct Shared {
    frontier: Frontier,
    limiter: RateLimiter,
    fetcher: Arc<dyn Fetch>,
    extractor: Extractor,
    sink: Arc<dyn Sink>,
    stats: CrawlStats,
    robots: RobotsCache,
    /// Product token matched against robots.txt; `None` ignores robots.txt
    robots_agent: Option<String>,
    max_crawl_delay: Duration,
    cancel: CancellationToken,
    state: Mutex<CrawlState>,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, CrawlState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Moves to `next` if that is a legal transition; returns whether it did
    fn transition(&self, next: CrawlState) -> bool {
        let mut state = self.lock_state();
        if *state == next || !state.can_transition_to(&next) {
            return false;
        }
        tracing::debug!("Crawl state {} -> {}", *state, next);
        *state = next;
        true
    }

    /// Handles one request from dispatch to completion
    ///
    /// Every exit path marks the request complete in the frontier, and the
    /// politeness slot is released as soon as the fetch is over.
    async fn process(self: Arc<Self>, request: Request) {
        let host = request.url.host_key();
        let mut permit = self.limiter.acquire(&host).await;

        if let Some(agent) = &self.robots_agent {
            let (robots, fetched) = self
                .robots
                .get_or_fetch(&host, || fetch_robots(self.fetcher.as_ref(), &request.url))
                .await;

            if fetched {
                if let Some(delay) = robots.crawl_delay(agent) {
                    if delay > self.max_crawl_delay {
                        tracing::warn!(
                            "{} asks for a crawl delay of {:?}; using {:?}",
                            host,
                            delay,
                            self.max_crawl_delay
                        );
                    }
                    self.limiter
                        .raise_min_delay(&host, delay.min(self.max_crawl_delay));
                }
                // The robots.txt fetch used this slot; wait for a fresh one
                drop(permit);
                permit = self.limiter.acquire(&host).await;
            }

            if !is_allowed(&robots, &request.url, agent) {
                tracing::debug!("{} disallowed by robots.txt", request.url);
                self.stats.record_robots_denied();
                drop(permit);
                self.frontier.complete(&request.url);
                return;
            }
        }

        self.stats.record_dispatch();
        let result = self.fetcher.fetch(&request).await;
        drop(permit);

        self.stats
            .record_fetch(result.status.is_ok(), result.attempts);

        if result.status.is_ok() {
            self.handle_page(&result).await;
        } else {
            tracing::warn!(
                "Giving up on {} after {} attempt(s): {}",
                request.url,
                result.attempts,
                result.status
            );
        }

        self.frontier.complete(&request.url);
    }

    async fn handle_page(&self, result: &crate::crawler::FetchResult) {
        // Parsing and extraction stay synchronous; nothing from the
        // document lives past this call
        let extraction = match self.extractor.process(result) {
            Ok(extraction) => extraction,
            Err(FolioError::UnclassifiedPage { url }) => {
                tracing::debug!("No page-type rule matched {}", url);
                self.stats.record_unclassified();
                return;
            }
            Err(e) => {
                tracing::warn!("Extraction failed for {}: {}", result.request.url, e);
                return;
            }
        };

        self.stats.record_classified(&extraction.page_type);

        let mut added = 0usize;
        let mut duplicates = 0u64;
        for derived in extraction.requests {
            let url = derived.url.clone();
            if self.frontier.push(derived) {
                added += 1;
            } else if self.frontier.contains(&url) {
                duplicates += 1;
            }
        }
        self.stats
            .record_links(extraction.invalid_links, extraction.offsite_links, duplicates);

        tracing::debug!(
            "Processed {} as {}: {} new request(s)",
            result.request.url,
            extraction.page_type,
            added
        );

        if let Some(item) = extraction.item {
            match self.sink.emit(item).await {
                Ok(()) => self.stats.record_item(true),
                Err(e) => {
                    tracing::warn!("Sink rejected item from {}: {}", result.request.url, e);
                    self.stats.record_item(false);
                }
            }
        }
    }
}

/// Orchestrates a single crawl run
///
/// A coordinator is built once, run once, and may be cancelled from any
/// task while it runs.
pub struct Coordinator {
    shared: Arc<Shared>,
    seeds: Vec<Request>,
    workers: usize,
    max_pages: Option<u64>,
    checkpoint_interval: u64,
    store: Mutex<Option<Box<dyn SnapshotStore>>>,
    config_hash: String,
    fresh: bool,
    started: AtomicBool,
    summary: Mutex<Option<CrawlSummary>>,
}

/// Builder for [`Coordinator`]
pub struct CoordinatorBuilder {
    fetcher: Arc<dyn Fetch>,
    extractor: Extractor,
    sink: Arc<dyn Sink>,
    seeds: Vec<Request>,
    workers: usize,
    max_depth: Option<u32>,
    max_pages: Option<u64>,
    checkpoint_interval: u64,
    max_concurrent_per_host: u32,
    min_delay: Duration,
    max_crawl_delay: Duration,
    robots_agent: Option<String>,
    store: Option<Box<dyn SnapshotStore>>,
    config_hash: String,
    fresh: bool,
}

impl CoordinatorBuilder {
    /// Adds a seed request
    pub fn seed(mut self, request: Request) -> Self {
        self.seeds.push(request);
        self
    }

    /// Sets the number of concurrent workers (at least 1)
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn max_depth(mut self, max_depth: Option<u32>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Stops dispatching after this many requests
    pub fn max_pages(mut self, max_pages: Option<u64>) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Number of finished requests between snapshots
    pub fn checkpoint_interval(mut self, interval: u64) -> Self {
        self.checkpoint_interval = interval.max(1);
        self
    }

    pub fn politeness(mut self, max_concurrent_per_host: u32, min_delay: Duration) -> Self {
        self.max_concurrent_per_host = max_concurrent_per_host;
        self.min_delay = min_delay;
        self
    }

    /// Caps the `Crawl-delay` a robots.txt may impose on its host
    pub fn max_crawl_delay(mut self, max: Duration) -> Self {
        self.max_crawl_delay = max;
        self
    }

    /// Honors robots.txt, matching groups against `agent`
    pub fn respect_robots(mut self, agent: &str) -> Self {
        self.robots_agent = Some(agent.to_string());
        self
    }

    pub fn ignore_robots(mut self) -> Self {
        self.robots_agent = None;
        self
    }

    /// Persists snapshots and run records to `store`, resuming from it
    pub fn store(mut self, store: Box<dyn SnapshotStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Hash recorded with the run to detect configuration changes on resume
    pub fn config_hash(mut self, hash: &str) -> Self {
        self.config_hash = hash.to_string();
        self
    }

    /// Discards any persisted snapshot instead of resuming from it
    pub fn fresh(mut self, fresh: bool) -> Self {
        self.fresh = fresh;
        self
    }

    pub fn build(self) -> Coordinator {
        let shared = Shared {
            frontier: Frontier::new(self.max_depth),
            limiter: RateLimiter::new(self.max_concurrent_per_host, self.min_delay),
            fetcher: self.fetcher,
            extractor: self.extractor,
            sink: self.sink,
            stats: CrawlStats::new(),
            robots: RobotsCache::new(),
            robots_agent: self.robots_agent,
            max_crawl_delay: self.max_crawl_delay,
            cancel: CancellationToken::new(),
            state: Mutex::new(CrawlState::Idle),
        };

        Coordinator {
            shared: Arc::new(shared),
            seeds: self.seeds,
            workers: self.workers,
            max_pages: self.max_pages,
            checkpoint_interval: self.checkpoint_interval,
            store: Mutex::new(self.store),
            config_hash: self.config_hash,
            fresh: self.fresh,
            started: AtomicBool::new(false),
            summary: Mutex::new(None),
        }
    }
}

impl Coordinator {
    /// Starts building a coordinator with defaults: one worker, no limits,
    /// no politeness delay, robots.txt ignored and nothing persisted
    pub fn builder(
        fetcher: Arc<dyn Fetch>,
        extractor: Extractor,
        sink: Arc<dyn Sink>,
    ) -> CoordinatorBuilder {
        CoordinatorBuilder {
            fetcher,
            extractor,
            sink,
            seeds: Vec::new(),
            workers: 1,
            max_depth: None,
            max_pages: None,
            checkpoint_interval: 100,
            max_concurrent_per_host: 1,
            min_delay: Duration::ZERO,
            max_crawl_delay: DEFAULT_MAX_CRAWL_DELAY,
            robots_agent: None,
            store: None,
            config_hash: String::new(),
            fresh: false,
        }
    }

    /// Prepares a coordinator from a validated configuration
    ///
    /// The returned builder still accepts a snapshot store, the config
    /// hash and the fresh flag.
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `fetcher` - Network retrieval, usually an `HttpFetcher`
    /// * `sink` - Receiver of extracted items
    ///
    /// # Returns
    ///
    /// * `Ok(CoordinatorBuilder)` - Ready to build
    /// * `Err(FolioError)` - A page type or seed URL could not be used
    pub fn from_config(
        config: &Config,
        fetcher: Arc<dyn Fetch>,
        sink: Arc<dyn Sink>,
    ) -> Result<CoordinatorBuilder, FolioError> {
        let extractor = Extractor::from_config(config)?;

        let mut builder = Self::builder(fetcher, extractor, sink)
            .workers(config.crawler.workers as usize)
            .max_depth(config.crawler.max_depth)
            .max_pages(config.crawler.max_pages)
            .checkpoint_interval(config.crawler.checkpoint_interval)
            .politeness(
                config.politeness.max_concurrent_per_host,
                config.politeness.min_delay(),
            )
            .max_crawl_delay(config.politeness.max_crawl_delay());

        builder = if config.crawler.respect_robots {
            builder.respect_robots(&config.user_agent.crawler_name)
        } else {
            builder.ignore_robots()
        };

        let normalizer = Normalizer::new(config.crawler.strip_tracking_params);
        for seed in &config.seeds {
            let url = normalizer.normalize(&seed.url, None)?;
            builder = builder.seed(Request::seed(url, seed.priority).with_hint(seed.page_type.clone()));
        }

        Ok(builder)
    }

    /// Requests a cooperative stop
    ///
    /// No new request is dispatched after this call; requests already in
    /// flight finish and their results are processed normally.
    pub fn cancel(&self) {
        if !self.shared.cancel.is_cancelled() {
            tracing::info!("Cancellation requested, finishing in-flight requests");
        }
        self.shared.cancel.cancel();
    }

    /// Returns a token that cancels this crawl when triggered
    pub fn cancel_handle(&self) -> CancellationToken {
        self.shared.cancel.clone()
    }

    pub fn state(&self) -> CrawlState {
        self.shared.lock_state().clone()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Requests still queued, in dispatch order
    pub fn pending(&self) -> Vec<Request> {
        self.shared.frontier.pending()
    }

    /// Summary of the finished run, including runs that stopped on an error
    pub fn summary(&self) -> Option<CrawlSummary> {
        self.summary
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Runs the crawl to completion
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlSummary)` - The crawl terminated normally or was cancelled
    /// * `Err(FolioError)` - A fatal condition stopped the crawl
    pub async fn run(&self) -> Result<CrawlSummary, FolioError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(FolioError::AlreadyStarted);
        }
        let started_at = Utc::now();

        let (run_id, resumed) = match self.prepare() {
            Ok(prepared) => prepared,
            Err(e) => {
                tracing::error!("Cannot start crawl: {}", e);
                self.shared
                    .transition(CrawlState::Stopped(StopReason::Fatal(e.to_string())));
                self.record_summary(None, started_at, false);
                return Err(e);
            }
        };

        self.shared.transition(CrawlState::Running);
        tracing::info!(
            "Starting crawl with {} queued request(s) and {} worker(s)",
            self.shared.frontier.len(),
            self.workers
        );

        let fatal = self.dispatch().await;

        let fatal = fatal.or_else(|| {
            let stats = self.shared.stats.snapshot();
            (stats.succeeded > 0 && stats.classified() == 0 && !self.shared.extractor.has_fallback())
                .then_some(FolioError::NoRuleMatched {
                    pages: stats.succeeded,
                })
        });

        let (final_state, run_status) = match &fatal {
            Some(e) => (
                CrawlState::Stopped(StopReason::Fatal(e.to_string())),
                RunStatus::Failed,
            ),
            None if self.shared.cancel.is_cancelled() => (
                CrawlState::Stopped(StopReason::Cancelled),
                RunStatus::Interrupted,
            ),
            None => (CrawlState::Terminated, RunStatus::Completed),
        };

        if final_state == CrawlState::Terminated {
            self.shared.transition(CrawlState::Draining);
        }
        self.shared.transition(final_state.clone());

        let corrupt = matches!(fatal, Some(FolioError::PersistenceCorruption(_)));
        if !corrupt {
            if let Err(e) = self.checkpoint().await {
                tracing::error!("Final snapshot failed: {}", e);
            }
        }
        self.finish_run(run_id, run_status);

        let summary = self.record_summary(run_id, started_at, resumed);
        match fatal {
            Some(e) => {
                tracing::error!("Crawl stopped: {}", e);
                Err(e)
            }
            None => {
                tracing::info!(
                    "Crawl {}: {} request(s) dispatched, {} item(s) emitted in {}s",
                    final_state,
                    summary.stats.dispatched,
                    summary.stats.items_emitted,
                    summary.duration_seconds()
                );
                Ok(summary)
            }
        }
    }

    fn lock_store(&self) -> MutexGuard<'_, Option<Box<dyn SnapshotStore>>> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Restores or clears persisted state, opens a run record, and seeds
    /// the frontier
    ///
    /// # Returns
    ///
    /// The run ID (when persisting) and whether a snapshot was restored
    fn prepare(&self) -> Result<(Option<i64>, bool), FolioError> {
        let mut resumed = false;
        let mut run_id = None;

        {
            let mut guard = self.lock_store();
            if let Some(store) = guard.as_mut() {
                if self.fresh {
                    tracing::info!("Discarding persisted crawl state");
                    store.clear_snapshot()?;
                }

                let previous = store.get_latest_run()?;
                let id = store.create_run(&self.config_hash)?;
                run_id = Some(id);

                let snapshot = match store.load_snapshot() {
                    Ok(snapshot) => snapshot,
                    Err(e) => {
                        let e = FolioError::from(e);
                        mark_failed(store.as_mut(), id);
                        return Err(e);
                    }
                };

                if let Some(snapshot) = snapshot {
                    if let Some(previous) = &previous {
                        if previous.config_hash != self.config_hash {
                            tracing::warn!(
                                "Configuration changed since run {}; resuming anyway",
                                previous.id
                            );
                        }
                        tracing::info!(
                            "Resuming from run {} ({})",
                            previous.id,
                            previous.status.to_db_string()
                        );
                    }
                    tracing::info!(
                        "Restoring {} pending and {} visited URL(s)",
                        snapshot.pending.len(),
                        snapshot.visited.len()
                    );
                    if let Err(e) = self.shared.frontier.restore(snapshot) {
                        mark_failed(store.as_mut(), id);
                        return Err(e);
                    }
                    resumed = true;
                }
            }
        }

        let mut seeded = 0;
        for seed in &self.seeds {
            if self.shared.frontier.push(seed.clone()) {
                seeded += 1;
            }
        }
        tracing::debug!("Seeded {} of {} request(s)", seeded, self.seeds.len());

        Ok((run_id, resumed))
    }

    /// Runs the worker pool until there is nothing left to do
    ///
    /// Returns the fatal error that stopped dispatching, if any.
    async fn dispatch(&self) -> Option<FolioError> {
        let mut tasks: JoinSet<()> = JoinSet::new();
        let mut task_urls: HashMap<Id, NormalizedUrl> = HashMap::new();
        let mut dispatched: u64 = 0;
        let mut since_checkpoint: u64 = 0;
        let mut fatal: Option<FolioError> = None;

        loop {
            let limit_hit = self.max_pages.is_some_and(|max| dispatched >= max);
            let halted = fatal.is_some() || self.shared.cancel.is_cancelled() || limit_hit;

            if !halted {
                while tasks.len() < self.workers {
                    if self.shared.cancel.is_cancelled()
                        || self.max_pages.is_some_and(|max| dispatched >= max)
                    {
                        break;
                    }
                    let Some(request) = self.shared.frontier.pop() else {
                        break;
                    };
                    dispatched += 1;
                    tracing::trace!(
                        "Dispatching {} (priority {}, depth {})",
                        request.url,
                        request.priority,
                        request.depth
                    );
                    let url = request.url.clone();
                    let shared = Arc::clone(&self.shared);
                    let handle = tasks.spawn(shared.process(request));
                    task_urls.insert(handle.id(), url);
                }
            }

            if tasks.is_empty() {
                if limit_hit && !self.shared.frontier.is_empty() {
                    tracing::info!(
                        "Page limit reached with {} request(s) still queued",
                        self.shared.frontier.len()
                    );
                }
                return fatal;
            }

            if halted || self.shared.frontier.is_empty() {
                self.shared.transition(CrawlState::Draining);
            } else {
                self.shared.transition(CrawlState::Running);
            }

            if let Some(joined) = tasks.join_next_with_id().await {
                match joined {
                    Ok((id, ())) => {
                        task_urls.remove(&id);
                    }
                    Err(e) => self.abandon(task_urls.remove(&e.id()), e),
                }

                since_checkpoint += 1;
                if since_checkpoint >= self.checkpoint_interval {
                    since_checkpoint = 0;
                    self.log_progress();
                    if let Err(e) = self.checkpoint().await {
                        if e.is_fatal() {
                            tracing::error!("Snapshot failed, stopping: {}", e);
                            fatal.get_or_insert(e);
                        } else {
                            tracing::warn!("Snapshot failed: {}", e);
                        }
                    }
                }

                if fatal.is_none() {
                    let stats = self.shared.stats.snapshot();
                    if stats.classified() == 0
                        && stats.unclassified >= MAX_UNCLASSIFIED_WITHOUT_MATCH
                        && !self.shared.extractor.has_fallback()
                    {
                        fatal = Some(FolioError::NoRuleMatched {
                            pages: stats.unclassified,
                        });
                    }
                }
            }
        }
    }

    /// Gives a request whose worker panicked its terminal outcome
    fn abandon(&self, url: Option<NormalizedUrl>, error: JoinError) {
        let Some(url) = url else {
            tracing::error!("Worker task failed: {}", error);
            return;
        };
        tracing::error!("Worker for {} failed: {}", url, error);
        self.shared.stats.record_fetch(false, 1);
        self.shared.frontier.complete(&url);
    }

    fn log_progress(&self) {
        let stats = self.shared.stats.snapshot();
        tracing::info!(
            "Progress: {} dispatched, {} queued, {} item(s), {} failed",
            stats.dispatched,
            self.shared.frontier.len(),
            stats.items_emitted,
            stats.failed_permanently
        );
    }

    /// Persists the frontier once the sink has flushed
    ///
    /// The snapshot is taken before the flush, so every request it records
    /// as done had its items emitted before the flush began.
    async fn checkpoint(&self) -> Result<(), FolioError> {
        let snapshot = self.shared.frontier.snapshot();
        if let Err(e) = self.shared.sink.flush().await {
            tracing::warn!("Failed to flush sink: {}", e);
        }

        let mut guard = self.lock_store();
        if let Some(store) = guard.as_mut() {
            store.save_snapshot(&snapshot)?;
            tracing::debug!(
                "Saved snapshot: {} pending, {} visited",
                snapshot.pending.len(),
                snapshot.visited.len()
            );
        }
        Ok(())
    }

    fn finish_run(&self, run_id: Option<i64>, status: RunStatus) {
        let Some(run_id) = run_id else {
            return;
        };
        let mut guard = self.lock_store();
        if let Some(store) = guard.as_mut() {
            if let Err(e) = store.finish_run(run_id, status) {
                tracing::warn!("Failed to record end of run {}: {}", run_id, e);
            }
        }
    }

    fn record_summary(
        &self,
        run_id: Option<i64>,
        started_at: DateTime<Utc>,
        resumed: bool,
    ) -> CrawlSummary {
        let summary = CrawlSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            final_state: self.state().to_string(),
            config_hash: self.config_hash.clone(),
            resumed,
            stats: self.shared.stats.snapshot(),
            pending: self.shared.frontier.len(),
            visited: self.shared.frontier.visited_len(),
            host_requests: self.shared.limiter.request_counts(),
        };
        *self.summary.lock().unwrap_or_else(PoisonError::into_inner) = Some(summary.clone());
        summary
    }
}

fn mark_failed(store: &mut dyn SnapshotStore, run_id: i64) {
    if let Err(e) = store.finish_run(run_id, RunStatus::Failed) {
        tracing::warn!("Failed to mark run {} as failed: {}", run_id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::{FetchResult, FetchStatus};
    use crate::extract::{Item, LinkComponent, PageRule, Predicate};
    use crate::output::{MemorySink, SinkResult};
    use crate::storage::{FrontierSnapshot, RunRecord, SqliteStore, StorageResult};
    use crate::url::normalize;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicU32;

    /// Serves canned HTML bodies keyed by URL; unknown URLs are 404
    struct StaticFetcher {
        pages: HashMap<String, String>,
        calls: AtomicU32,
    }

    impl StaticFetcher {
        fn new(pages: &[(&str, &str)]) -> Self {
            Self {
                pages: pages
                    .iter()
                    .map(|(url, body)| (url.to_string(), body.to_string()))
                    .collect(),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Fetch for StaticFetcher {
        async fn fetch(&self, request: &Request) -> FetchResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.pages.get(request.url.as_str()) {
                Some(body) => {
                    let mut result = FetchResult::failed(request.clone(), FetchStatus::Ok, 1);
                    result.body = Some(body.clone().into_bytes());
                    result
                        .headers
                        .insert("content-type".to_string(), "text/html".to_string());
                    result
                }
                None => FetchResult::failed(request.clone(), FetchStatus::HttpError(404), 1),
            }
        }
    }

    fn seed(url: &str) -> Request {
        Request::seed(normalize(url, None).unwrap(), 0)
    }

    fn link_extractor() -> Extractor {
        Extractor::new(
            vec![PageRule::new("page", Predicate::any())
                .link(LinkComponent::new("links", "a"))
                .item_builder(|page: &crate::extract::PageView<'_>| {
                    Some(Item::new().with("url", page.url().as_str()))
                })],
            None,
        )
    }

    fn site() -> StaticFetcher {
        StaticFetcher::new(&[
            ("http://site.test/", r#"<a href="/a">a</a><a href="/b">b</a>"#),
            ("http://site.test/a", r#"<a href="/">home</a><a href="/c">c</a>"#),
            ("http://site.test/b", "<p>b</p>"),
            ("http://site.test/c", r#"<a href="/missing">gone</a>"#),
        ])
    }

    #[tokio::test]
    async fn test_crawls_site_once_per_url() {
        let fetcher = Arc::new(site());
        let sink = Arc::new(MemorySink::new());
        let coordinator = Coordinator::builder(fetcher.clone(), link_extractor(), sink.clone())
            .seed(seed("http://site.test/"))
            .workers(3)
            .build();

        let summary = coordinator.run().await.unwrap();

        assert_eq!(coordinator.state(), CrawlState::Terminated);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 5);
        assert_eq!(sink.len(), 4);
        assert_eq!(summary.stats.dispatched, 5);
        assert_eq!(summary.stats.succeeded, 4);
        assert_eq!(summary.stats.failed_permanently, 1);
        assert_eq!(summary.stats.duplicates, 1);
        assert_eq!(summary.visited, 5);
        assert_eq!(summary.pending, 0);
    }

    #[tokio::test]
    async fn test_max_pages_stops_dispatch() {
        let fetcher = Arc::new(site());
        let coordinator =
            Coordinator::builder(fetcher.clone(), link_extractor(), Arc::new(MemorySink::new()))
                .seed(seed("http://site.test/"))
                .max_pages(Some(1))
                .build();

        let summary = coordinator.run().await.unwrap();

        assert_eq!(coordinator.state(), CrawlState::Terminated);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(summary.pending, 2);
    }

    #[tokio::test]
    async fn test_max_depth_limits_crawl() {
        let fetcher = Arc::new(site());
        let coordinator =
            Coordinator::builder(fetcher.clone(), link_extractor(), Arc::new(MemorySink::new()))
                .seed(seed("http://site.test/"))
                .max_depth(Some(1))
                .build();

        coordinator.run().await.unwrap();

        // "/", "/a", "/b"; "/c" sits at depth 2
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_no_rule_matched_is_fatal() {
        let extractor = Extractor::new(
            vec![PageRule::new("book", Predicate::any().hint("book"))],
            None,
        );
        let coordinator =
            Coordinator::builder(Arc::new(site()), extractor, Arc::new(MemorySink::new()))
                .seed(seed("http://site.test/"))
                .build();

        let result = coordinator.run().await;

        assert!(matches!(result, Err(FolioError::NoRuleMatched { pages: 1 })));
        assert!(matches!(
            coordinator.state(),
            CrawlState::Stopped(StopReason::Fatal(_))
        ));
        assert_eq!(coordinator.summary().unwrap().stats.unclassified, 1);
    }

    #[tokio::test]
    async fn test_cancel_before_run_dispatches_nothing() {
        let fetcher = Arc::new(site());
        let coordinator =
            Coordinator::builder(fetcher.clone(), link_extractor(), Arc::new(MemorySink::new()))
                .seed(seed("http://site.test/"))
                .build();

        coordinator.cancel();
        let summary = coordinator.run().await.unwrap();

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(coordinator.state(), CrawlState::Stopped(StopReason::Cancelled));
        assert_eq!(summary.pending, 1);
    }

    #[tokio::test]
    async fn test_run_twice_is_rejected() {
        let coordinator =
            Coordinator::builder(Arc::new(site()), link_extractor(), Arc::new(MemorySink::new()))
                .seed(seed("http://site.test/b"))
                .build();

        coordinator.run().await.unwrap();
        assert!(matches!(
            coordinator.run().await,
            Err(FolioError::AlreadyStarted)
        ));
    }

    #[tokio::test]
    async fn test_run_records_are_written() {
        let store = SqliteStore::new_in_memory().unwrap();
        let coordinator =
            Coordinator::builder(Arc::new(site()), link_extractor(), Arc::new(MemorySink::new()))
                .seed(seed("http://site.test/"))
                .store(Box::new(store))
                .config_hash("hash-1")
                .build();

        let summary = coordinator.run().await.unwrap();
        assert_eq!(summary.run_id, Some(1));

        let guard = coordinator.lock_store();
        let store = guard.as_ref().unwrap();
        let run = store.get_latest_run().unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.config_hash, "hash-1");
        assert!(run.finished_at.is_some());

        let snapshot = store.load_snapshot().unwrap().unwrap();
        assert!(snapshot.pending.is_empty());
        assert_eq!(snapshot.visited.len(), 5);
    }

    #[tokio::test]
    async fn test_crawl_delay_is_capped() {
        let fetcher = StaticFetcher::new(&[
            ("http://site.test/robots.txt", "User-agent: *\nCrawl-delay: 86400\n"),
            ("http://site.test/b", "<p>b</p>"),
        ]);
        let coordinator =
            Coordinator::builder(Arc::new(fetcher), link_extractor(), Arc::new(MemorySink::new()))
                .seed(seed("http://site.test/b"))
                .respect_robots("FolioBot")
                .max_crawl_delay(Duration::from_millis(50))
                .build();

        let summary = coordinator.run().await.unwrap();

        assert_eq!(summary.stats.succeeded, 1);
        assert_eq!(
            coordinator.shared.limiter.min_delay("site.test"),
            Duration::from_millis(50)
        );
    }

    #[tokio::test]
    async fn test_unrepresentable_crawl_delay_is_ignored() {
        let fetcher = StaticFetcher::new(&[
            ("http://site.test/robots.txt", "User-agent: *\nCrawl-delay: 1e20\n"),
            ("http://site.test/b", "<p>b</p>"),
        ]);
        let coordinator =
            Coordinator::builder(Arc::new(fetcher), link_extractor(), Arc::new(MemorySink::new()))
                .seed(seed("http://site.test/b"))
                .respect_robots("FolioBot")
                .build();

        let summary = coordinator.run().await.unwrap();

        assert_eq!(summary.stats.dispatched, 1);
        assert_eq!(summary.stats.succeeded, 1);
        assert_eq!(summary.stats.items_emitted, 1);
        assert_eq!(coordinator.shared.limiter.min_delay("site.test"), Duration::ZERO);
    }

    struct PanickingFetcher;

    #[async_trait]
    impl Fetch for PanickingFetcher {
        async fn fetch(&self, request: &Request) -> FetchResult {
            panic!("fetcher failed on {}", request.url)
        }
    }

    #[tokio::test]
    async fn test_panicking_worker_still_completes_request() {
        let coordinator = Coordinator::builder(
            Arc::new(PanickingFetcher),
            link_extractor(),
            Arc::new(MemorySink::new()),
        )
        .seed(seed("http://site.test/"))
        .seed(seed("http://site.test/b"))
        .workers(2)
        .build();

        let summary = coordinator.run().await.unwrap();

        assert_eq!(summary.stats.dispatched, 2);
        assert_eq!(summary.stats.failed_permanently, 2);
        assert_eq!(summary.pending, 0);
        assert!(coordinator.shared.frontier.snapshot().pending.is_empty());
        assert_eq!(coordinator.state(), CrawlState::Terminated);
    }

    /// Remembers which item URLs had been emitted when the last flush ran
    #[derive(Default)]
    struct FlushTrackingSink {
        emitted: Mutex<Vec<String>>,
        flushed: Mutex<HashSet<String>>,
    }

    #[async_trait]
    impl Sink for FlushTrackingSink {
        async fn emit(&self, item: Item) -> SinkResult<()> {
            if let Some(url) = item.get("url").and_then(|v| v.as_str()) {
                self.emitted.lock().unwrap().push(url.to_string());
            }
            Ok(())
        }

        async fn flush(&self) -> SinkResult<()> {
            let emitted = self.emitted.lock().unwrap().clone();
            self.flushed.lock().unwrap().extend(emitted);
            Ok(())
        }
    }

    /// Counts saved snapshots that mark a URL done whose item was not yet flushed
    struct FlushCheckingStore {
        sink: Arc<FlushTrackingSink>,
        saves: Arc<AtomicU32>,
        unflushed: Arc<AtomicU32>,
    }

    impl SnapshotStore for FlushCheckingStore {
        fn create_run(&mut self, _config_hash: &str) -> StorageResult<i64> {
            Ok(1)
        }

        fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
            Ok(None)
        }

        fn finish_run(&mut self, _run_id: i64, _status: RunStatus) -> StorageResult<()> {
            Ok(())
        }

        fn count_runs(&self) -> StorageResult<u64> {
            Ok(1)
        }

        fn save_snapshot(&mut self, snapshot: &FrontierSnapshot) -> StorageResult<()> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            let pending: HashSet<&str> = snapshot.pending.iter().map(|r| r.url.as_str()).collect();
            let emitted = self.sink.emitted.lock().unwrap().clone();
            let flushed = self.sink.flushed.lock().unwrap().clone();
            for url in &snapshot.visited {
                if !pending.contains(url.as_str()) && emitted.contains(url) && !flushed.contains(url) {
                    self.unflushed.fetch_add(1, Ordering::SeqCst);
                }
            }
            Ok(())
        }

        fn load_snapshot(&self) -> StorageResult<Option<FrontierSnapshot>> {
            Ok(None)
        }

        fn clear_snapshot(&mut self) -> StorageResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_checkpoint_never_saves_unflushed_items() {
        let sink = Arc::new(FlushTrackingSink::default());
        let saves = Arc::new(AtomicU32::new(0));
        let unflushed = Arc::new(AtomicU32::new(0));
        let store = FlushCheckingStore {
            sink: Arc::clone(&sink),
            saves: Arc::clone(&saves),
            unflushed: Arc::clone(&unflushed),
        };

        let coordinator = Coordinator::builder(Arc::new(site()), link_extractor(), sink.clone())
            .seed(seed("http://site.test/"))
            .workers(3)
            .politeness(3, Duration::ZERO)
            .checkpoint_interval(1)
            .store(Box::new(store))
            .build();

        let summary = coordinator.run().await.unwrap();

        assert_eq!(summary.stats.items_emitted, 4);
        assert!(saves.load(Ordering::SeqCst) >= 5);
        assert_eq!(unflushed.load(Ordering::SeqCst), 0);
        assert_eq!(sink.flushed.lock().unwrap().len(), 4);
    }
}
