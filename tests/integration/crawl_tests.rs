//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and run full crawls
//! against them, including resumption from a persisted snapshot.

use async_trait::async_trait;
use folio::config::{parse_config, Config};
use folio::crawler::{Coordinator, Fetch, FetchResult, FetchStatus, HttpFetcher, Request};
use folio::extract::{Extractor, Item, PageRule, PageView, Predicate};
use folio::output::{JsonLinesSink, MemorySink, Sink};
use folio::state::{CrawlState, StopReason};
use folio::storage::{open_storage, RunStatus, SnapshotStore};
use folio::{normalize, FolioError};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::{mpsc, Semaphore};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LISTING_PAGE_1: &str = r#"
<html><head><title>All products | Books to Scrape</title></head><body>
  <ol class="row">
    <li><article class="product_pod"><h3><a href="a-light-in-the-attic_1000/index.html">A Light in the ...</a></h3></article></li>
    <li><article class="product_pod"><h3><a href="tipping-the-velvet_999/index.html">Tipping the Velvet</a></h3></article></li>
    <li><article class="product_pod"><h3><a href="soumission_998/index.html">Soumission</a></h3></article></li>
  </ol>
  <ul class="pager"><li class="current">Page 1 of 2</li><li class="next"><a href="page-2.html">next</a></li></ul>
</body></html>
"#;

const LISTING_PAGE_2: &str = r#"
<html><head><title>All products | Books to Scrape</title></head><body>
  <ol class="row"></ol>
  <ul class="pager"><li class="current">Page 2 of 2</li></ul>
</body></html>
"#;

fn book_page(title: &str) -> String {
    format!(
        r#"<html><head><title>{title} | Books to Scrape</title></head><body>
           <div class="product_main"><h1>{title}</h1><p class="price_color">£51.77</p></div>
           </body></html>"#
    )
}

/// Builds a books.toscrape-style configuration pointing at `base`
fn books_config(base: &str, crawler_extra: &str, state_path: Option<&Path>) -> Config {
    let state = state_path
        .map(|p| format!("state-path = \"{}\"", p.display()))
        .unwrap_or_default();

    parse_config(&format!(
        r#"
[crawler]
workers = 2
{crawler_extra}

[politeness]
max-concurrent-per-host = 2
min-delay-ms = 0

[fetcher]
timeout-ms = 5000
max-retries = 0

[user-agent]
crawler-name = "FolioBot"
crawler-version = "0.1.0"
contact-url = "https://example.com/bot"
contact-email = "bot@example.com"

[output]
items-path = "items.jsonl"
{state}

[[seeds]]
url = "{base}/catalogue/page-1.html"

[[page-types]]
name = "book"
[page-types.match]
hint = "book"
[[page-types.item]]
name = "url"
value = "url"
[[page-types.item]]
name = "title"
selector = ".product_main h1"
[[page-types.item]]
name = "price"
selector = ".price_color"

[[page-types]]
name = "listing"
fallback = true
[[page-types.links]]
name = "book-list"
selector = "article.product_pod h3 a"
follow-as = "book"
[[page-types.links]]
name = "pagination"
selector = ".pager .next a"
priority = 10
"#
    ))
    .expect("test config is valid")
}

fn http_fetcher(config: &Config) -> Arc<HttpFetcher> {
    Arc::new(HttpFetcher::new(&config.user_agent, &config.fetcher).unwrap())
}

async fn mount_page(server: &MockServer, page: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(page))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/html; charset=utf-8"),
        )
        .mount(server)
        .await;
}

async fn mount_books_site(server: &MockServer) {
    mount_page(server, "/catalogue/page-1.html", LISTING_PAGE_1.to_string()).await;
    mount_page(server, "/catalogue/page-2.html", LISTING_PAGE_2.to_string()).await;
    mount_page(
        server,
        "/catalogue/a-light-in-the-attic_1000/index.html",
        book_page("A Light in the Attic"),
    )
    .await;
    mount_page(
        server,
        "/catalogue/tipping-the-velvet_999/index.html",
        book_page("Tipping the Velvet"),
    )
    .await;
    mount_page(
        server,
        "/catalogue/soumission_998/index.html",
        book_page("Soumission"),
    )
    .await;
}

async fn requests_to(server: &MockServer, page: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == page)
        .count()
}

#[tokio::test]
async fn test_listing_crawl_then_resume_to_completion() {
    let server = MockServer::start().await;
    mount_books_site(&server).await;
    let dir = TempDir::new().unwrap();
    let state_path = dir.path().join("state.db");

    // One cycle: only the listing page is dispatched
    let config = books_config(&server.uri(), "max-pages = 1", Some(&state_path));
    let sink = Arc::new(MemorySink::new());
    let coordinator = Coordinator::from_config(&config, http_fetcher(&config), sink.clone())
        .unwrap()
        .store(Box::new(open_storage(&state_path).unwrap()))
        .config_hash("books")
        .build();

    let summary = coordinator.run().await.unwrap();
    assert_eq!(coordinator.state(), CrawlState::Terminated);
    assert_eq!(summary.stats.dispatched, 1);
    assert!(sink.is_empty());

    let pending = coordinator.pending();
    assert_eq!(pending.len(), 4);
    assert!(pending[0].url.as_str().ends_with("/catalogue/page-2.html"));
    assert_eq!(pending[0].priority, 10);
    assert_eq!(pending[0].page_type_hint, None);
    assert!(pending[1]
        .url
        .as_str()
        .ends_with("/catalogue/a-light-in-the-attic_1000/index.html"));
    assert!(pending[3]
        .url
        .as_str()
        .ends_with("/catalogue/soumission_998/index.html"));
    assert!(pending[1..]
        .iter()
        .all(|r| r.depth == 1 && r.page_type_hint.as_deref() == Some("book")));
    drop(coordinator);

    // Resume without the page limit and drain the frontier
    let config = books_config(&server.uri(), "", Some(&state_path));
    let sink = Arc::new(MemorySink::new());
    let coordinator = Coordinator::from_config(&config, http_fetcher(&config), sink.clone())
        .unwrap()
        .store(Box::new(open_storage(&state_path).unwrap()))
        .config_hash("books")
        .build();

    let summary = coordinator.run().await.unwrap();
    assert_eq!(coordinator.state(), CrawlState::Terminated);
    assert!(summary.resumed);
    assert_eq!(summary.stats.dispatched, 4);
    assert_eq!(summary.pending, 0);
    assert_eq!(summary.visited, 5);

    let items = sink.items();
    assert_eq!(items.len(), 3);
    let mut titles: Vec<&str> = items
        .iter()
        .filter_map(|item| item.get("title").and_then(|v| v.as_str()))
        .collect();
    titles.sort();
    assert_eq!(
        titles,
        vec!["A Light in the Attic", "Soumission", "Tipping the Velvet"]
    );
    assert!(items.iter().all(|item| item.get("price").is_some()));

    // The listing was never fetched twice across both runs
    assert_eq!(requests_to(&server, "/catalogue/page-1.html").await, 1);
    assert_eq!(requests_to(&server, "/catalogue/page-2.html").await, 1);

    let store = open_storage(&state_path).unwrap();
    assert_eq!(store.count_runs().unwrap(), 2);
    let run = store.get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.config_hash, "books");
}

#[tokio::test]
async fn test_items_written_as_json_lines() {
    let server = MockServer::start().await;
    mount_books_site(&server).await;
    let dir = TempDir::new().unwrap();
    let items_path = dir.path().join("items.jsonl");

    let config = books_config(&server.uri(), "", None);
    let sink = JsonLinesSink::create(&items_path).await.unwrap();
    let coordinator = Coordinator::from_config(&config, http_fetcher(&config), Arc::new(sink))
        .unwrap()
        .build();

    let summary = coordinator.run().await.unwrap();
    assert_eq!(summary.stats.items_emitted, 3);
    assert_eq!(summary.stats.pages_by_type.get("listing"), Some(&2));
    assert_eq!(summary.stats.pages_by_type.get("book"), Some(&3));

    let content = std::fs::read_to_string(&items_path).unwrap();
    let lines: Vec<serde_json::Value> = content
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 3);
    assert!(lines
        .iter()
        .all(|item| item["url"].as_str().unwrap().starts_with(&server.uri())));
}

#[tokio::test]
async fn test_robots_disallow_drops_requests() {
    let server = MockServer::start().await;
    mount_books_site(&server).await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("User-agent: *\nDisallow: /catalogue/soumission_998/\n"),
        )
        .mount(&server)
        .await;

    let config = books_config(&server.uri(), "", None);
    let sink = Arc::new(MemorySink::new());
    let coordinator = Coordinator::from_config(&config, http_fetcher(&config), sink.clone())
        .unwrap()
        .build();

    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.stats.robots_denied, 1);
    assert_eq!(sink.len(), 2);
    assert_eq!(
        requests_to(&server, "/catalogue/soumission_998/index.html").await,
        0
    );
    assert_eq!(requests_to(&server, "/robots.txt").await, 1);
}

#[tokio::test]
async fn test_max_depth_stops_following_links() {
    let server = MockServer::start().await;
    mount_books_site(&server).await;

    let config = books_config(&server.uri(), "max-depth = 0", None);
    let sink = Arc::new(MemorySink::new());
    let coordinator = Coordinator::from_config(&config, http_fetcher(&config), sink.clone())
        .unwrap()
        .build();

    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.stats.dispatched, 1);
    assert_eq!(summary.visited, 1);
    assert!(sink.is_empty());
}

#[tokio::test]
async fn test_corrupt_snapshot_stops_crawl() {
    let server = MockServer::start().await;
    mount_books_site(&server).await;
    let dir = TempDir::new().unwrap();
    let state_path = dir.path().join("state.db");

    let config = books_config(&server.uri(), "max-pages = 1", Some(&state_path));
    let coordinator =
        Coordinator::from_config(&config, http_fetcher(&config), Arc::new(MemorySink::new()))
            .unwrap()
            .store(Box::new(open_storage(&state_path).unwrap()))
            .build();
    coordinator.run().await.unwrap();
    drop(coordinator);

    {
        let conn = rusqlite::Connection::open(&state_path).unwrap();
        conn.execute("UPDATE frontier SET enqueued_at = 'yesterday-ish'", [])
            .unwrap();
    }

    let config = books_config(&server.uri(), "", Some(&state_path));
    let coordinator =
        Coordinator::from_config(&config, http_fetcher(&config), Arc::new(MemorySink::new()))
            .unwrap()
            .store(Box::new(open_storage(&state_path).unwrap()))
            .build();

    let result = coordinator.run().await;

    assert!(matches!(result, Err(FolioError::PersistenceCorruption(_))));
    assert!(matches!(
        coordinator.state(),
        CrawlState::Stopped(StopReason::Fatal(_))
    ));
    assert_eq!(coordinator.stats().dispatched, 0);
    assert_eq!(requests_to(&server, "/catalogue/page-1.html").await, 1);

    let store = open_storage(&state_path).unwrap();
    let run = store.get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
}

/// Fetcher that reports each start and then blocks until the test opens the gate
struct GatedFetcher {
    started: AtomicU32,
    started_tx: mpsc::UnboundedSender<String>,
    gate: Semaphore,
}

#[async_trait]
impl Fetch for GatedFetcher {
    async fn fetch(&self, request: &Request) -> FetchResult {
        self.started.fetch_add(1, Ordering::SeqCst);
        let _ = self.started_tx.send(request.url.to_string());
        let _permit = self.gate.acquire().await;

        let mut result = FetchResult::failed(request.clone(), FetchStatus::Ok, 1);
        result.body = Some(b"<html><body><h1>page</h1></body></html>".to_vec());
        result
            .headers
            .insert("content-type".to_string(), "text/html".to_string());
        result
    }
}

fn url_item(page: &PageView<'_>) -> Option<Item> {
    Some(Item::new().with("url", page.url().as_str()))
}

#[tokio::test]
async fn test_cancel_finishes_in_flight_and_leaves_queue() {
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let fetcher = Arc::new(GatedFetcher {
        started: AtomicU32::new(0),
        started_tx,
        gate: Semaphore::new(0),
    });
    let sink = Arc::new(MemorySink::new());

    let extractor = Extractor::new(
        vec![PageRule::new("page", Predicate::any()).item_builder(url_item)],
        None,
    );

    let mut builder = Coordinator::builder(fetcher.clone(), extractor, sink.clone())
        .workers(2)
        .politeness(2, std::time::Duration::ZERO);
    for i in 0..7 {
        let url = normalize(&format!("http://books.test/page-{}.html", i), None).unwrap();
        builder = builder.seed(Request::seed(url, 0));
    }
    let coordinator = Arc::new(builder.build());

    let handle = tokio::spawn({
        let coordinator = Arc::clone(&coordinator);
        async move { coordinator.run().await }
    });

    started_rx.recv().await.unwrap();
    started_rx.recv().await.unwrap();
    coordinator.cancel();
    fetcher.gate.add_permits(7);

    let summary = handle.await.unwrap().unwrap();

    assert_eq!(fetcher.started.load(Ordering::SeqCst), 2);
    assert_eq!(
        coordinator.state(),
        CrawlState::Stopped(StopReason::Cancelled)
    );
    assert_eq!(summary.stats.dispatched, 2);
    assert_eq!(summary.stats.succeeded, 2);
    assert_eq!(summary.pending, 5);
    assert_eq!(sink.len(), 2);
    assert_eq!(coordinator.pending().len(), 5);
}

/// Sink that refuses everything
struct RejectingSink;

#[async_trait]
impl Sink for RejectingSink {
    async fn emit(&self, _item: Item) -> folio::output::SinkResult<()> {
        Err(folio::output::SinkError::Rejected("read-only".to_string()))
    }
}

#[tokio::test]
async fn test_sink_errors_do_not_stop_crawl() {
    let server = MockServer::start().await;
    mount_books_site(&server).await;

    let config = books_config(&server.uri(), "", None);
    let coordinator = Coordinator::from_config(&config, http_fetcher(&config), Arc::new(RejectingSink))
        .unwrap()
        .build();

    let summary = coordinator.run().await.unwrap();

    assert_eq!(coordinator.state(), CrawlState::Terminated);
    assert_eq!(summary.stats.sink_errors, 3);
    assert_eq!(summary.stats.items_emitted, 0);
    assert_eq!(summary.stats.dispatched, 5);
}
