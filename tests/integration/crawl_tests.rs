//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test
//! the full crawl cycle end-to-end.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tidepool::config::Config;
use tidepool::crawler::{crawl, open_deduplicator, CrawlOptions, CycleOutcome};
use tidepool::dedup::{DedupError, DedupOptions, DedupResult, DedupStore, Deduplicator};
use tidepool::plugin::{Plugin, PluginError, PluginPipeline, PluginResult};
use tidepool::storage::{
    FrontierFiles, FrontierSnapshot, MemoryPageSink, PageSink, StorageError, StorageResult,
};
use tidepool::Coordinator;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration crawling the mock server with no pacing
fn create_test_config(base_url: &str) -> Config {
    let mut config = Config::new(format!("{}/", base_url));
    config.crawler.rate_limit = 0.0;
    config.crawler.max_concurrency = 4;
    config.fetch.timeout = 5;
    config
}

/// Points every on-disk path of `config` into `dir`
fn use_temp_paths(config: &mut Config, dir: &TempDir) {
    config.dedup.database_path = dir.path().join("dedup.db");
    config.output.data_dir = dir.path().join("Data");
    config.output.database_path = dir.path().join("pages.db");
}

fn test_dedup() -> Arc<Deduplicator> {
    Arc::new(Deduplicator::in_memory(DedupOptions {
        expected_items: 10_000,
        ..Default::default()
    }))
}

async fn mount_html(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/html; charset=utf-8"),
        )
        .mount(server)
        .await;
}

async fn mount_html_expect(server: &MockServer, route: &str, body: String, calls: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/html"),
        )
        .expect(calls)
        .mount(server)
        .await;
}

fn page(title: &str, links: &[&str]) -> String {
    let anchors: String = links
        .iter()
        .map(|href| format!(r#"<a href="{}">{}</a>"#, href, href))
        .collect();
    format!(
        "<html><head><title>{}</title></head><body><p>{} body text</p>{}</body></html>",
        title, title, anchors
    )
}

#[tokio::test]
async fn test_one_cycle_end_to_end() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_html(
        &server,
        "/",
        page("Home", &["/a", "b/", "https://other.com/x", "mailto:me@example.com"]),
    )
    .await;

    let sink = Arc::new(MemoryPageSink::new());
    let mut coordinator = Coordinator::new(
        &create_test_config(&base),
        test_dedup(),
        PluginPipeline::new(),
        sink.clone(),
    )
    .expect("Failed to create coordinator");

    let outcome = coordinator.run_once().await.expect("frontier had the start URL");

    assert_eq!(
        outcome,
        CycleOutcome::Stored {
            links_enqueued: 2,
            plugin_failures: 0
        }
    );
    assert_eq!(
        coordinator.frontier_snapshot(),
        vec![format!("{}/a", base), format!("{}/b", base)]
    );
    assert_eq!(coordinator.visited_snapshot(), vec![format!("{}/", base)]);
    assert_eq!(sink.calls().len(), 1);
    assert_eq!(sink.stored_urls(), vec![format!("{}/", base)]);
}

#[tokio::test]
async fn test_full_crawl_single_domain() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_html(&server, "/", page("Home", &["/page1", "/page2"])).await;
    mount_html(&server, "/page1", page("Page 1", &["/", "/page2"])).await;
    mount_html(&server, "/page2", page("Page 2", &["/data.json", "/missing"])).await;

    Mock::given(method("GET"))
        .and(path("/data.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("{}")
                .insert_header("content-type", "application/json"),
        )
        .mount(&server)
        .await;

    let sink = Arc::new(MemoryPageSink::new());
    let mut coordinator = Coordinator::new(
        &create_test_config(&base),
        test_dedup(),
        PluginPipeline::new(),
        sink.clone(),
    )
    .unwrap();

    let stats = coordinator.run().await.expect("Crawl failed");

    assert_eq!(stats.dispatched, 5);
    assert_eq!(stats.stored, 3);
    assert_eq!(stats.fetch_failures, 2);
    assert_eq!(stats.cycle_errors, 0);
    assert!(coordinator.frontier_snapshot().is_empty());
    assert_eq!(coordinator.visited_snapshot().len(), 5);

    let mut stored = sink.stored_urls();
    stored.sort();
    assert_eq!(
        stored,
        vec![
            format!("{}/", base),
            format!("{}/page1", base),
            format!("{}/page2", base),
        ]
    );
}

#[tokio::test]
async fn test_duplicate_content_is_not_stored() {
    let server = MockServer::start().await;
    let base = server.uri();

    let same = page("Mirror", &[]);
    mount_html(&server, "/", page("Home", &["/a", "/b"])).await;
    mount_html(&server, "/a", same.clone()).await;
    mount_html(&server, "/b", same).await;

    let sink = Arc::new(MemoryPageSink::new());
    let mut coordinator = Coordinator::new(
        &create_test_config(&base),
        test_dedup(),
        PluginPipeline::new(),
        sink.clone(),
    )
    .unwrap();

    let stats = coordinator.run().await.unwrap();

    assert_eq!(stats.dispatched, 3);
    assert_eq!(stats.stored, 2);
    assert_eq!(stats.duplicate_content, 1);
    assert_eq!(sink.calls().len(), 2);
    assert_eq!(coordinator.visited_snapshot().len(), 3);
}

#[tokio::test]
async fn test_shared_link_fetched_once() {
    let server = MockServer::start().await;
    let base = server.uri();

    let hubs: Vec<String> = (0..8).map(|i| format!("/hub{}", i)).collect();
    let hub_refs: Vec<&str> = hubs.iter().map(String::as_str).collect();
    mount_html(&server, "/", page("Home", &hub_refs)).await;

    for hub in &hubs {
        mount_html(&server, hub, page(hub, &["/shared", "/shared/", "/"])).await;
    }

    mount_html_expect(&server, "/shared", page("Shared", &hub_refs), 1).await;

    let sink = Arc::new(MemoryPageSink::new());
    let mut coordinator = Coordinator::new(
        &create_test_config(&base),
        test_dedup(),
        PluginPipeline::new(),
        sink.clone(),
    )
    .unwrap();

    let stats = coordinator.run().await.unwrap();

    assert_eq!(stats.dispatched, 10);
    assert_eq!(stats.stored, 10);

    let mut stored = sink.stored_urls();
    let total = stored.len();
    stored.dedup();
    assert_eq!(stored.len(), total);
}

struct Marker(&'static str);

#[async_trait]
impl Plugin for Marker {
    fn name(&self) -> &str {
        self.0
    }

    async fn process(&self, _url: &str, content: String) -> PluginResult<String> {
        Ok(format!("{}[{}]", content, self.0))
    }
}

struct Broken;

#[async_trait]
impl Plugin for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    async fn process(&self, _url: &str, _content: String) -> PluginResult<String> {
        Err(PluginError::Failed("cannot process".to_string()))
    }
}

#[tokio::test]
async fn test_plugins_run_in_order_and_failures_are_isolated() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_html(&server, "/", page("Home", &[])).await;

    let pipeline = PluginPipeline::new()
        .with(Arc::new(Marker("A")))
        .with(Arc::new(Broken))
        .with(Arc::new(Marker("C")));

    let sink = Arc::new(MemoryPageSink::new());
    let mut coordinator =
        Coordinator::new(&create_test_config(&base), test_dedup(), pipeline, sink.clone()).unwrap();

    let stats = coordinator.run().await.unwrap();

    assert_eq!(stats.stored, 1);
    assert_eq!(stats.plugin_failures, 1);

    let stored = sink.content(&format!("{}/", base)).unwrap();
    assert!(stored.ends_with("[A][C]"), "got {}", stored);
}

/// Store that answers pings but fails every lookup
struct FlakyStore;

impl DedupStore for FlakyStore {
    fn ping(&self) -> DedupResult<()> {
        Ok(())
    }

    fn exists(&self, _key: &str) -> DedupResult<bool> {
        Err(DedupError::Unavailable("connection reset".to_string()))
    }

    fn set(&mut self, _key: &str, _value: &str) -> DedupResult<()> {
        Err(DedupError::Unavailable("connection reset".to_string()))
    }

    fn batch_exists(&self, _keys: &[String]) -> DedupResult<Vec<bool>> {
        Err(DedupError::Unavailable("connection reset".to_string()))
    }

    fn scan_prefix(&self, _prefix: &str) -> DedupResult<Vec<String>> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_dedup_failure_fails_only_that_cycle() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_html(&server, "/", page("Home", &["/a"])).await;

    let dedup = Arc::new(
        Deduplicator::new(Box::new(FlakyStore), DedupOptions::default())
            .expect("ping succeeds"),
    );
    let sink = Arc::new(MemoryPageSink::new());
    let mut coordinator = Coordinator::new(
        &create_test_config(&base),
        dedup,
        PluginPipeline::new(),
        sink.clone(),
    )
    .unwrap();

    let stats = coordinator.run().await.expect("the run itself survives");

    assert_eq!(stats.dispatched, 1);
    assert_eq!(stats.cycle_errors, 1);
    assert_eq!(stats.stored, 0);
    assert!(sink.calls().is_empty());
}

#[tokio::test]
async fn test_bootstrap_marks_previous_urls_as_duplicates() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();

    let mut config = create_test_config(&base);
    use_temp_paths(&mut config, &dir);

    let previous: Vec<String> = ["/old1", "/old2", "/old3"]
        .iter()
        .map(|p| format!("{}{}", base, p))
        .collect();

    let earlier = FrontierFiles::create_project(&config.output.data_dir, "earlier").unwrap();
    earlier
        .save(&FrontierSnapshot {
            pending: vec![],
            visited: previous.clone(),
        })
        .unwrap();

    let dedup = open_deduplicator(&config).unwrap();
    for url in &previous {
        assert!(dedup.is_duplicate_url(url).unwrap(), "{} should be known", url);
    }
    drop(dedup);

    mount_html(&server, "/", page("Home", &["/old1", "/old2", "/old3", "/new"])).await;
    for old in ["/old1", "/old2", "/old3"] {
        mount_html_expect(&server, old, page(old, &[]), 0).await;
    }
    mount_html_expect(&server, "/new", page("New", &[]), 1).await;

    let stats = crawl(&config, &CrawlOptions::default()).await.unwrap();

    assert_eq!(stats.dispatched, 2);
    assert_eq!(stats.stored, 2);

    let files = FrontierFiles::create_project(&config.output.data_dir, config.project()).unwrap();
    let saved = files.load().unwrap();
    assert!(saved.pending.is_empty());
    assert_eq!(saved.visited, vec![format!("{}/", base), format!("{}/new", base)]);
}

#[tokio::test]
async fn test_second_run_resumes_without_refetching() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();

    let mut config = create_test_config(&base);
    use_temp_paths(&mut config, &dir);

    mount_html_expect(&server, "/", page("Home", &["/a"]), 1).await;
    mount_html_expect(&server, "/a", page("A", &[]), 1).await;

    let first = crawl(&config, &CrawlOptions::default()).await.unwrap();
    assert_eq!(first.stored, 2);

    let second = crawl(&config, &CrawlOptions::default()).await.unwrap();
    assert_eq!(second.dispatched, 0);
}

#[tokio::test]
async fn test_interrupted_run_leaves_discovered_links_fetchable() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();

    let mut config = create_test_config(&base);
    use_temp_paths(&mut config, &dir);

    mount_html(&server, "/", page("Home", &["/slow"])).await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(page("Slow", &[]))
                .insert_header("content-type", "text/html")
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    // Abandon the run while /slow is still in flight.
    let interrupted = tokio::time::timeout(
        Duration::from_millis(1000),
        crawl(&config, &CrawlOptions::default()),
    )
    .await;
    assert!(interrupted.is_err());

    let resumed = crawl(&config, &CrawlOptions::default()).await.unwrap();

    assert_eq!(resumed.dispatched, 2);
    assert_eq!(resumed.duplicate_content, 1);
    assert_eq!(resumed.stored, 1);

    let files = FrontierFiles::create_project(&config.output.data_dir, config.project()).unwrap();
    let saved = files.load().unwrap();
    assert!(saved.visited.contains(&format!("{}/slow", base)));
}

/// Sink whose first write fails
struct FailsOnceSink {
    failed: AtomicBool,
    inner: MemoryPageSink,
}

impl PageSink for FailsOnceSink {
    fn store(&self, url: &str, content: &str) -> StorageResult<()> {
        if !self.failed.swap(true, Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )));
        }
        self.inner.store(url, content)
    }
}

#[tokio::test]
async fn test_failed_store_does_not_mark_content_seen() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_html_expect(&server, "/", page("Home", &["/a"]), 2).await;

    let config = create_test_config(&base);
    let dedup = test_dedup();

    let failing = Arc::new(FailsOnceSink {
        failed: AtomicBool::new(false),
        inner: MemoryPageSink::new(),
    });
    let mut first =
        Coordinator::new(&config, dedup.clone(), PluginPipeline::new(), failing.clone()).unwrap();
    let outcome = first.run_once().await.unwrap();
    assert!(matches!(outcome, CycleOutcome::Failed(_)));
    assert!(first.frontier_snapshot().is_empty());

    let sink = Arc::new(MemoryPageSink::new());
    let mut second = Coordinator::new(&config, dedup, PluginPipeline::new(), sink.clone()).unwrap();
    let outcome = second.run_once().await.unwrap();

    assert_eq!(
        outcome,
        CycleOutcome::Stored {
            links_enqueued: 1,
            plugin_failures: 0
        }
    );
    assert_eq!(sink.stored_urls(), vec![format!("{}/", base)]);
}

#[tokio::test]
async fn test_resume_continues_pending_queue() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_html_expect(&server, "/", page("Home", &[]), 0).await;
    mount_html_expect(&server, "/left", page("Left", &[]), 1).await;

    let sink = Arc::new(MemoryPageSink::new());
    let mut coordinator = Coordinator::resume(
        &create_test_config(&base),
        test_dedup(),
        PluginPipeline::new(),
        sink.clone(),
        FrontierSnapshot {
            pending: vec![format!("{}/left", base)],
            visited: vec![format!("{}/", base)],
        },
    )
    .unwrap();

    let stats = coordinator.run().await.unwrap();
    assert_eq!(stats.dispatched, 1);
    assert_eq!(sink.stored_urls(), vec![format!("{}/left", base)]);
}

#[test]
fn test_page_sink_is_object_safe() {
    let sink: Arc<dyn PageSink> = Arc::new(MemoryPageSink::new());
    sink.store("http://a.com/", "x").unwrap();
}
