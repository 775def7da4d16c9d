//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the main crawl loop that coordinates all aspects of
//! the crawling process, including:
//! - Owning the frontier and visited set
//! - Pacing dispatches and bounding concurrent fetches
//! - Running each URL through fetch, content dedup, plugins and storage
//! - Feeding newly discovered in-scope links back into the frontier
//! - Periodically persisting the frontier so a crawl can resume

use crate::config::Config;
use crate::crawler::fetcher::{build_http_client, fetch_url, FetchResult};
use crate::crawler::parser::extract_links;
use crate::crawler::scheduler::{FetchPermits, Frontier, RateLimiter};
use crate::crawler::stats::{CrawlStats, CycleOutcome};
use crate::dedup::Deduplicator;
use crate::plugin::PluginPipeline;
use crate::storage::{FrontierFiles, FrontierSnapshot, PageSink};
use crate::url::try_normalize_url;
use crate::TidepoolError;
use reqwest::Client;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::task::{JoinError, JoinSet};

/// Everything a crawl task needs, shared between the loop and its tasks
struct CrawlContext {
    client: Client,
    dedup: Arc<Deduplicator>,
    pipeline: PluginPipeline,
    sink: Arc<dyn PageSink>,
    domain: String,
    frontier: Mutex<Frontier>,
    permits: FetchPermits,
}

impl CrawlContext {
    fn frontier(&self) -> MutexGuard<'_, Frontier> {
        // Frontier operations cannot leave it half-updated, so a poisoned
        // lock still guards consistent data.
        self.frontier.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Main crawler coordinator structure
pub struct Coordinator {
    ctx: Arc<CrawlContext>,
    rate_limiter: RateLimiter,
    frontier_files: Option<FrontierFiles>,
    persist_every: u64,
}

impl Coordinator {
    /// Creates a coordinator whose frontier holds only the start URL
    pub fn new(
        config: &Config,
        dedup: Arc<Deduplicator>,
        pipeline: PluginPipeline,
        sink: Arc<dyn PageSink>,
    ) -> Result<Self, TidepoolError> {
        Self::resume(config, dedup, pipeline, sink, FrontierSnapshot::default())
    }

    /// Creates a coordinator continuing from a persisted frontier
    ///
    /// The start URL is queued only if it is neither pending nor visited in
    /// `snapshot`.
    pub fn resume(
        config: &Config,
        dedup: Arc<Deduplicator>,
        pipeline: PluginPipeline,
        sink: Arc<dyn PageSink>,
        snapshot: FrontierSnapshot,
    ) -> Result<Self, TidepoolError> {
        let start_url = try_normalize_url(&config.crawler.start_url)?.to_string();

        if !snapshot.is_empty() {
            tracing::info!(
                "Resuming with {} pending and {} visited URLs",
                snapshot.pending.len(),
                snapshot.visited.len()
            );
        }

        let mut frontier = Frontier::from_snapshot(snapshot);
        if frontier.push(start_url.clone()) {
            tracing::info!("Seeded frontier with {}", start_url);
        }

        let client = build_http_client(&config.fetch)?;

        let ctx = CrawlContext {
            client,
            dedup,
            pipeline,
            sink,
            domain: config.domain().to_string(),
            frontier: Mutex::new(frontier),
            permits: FetchPermits::new(config.crawler.max_concurrency as usize),
        };

        Ok(Self {
            ctx: Arc::new(ctx),
            rate_limiter: RateLimiter::new(config.crawler.rate_limit_interval()),
            frontier_files: None,
            persist_every: u64::from(config.crawler.persist_every.max(1)),
        })
    }

    /// Saves the frontier to `files` during and after [`Self::run`]
    pub fn persist_to(mut self, files: FrontierFiles) -> Self {
        self.frontier_files = Some(files);
        self
    }

    /// Pending URLs in queue order
    pub fn frontier_snapshot(&self) -> Vec<String> {
        self.ctx.frontier().pending()
    }

    /// Visited URLs, sorted
    pub fn visited_snapshot(&self) -> Vec<String> {
        self.ctx.frontier().visited()
    }

    /// Runs the main crawl loop until the frontier is exhausted
    ///
    /// URLs are dispatched in FIFO order, no faster than the rate limit, to at
    /// most `max_concurrency` concurrent tasks. The loop ends once the
    /// frontier is empty and no task is outstanding.
    pub async fn run(&mut self) -> Result<CrawlStats, TidepoolError> {
        tracing::info!(
            "Starting crawl of {} with up to {} concurrent fetches, {:?} between dispatches",
            self.ctx.domain,
            self.ctx.permits.limit(),
            self.rate_limiter.interval()
        );

        let start_time = Instant::now();
        let mut stats = CrawlStats::default();
        let mut tasks: JoinSet<CycleOutcome> = JoinSet::new();

        loop {
            while tasks.len() >= self.ctx.permits.limit() {
                if let Some(joined) = tasks.join_next().await {
                    self.finish_cycle(joined, &mut stats, start_time)?;
                }
            }

            let next = self.ctx.frontier().pop_next();

            match next {
                Some(url) => {
                    self.rate_limiter.acquire().await;
                    stats.dispatched += 1;
                    tracing::debug!("Dispatching {}", url);
                    tasks.spawn(process_url(Arc::clone(&self.ctx), url));
                }
                None => match tasks.join_next().await {
                    Some(joined) => self.finish_cycle(joined, &mut stats, start_time)?,
                    None => {
                        tracing::info!("Frontier is empty, crawl complete");
                        break;
                    }
                },
            }
        }

        self.persist()?;

        stats.elapsed = start_time.elapsed();
        tracing::info!(
            "Crawl completed: {} pages stored, {} dispatched in {:?}",
            stats.stored,
            stats.dispatched,
            stats.elapsed
        );

        Ok(stats)
    }

    /// Processes exactly one URL from the frontier, inline
    ///
    /// Returns None when the frontier is empty.
    pub async fn run_once(&mut self) -> Option<CycleOutcome> {
        let url = self.ctx.frontier().pop_next()?;
        self.rate_limiter.acquire().await;
        Some(process_url(Arc::clone(&self.ctx), url).await)
    }

    fn finish_cycle(
        &self,
        joined: Result<CycleOutcome, JoinError>,
        stats: &mut CrawlStats,
        start_time: Instant,
    ) -> Result<(), TidepoolError> {
        match joined {
            Ok(outcome) => stats.record(&outcome),
            Err(e) => {
                tracing::error!("Crawl task aborted: {}", e);
                stats.record(&CycleOutcome::Failed(e.to_string()));
            }
        }

        let completed = stats.completed();

        // Progress reporting every 10 pages
        if completed % 10 == 0 {
            let rate = completed as f64 / start_time.elapsed().as_secs_f64().max(f64::EPSILON);
            let frontier = self.ctx.frontier();
            tracing::info!(
                "Progress: {} pages processed, {} stored, {} in frontier, {} visited, {:.2} pages/sec",
                completed,
                stats.stored,
                frontier.pending_len(),
                frontier.visited_len(),
                rate
            );
        }

        if completed % self.persist_every == 0 {
            self.persist()?;
        }

        Ok(())
    }

    fn persist(&self) -> Result<(), TidepoolError> {
        if let Some(files) = &self.frontier_files {
            let snapshot = self.ctx.frontier().snapshot();
            files.save(&snapshot)?;
        }
        Ok(())
    }
}

/// One crawl cycle for a URL that has already been marked visited
///
/// Everything after the pipeline runs without yielding, so a cancelled cycle
/// either records nothing durable or records the page's content together with
/// its outgoing links.
async fn process_url(ctx: Arc<CrawlContext>, url: String) -> CycleOutcome {
    let fetched = {
        let _permit = ctx.permits.acquire().await;
        tracing::trace!("{} fetch permits left", ctx.permits.available());
        fetch_url(&ctx.client, &url).await
    };

    let (final_url, body) = match fetched {
        FetchResult::Success {
            final_url, body, ..
        } => (final_url, body),
        _ => return CycleOutcome::FetchFailed,
    };

    let claim = match ctx.dedup.claim_content(&body) {
        Ok(Some(claim)) => claim,
        Ok(None) => {
            tracing::debug!("Duplicate content at {}", url);
            return CycleOutcome::DuplicateContent;
        }
        Err(e) => {
            tracing::error!("Content dedup failed for {}: {}", url, e);
            return CycleOutcome::Failed(e.to_string());
        }
    };

    let outcome = ctx.pipeline.run(&url, body.clone()).await;

    // A dropped claim leaves the content unrecorded for the next attempt.
    if let Err(e) = ctx.sink.store(&url, &outcome.content) {
        tracing::error!("Storing {} failed: {}", url, e);
        return CycleOutcome::Failed(e.to_string());
    }

    let links = extract_links(&final_url, &body, &ctx.domain);
    let mut links_enqueued = 0;

    for link in links {
        {
            let frontier = ctx.frontier();
            if frontier.is_visited(&link) || frontier.is_queued(&link) {
                continue;
            }
        }

        match ctx.dedup.is_duplicate_url(&link) {
            Ok(true) => continue,
            Ok(false) => {
                if ctx.frontier().push(link) {
                    links_enqueued += 1;
                }
            }
            Err(e) => {
                tracing::error!("URL dedup failed while expanding {}: {}", url, e);
                return CycleOutcome::Failed(e.to_string());
            }
        }
    }

    if let Err(e) = claim.commit() {
        tracing::error!("Recording content of {} failed: {}", url, e);
        return CycleOutcome::Failed(e.to_string());
    }

    tracing::debug!("Processed {}: {} new links", url, links_enqueued);

    CycleOutcome::Stored {
        links_enqueued,
        plugin_failures: outcome.failures.len(),
    }
}
