//! Crawler module for web page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching
//! - HTML parsing and link extraction
//! - Frontier management and rate limiting
//! - Overall crawl coordination

mod coordinator;
mod fetcher;
mod parser;
mod scheduler;
mod stats;

pub use coordinator::Coordinator;
pub use fetcher::{build_http_client, fetch_url, FetchResult};
pub use parser::{extract_links, extract_title};
pub use scheduler::{FetchPermits, Frontier, RateLimiter};
pub use stats::{CrawlStats, CycleOutcome};

use crate::config::{Config, PluginsConfig};
use crate::dedup::{DedupError, Deduplicator, SqliteDedupStore};
use crate::plugin::{PluginPipeline, TitleLoggerPlugin};
use crate::storage::{
    all_crawled_urls, FrontierFiles, FrontierSnapshot, RunStatus, SqlitePageSink,
};
use crate::url::matches_domain;
use crate::TidepoolError;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Options that apply to a whole crawl run
#[derive(Debug, Clone, Default)]
pub struct CrawlOptions {
    /// Discard the project's persisted queue and crawled lists first
    pub fresh: bool,

    /// Hash of the configuration file, recorded with the run
    pub config_hash: String,
}

/// Builds the plugin pipeline enabled by `config`
pub fn build_pipeline(config: &PluginsConfig) -> PluginPipeline {
    let mut pipeline = PluginPipeline::new();
    if config.title_logger {
        pipeline.register(Arc::new(TitleLoggerPlugin::new()));
    }
    pipeline
}

/// Opens the durable dedup store and seeds it from earlier runs
///
/// Fails with [`TidepoolError::DedupUnavailable`] when the store cannot be
/// reached.
pub fn open_deduplicator(config: &Config) -> Result<Deduplicator, TidepoolError> {
    let path = &config.dedup.database_path;
    ensure_parent_dir(path)?;

    let store = SqliteDedupStore::open(path).map_err(unavailable)?;
    let dedup = Deduplicator::new(Box::new(store), config.dedup.options()).map_err(unavailable)?;

    let warmed = dedup.warm_from_store()?;
    tracing::info!("Loaded {} dedup keys from {}", warmed, path.display());

    let crawled = all_crawled_urls(&config.output.data_dir)?;
    dedup.bootstrap(&crawled)?;

    Ok(dedup)
}

/// Runs a complete crawl operation
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Open the dedup store and bootstrap it from every project's crawled list
/// 2. Load (or, with `fresh`, clear) this project's frontier files
/// 3. Requeue in-scope URLs the dedup store admitted but no run finished
/// 4. Open the page database and record a new run
/// 5. Crawl until the frontier is exhausted
/// 6. Mark the run completed or failed
///
/// # Example
///
/// ```no_run
/// use tidepool::config::load_config;
/// use tidepool::crawler::{crawl, CrawlOptions};
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("config.toml"))?;
/// let stats = crawl(&config, &CrawlOptions::default()).await?;
/// println!("{}", stats);
/// # Ok(())
/// # }
/// ```
pub async fn crawl(config: &Config, options: &CrawlOptions) -> Result<CrawlStats, TidepoolError> {
    let dedup = Arc::new(open_deduplicator(config)?);
    let crawled = all_crawled_urls(&config.output.data_dir)?;

    let files = FrontierFiles::create_project(&config.output.data_dir, config.project())?;
    if options.fresh {
        tracing::info!("Fresh crawl: clearing {}", files.project_dir().display());
        files.clear()?;
    }
    let mut snapshot = files.load()?;
    requeue_unfinished(&dedup, config.domain(), &crawled, &mut snapshot)?;

    let sink = Arc::new(SqlitePageSink::open(&config.output.database_path)?);
    let run_id = sink.create_run(&options.config_hash)?;

    let result = match Coordinator::resume(
        config,
        dedup,
        build_pipeline(&config.plugins),
        sink.clone(),
        snapshot,
    ) {
        Ok(coordinator) => {
            let mut coordinator = coordinator.persist_to(files);
            coordinator.run().await
        }
        Err(e) => Err(e),
    };

    match &result {
        Ok(stats) => sink.finish_run(run_id, RunStatus::Completed, stats.stored)?,
        Err(e) => {
            tracing::error!("Crawl run {} failed: {}", run_id, e);
            sink.finish_run(run_id, RunStatus::Failed, 0)?;
        }
    }

    let run = sink.get_run(run_id)?;
    tracing::info!(
        "Run {} {} ({} pages stored, {} in database, started {}, finished {})",
        run.id,
        run.status.to_db_string(),
        run.pages_stored,
        sink.count_pages()?,
        run.started_at,
        run.finished_at.as_deref().unwrap_or("-")
    );

    result
}

/// Appends to `snapshot.pending` every in-scope URL the dedup store has
/// admitted that is neither listed in `snapshot` nor crawled by any project
///
/// Links are recorded as seen when discovered, while the frontier files are
/// only saved periodically, so a run that stops between saves leaves admitted
/// URLs in neither list.
fn requeue_unfinished(
    dedup: &Deduplicator,
    domain: &str,
    crawled: &BTreeSet<String>,
    snapshot: &mut FrontierSnapshot,
) -> Result<usize, TidepoolError> {
    let listed: HashSet<&str> = snapshot
        .pending
        .iter()
        .chain(snapshot.visited.iter())
        .map(String::as_str)
        .collect();

    let unfinished: Vec<String> = dedup
        .known_urls()?
        .into_iter()
        .filter(|url| matches_domain(url, domain))
        .filter(|url| !crawled.contains(url) && !listed.contains(url.as_str()))
        .collect();

    if !unfinished.is_empty() {
        tracing::info!(
            "Requeueing {} URLs admitted by an unfinished run",
            unfinished.len()
        );
    }

    let count = unfinished.len();
    snapshot.pending.extend(unfinished);
    Ok(count)
}

/// Runs [`crawl`], re-invoking the whole run up to `retries` more times
///
/// Retries resume from the persisted frontier rather than starting fresh.
pub async fn crawl_with_retries(
    config: &Config,
    options: &CrawlOptions,
    retries: u32,
    delay: Duration,
) -> Result<CrawlStats, TidepoolError> {
    let mut options = options.clone();
    let mut attempt = 0;

    loop {
        match crawl(config, &options).await {
            Ok(stats) => return Ok(stats),
            Err(e) if attempt < retries => {
                attempt += 1;
                tracing::warn!(
                    "Crawl failed ({}), retry {}/{} in {:?}",
                    e,
                    attempt,
                    retries,
                    delay
                );
                options.fresh = false;
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

fn unavailable(e: DedupError) -> TidepoolError {
    TidepoolError::DedupUnavailable(e.to_string())
}

fn ensure_parent_dir(path: &Path) -> Result<(), TidepoolError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
