//! Tidepool main entry point
//!
//! This is the command-line interface for the Tidepool scoped crawler.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tidepool::config::{load_config_with_hash, Config};
use tidepool::crawler::{crawl_with_retries, CrawlOptions};
use tracing_subscriber::EnvFilter;

/// Delay between whole-run retries
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Tidepool: a scoped web crawler
///
/// Tidepool crawls every page reachable from a start URL without leaving its
/// domain, fetching each URL once and skipping duplicate content. Progress is
/// saved under the data directory so an interrupted crawl picks up where it
/// stopped.
#[derive(Parser, Debug)]
#[command(name = "tidepool")]
#[command(version)]
#[command(about = "A scoped web crawler", long_about = None)]
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

    /// Start a fresh crawl, discarding this project's saved queue
    #[arg(long)]
    fresh: bool,

    /// Validate config and print the effective settings without crawling
    #[arg(long)]
    dry_run: bool,

    /// Times to re-run a failed crawl
    #[arg(long, default_value_t = 3)]
    retries: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        return handle_dry_run(&config);
    }

    let options = CrawlOptions {
        fresh: cli.fresh,
        config_hash,
    };

    if options.fresh {
        tracing::info!("Starting fresh crawl (ignoring saved frontier)");
    } else {
        tracing::info!("Starting crawl (will resume from saved frontier)");
    }

    let stats = crawl_with_retries(&config, &options, cli.retries, RETRY_DELAY)
        .await
        .context("crawl failed")?;

    println!("{}", stats);
    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("tidepool=info,warn"),
            1 => EnvFilter::new("tidepool=debug,info"),
            2 => EnvFilter::new("tidepool=trace,debug"),
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

/// Handles the --dry-run mode: prints the effective configuration
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== Tidepool Dry Run ===\n");

    println!("Start URL:    {}", config.crawler.start_url);
    println!("Domain:       {}", config.domain());
    println!("Project dir:  {}", config.project_dir().display());
    println!();

    let effective = toml::to_string_pretty(config).context("failed to render configuration")?;
    println!("{}", effective);

    println!("✓ Configuration is valid");
    Ok(())
}
