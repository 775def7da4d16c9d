//! Configuration module for Tidepool
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files, with `CRAWLER_*` environment overrides applied on top.
//!
//! # Example
//!
//! ```no_run
//! use tidepool::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! println!("Crawler will stay inside: {}", config.domain());
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, CrawlerConfig, DedupConfig, FetchConfig, OutputConfig, PluginsConfig,
};

// Re-export parser functions
pub use parser::{
    apply_overrides, compute_config_hash, load_config, load_config_with_hash, parse_config,
    ENV_MAX_CONCURRENCY, ENV_RATE_LIMIT, ENV_START_URL, ENV_TIMEOUT, ENV_USER_AGENT,
};
pub use validation::validate;
