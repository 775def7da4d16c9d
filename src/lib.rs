//! Tidepool: a scoped web crawler
//!
//! This crate crawls every page reachable from a start URL inside one domain,
//! never fetching a URL twice and never processing near-identical content twice.
//! Fetched pages flow through an ordered plugin pipeline before being persisted.

pub mod config;
pub mod crawler;
pub mod dedup;
pub mod plugin;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Tidepool operations
#[derive(Debug, Error)]
pub enum TidepoolError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("Dedup error: {0}")]
    Dedup(#[from] dedup::DedupError),

    #[error("Dedup backing store unavailable: {0}")]
    DedupUnavailable(String),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Crawl task failed: {0}")]
    Task(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid environment override {name}: {message}")]
    InvalidOverride { name: String, message: String },
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,
}

/// Result type alias for Tidepool operations
pub type Result<T> = std::result::Result<T, TidepoolError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Coordinator, CrawlStats};
pub use dedup::{fingerprint, Deduplicator, Fingerprint};
pub use plugin::{Plugin, PluginPipeline};
pub use crate::url::{extract_domain, normalize_url, registered_domain};
