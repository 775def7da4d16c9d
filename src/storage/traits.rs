//! Storage traits and error types
//!
//! This module defines the persistence sink interface that crawled pages are
//! handed to, and the errors storage backends report.

use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Storage lock poisoned")]
    Poisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Destination for processed page content
///
/// `store` is an idempotent upsert keyed by the normalized URL: storing the
/// same URL again is a no-op. Implementations are shared across crawl tasks.
pub trait PageSink: Send + Sync {
    /// Persists `content` for `url`
    fn store(&self, url: &str, content: &str) -> StorageResult<()>;
}
