//! Storage module for persisting crawl output
//!
//! This module handles everything the crawler writes to disk:
//! - The page sink that processed content is handed to
//! - Crawl run tracking in the page database
//! - Per-project frontier files used to resume a crawl

mod frontier_files;
mod memory;
mod schema;
mod sqlite;
mod traits;

pub use frontier_files::{all_crawled_urls, FrontierFiles, FrontierSnapshot};
pub use memory::MemoryPageSink;
pub use sqlite::SqlitePageSink;
pub use traits::{PageSink, StorageError, StorageResult};

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
    pub pages_stored: u64,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
