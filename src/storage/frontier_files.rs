//! Per-project frontier persistence
//!
//! Each project directory under the data directory holds two newline-delimited
//! files: `queue.txt` with URLs still waiting to be fetched and `crawled.txt`
//! with URLs already dispatched. Both are rewritten whole through a temporary
//! file and a rename, so a crash never leaves a half-written list behind.

use crate::storage::StorageResult;
use std::collections::BTreeSet;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const QUEUE_FILE: &str = "queue.txt";
const CRAWLED_FILE: &str = "crawled.txt";

/// Pending and visited URLs as persisted between runs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrontierSnapshot {
    /// URLs still to fetch, in queue order
    pub pending: Vec<String>,

    /// URLs already dispatched
    pub visited: Vec<String>,
}

impl FrontierSnapshot {
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.visited.is_empty()
    }
}

/// Queue and crawled lists for one project
#[derive(Debug, Clone)]
pub struct FrontierFiles {
    project_dir: PathBuf,
}

impl FrontierFiles {
    /// Opens the project directory `<data_dir>/<project>`, creating it and
    /// empty list files if missing
    pub fn create_project(data_dir: &Path, project: &str) -> StorageResult<Self> {
        let project_dir = data_dir.join(project);
        fs::create_dir_all(&project_dir)?;

        let files = Self { project_dir };
        for path in [files.queue_path(), files.crawled_path()] {
            if !path.exists() {
                tracing::debug!("Creating {}", path.display());
                fs::write(&path, "")?;
            }
        }

        Ok(files)
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn queue_path(&self) -> PathBuf {
        self.project_dir.join(QUEUE_FILE)
    }

    pub fn crawled_path(&self) -> PathBuf {
        self.project_dir.join(CRAWLED_FILE)
    }

    /// Reads both lists
    ///
    /// Blank lines are skipped and repeated URLs keep their first position.
    pub fn load(&self) -> StorageResult<FrontierSnapshot> {
        Ok(FrontierSnapshot {
            pending: read_url_list(&self.queue_path())?,
            visited: read_url_list(&self.crawled_path())?,
        })
    }

    /// Replaces both lists with `snapshot`
    pub fn save(&self, snapshot: &FrontierSnapshot) -> StorageResult<()> {
        write_url_list(&self.queue_path(), &snapshot.pending)?;
        write_url_list(&self.crawled_path(), &snapshot.visited)?;
        tracing::debug!(
            "Saved frontier: {} pending, {} crawled",
            snapshot.pending.len(),
            snapshot.visited.len()
        );
        Ok(())
    }

    /// Empties both lists
    pub fn clear(&self) -> StorageResult<()> {
        self.save(&FrontierSnapshot::default())
    }
}

/// Collects the crawled URLs of every project under `data_dir`
///
/// A missing data directory yields an empty set.
pub fn all_crawled_urls(data_dir: &Path) -> StorageResult<BTreeSet<String>> {
    let mut urls = BTreeSet::new();

    if !data_dir.is_dir() {
        return Ok(urls);
    }

    for entry in fs::read_dir(data_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }

        let crawled = entry.path().join(CRAWLED_FILE);
        if crawled.is_file() {
            let before = urls.len();
            urls.extend(read_url_list(&crawled)?);
            tracing::debug!(
                "Loaded {} crawled URLs from {}",
                urls.len() - before,
                crawled.display()
            );
        }
    }

    Ok(urls)
}

fn read_url_list(path: &Path) -> StorageResult<Vec<String>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let contents = fs::read_to_string(path)?;
    let mut seen = BTreeSet::new();
    let urls = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| seen.insert(line.to_string()))
        .map(str::to_string)
        .collect();

    Ok(urls)
}

fn write_url_list(path: &Path, urls: &[String]) -> StorageResult<()> {
    let tmp = path.with_extension("txt.tmp");

    {
        let mut writer = BufWriter::new(fs::File::create(&tmp)?);
        for url in urls {
            writeln!(writer, "{}", url)?;
        }
        writer.flush()?;
    }

    fs::rename(&tmp, path)?;
    Ok(())
}
