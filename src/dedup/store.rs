//! Authoritative dedup store trait and the in-memory implementation

use crate::dedup::DedupResult;
use std::collections::HashMap;

/// Durable key/value capability backing dedup decisions
///
/// The store is the source of truth: it survives restarts and is what the
/// probabilistic layer is rebuilt from. Implementations are driven only by
/// [`Deduplicator`](crate::dedup::Deduplicator), which serializes access.
pub trait DedupStore: Send {
    /// Verifies the store is reachable
    fn ping(&self) -> DedupResult<()>;

    /// Returns true if `key` has been recorded
    fn exists(&self, key: &str) -> DedupResult<bool>;

    /// Records `key` with `value`, overwriting any previous value
    fn set(&mut self, key: &str, value: &str) -> DedupResult<()>;

    /// Checks many keys in one round-trip; results are in input order
    fn batch_exists(&self, keys: &[String]) -> DedupResult<Vec<bool>>;

    /// Returns every recorded key starting with `prefix`
    fn scan_prefix(&self, prefix: &str) -> DedupResult<Vec<String>>;

    /// Records many keys with the marker value in one round-trip
    fn set_batch(&mut self, keys: &[String]) -> DedupResult<()> {
        for key in keys {
            self.set(key, "1")?;
        }
        Ok(())
    }
}

/// Map-backed store for tests and throwaway crawls
#[derive(Debug, Default)]
pub struct MemoryDedupStore {
    entries: HashMap<String, String>,
}

impl MemoryDedupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl DedupStore for MemoryDedupStore {
    fn ping(&self) -> DedupResult<()> {
        Ok(())
    }

    fn exists(&self, key: &str) -> DedupResult<bool> {
        Ok(self.entries.contains_key(key))
    }

    fn set(&mut self, key: &str, value: &str) -> DedupResult<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn batch_exists(&self, keys: &[String]) -> DedupResult<Vec<bool>> {
        Ok(keys.iter().map(|k| self.entries.contains_key(k)).collect())
    }

    fn scan_prefix(&self, prefix: &str) -> DedupResult<Vec<String>> {
        let mut keys: Vec<String> = self
            .entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}
