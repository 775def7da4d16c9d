use crate::storage::traits::{PageSink, StorageError, StorageResult};
use std::sync::Mutex;

/// Page sink that keeps every `store` call in memory
///
/// Repeated stores of a URL are recorded as calls but do not overwrite the
/// first content, matching the upsert semantics of the SQLite sink.
#[derive(Debug, Default)]
pub struct MemoryPageSink {
    calls: Mutex<Vec<(String, String)>>,
}

impl MemoryPageSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(url, content)` pair passed to `store`, in call order
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// URLs stored so far, first occurrence only
    pub fn stored_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = Vec::new();
        for (url, _) in self.calls() {
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
        urls
    }

    /// Content first stored for `url`
    pub fn content(&self, url: &str) -> Option<String> {
        self.calls()
            .into_iter()
            .find(|(u, _)| u == url)
            .map(|(_, content)| content)
    }
}

impl PageSink for MemoryPageSink {
    fn store(&self, url: &str, content: &str) -> StorageResult<()> {
        self.calls
            .lock()
            .map_err(|_| StorageError::Poisoned)?
            .push((url.to_string(), content.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_calls() {
        let sink = MemoryPageSink::new();
        sink.store("a", "1").unwrap();
        sink.store("b", "2").unwrap();
        sink.store("a", "3").unwrap();

        assert_eq!(sink.calls().len(), 3);
        assert_eq!(sink.stored_urls(), vec!["a", "b"]);
        assert_eq!(sink.content("a"), Some("1".to_string()));
    }
}
