//! Two-tier deduplication for URLs and page content
//!
//! Every membership test first consults an in-memory Bloom filter and then the
//! authoritative [`DedupStore`]. A key absent from both is recorded in both
//! before the call returns, and the check-and-record happens under one lock so
//! concurrent crawl tasks can never both see the same key as new.
//!
//! Content is keyed by its 256-bit [`Fingerprint`]. With a non-zero
//! similarity threshold, a page whose fingerprint lies within that Hamming
//! distance of an earlier page is also reported as a duplicate.
//!
//! The crawl loop reserves content with [`Deduplicator::claim_content`] and
//! only commits the claim once the page has been stored. An uncommitted claim
//! never reaches the store, so a page that failed to persist is fetched and
//! processed again by the next run.

mod bloom;
mod fingerprint;
mod sqlite;
mod store;

pub use bloom::BloomFilter;
pub use fingerprint::{fingerprint, Fingerprint, FINGERPRINT_BITS};
pub use sqlite::SqliteDedupStore;
pub use store::{DedupStore, MemoryDedupStore};

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

/// Store key prefix for URL records
pub const URL_PREFIX: &str = "url:";

/// Store key prefix for content fingerprint records
pub const CONTENT_PREFIX: &str = "content:";

/// Errors raised by the dedup layer
#[derive(Debug, Error)]
pub enum DedupError {
    #[error("Dedup store unavailable: {0}")]
    Unavailable(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Dedup state lock poisoned")]
    Poisoned,
}

/// Result type for dedup operations
pub type DedupResult<T> = Result<T, DedupError>;

/// Tuning knobs for the [`Deduplicator`]
#[derive(Debug, Clone)]
pub struct DedupOptions {
    /// Number of keys each Bloom filter is sized for
    pub expected_items: usize,

    /// Target false-positive rate of the Bloom filters
    pub error_rate: f64,

    /// Maximum Hamming distance at which two fingerprints count as the same
    /// content; 0 means exact match only
    pub similarity_threshold: u32,

    /// Keys per store round-trip during bootstrap
    pub batch_size: usize,
}

impl Default for DedupOptions {
    fn default() -> Self {
        Self {
            expected_items: 1_000_000,
            error_rate: 0.01,
            similarity_threshold: 0,
            batch_size: 1000,
        }
    }
}

/// Outcome of seeding the dedup layers from a previous run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    /// Distinct URLs offered for seeding
    pub offered: usize,

    /// URLs that were missing from the store and got written
    pub written: usize,

    /// Store round-trips used
    pub batches: usize,
}

struct DedupState {
    urls: BloomFilter,
    contents: BloomFilter,
    // Only populated when near-duplicate matching is enabled.
    known_fingerprints: Vec<Fingerprint>,
    // Claimed by an in-flight page, not yet committed.
    claimed: HashSet<Fingerprint>,
    store: Box<dyn DedupStore>,
}

impl DedupState {
    fn seen_content(&self, key: &str, fp: &Fingerprint, threshold: u32) -> DedupResult<bool> {
        if self.claimed.contains(fp)
            || self.contents.contains(key.as_bytes())
            || self.store.exists(key)?
        {
            return Ok(true);
        }

        if threshold == 0 {
            return Ok(false);
        }

        Ok(self
            .known_fingerprints
            .iter()
            .chain(self.claimed.iter())
            .any(|known| known.hamming_distance(fp) <= threshold))
    }
}

/// Owner of both dedup layers
pub struct Deduplicator {
    state: Mutex<DedupState>,
    options: DedupOptions,
}

impl Deduplicator {
    /// Creates a deduplicator over `store`
    ///
    /// The store is pinged first: running with only the Bloom layer would
    /// suppress pages with no way to correct it across restarts, so an
    /// unreachable store is an error.
    pub fn new(store: Box<dyn DedupStore>, options: DedupOptions) -> DedupResult<Self> {
        store
            .ping()
            .map_err(|e| DedupError::Unavailable(e.to_string()))?;

        let state = DedupState {
            urls: BloomFilter::with_rate(options.expected_items, options.error_rate),
            contents: BloomFilter::with_rate(options.expected_items, options.error_rate),
            known_fingerprints: Vec::new(),
            claimed: HashSet::new(),
            store,
        };
        tracing::debug!(
            "Dedup Bloom filters sized at {} bits with {} hashes each",
            state.urls.bit_count(),
            state.urls.hash_count()
        );

        Ok(Self {
            state: Mutex::new(state),
            options,
        })
    }

    /// Creates a deduplicator backed by a fresh [`MemoryDedupStore`]
    pub fn in_memory(options: DedupOptions) -> Self {
        let state = DedupState {
            urls: BloomFilter::with_rate(options.expected_items, options.error_rate),
            contents: BloomFilter::with_rate(options.expected_items, options.error_rate),
            known_fingerprints: Vec::new(),
            claimed: HashSet::new(),
            store: Box::new(MemoryDedupStore::new()),
        };

        Self {
            state: Mutex::new(state),
            options,
        }
    }

    pub fn options(&self) -> &DedupOptions {
        &self.options
    }

    /// Returns true if `normalized_url` was seen before; records it otherwise
    pub fn is_duplicate_url(&self, normalized_url: &str) -> DedupResult<bool> {
        let key = format!("{}{}", URL_PREFIX, normalized_url);
        let mut guard = self.lock()?;
        let state = &mut *guard;

        if state.urls.contains(key.as_bytes()) || state.store.exists(&key)? {
            return Ok(true);
        }

        state.store.set(&key, "1")?;
        state.urls.insert(key.as_bytes());
        Ok(false)
    }

    /// Fingerprints `text` and applies [`Self::is_duplicate_fingerprint`]
    pub fn is_duplicate_content(&self, text: &str) -> DedupResult<bool> {
        self.is_duplicate_fingerprint(fingerprint(text))
    }

    /// Returns true if `fp` (or, with a similarity threshold, a fingerprint
    /// close to it) was seen before; records it otherwise
    pub fn is_duplicate_fingerprint(&self, fp: Fingerprint) -> DedupResult<bool> {
        match self.claim_fingerprint(fp)? {
            Some(claim) => {
                claim.commit()?;
                Ok(false)
            }
            None => Ok(true),
        }
    }

    /// Reserves the fingerprint of `text` unless that content was seen before
    ///
    /// Returns None for duplicate content. While the returned claim is alive,
    /// the same content is reported as a duplicate to every other caller.
    pub fn claim_content(&self, text: &str) -> DedupResult<Option<ContentClaim<'_>>> {
        self.claim_fingerprint(fingerprint(text))
    }

    fn claim_fingerprint(&self, fp: Fingerprint) -> DedupResult<Option<ContentClaim<'_>>> {
        let key = content_key(&fp);
        let mut guard = self.lock()?;

        if guard.seen_content(&key, &fp, self.options.similarity_threshold)? {
            return Ok(None);
        }

        guard.claimed.insert(fp);
        Ok(Some(ContentClaim {
            dedup: self,
            fp,
            settled: false,
        }))
    }

    fn commit_content(&self, fp: &Fingerprint) -> DedupResult<()> {
        let key = content_key(fp);
        let mut guard = self.lock()?;
        let state = &mut *guard;

        state.claimed.remove(fp);
        state.store.set(&key, "1")?;
        state.contents.insert(key.as_bytes());
        if self.options.similarity_threshold > 0 {
            state.known_fingerprints.push(*fp);
        }
        Ok(())
    }

    fn release_content(&self, fp: &Fingerprint) {
        match self.lock() {
            Ok(mut state) => {
                state.claimed.remove(fp);
            }
            Err(e) => tracing::warn!("Could not release content claim {}: {}", fp, e),
        }
    }

    /// Every URL the store has recorded, sorted
    pub fn known_urls(&self) -> DedupResult<Vec<String>> {
        let keys = self.lock()?.store.scan_prefix(URL_PREFIX)?;
        let mut urls: Vec<String> = keys
            .into_iter()
            .filter_map(|key| key.strip_prefix(URL_PREFIX).map(str::to_string))
            .collect();
        urls.sort();
        Ok(urls)
    }

    /// Seeds both layers with URLs visited by earlier runs
    ///
    /// URLs are checked against the store in batches of
    /// [`DedupOptions::batch_size`]; only the missing ones are written.
    pub fn bootstrap<I, S>(&self, existing_urls: I) -> DedupResult<BootstrapReport>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut keys: Vec<String> = existing_urls
            .into_iter()
            .map(|u| u.as_ref().trim().to_string())
            .filter(|u| !u.is_empty())
            .map(|u| format!("{}{}", URL_PREFIX, u))
            .collect();
        keys.sort();
        keys.dedup();

        let mut report = BootstrapReport {
            offered: keys.len(),
            ..Default::default()
        };

        for batch in keys.chunks(self.options.batch_size.max(1)) {
            let mut guard = self.lock()?;
            let state = &mut *guard;

            let present = state.store.batch_exists(batch)?;
            let missing: Vec<String> = batch
                .iter()
                .zip(present)
                .filter(|(_, exists)| !exists)
                .map(|(key, _)| key.clone())
                .collect();

            if !missing.is_empty() {
                state.store.set_batch(&missing)?;
            }
            for key in batch {
                state.urls.insert(key.as_bytes());
            }

            report.written += missing.len();
            report.batches += 1;
        }

        tracing::info!(
            "Dedup bootstrap: {} URLs offered, {} written in {} batches",
            report.offered,
            report.written,
            report.batches
        );

        Ok(report)
    }

    /// Loads every key already in the store into the Bloom filters
    ///
    /// Returns the number of keys loaded.
    pub fn warm_from_store(&self) -> DedupResult<usize> {
        let mut guard = self.lock()?;
        let state = &mut *guard;

        let url_keys = state.store.scan_prefix(URL_PREFIX)?;
        for key in &url_keys {
            state.urls.insert(key.as_bytes());
        }

        let content_keys = state.store.scan_prefix(CONTENT_PREFIX)?;
        for key in &content_keys {
            state.contents.insert(key.as_bytes());
            if self.options.similarity_threshold > 0 {
                match key[CONTENT_PREFIX.len()..].parse::<Fingerprint>() {
                    Ok(fp) => state.known_fingerprints.push(fp),
                    Err(e) => tracing::warn!("Skipping malformed content key {}: {}", key, e),
                }
            }
        }

        tracing::debug!(
            "Warmed dedup filters with {} URL and {} content keys",
            url_keys.len(),
            content_keys.len()
        );

        Ok(url_keys.len() + content_keys.len())
    }

    fn lock(&self) -> DedupResult<MutexGuard<'_, DedupState>> {
        self.state.lock().map_err(|_| DedupError::Poisoned)
    }
}

fn content_key(fp: &Fingerprint) -> String {
    format!("{}{}", CONTENT_PREFIX, fp)
}

/// Content reserved by [`Deduplicator::claim_content`]
///
/// Dropping the claim without committing releases the reservation.
pub struct ContentClaim<'a> {
    dedup: &'a Deduplicator,
    fp: Fingerprint,
    settled: bool,
}

impl ContentClaim<'_> {
    /// Records the content in both layers
    pub fn commit(mut self) -> DedupResult<()> {
        self.settled = true;
        self.dedup.commit_content(&self.fp)
    }
}

impl Drop for ContentClaim<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.dedup.release_content(&self.fp);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn small_options() -> DedupOptions {
        DedupOptions {
            expected_items: 1000,
            ..Default::default()
        }
    }

    struct UnreachableStore;

    impl DedupStore for UnreachableStore {
        fn ping(&self) -> DedupResult<()> {
            Err(DedupError::Unavailable("connection refused".to_string()))
        }
        fn exists(&self, _key: &str) -> DedupResult<bool> {
            Err(DedupError::Unavailable("connection refused".to_string()))
        }
        fn set(&mut self, _key: &str, _value: &str) -> DedupResult<()> {
            Err(DedupError::Unavailable("connection refused".to_string()))
        }
        fn batch_exists(&self, _keys: &[String]) -> DedupResult<Vec<bool>> {
            Err(DedupError::Unavailable("connection refused".to_string()))
        }
        fn scan_prefix(&self, _prefix: &str) -> DedupResult<Vec<String>> {
            Err(DedupError::Unavailable("connection refused".to_string()))
        }
    }

    #[test]
    fn test_first_sighting_is_not_duplicate() {
        let dedup = Deduplicator::in_memory(small_options());
        assert!(!dedup.is_duplicate_url("http://a.com/x").unwrap());
        assert!(dedup.is_duplicate_url("http://a.com/x").unwrap());
        assert!(!dedup.is_duplicate_url("http://a.com/y").unwrap());
    }

    #[test]
    fn test_store_hit_is_duplicate_without_bloom() {
        let mut store = MemoryDedupStore::new();
        store.set("url:http://a.com/old", "1").unwrap();

        let dedup = Deduplicator::new(Box::new(store), small_options()).unwrap();
        assert!(dedup.is_duplicate_url("http://a.com/old").unwrap());
    }

    #[test]
    fn test_duplicate_content() {
        let dedup = Deduplicator::in_memory(small_options());
        assert!(!dedup.is_duplicate_content("same words here").unwrap());
        assert!(dedup.is_duplicate_content("same  words\nhere").unwrap());
        assert!(!dedup.is_duplicate_content("entirely different page").unwrap());
    }

    #[test]
    fn test_claim_blocks_content_until_released() {
        let dedup = Deduplicator::in_memory(small_options());

        let claim = dedup.claim_content("page body").unwrap().expect("new content");
        assert!(dedup.claim_content("page body").unwrap().is_none());
        assert!(dedup.is_duplicate_content("page body").unwrap());

        drop(claim);
        let claim = dedup.claim_content("page body").unwrap().expect("released");
        claim.commit().unwrap();
        assert!(dedup.claim_content("page body").unwrap().is_none());
    }

    #[test]
    fn test_uncommitted_claim_never_reaches_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("dedup.db");

        {
            let dedup = Deduplicator::new(
                Box::new(SqliteDedupStore::open(&path).unwrap()),
                small_options(),
            )
            .unwrap();
            let _abandoned = dedup.claim_content("unsaved page").unwrap().expect("new");
            dedup
                .claim_content("saved page")
                .unwrap()
                .expect("new")
                .commit()
                .unwrap();
        }

        let reopened = Deduplicator::new(
            Box::new(SqliteDedupStore::open(&path).unwrap()),
            small_options(),
        )
        .unwrap();
        assert_eq!(reopened.warm_from_store().unwrap(), 1);
        assert!(!reopened.is_duplicate_content("unsaved page").unwrap());
        assert!(reopened.is_duplicate_content("saved page").unwrap());
    }

    #[test]
    fn test_known_urls_strips_prefix() {
        let dedup = Deduplicator::in_memory(small_options());
        dedup.is_duplicate_url("http://a.com/2").unwrap();
        dedup.is_duplicate_url("http://a.com/1").unwrap();
        dedup.is_duplicate_content("not a url").unwrap();

        assert_eq!(
            dedup.known_urls().unwrap(),
            vec!["http://a.com/1", "http://a.com/2"]
        );
    }

    #[test]
    fn test_url_and_content_namespaces_are_separate() {
        let dedup = Deduplicator::in_memory(small_options());
        let fp = fingerprint("x");
        assert!(!dedup.is_duplicate_url(&fp.to_hex()).unwrap());
        assert!(!dedup.is_duplicate_fingerprint(fp).unwrap());
    }

    #[test]
    fn test_near_duplicate_threshold() {
        let base: String = (0..300).map(|i| format!("token{} ", i)).collect();
        let edited = format!("{} appended extra words here", base);

        let exact = Deduplicator::in_memory(small_options());
        assert!(!exact.is_duplicate_content(&base).unwrap());
        assert!(!exact.is_duplicate_content(&edited).unwrap());

        let fuzzy = Deduplicator::in_memory(DedupOptions {
            similarity_threshold: 40,
            ..small_options()
        });
        assert!(!fuzzy.is_duplicate_content(&base).unwrap());
        assert!(fuzzy.is_duplicate_content(&edited).unwrap());
    }

    #[test]
    fn test_unreachable_store_is_fatal() {
        let result = Deduplicator::new(Box::new(UnreachableStore), small_options());
        assert!(matches!(result, Err(DedupError::Unavailable(_))));
    }

    #[test]
    fn test_bootstrap_batches_and_writes_missing() {
        let mut store = MemoryDedupStore::new();
        store.set("url:http://a.com/0", "1").unwrap();

        let dedup = Deduplicator::new(
            Box::new(store),
            DedupOptions {
                batch_size: 2,
                ..small_options()
            },
        )
        .unwrap();

        let urls: Vec<String> = (0..5).map(|i| format!("http://a.com/{}", i)).collect();
        let report = dedup.bootstrap(&urls).unwrap();

        assert_eq!(report.offered, 5);
        assert_eq!(report.written, 4);
        assert_eq!(report.batches, 3);
        for url in &urls {
            assert!(dedup.is_duplicate_url(url).unwrap());
        }
    }

    #[test]
    fn test_bootstrap_is_idempotent() {
        let dedup = Deduplicator::in_memory(small_options());
        let urls = ["http://a.com/1", "http://a.com/1", " ", "http://a.com/2"];

        let first = dedup.bootstrap(urls).unwrap();
        let second = dedup.bootstrap(urls).unwrap();

        assert_eq!(first.offered, 2);
        assert_eq!(first.written, 2);
        assert_eq!(second.written, 0);
    }

    #[test]
    fn test_warm_from_store_loads_fingerprints() {
        let fp = fingerprint("remembered page");
        let mut store = MemoryDedupStore::new();
        store.set(&format!("content:{}", fp), "1").unwrap();
        store.set("url:http://a.com/", "1").unwrap();

        let dedup = Deduplicator::new(
            Box::new(store),
            DedupOptions {
                similarity_threshold: 3,
                ..small_options()
            },
        )
        .unwrap();

        assert_eq!(dedup.warm_from_store().unwrap(), 2);
        assert!(dedup.is_duplicate_fingerprint(fp).unwrap());
    }

    #[test]
    fn test_concurrent_checks_admit_once() {
        let dedup = Arc::new(Deduplicator::in_memory(small_options()));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let dedup = Arc::clone(&dedup);
                std::thread::spawn(move || dedup.is_duplicate_url("http://a.com/race").unwrap())
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|dup| !dup)
            .count();
        assert_eq!(admitted, 1);
    }
}
