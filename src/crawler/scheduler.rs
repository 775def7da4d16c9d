//! Frontier management and dispatch pacing
//!
//! This module handles:
//! - The FIFO queue of URLs waiting to be fetched
//! - The visited set, kept disjoint from the queue
//! - Global concurrency limiting via a semaphore
//! - The minimum delay between successive dispatches

use crate::storage::FrontierSnapshot;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

/// Pending URLs plus the set of URLs already dispatched
///
/// A URL is never both pending and visited. Popping a URL moves it to the
/// visited set in the same step, so the decision to fetch it is made once.
#[derive(Debug, Default)]
pub struct Frontier {
    queue: VecDeque<String>,
    queued: HashSet<String>,
    visited: HashSet<String>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a frontier from persisted lists
    ///
    /// Pending entries that are also visited are dropped.
    pub fn from_snapshot(snapshot: FrontierSnapshot) -> Self {
        let mut frontier = Self {
            visited: snapshot.visited.into_iter().collect(),
            ..Self::default()
        };
        for url in snapshot.pending {
            frontier.push(url);
        }
        frontier
    }

    /// Queues `url` unless it is empty, already queued, or visited
    ///
    /// Returns true if the URL was added.
    pub fn push(&mut self, url: String) -> bool {
        if url.is_empty() || self.visited.contains(&url) || self.queued.contains(&url) {
            return false;
        }
        self.queued.insert(url.clone());
        self.queue.push_back(url);
        true
    }

    /// Takes the oldest pending URL and marks it visited
    pub fn pop_next(&mut self) -> Option<String> {
        while let Some(url) = self.queue.pop_front() {
            self.queued.remove(&url);
            if self.visited.insert(url.clone()) {
                return Some(url);
            }
        }
        None
    }

    pub fn is_visited(&self, url: &str) -> bool {
        self.visited.contains(url)
    }

    pub fn is_queued(&self, url: &str) -> bool {
        self.queued.contains(url)
    }

    pub fn pending_len(&self) -> usize {
        self.queue.len()
    }

    pub fn visited_len(&self) -> usize {
        self.visited.len()
    }

    /// Returns whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Pending URLs in queue order
    pub fn pending(&self) -> Vec<String> {
        self.queue.iter().cloned().collect()
    }

    /// Visited URLs, sorted
    pub fn visited(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.visited.iter().cloned().collect();
        urls.sort();
        urls
    }

    pub fn snapshot(&self) -> FrontierSnapshot {
        FrontierSnapshot {
            pending: self.pending(),
            visited: self.visited(),
        }
    }
}

/// Single shared gate spacing out fetch dispatches
///
/// Every caller of [`RateLimiter::acquire`] waits until at least the
/// configured interval has passed since the previous caller was let through.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Waits for this caller's dispatch slot
    pub async fn acquire(&self) {
        let mut last = self.last.lock().await;

        if let Some(previous) = *last {
            let ready_at = previous + self.interval;
            if Instant::now() < ready_at {
                tracing::trace!("Rate limiter waiting {:?}", ready_at - Instant::now());
                tokio::time::sleep_until(ready_at).await;
            }
        }

        *last = Some(Instant::now());
    }
}

/// Bound on concurrent fetches
#[derive(Debug, Clone)]
pub struct FetchPermits {
    semaphore: Arc<Semaphore>,
    limit: usize,
}

impl FetchPermits {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Waits for a free fetch slot
    ///
    /// Returns None only if the semaphore was closed.
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        self.semaphore.clone().acquire_owned().await.ok()
    }
}
