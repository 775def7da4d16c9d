//! Per-run crawl counters

use std::fmt;
use std::time::Duration;

/// How one crawl cycle ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Content was processed and stored
    Stored {
        /// In-scope links newly queued from this page
        links_enqueued: usize,
        /// Plugins that failed on this page
        plugin_failures: usize,
    },

    /// The fetch produced no usable content
    FetchFailed,

    /// The content matched a page seen before
    DuplicateContent,

    /// The cycle aborted (dedup or storage error)
    Failed(String),
}

/// Crawl statistics summary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlStats {
    /// URLs taken from the frontier and dispatched
    pub dispatched: u64,

    /// Pages handed to the persistence sink
    pub stored: u64,

    /// Fetches that yielded no content
    pub fetch_failures: u64,

    /// Pages discarded as duplicate content
    pub duplicate_content: u64,

    /// Individual plugin failures across all pages
    pub plugin_failures: u64,

    /// Cycles aborted by dedup or storage errors
    pub cycle_errors: u64,

    /// Links added to the frontier
    pub links_enqueued: u64,

    /// Wall-clock duration of the run
    pub elapsed: Duration,
}

impl CrawlStats {
    /// Folds one finished cycle into the counters
    pub fn record(&mut self, outcome: &CycleOutcome) {
        match outcome {
            CycleOutcome::Stored {
                links_enqueued,
                plugin_failures,
            } => {
                self.stored += 1;
                self.links_enqueued += *links_enqueued as u64;
                self.plugin_failures += *plugin_failures as u64;
            }
            CycleOutcome::FetchFailed => self.fetch_failures += 1,
            CycleOutcome::DuplicateContent => self.duplicate_content += 1,
            CycleOutcome::Failed(_) => self.cycle_errors += 1,
        }
    }

    /// Cycles that have finished, whatever their outcome
    pub fn completed(&self) -> u64 {
        self.stored + self.fetch_failures + self.duplicate_content + self.cycle_errors
    }

    /// Completed cycles per second
    pub fn pages_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.completed() as f64 / secs
        } else {
            0.0
        }
    }
}

impl fmt::Display for CrawlStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Crawl Statistics")?;
        writeln!(f, "================")?;
        writeln!(f, "Dispatched:         {}", self.dispatched)?;
        writeln!(f, "Stored:             {}", self.stored)?;
        writeln!(f, "Fetch failures:     {}", self.fetch_failures)?;
        writeln!(f, "Duplicate content:  {}", self.duplicate_content)?;
        writeln!(f, "Plugin failures:    {}", self.plugin_failures)?;
        writeln!(f, "Cycle errors:       {}", self.cycle_errors)?;
        writeln!(f, "Links enqueued:     {}", self.links_enqueued)?;
        write!(
            f,
            "Elapsed:            {:.2?} ({:.2} pages/sec)",
            self.elapsed,
            self.pages_per_second()
        )
    }
}
