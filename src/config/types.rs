use crate::dedup::DedupOptions;
use crate::url::{canonical_host, registered_domain};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Tidepool
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub plugins: PluginsConfig,
}

impl Config {
    /// Builds a configuration with every default except the start URL
    pub fn new(start_url: impl Into<String>) -> Self {
        let mut config = Self {
            crawler: CrawlerConfig {
                start_url: start_url.into(),
                domain: None,
                project: None,
                rate_limit: default_rate_limit(),
                max_concurrency: default_max_concurrency(),
                persist_every: default_persist_every(),
            },
            fetch: FetchConfig::default(),
            dedup: DedupConfig::default(),
            output: OutputConfig::default(),
            plugins: PluginsConfig::default(),
        };
        config.fill_derived();
        config
    }

    /// Derives `domain` from the start URL and `project` from the domain when
    /// either is unset
    ///
    /// A configured domain is kept as written apart from case, so a subdomain
    /// scope stays a subdomain scope.
    pub fn fill_derived(&mut self) {
        match &mut self.crawler.domain {
            Some(domain) => *domain = canonical_host(domain),
            None => {
                self.crawler.domain = url::Url::parse(&self.crawler.start_url)
                    .ok()
                    .and_then(|u| registered_domain(&u));
            }
        }

        if self.crawler.project.is_none() {
            self.crawler.project = self.crawler.domain.clone();
        }
    }

    /// Crawl boundary; links on this host or its subdomains are in scope
    pub fn domain(&self) -> &str {
        self.crawler.domain.as_deref().unwrap_or_default()
    }

    /// Name of the project directory under the data directory
    pub fn project(&self) -> &str {
        self.crawler.project.as_deref().unwrap_or_default()
    }

    pub fn project_dir(&self) -> PathBuf {
        self.output.data_dir.join(self.project())
    }
}

/// Crawl scope and pacing
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// URL the crawl begins at
    pub start_url: String,

    /// Domain links must stay within, subdomains included; derived from the
    /// registered domain of `start_url`
    #[serde(default)]
    pub domain: Option<String>,

    /// Project directory name; derived from `domain`
    #[serde(default)]
    pub project: Option<String>,

    /// Minimum seconds between successive fetch dispatches
    #[serde(default = "default_rate_limit")]
    pub rate_limit: f64,

    /// Maximum number of concurrent fetches
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: u32,

    /// Completed cycles between frontier file saves
    #[serde(default = "default_persist_every")]
    pub persist_every: u32,
}

impl CrawlerConfig {
    pub fn rate_limit_interval(&self) -> Duration {
        Duration::from_secs_f64(self.rate_limit.max(0.0))
    }
}

/// HTTP client settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct FetchConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout: default_timeout(),
        }
    }
}

impl FetchConfig {
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

/// Deduplication settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct DedupConfig {
    /// Path to the authoritative dedup store
    #[serde(default = "default_dedup_path")]
    pub database_path: PathBuf,

    #[serde(default = "default_expected_items")]
    pub expected_items: usize,

    /// Bloom filter false-positive rate, in (0, 1)
    #[serde(default = "default_error_rate")]
    pub error_rate: f64,

    /// Maximum fingerprint Hamming distance treated as duplicate content
    #[serde(default)]
    pub similarity_threshold: u32,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            database_path: default_dedup_path(),
            expected_items: default_expected_items(),
            error_rate: default_error_rate(),
            similarity_threshold: 0,
            batch_size: default_batch_size(),
        }
    }
}

impl DedupConfig {
    pub fn options(&self) -> DedupOptions {
        DedupOptions {
            expected_items: self.expected_items,
            error_rate: self.error_rate,
            similarity_threshold: self.similarity_threshold,
            batch_size: self.batch_size,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Directory holding one subdirectory per project
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Path to the SQLite page database
    #[serde(default = "default_pages_path")]
    pub database_path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database_path: default_pages_path(),
        }
    }
}

/// Which bundled plugins are registered
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PluginsConfig {
    #[serde(default = "default_true")]
    pub title_logger: bool,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self { title_logger: true }
    }
}

fn default_rate_limit() -> f64 {
    1.0
}

fn default_max_concurrency() -> u32 {
    10
}

fn default_persist_every() -> u32 {
    10
}

fn default_user_agent() -> String {
    "Tidepool/0.1".to_string()
}

fn default_timeout() -> u64 {
    10
}

fn default_dedup_path() -> PathBuf {
    PathBuf::from("./Data/dedup.db")
}

fn default_expected_items() -> usize {
    1_000_000
}

fn default_error_rate() -> f64 {
    0.01
}

fn default_batch_size() -> usize {
    1000
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./Data")
}

fn default_pages_path() -> PathBuf {
    PathBuf::from("./Data/pages.db")
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_derives_domain_and_project() {
        let config = Config::new("https://blog.example.com/start");
        assert_eq!(config.domain(), "example.com");
        assert_eq!(config.project(), "example.com");
        assert_eq!(config.crawler.max_concurrency, 10);
        assert_eq!(config.fetch.user_agent, "Tidepool/0.1");
    }

    #[test]
    fn test_explicit_domain_is_kept() {
        let mut config = Config::new("https://docs.example.com/");
        config.crawler.domain = Some("Docs.Example.com.".to_string());
        config.crawler.project = Some("site".to_string());
        config.fill_derived();

        assert_eq!(config.domain(), "docs.example.com");
        assert_eq!(config.project(), "site");
        assert_eq!(config.project_dir(), PathBuf::from("./Data/site"));
    }

    #[test]
    fn test_derived_domain_respects_public_suffix() {
        let config = Config::new("https://www.bbc.co.uk/");
        assert_eq!(config.domain(), "bbc.co.uk");
        assert_eq!(config.project(), "bbc.co.uk");
    }

    #[test]
    fn test_unparsable_start_url_leaves_domain_empty() {
        let config = Config::new("not a url");
        assert_eq!(config.domain(), "");
    }

    #[test]
    fn test_dedup_options() {
        let options = DedupConfig::default().options();
        assert_eq!(options.batch_size, 1000);
        assert_eq!(options.similarity_threshold, 0);
    }
}
