use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Environment variables that override file settings
pub const ENV_START_URL: &str = "CRAWLER_START_URL";
pub const ENV_RATE_LIMIT: &str = "CRAWLER_RATE_LIMIT";
pub const ENV_USER_AGENT: &str = "CRAWLER_USER_AGENT";
pub const ENV_TIMEOUT: &str = "CRAWLER_TIMEOUT";
pub const ENV_MAX_CONCURRENCY: &str = "CRAWLER_MAX_CONCURRENCY";

/// Loads and parses a configuration file from the given path
///
/// `CRAWLER_*` environment variables are applied on top of the file before
/// derived values are filled in and the result is validated.
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use tidepool::config::load_config;
///
/// let config = load_config(Path::new("config.toml")).unwrap();
/// println!("Crawling {}", config.domain());
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content, |name| std::env::var(name).ok())
}

/// Parses configuration text, applying overrides from `lookup`
///
/// `lookup` maps an override variable name to its value, if set.
pub fn parse_config<F>(content: &str, lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config: Config = toml::from_str(content)?;

    apply_overrides(&mut config, lookup)?;
    config.fill_derived();
    validate(&config)?;

    Ok(config)
}

/// Applies `CRAWLER_*` overrides to `config`
pub fn apply_overrides<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(start_url) = lookup(ENV_START_URL) {
        tracing::debug!("{} overrides start_url", ENV_START_URL);
        config.crawler.start_url = start_url;
    }

    if let Some(value) = lookup(ENV_RATE_LIMIT) {
        config.crawler.rate_limit = parse_override(ENV_RATE_LIMIT, &value)?;
    }

    if let Some(user_agent) = lookup(ENV_USER_AGENT) {
        config.fetch.user_agent = user_agent;
    }

    if let Some(value) = lookup(ENV_TIMEOUT) {
        config.fetch.timeout = parse_override(ENV_TIMEOUT, &value)?;
    }

    if let Some(value) = lookup(ENV_MAX_CONCURRENCY) {
        config.crawler.max_concurrency = parse_override(ENV_MAX_CONCURRENCY, &value)?;
    }

    Ok(())
}

fn parse_override<T>(name: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidOverride {
            name: name.to_string(),
            message: format!("'{}': {}", value, e),
        })
}

/// Computes a SHA-256 hash of the configuration file content
///
/// This is recorded with each crawl run to tell runs with different settings
/// apart.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}
