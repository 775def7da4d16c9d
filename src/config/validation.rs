use crate::config::types::{Config, CrawlerConfig, DedupConfig, FetchConfig, OutputConfig};
use crate::dedup::FINGERPRINT_BITS;
use crate::url::{matches_domain, try_normalize_url};
use crate::ConfigError;

/// Longest accepted pause between dispatches, in seconds (one day)
const MAX_RATE_LIMIT: f64 = 86_400.0;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_fetch_config(&config.fetch)?;
    validate_dedup_config(&config.dedup)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    let start_url = try_normalize_url(&config.start_url).map_err(|e| {
        ConfigError::InvalidUrl(format!("Invalid start_url '{}': {}", config.start_url, e))
    })?;

    match config.domain.as_deref() {
        None | Some("") => {
            return Err(ConfigError::Validation(
                "domain could not be determined from start_url".to_string(),
            ))
        }
        Some(domain) if !matches_domain(start_url.as_str(), domain) => {
            return Err(ConfigError::Validation(format!(
                "start_url '{}' is outside domain '{}'",
                config.start_url, domain
            )))
        }
        Some(_) => {}
    }

    if let Some(project) = config.project.as_deref() {
        validate_project_name(project)?;
    }

    if !(0.0..=MAX_RATE_LIMIT).contains(&config.rate_limit) {
        return Err(ConfigError::Validation(format!(
            "rate_limit must be between 0 and {} seconds, got {}",
            MAX_RATE_LIMIT, config.rate_limit
        )));
    }

    if config.max_concurrency < 1 || config.max_concurrency > 100 {
        return Err(ConfigError::Validation(format!(
            "max_concurrency must be between 1 and 100, got {}",
            config.max_concurrency
        )));
    }

    if config.persist_every < 1 {
        return Err(ConfigError::Validation(format!(
            "persist_every must be >= 1, got {}",
            config.persist_every
        )));
    }

    Ok(())
}

/// Project names become directory names, so they must be a single path segment
fn validate_project_name(project: &str) -> Result<(), ConfigError> {
    if project.is_empty() || project == "." || project == ".." {
        return Err(ConfigError::Validation(format!(
            "project must be a directory name, got '{}'",
            project
        )));
    }

    if project.contains(['/', '\\']) {
        return Err(ConfigError::Validation(format!(
            "project must not contain path separators, got '{}'",
            project
        )));
    }

    Ok(())
}

/// Validates HTTP client configuration
fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    if config.timeout == 0 {
        return Err(ConfigError::Validation(
            "timeout must be at least 1 second".to_string(),
        ));
    }

    Ok(())
}

/// Validates dedup configuration
fn validate_dedup_config(config: &DedupConfig) -> Result<(), ConfigError> {
    if config.database_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "dedup database_path cannot be empty".to_string(),
        ));
    }

    if config.expected_items == 0 {
        return Err(ConfigError::Validation(
            "expected_items must be >= 1".to_string(),
        ));
    }

    if !(config.error_rate > 0.0 && config.error_rate < 1.0) {
        return Err(ConfigError::Validation(format!(
            "error_rate must be between 0 and 1 (exclusive), got {}",
            config.error_rate
        )));
    }

    if config.similarity_threshold as usize > FINGERPRINT_BITS {
        return Err(ConfigError::Validation(format!(
            "similarity_threshold must be between 0 and {}, got {}",
            FINGERPRINT_BITS, config.similarity_threshold
        )));
    }

    if config.batch_size == 0 {
        return Err(ConfigError::Validation(
            "batch_size must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.data_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "data_dir cannot be empty".to_string(),
        ));
    }

    if config.database_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}
