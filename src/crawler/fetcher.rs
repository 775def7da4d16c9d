//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with the configured user agent and timeout
//! - GET requests to fetch page content
//! - Classifying responses so only HTML pages move on
//!
//! Fetches are never retried here; a failed fetch simply yields no content.

use crate::config::FetchConfig;
use reqwest::{header::CONTENT_TYPE, redirect::Policy, Client, StatusCode};
use std::time::Duration;

/// Result of a fetch operation
#[derive(Debug)]
pub enum FetchResult {
    /// Successfully fetched an HTML page
    Success {
        /// Final URL after redirects
        final_url: String,
        /// HTTP status code
        status_code: u16,
        /// Content-Type header value
        content_type: String,
        /// Page body content
        body: String,
    },

    /// Page is not HTML (Content-Type mismatch)
    ContentMismatch {
        /// The actual Content-Type received
        content_type: String,
    },

    /// Any status other than 200
    HttpError {
        /// The HTTP status code
        status_code: u16,
    },

    /// Network error (connection refused, timeout, etc.)
    NetworkError {
        /// Error description
        error: String,
        /// Whether the request hit the timeout
        timed_out: bool,
    },
}

impl FetchResult {
    /// Page body, if the fetch produced usable HTML
    pub fn into_content(self) -> Option<String> {
        match self {
            Self::Success { body, .. } => Some(body),
            _ => None,
        }
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Example
///
/// ```
/// use tidepool::config::FetchConfig;
/// use tidepool::crawler::build_http_client;
///
/// let client = build_http_client(&FetchConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &FetchConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(config.timeout_duration())
        .connect_timeout(Duration::from_secs(config.timeout.min(10)))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches a URL and classifies the response
///
/// | Condition | Result |
/// |-----------|--------|
/// | 200 with `text/html` | Success |
/// | 200 with other Content-Type | ContentMismatch |
/// | Any other status | HttpError |
/// | Timeout, connection or body error | NetworkError |
pub async fn fetch_url(client: &Client, url: &str) -> FetchResult {
    let response = match client.get(url).send().await {
        Ok(response) => response,
        Err(e) => {
            let result = network_error(e);
            tracing::warn!("Fetch failed for {}: {:?}", url, result);
            return result;
        }
    };

    let status = response.status();
    let final_url = response.url().to_string();

    if status != StatusCode::OK {
        tracing::warn!("HTTP {} for {}", status.as_u16(), url);
        return FetchResult::HttpError {
            status_code: status.as_u16(),
        };
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    if !content_type.to_ascii_lowercase().contains("text/html") {
        tracing::warn!("Skipping {}: content type '{}'", url, content_type);
        return FetchResult::ContentMismatch { content_type };
    }

    match response.text().await {
        Ok(body) => {
            tracing::debug!("Fetched {} ({} bytes)", final_url, body.len());
            FetchResult::Success {
                final_url,
                status_code: status.as_u16(),
                content_type,
                body,
            }
        }
        Err(e) => {
            let result = network_error(e);
            tracing::warn!("Reading body failed for {}: {:?}", url, result);
            result
        }
    }
}

fn network_error(e: reqwest::Error) -> FetchResult {
    if e.is_timeout() {
        FetchResult::NetworkError {
            error: "Request timeout".to_string(),
            timed_out: true,
        }
    } else if e.is_connect() {
        FetchResult::NetworkError {
            error: format!("Connection failed: {}", e),
            timed_out: false,
        }
    } else {
        FetchResult::NetworkError {
            error: e.to_string(),
            timed_out: false,
        }
    }
}
