//! URL handling module for Tidepool
//!
//! This module provides URL normalization (the crawler's single dedup key)
//! and the domain helpers used to keep a crawl inside its boundary.

mod domain;
mod normalize;

pub use domain::{canonical_host, extract_domain, matches_domain, registered_domain};
pub use normalize::{normalize_url, try_normalize_url};
