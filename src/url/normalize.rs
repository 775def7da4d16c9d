use crate::UrlError;
use url::form_urlencoded;
use url::Url;

/// Normalizes a URL into the crawler's dedup key
///
/// Malformed or non-HTTP(S) input normalizes to an empty string; the domain
/// check downstream filters it out.
///
/// # Examples
///
/// ```
/// use tidepool::url::normalize_url;
///
/// assert_eq!(
///     normalize_url("HTTP://Example.COM/docs/?b=2&a=1"),
///     "http://example.com/docs?a=1&b=2"
/// );
/// assert_eq!(normalize_url("not a url"), "");
/// ```
pub fn normalize_url(url_str: &str) -> String {
    match try_normalize_url(url_str) {
        Ok(url) => url.to_string(),
        Err(e) => {
            tracing::trace!("Dropping unnormalizable URL {:?}: {}", url_str, e);
            String::new()
        }
    }
}

/// Normalizes a URL, reporting why normalization failed
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Reject anything that is not http or https
/// 3. Lowercase scheme and host (done by the parser)
/// 4. Remove trailing slashes from the path (root `/` is kept)
/// 5. Sort query parameters by key, then value, and re-encode them
/// 6. Drop an empty query string or empty fragment
///
/// The fragment itself is preserved.
pub fn try_normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::MissingDomain);
    }

    let path = strip_trailing_slashes(url.path()).to_string();
    url.set_path(&path);

    let query = url.query().map(sorted_query);
    match query {
        Some(q) if !q.is_empty() => url.set_query(Some(&q)),
        _ => url.set_query(None),
    }

    if url.fragment() == Some("") {
        url.set_fragment(None);
    }

    Ok(url)
}

/// Strips every trailing slash, leaving the root path intact
fn strip_trailing_slashes(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}

/// Decodes a query string, sorts the pairs and re-encodes them
fn sorted_query(query: &str) -> String {
    let mut pairs: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    pairs.sort();

    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}
