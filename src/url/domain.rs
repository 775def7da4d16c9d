use std::net::IpAddr;
use url::Url;

/// Extracts the lowercase host from a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use tidepool::url::extract_domain;
///
/// let url = Url::parse("https://Blog.Example.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("blog.example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Reduces a URL's host to its registered domain
///
/// The registered domain is one label below the public suffix, so
/// `blog.example.com` gives `example.com` and `www.bbc.co.uk` gives
/// `bbc.co.uk`. IP addresses and hosts with no label below a public suffix,
/// such as `localhost`, are returned whole.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use tidepool::url::registered_domain;
///
/// let url = Url::parse("https://api.v2.example.com/").unwrap();
/// assert_eq!(registered_domain(&url), Some("example.com".to_string()));
///
/// let url = Url::parse("https://www.bbc.co.uk/news").unwrap();
/// assert_eq!(registered_domain(&url), Some("bbc.co.uk".to_string()));
///
/// let url = Url::parse("http://127.0.0.1:8080/").unwrap();
/// assert_eq!(registered_domain(&url), Some("127.0.0.1".to_string()));
/// ```
pub fn registered_domain(url: &Url) -> Option<String> {
    let host = canonical_host(url.host_str()?);
    if is_ip(&host) {
        return Some(host);
    }

    let registered = psl::domain_str(&host).unwrap_or(host.as_str());
    Some(registered.to_string())
}

/// Lowercases a host and drops any trailing root dot
pub fn canonical_host(host: &str) -> String {
    host.trim_end_matches('.').to_lowercase()
}

/// Returns true if `url` (already normalized) falls inside the crawl `domain`
///
/// A URL is in scope when its host is `domain` itself or a subdomain of it.
/// IP hosts must match exactly. An empty or unparsable URL is never in scope.
pub fn matches_domain(url: &str, domain: &str) -> bool {
    if url.is_empty() {
        return false;
    }

    let Some(host) = Url::parse(url).ok().and_then(|u| extract_domain(&u)) else {
        return false;
    };
    let host = canonical_host(&host);
    let domain = canonical_host(domain);

    if domain.is_empty() {
        return false;
    }
    if host == domain {
        return true;
    }

    !is_ip(&domain)
        && host
            .strip_suffix(domain.as_str())
            .map_or(false, |rest| rest.ends_with('.'))
}

fn is_ip(host: &str) -> bool {
    host.trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .is_ok()
}
