//! HTML parser for extracting in-scope links and the page title
//!
//! Link extraction never fails: malformed markup just yields fewer links.

use crate::url::{matches_domain, normalize_url};
use scraper::{Html, Selector};
use std::collections::BTreeSet;
use url::Url;

/// Extracts every followable link on a page that stays inside `domain`
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` anywhere in the document
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:` links
/// - Data URIs
/// - Fragment-only and empty hrefs
/// - Links whose registered domain differs from `domain`
///
/// Relative hrefs are resolved against the document's `<base href>` when it
/// has one, otherwise against `page_url`. Results are normalized.
///
/// # Example
///
/// ```
/// use tidepool::crawler::extract_links;
///
/// let html = r#"<a href="/b/">B</a><a href="https://other.org/">X</a>"#;
/// let links = extract_links("https://example.com/a", html, "example.com");
/// assert_eq!(links.into_iter().collect::<Vec<_>>(), vec!["https://example.com/b"]);
/// ```
pub fn extract_links(page_url: &str, html: &str, domain: &str) -> BTreeSet<String> {
    let mut links = BTreeSet::new();

    let page = match Url::parse(page_url) {
        Ok(u) => u,
        Err(e) => {
            tracing::debug!("Cannot extract links, bad page URL {}: {}", page_url, e);
            return links;
        }
    };

    let document = Html::parse_document(html);
    let base = document_base(&document, &page).unwrap_or(page);

    let a_selector = match Selector::parse("a[href]") {
        Ok(s) => s,
        Err(_) => return links,
    };

    for element in document.select(&a_selector) {
        if element.value().attr("download").is_some() {
            continue;
        }

        let Some(href) = element.value().attr("href") else {
            continue;
        };

        let Some(absolute) = resolve_link(href, &base) else {
            continue;
        };

        let normalized = normalize_url(&absolute);
        if matches_domain(&normalized, domain) {
            links.insert(normalized);
        }
    }

    links
}

/// Extracts the trimmed `<title>` text, if any
pub fn extract_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn document_base(document: &Html, page: &Url) -> Option<Url> {
    let selector = Selector::parse("base[href]").ok()?;
    let href = document.select(&selector).next()?.value().attr("href")?;
    page.join(href.trim()).ok()
}

/// Resolves a link href to an absolute URL
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with("data:")
    {
        return None;
    }

    match base_url.join(href) {
        Ok(absolute_url) if matches!(absolute_url.scheme(), "http" | "https") => {
            Some(absolute_url.to_string())
        }
        _ => None,
    }
}
