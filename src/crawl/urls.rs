//! Canonical URL handling for visited tracking and link resolution.
//!
//! A canonical URL is the uniqueness key of the crawl: scheme and host are
//! lowercased (the `url` crate guarantees this on parse), the fragment is
//! stripped, and a trailing slash on a non-root path is removed so that
//! `/about` and `/about/` count as one page.

use url::Url;

/// File extensions that never contain crawlable text.
const SKIPPED_EXTENSIONS: &[&str] = &[
    ".pdf", ".jpg", ".jpeg", ".png", ".gif", ".zip", ".exe", ".mp4", ".mp3", ".svg", ".ico",
    ".css", ".js",
];

/// Normalizes a URL into its canonical form.
pub fn canonicalize(url: &Url) -> Url {
    let mut canonical = url.clone();
    canonical.set_fragment(None);
    let path = canonical.path();
    if path.len() > 1 && path.ends_with('/') {
        let trimmed = path.trim_end_matches('/').to_string();
        canonical.set_path(&trimmed);
    }
    canonical
}

/// Parses a string into a canonical absolute URL.
pub fn parse_canonical(raw: &str) -> Result<Url, crate::types::SiteChatError> {
    let url = Url::parse(raw).map_err(|err| crate::types::SiteChatError::InvalidUrl {
        url: raw.to_string(),
        reason: err.to_string(),
    })?;
    Ok(canonicalize(&url))
}

/// Resolves an anchor `href` against the page it appeared on.
///
/// Returns `None` for anything that must never be enqueued: unparsable
/// references, non-http(s) schemes, and binary resources.
pub fn resolve_link(page_url: &Url, href: &str) -> Option<Url> {
    let joined = page_url.join(href).ok()?;
    if !matches!(joined.scheme(), "http" | "https") {
        return None;
    }
    let canonical = canonicalize(&joined);
    if has_skipped_extension(&canonical) {
        return None;
    }
    Some(canonical)
}

/// True when both URLs share a host and port.
pub fn same_domain(a: &Url, b: &Url) -> bool {
    match (a.host_str(), b.host_str()) {
        (Some(left), Some(right)) => {
            left.eq_ignore_ascii_case(right) && a.port_or_known_default() == b.port_or_known_default()
        }
        _ => false,
    }
}

fn has_skipped_extension(url: &Url) -> bool {
    let path = url.path().to_ascii_lowercase();
    SKIPPED_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(raw: &str) -> Url {
        Url::parse(raw).unwrap()
    }

    #[test]
    fn fragment_is_stripped() {
        let canonical = canonicalize(&url("https://ex.com/docs#install"));
        assert_eq!(canonical.as_str(), "https://ex.com/docs");
    }

    #[test]
    fn trailing_slash_is_normalized_except_root() {
        assert_eq!(
            canonicalize(&url("https://ex.com/about/")).as_str(),
            "https://ex.com/about"
        );
        assert_eq!(canonicalize(&url("https://ex.com/")).as_str(), "https://ex.com/");
    }

    #[test]
    fn host_and_scheme_are_lowercased_on_parse() {
        let canonical = canonicalize(&url("HTTPS://EX.com/About"));
        assert_eq!(canonical.scheme(), "https");
        assert_eq!(canonical.host_str(), Some("ex.com"));
        // Path case is preserved: /About and /about may be distinct pages.
        assert_eq!(canonical.path(), "/About");
    }

    #[test]
    fn relative_links_resolve_against_the_page() {
        let page = url("https://ex.com/docs/guide");
        let resolved = resolve_link(&page, "../pricing").unwrap();
        assert_eq!(resolved.as_str(), "https://ex.com/pricing");
    }

    #[test]
    fn non_http_schemes_are_rejected() {
        let page = url("https://ex.com/");
        assert!(resolve_link(&page, "mailto:team@ex.com").is_none());
        assert!(resolve_link(&page, "javascript:void(0)").is_none());
    }

    #[test]
    fn binary_resources_are_rejected() {
        let page = url("https://ex.com/");
        assert!(resolve_link(&page, "/whitepaper.pdf").is_none());
        assert!(resolve_link(&page, "/logo.PNG").is_none());
        assert!(resolve_link(&page, "/about").is_some());
    }

    #[test]
    fn same_domain_ignores_case() {
        assert!(same_domain(&url("https://Ex.com/a"), &url("https://ex.COM/b")));
        assert!(!same_domain(&url("https://ex.com"), &url("https://other.com")));
    }

    #[test]
    fn same_domain_distinguishes_ports() {
        assert!(!same_domain(
            &url("http://127.0.0.1:5000/"),
            &url("http://127.0.0.1:5001/")
        ));
        // An explicit default port equals the implicit one.
        assert!(same_domain(&url("https://ex.com/"), &url("https://ex.com:443/")));
    }
}
