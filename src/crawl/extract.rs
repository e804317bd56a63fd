//! Turns raw HTML into a [`Page`]: normalized text, ordered headings, and
//! same-domain outbound links.

use chrono::{DateTime, Utc};
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::crawl::urls;
use crate::types::SiteChatError;

/// Elements whose subtrees carry chrome or code, not content.
const EXCLUDED_ELEMENTS: &[&str] = &["script", "style", "noscript", "nav", "footer", "header"];

/// A crawled page, immutable once created. Pages exist only long enough to
/// be chunked; they are not persisted independently of their chunks.
#[derive(Debug, Clone)]
pub struct Page {
    /// Canonical URL, the uniqueness key of the crawl.
    pub url: Url,
    /// Link depth from the crawl's base URL.
    pub depth: usize,
    pub title: String,
    /// Headings in document order, used for chunk attribution.
    pub headings: Vec<String>,
    /// Whitespace-normalized body text.
    pub text: String,
    /// Same-domain outbound links in canonical form, deduplicated.
    pub links: Vec<Url>,
    pub fetched_at: DateTime<Utc>,
}

/// Extracts a [`Page`] from HTML already known to be `text/html`.
///
/// Fails only when the document contains no usable content at all; such a
/// page cannot contribute chunks and is skipped by the scheduler.
pub fn extract_page(url: &Url, depth: usize, html: &str) -> Result<Page, SiteChatError> {
    let document = Html::parse_document(html);

    let title_selector = Selector::parse("title").expect("static selector");
    let title = document
        .select(&title_selector)
        .next()
        .map(|el| collapse_whitespace(&el.text().collect::<Vec<_>>().join(" ")))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| url.to_string());

    let heading_selector = Selector::parse("h1, h2, h3, h4, h5, h6").expect("static selector");
    let headings: Vec<String> = document
        .select(&heading_selector)
        .filter(|el| !in_excluded_subtree(el))
        .map(|el| collapse_whitespace(&el.text().collect::<Vec<_>>().join(" ")))
        .filter(|h| !h.is_empty())
        .collect();

    let mut parts = Vec::new();
    collect_text(document.root_element(), &mut parts);
    let text = parts.join(" ");

    let link_selector = Selector::parse("a[href]").expect("static selector");
    let mut links = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for anchor in document.select(&link_selector) {
        if in_excluded_subtree(&anchor) {
            continue;
        }
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Some(resolved) = urls::resolve_link(url, href) else {
            continue;
        };
        if !urls::same_domain(url, &resolved) {
            continue;
        }
        if seen.insert(resolved.to_string()) {
            links.push(resolved);
        }
    }

    if text.is_empty() && headings.is_empty() {
        return Err(SiteChatError::Extraction {
            url: url.to_string(),
            reason: "document contains no textual content".to_string(),
        });
    }

    Ok(Page {
        url: url.clone(),
        depth,
        title,
        headings,
        text,
        links,
        fetched_at: Utc::now(),
    })
}

fn collect_text(element: ElementRef<'_>, parts: &mut Vec<String>) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            let collapsed = collapse_whitespace(text);
            if !collapsed.is_empty() {
                parts.push(collapsed);
            }
        } else if let Some(child_element) = ElementRef::wrap(child) {
            if !EXCLUDED_ELEMENTS.contains(&child_element.value().name()) {
                collect_text(child_element, parts);
            }
        }
    }
}

fn in_excluded_subtree(element: &ElementRef<'_>) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| EXCLUDED_ELEMENTS.contains(&ancestor.value().name()))
}

fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}
