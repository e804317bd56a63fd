//! Deterministic sliding-window chunking.
//!
//! A window of `chunk_size` characters slides over the page text with
//! stride `chunk_size - chunk_overlap`; the final chunk may be shorter and
//! is never padded or dropped. Offsets are character offsets into the
//! page's normalized text, so re-chunking the same page with the same
//! parameters yields byte-identical boundaries, the property idempotent
//! re-indexing relies on.

use serde::{Deserialize, Serialize};

use crate::crawl::Page;
use crate::types::SiteChatError;

/// One retrievable slice of a page, the unit of embedding and retrieval.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Derived id, `"{url}#{index}"`; stable across re-chunking.
    pub id: String,
    pub url: String,
    pub title: String,
    /// Nearest heading preceding this chunk's start, empty when none.
    pub heading: String,
    /// Zero-based position of this chunk within its page.
    pub index: usize,
    pub text: String,
    /// Character offset of the first character, inclusive.
    pub start: usize,
    /// Character offset one past the last character, exclusive.
    pub end: usize,
    /// True when the chunk's head repeats the tail of its predecessor.
    pub overlaps_previous: bool,
}

/// Splits one page into an ordered chunk sequence covering its text.
///
/// `chunk_overlap` must be smaller than `chunk_size`, otherwise the window
/// cannot advance; that combination is rejected as a configuration error.
/// A page with empty text produces zero chunks.
pub fn chunk_page(
    page: &Page,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<Chunk>, SiteChatError> {
    if chunk_size == 0 || chunk_overlap >= chunk_size {
        return Err(SiteChatError::Configuration(format!(
            "chunk_overlap ({chunk_overlap}) must be smaller than chunk_size ({chunk_size})"
        )));
    }

    // Byte offset of every char boundary, plus the end of the text.
    let mut boundaries: Vec<usize> = page.text.char_indices().map(|(i, _)| i).collect();
    boundaries.push(page.text.len());
    let total_chars = boundaries.len() - 1;

    let heading_offsets = locate_headings(&page.text, &page.headings, &boundaries);

    let stride = chunk_size - chunk_overlap;
    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < total_chars {
        let end = (start + chunk_size).min(total_chars);
        let text = page.text[boundaries[start]..boundaries[end]].to_string();
        let index = chunks.len();
        chunks.push(Chunk {
            id: format!("{}#{}", page.url, index),
            url: page.url.to_string(),
            title: page.title.clone(),
            heading: nearest_preceding_heading(&heading_offsets, start),
            index,
            text,
            start,
            end,
            overlaps_previous: index > 0 && chunk_overlap > 0,
        });
        if end == total_chars {
            break;
        }
        start += stride;
    }

    Ok(chunks)
}

/// Locates each heading's first occurrence in the page text, scanning
/// forward so repeated heading strings resolve in document order.
fn locate_headings(text: &str, headings: &[String], boundaries: &[usize]) -> Vec<(usize, String)> {
    let mut located = Vec::new();
    let mut cursor = 0usize;
    for heading in headings {
        if heading.is_empty() {
            continue;
        }
        if let Some(found) = text[cursor..].find(heading.as_str()) {
            let byte_offset = cursor + found;
            let char_offset = boundaries
                .binary_search(&byte_offset)
                .unwrap_or_else(|insert_at| insert_at);
            located.push((char_offset, heading.clone()));
            cursor = byte_offset + heading.len();
        }
    }
    located
}

fn nearest_preceding_heading(heading_offsets: &[(usize, String)], chunk_start: usize) -> String {
    heading_offsets
        .iter()
        .take_while(|(offset, _)| *offset <= chunk_start)
        .last()
        .map(|(_, heading)| heading.clone())
        .unwrap_or_default()
}
