//! Error taxonomy shared across the crawling and query pipelines.
//!
//! Failures fall into two propagation classes:
//!
//! * **Recoverable per page** — [`SiteChatError::Fetch`] and
//!   [`SiteChatError::Extraction`] are absorbed by the crawl scheduler: the
//!   page is logged and skipped, the crawl continues.
//! * **Terminal per request** — embedding, index, and generation failures
//!   abort the enclosing indexing or query request and are surfaced to the
//!   caller as a typed error, never silently degraded.

use thiserror::Error;

/// Classifies why a single page fetch failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchFailure {
    /// The request did not complete within the configured timeout.
    #[error("request timed out")]
    Timeout,
    /// DNS resolution or connection establishment failed.
    #[error("connection failed: {0}")]
    Connect(String),
    /// The server answered with a non-success status code.
    #[error("http status {0}")]
    Http(u16),
    /// The response is not `text/html` and must not be parsed as text.
    #[error("unsupported content type '{0}'")]
    NonHtml(String),
}

/// Unified error type for the sitechat pipelines.
#[derive(Debug, Error)]
pub enum SiteChatError {
    /// A page fetch failed. Recoverable during crawling (page skipped),
    /// fatal only when the crawl's base URL itself cannot be fetched.
    #[error("fetch failed for {url}: {failure}")]
    Fetch { url: String, failure: FetchFailure },

    /// Page markup could not be turned into a [`crate::crawl::Page`].
    #[error("extraction failed for {url}: {reason}")]
    Extraction { url: String, reason: String },

    /// A URL could not be parsed or canonicalized.
    #[error("invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The embedding model call failed or returned the wrong dimensionality.
    /// Terminal for the enclosing indexing or query request.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// The vector index could not be reached. Distinct from an empty result
    /// set: "no grounding available" is not an error, an unreachable index is.
    #[error("vector index unavailable: {0}")]
    IndexUnavailable(String),

    /// The generation model call failed or was cancelled mid-stream.
    /// Partial tokens are discarded; the caller sees this error instead.
    #[error("generation failed: {0}")]
    Generation(String),

    /// Storage-layer failure below the retrieval boundary.
    #[error("storage error: {0}")]
    Storage(String),

    /// A required setting is missing or invalid. Fatal at startup.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SiteChatError {
    /// Recoverable failures are absorbed during crawling; everything else
    /// aborts the enclosing operation.
    pub fn is_page_recoverable(&self) -> bool {
        matches!(
            self,
            SiteChatError::Fetch { .. } | SiteChatError::Extraction { .. }
        )
    }
}
