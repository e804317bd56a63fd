//! Retrieval stage: query embedding and top-k similarity search.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::agents::SearchResult;
use crate::embeddings::EmbeddingGateway;
use crate::stores::VectorBackend;
use crate::types::SiteChatError;

/// Whether the index held anything to ground an answer on.
///
/// An empty index is a normal state, not a failure: the caller gets zero
/// results and this signal instead of an error. An unreachable index is
/// [`SiteChatError::IndexUnavailable`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grounding {
    /// The index holds content; results reflect a real search.
    Available,
    /// Nothing has been indexed yet; results are necessarily empty.
    IndexEmpty,
}

/// Ranked passages plus the grounding signal they came with.
#[derive(Clone, Debug, PartialEq)]
pub struct RetrievalOutcome {
    pub grounding: Grounding,
    /// Best-first; ordering from the store is preserved untouched.
    pub results: Vec<SearchResult>,
}

/// Embeds a query and searches the vector index.
pub struct RetrievalAgent<B> {
    embeddings: EmbeddingGateway,
    store: B,
    default_top_k: usize,
}

impl<B: VectorBackend> RetrievalAgent<B> {
    pub fn new(embeddings: EmbeddingGateway, store: B, default_top_k: usize) -> Self {
        Self {
            embeddings,
            store,
            default_top_k: default_top_k.max(1),
        }
    }

    /// Retrieves up to `top_k` passages for the query; `None` falls back to
    /// the configured default, and a requested zero is raised to one.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: Option<usize>,
    ) -> Result<RetrievalOutcome, SiteChatError> {
        let top_k = top_k.unwrap_or(self.default_top_k).max(1);
        let count = self.store.count().await.map_err(index_unavailable)?;
        if count == 0 {
            info!("index is empty, nothing to retrieve");
            return Ok(RetrievalOutcome {
                grounding: Grounding::IndexEmpty,
                results: Vec::new(),
            });
        }

        let query_vector = self.embeddings.embed_query(query).await?;
        let hits = self
            .store
            .search_similar(&query_vector, top_k)
            .await
            .map_err(index_unavailable)?;

        let results: Vec<SearchResult> = hits
            .into_iter()
            .map(|(record, score)| SearchResult::from_record(record, score))
            .collect();

        debug!(results = results.len(), top_k, "retrieval complete");
        Ok(RetrievalOutcome {
            grounding: Grounding::Available,
            results,
        })
    }
}

/// A store failure during retrieval means the index cannot be consulted.
fn index_unavailable(err: SiteChatError) -> SiteChatError {
    match err {
        SiteChatError::Storage(reason) => SiteChatError::IndexUnavailable(reason),
        other => other,
    }
}
