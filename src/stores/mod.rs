//! Vector storage behind the [`VectorBackend`] seam.
//!
//! The pipeline never talks to a database directly; it inserts and searches
//! [`ChunkRecord`]s through this trait. [`sqlite::SqliteChunkStore`] is the
//! shipped backend.

pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::ingestion::Chunk;
use crate::types::SiteChatError;

/// A chunk as stored and retrieved, embedding included.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: String,
    pub url: String,
    pub title: String,
    pub heading: String,
    pub chunk_index: usize,
    pub content: String,
    /// Present on insert, absent on records read back from search.
    pub embedding: Option<Vec<f32>>,
}

impl ChunkRecord {
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }
}

impl From<Chunk> for ChunkRecord {
    fn from(chunk: Chunk) -> Self {
        Self {
            id: chunk.id,
            url: chunk.url,
            title: chunk.title,
            heading: chunk.heading,
            chunk_index: chunk.index,
            content: chunk.text,
            embedding: None,
        }
    }
}

/// Storage backend for chunk records and their embeddings.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Writes records and their embeddings; every record must carry one.
    async fn insert_chunks(&self, records: &[ChunkRecord]) -> Result<(), SiteChatError>;

    /// Returns up to `top_k` records nearest to `query`, best first, each
    /// paired with a cosine similarity in `[-1.0, 1.0]`.
    async fn search_similar(
        &self,
        query: &[f32],
        top_k: usize,
    ) -> Result<Vec<(ChunkRecord, f32)>, SiteChatError>;

    /// Number of stored chunks.
    async fn count(&self) -> Result<usize, SiteChatError>;

    /// Removes every stored chunk and embedding.
    async fn clear(&self) -> Result<(), SiteChatError>;
}

pub use sqlite::SqliteChunkStore;
