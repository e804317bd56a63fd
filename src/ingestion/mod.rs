//! Ingestion pipeline: crawl, chunk, embed, store.
//!
//! [`Indexer`] drives the whole pipeline for one site. Re-indexing a site
//! replaces its previous content wholesale: the backing store is cleared
//! before the new chunks are written, so stale pages never linger.

pub mod chunk;

pub use chunk::{chunk_page, Chunk};

use tracing::{info, warn};
use url::Url;

use crate::config::Settings;
use crate::crawl::{CrawlScheduler, Page};
use crate::embeddings::EmbeddingGateway;
use crate::stores::{ChunkRecord, VectorBackend};
use crate::types::SiteChatError;

/// Outcome of one indexing run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IndexReport {
    /// Pages that fetched and extracted successfully.
    pub pages_indexed: usize,
    /// Chunks embedded and written to the store.
    pub chunks_written: usize,
    /// Pages that produced no chunks (empty after extraction).
    pub pages_skipped: usize,
}

/// Crawls a site and builds its vector index.
pub struct Indexer<B> {
    scheduler: CrawlScheduler,
    embeddings: EmbeddingGateway,
    store: B,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl<B: VectorBackend> Indexer<B> {
    pub fn new(
        scheduler: CrawlScheduler,
        embeddings: EmbeddingGateway,
        store: B,
        settings: &Settings,
    ) -> Self {
        Self {
            scheduler,
            embeddings,
            store,
            chunk_size: settings.chunk_size,
            chunk_overlap: settings.chunk_overlap,
        }
    }

    pub fn store(&self) -> &B {
        &self.store
    }

    /// Crawls `base_url` and replaces the index with its content.
    pub async fn index_site(&self, base_url: &Url) -> Result<IndexReport, SiteChatError> {
        let pages = self.scheduler.crawl(base_url).await?;
        self.index_pages(&pages).await
    }

    /// Chunks, embeds, and stores an already-crawled page set.
    ///
    /// The store is cleared first, after the crawl has succeeded, so a
    /// failed crawl never destroys an existing index.
    pub async fn index_pages(&self, pages: &[Page]) -> Result<IndexReport, SiteChatError> {
        self.store.clear().await?;

        let mut report = IndexReport {
            pages_indexed: pages.len(),
            ..IndexReport::default()
        };

        for page in pages {
            let chunks = chunk_page(page, self.chunk_size, self.chunk_overlap)?;
            if chunks.is_empty() {
                warn!(url = %page.url, "page produced no chunks");
                report.pages_skipped += 1;
                continue;
            }

            let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embeddings.embed_batch(&texts).await?;

            let records: Vec<ChunkRecord> = chunks
                .into_iter()
                .zip(vectors)
                .map(|(chunk, vector)| ChunkRecord::from(chunk).with_embedding(vector))
                .collect();

            report.chunks_written += records.len();
            self.store.insert_chunks(&records).await?;
        }

        info!(
            pages = report.pages_indexed,
            chunks = report.chunks_written,
            skipped = report.pages_skipped,
            "indexing complete"
        );
        Ok(report)
    }
}
