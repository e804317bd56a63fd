//! End-to-end ingestion: pages in, ranked passages out.

use std::sync::Arc;

use chrono::Utc;
use url::Url;

use sitechat::agents::{Grounding, RetrievalAgent};
use sitechat::config::Settings;
use sitechat::crawl::{CrawlLimits, CrawlScheduler, Fetcher, Page};
use sitechat::embeddings::{EmbeddingGateway, MockEmbeddingProvider};
use sitechat::ingestion::Indexer;
use sitechat::stores::{SqliteChunkStore, VectorBackend};

const DIMS: usize = 16;

fn gateway() -> EmbeddingGateway {
    EmbeddingGateway::new(Arc::new(MockEmbeddingProvider::with_dimensions(DIMS)), 4)
}

fn page(path: &str, text: &str) -> Page {
    Page {
        url: Url::parse(&format!("https://ex.com{path}")).unwrap(),
        depth: 0,
        title: format!("Title of {path}"),
        headings: Vec::new(),
        text: text.to_string(),
        links: Vec::new(),
        fetched_at: Utc::now(),
    }
}

fn indexer(store: SqliteChunkStore, chunk_size: usize, overlap: usize) -> Indexer<SqliteChunkStore> {
    let settings = Settings {
        chunk_size,
        chunk_overlap: overlap,
        embedding_dimensions: DIMS,
        ..Settings::default()
    };
    let fetcher = Fetcher::new(settings.fetch_timeout, std::time::Duration::ZERO).unwrap();
    let scheduler = CrawlScheduler::new(fetcher, CrawlLimits::default());
    Indexer::new(scheduler, gateway(), store, &settings)
}

#[tokio::test]
async fn indexing_writes_every_chunk() {
    let store = SqliteChunkStore::in_memory("chunks", DIMS).await.unwrap();
    let idx = indexer(store, 50, 10);

    let long_text = "sitechat indexes website text for retrieval. ".repeat(5);
    let report = idx
        .index_pages(&[page("/a", &long_text), page("/b", "short page")])
        .await
        .unwrap();

    assert_eq!(report.pages_indexed, 2);
    assert_eq!(report.pages_skipped, 0);
    assert!(report.chunks_written > 2);
    assert_eq!(idx.store().count().await.unwrap(), report.chunks_written);
}

#[tokio::test]
async fn reindexing_replaces_previous_content() {
    let store = SqliteChunkStore::in_memory("chunks", DIMS).await.unwrap();
    let idx = indexer(store, 100, 20);

    idx.index_pages(&[page("/old", "content that will disappear")])
        .await
        .unwrap();
    let report = idx
        .index_pages(&[page("/new", "fresh content replacing the old")])
        .await
        .unwrap();

    assert_eq!(report.chunks_written, 1);
    assert_eq!(idx.store().count().await.unwrap(), 1);

    let query = gateway().embed_query("anything").await.unwrap();
    let results = idx.store().search_similar(&query, 10).await.unwrap();
    assert!(results.iter().all(|(r, _)| r.url.contains("/new")));
}

#[tokio::test]
async fn empty_pages_are_counted_as_skipped() {
    let store = SqliteChunkStore::in_memory("chunks", DIMS).await.unwrap();
    let idx = indexer(store, 100, 20);

    let report = idx
        .index_pages(&[page("/a", "real text"), page("/empty", "")])
        .await
        .unwrap();

    assert_eq!(report.pages_indexed, 2);
    assert_eq!(report.pages_skipped, 1);
    assert_eq!(report.chunks_written, 1);
}

#[tokio::test]
async fn retrieval_finds_the_matching_chunk_over_a_real_index() {
    let store = SqliteChunkStore::in_memory("chunks", DIMS).await.unwrap();
    let idx = indexer(store.clone(), 100, 0);

    idx.index_pages(&[
        page("/pricing", "plans start at ten dollars per month"),
        page("/about", "the company was founded in a garage"),
        page("/docs", "install the tool with a single command"),
    ])
    .await
    .unwrap();

    let agent = RetrievalAgent::new(gateway(), store, 3);
    // Mock embeddings only match on identical text, so query with one.
    let outcome = agent
        .retrieve("plans start at ten dollars per month", None)
        .await
        .unwrap();

    assert_eq!(outcome.grounding, Grounding::Available);
    assert_eq!(outcome.results[0].url, "https://ex.com/pricing");
    assert!((outcome.results[0].score - 1.0).abs() < 1e-4);
}

#[tokio::test]
async fn empty_index_yields_the_empty_grounding_signal() {
    let store = SqliteChunkStore::in_memory("chunks", DIMS).await.unwrap();
    let agent = RetrievalAgent::new(gateway(), store, 5);
    let outcome = agent.retrieve("anything at all", None).await.unwrap();
    assert_eq!(outcome.grounding, Grounding::IndexEmpty);
    assert!(outcome.results.is_empty());
}

#[tokio::test]
async fn on_disk_store_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.sqlite");

    {
        let store = SqliteChunkStore::open(&path, "chunks", DIMS).await.unwrap();
        let idx = indexer(store, 100, 20);
        idx.index_pages(&[page("/a", "persisted content")])
            .await
            .unwrap();
    }

    let reopened = SqliteChunkStore::open(&path, "chunks", DIMS).await.unwrap();
    assert_eq!(reopened.count().await.unwrap(), 1);
}
