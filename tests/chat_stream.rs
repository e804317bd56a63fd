//! Streaming query pipeline, end to end over an in-memory index.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use url::Url;

use sitechat::agents::AnswerAgent;
use sitechat::agents::RetrievalAgent;
use sitechat::config::Settings;
use sitechat::crawl::{CrawlLimits, CrawlScheduler, Fetcher, Page};
use sitechat::embeddings::{EmbeddingGateway, MockEmbeddingProvider};
use sitechat::ingestion::Indexer;
use sitechat::llm::{ChatModel, MockChatModel, TokenStream};
use sitechat::message::ChatTurn;
use sitechat::stores::SqliteChunkStore;
use sitechat::types::SiteChatError;
use sitechat::workflow::{ChatEvent, ChatWorkflow};

const DIMS: usize = 16;

fn gateway() -> EmbeddingGateway {
    EmbeddingGateway::new(Arc::new(MockEmbeddingProvider::with_dimensions(DIMS)), 4)
}

fn page(path: &str, heading: &str, text: &str) -> Page {
    Page {
        url: Url::parse(&format!("https://ex.com{path}")).unwrap(),
        depth: 0,
        title: format!("Title of {path}"),
        headings: vec![heading.to_string()],
        text: format!("{heading} {text}"),
        links: Vec::new(),
        fetched_at: Utc::now(),
    }
}

async fn indexed_store(pages: &[Page]) -> SqliteChunkStore {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let store = SqliteChunkStore::in_memory("chunks", DIMS).await.unwrap();
    let settings = Settings {
        chunk_size: 200,
        chunk_overlap: 0,
        embedding_dimensions: DIMS,
        ..Settings::default()
    };
    let fetcher = Fetcher::new(settings.fetch_timeout, std::time::Duration::ZERO).unwrap();
    let scheduler = CrawlScheduler::new(fetcher, CrawlLimits::default());
    let idx = Indexer::new(scheduler, gateway(), store.clone(), &settings);
    idx.index_pages(pages).await.unwrap();
    store
}

fn workflow(
    store: SqliteChunkStore,
    model: Arc<dyn ChatModel>,
    min_score: f32,
) -> ChatWorkflow<SqliteChunkStore> {
    ChatWorkflow::new(
        RetrievalAgent::new(gateway(), store, 5),
        AnswerAgent::new(model, min_score),
    )
}

async fn collect(rx: flume::Receiver<ChatEvent>) -> Vec<ChatEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.recv_async().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn grounded_stream_emits_sources_tokens_complete() {
    let store = indexed_store(&[page("/docs", "Install", "run the installer")]).await;
    let wf = workflow(store, Arc::new(MockChatModel::new("See Source 1.")), -1.0);

    let rx = wf.process_query_stream("Install run the installer".to_string(), Vec::new(), None);
    let events = collect(rx).await;

    match &events[0] {
        ChatEvent::Sources { sources } => {
            assert_eq!(sources.len(), 1);
            assert_eq!(sources[0].url, "https://ex.com/docs");
            assert_eq!(sources[0].sections, vec!["Install"]);
        }
        other => panic!("expected sources first, got {other:?}"),
    }
    assert!(matches!(events.last(), Some(ChatEvent::Complete)));

    let answer: String = events
        .iter()
        .filter_map(|e| match e {
            ChatEvent::Token { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(answer, "See Source 1.");
}

#[tokio::test]
async fn below_threshold_stream_carries_the_canonical_answer_and_no_sources() {
    let store = indexed_store(&[page("/docs", "Install", "run the installer")]).await;
    let model = Arc::new(MockChatModel::new("should never stream"));
    let calls = model.calls();
    let wf = workflow(store, model, 0.99);

    // A query the mock embeddings place far from any stored chunk.
    let rx = wf.process_query_stream("completely unrelated question".to_string(), Vec::new(), None);
    let events = collect(rx).await;

    assert!(
        matches!(&events[0], ChatEvent::Sources { sources } if sources.is_empty()),
        "expected empty sources, got {:?}",
        events[0]
    );
    assert!(matches!(
        &events[1],
        ChatEvent::Token { text } if text == AnswerAgent::INSUFFICIENT_INFORMATION
    ));
    assert!(matches!(events.last(), Some(ChatEvent::Complete)));
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn history_passes_through_to_the_answer_stage() {
    let store = indexed_store(&[page("/docs", "Install", "run the installer")]).await;
    let wf = workflow(store, Arc::new(MockChatModel::new("ok")), -1.0);

    let history = vec![
        ChatTurn::user("earlier question"),
        ChatTurn::assistant("earlier answer"),
    ];
    let response = wf
        .process_query("Install run the installer", &history, None)
        .await
        .unwrap();
    assert_eq!(response.answer, "ok");
    assert_eq!(response.query, "Install run the installer");
}

/// Fails after the first token, exercising the mid-stream error path.
struct FailingChatModel;

#[async_trait]
impl ChatModel for FailingChatModel {
    async fn complete(&self, _messages: &[ChatTurn]) -> Result<String, SiteChatError> {
        Err(SiteChatError::Generation("unused".into()))
    }

    async fn stream_completion(
        &self,
        _messages: &[ChatTurn],
    ) -> Result<TokenStream, SiteChatError> {
        let stream = async_stream::stream! {
            yield Ok("partial ".to_string());
            yield Err(SiteChatError::Generation("model connection lost".into()));
        };
        Ok(Box::pin(stream))
    }
}

#[tokio::test]
async fn mid_stream_failure_terminates_with_an_error_event() {
    let store = indexed_store(&[page("/docs", "Install", "run the installer")]).await;
    let wf = workflow(store, Arc::new(FailingChatModel), -1.0);

    let rx = wf.process_query_stream("Install run the installer".to_string(), Vec::new(), None);
    let events = collect(rx).await;

    assert!(matches!(events.first(), Some(ChatEvent::Sources { .. })));
    assert!(matches!(
        events.last(),
        Some(ChatEvent::Error { message }) if message.contains("model connection lost")
    ));
    // The stream closed on the error; no Complete follows it.
    assert!(!events.iter().any(|e| matches!(e, ChatEvent::Complete)));
}
