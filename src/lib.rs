//! ```text
//! Base URL ──► crawl::scheduler ──► crawl::fetcher ──► crawl::extract ──► Page
//!                                                                          │
//! Page ──► ingestion::chunk ──► embeddings::EmbeddingGateway ──► stores::SqliteChunkStore
//!                                                                          │
//! Query ──► agents::retrieval ──► agents::answer ──► workflow::ChatWorkflow
//!                                                     │
//!                                                     ├─► ChatResponse (one-shot)
//!                                                     └─► ChatEvent stream (sources, tokens, complete)
//! ```
//!
pub mod agents;
pub mod config;
pub mod crawl;
pub mod embeddings;
pub mod ingestion;
pub mod llm;
pub mod message;
pub mod stores;
pub mod types;
pub mod workflow;

pub use agents::{AnswerAgent, AnswerResponse, Grounding, RetrievalAgent, SearchResult, SourceRef};
pub use config::Settings;
pub use crawl::{CrawlLimits, CrawlScheduler, Fetcher, Page};
pub use embeddings::{EmbeddingGateway, EmbeddingProvider};
pub use ingestion::{chunk_page, Chunk, IndexReport, Indexer};
pub use llm::ChatModel;
pub use message::ChatTurn;
pub use stores::{ChunkRecord, SqliteChunkStore, VectorBackend};
pub use types::SiteChatError;
pub use workflow::{ChatEvent, ChatResponse, ChatWorkflow};
