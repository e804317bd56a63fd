//! Query orchestration: retrieve, then answer, optionally streamed.
//!
//! [`ChatWorkflow`] composes the retrieval and answer agents and holds no
//! per-request state; chat history travels with each call. Streaming is a
//! producer-consumer contract over a bounded channel: the producer task
//! pushes [`ChatEvent`]s, a full channel applies backpressure, and a dropped
//! receiver fails the next send so the producer stops pulling tokens from
//! the model instead of generating into the void.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};

use crate::agents::{
    AnswerAgent, Grounding, RetrievalAgent, RetrievalOutcome, SearchResult, SourceRef,
};
use crate::message::ChatTurn;
use crate::stores::VectorBackend;
use crate::types::SiteChatError;

/// Events of one streaming query, in emission order: `Sources` first, then
/// zero or more `Token`s, then exactly one terminal `Complete` or `Error`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    Sources { sources: Vec<SourceRef> },
    Token { text: String },
    Complete,
    Error { message: String },
}

/// A complete, non-streaming query response.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatResponse {
    pub query: String,
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub results: Vec<SearchResult>,
    pub grounding: Grounding,
}

/// Size of the streaming event buffer; a slow consumer blocks the producer
/// rather than growing memory without bound.
const STREAM_BUFFER: usize = 16;

/// The two-stage query pipeline over one vector index.
pub struct ChatWorkflow<B> {
    retrieval: Arc<RetrievalAgent<B>>,
    answer: Arc<AnswerAgent>,
}

impl<B> Clone for ChatWorkflow<B> {
    fn clone(&self) -> Self {
        Self {
            retrieval: Arc::clone(&self.retrieval),
            answer: Arc::clone(&self.answer),
        }
    }
}

impl<B: VectorBackend + 'static> ChatWorkflow<B> {
    pub fn new(retrieval: RetrievalAgent<B>, answer: AnswerAgent) -> Self {
        Self {
            retrieval: Arc::new(retrieval),
            answer: Arc::new(answer),
        }
    }

    /// Retrieval without generation, for search-only callers. A `None`
    /// `top_k` uses the configured default.
    pub async fn search(
        &self,
        query: &str,
        top_k: Option<usize>,
    ) -> Result<RetrievalOutcome, SiteChatError> {
        self.retrieval.retrieve(query, top_k).await
    }

    /// Runs the full pipeline and returns the complete answer.
    pub async fn process_query(
        &self,
        query: &str,
        history: &[ChatTurn],
        top_k: Option<usize>,
    ) -> Result<ChatResponse, SiteChatError> {
        info!(query, "processing query");
        let outcome = self.retrieval.retrieve(query, top_k).await?;
        let grounding = outcome.grounding;
        let response = self.answer.answer(query, history, outcome.results).await?;
        Ok(ChatResponse {
            query: query.to_string(),
            answer: response.answer,
            sources: response.sources,
            results: response.results,
            grounding,
        })
    }

    /// Runs the full pipeline, streaming events to the returned receiver.
    ///
    /// The producer task ends when it has emitted a terminal event or when
    /// the receiver is dropped, whichever comes first.
    pub fn process_query_stream(
        &self,
        query: String,
        history: Vec<ChatTurn>,
        top_k: Option<usize>,
    ) -> flume::Receiver<ChatEvent> {
        let (tx, rx) = flume::bounded(STREAM_BUFFER);
        let workflow = self.clone();
        tokio::spawn(async move {
            workflow.run_stream(query, history, top_k, tx).await;
        });
        rx
    }

    async fn run_stream(
        &self,
        query: String,
        history: Vec<ChatTurn>,
        top_k: Option<usize>,
        tx: flume::Sender<ChatEvent>,
    ) {
        use futures_util::StreamExt;

        let outcome = match self.retrieval.retrieve(&query, top_k).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(error = %err, "retrieval failed mid-stream");
                let _ = tx
                    .send_async(ChatEvent::Error {
                        message: err.to_string(),
                    })
                    .await;
                return;
            }
        };

        let (sources, mut tokens) = match self
            .answer
            .answer_stream(&query, &history, &outcome.results)
            .await
        {
            Ok(started) => started,
            Err(err) => {
                error!(error = %err, "generation failed to start");
                let _ = tx
                    .send_async(ChatEvent::Error {
                        message: err.to_string(),
                    })
                    .await;
                return;
            }
        };

        if tx.send_async(ChatEvent::Sources { sources }).await.is_err() {
            return;
        }

        while let Some(token) = tokens.next().await {
            let event = match token {
                Ok(text) => ChatEvent::Token { text },
                Err(err) => {
                    error!(error = %err, "generation failed mid-stream");
                    let _ = tx
                        .send_async(ChatEvent::Error {
                            message: err.to_string(),
                        })
                        .await;
                    return;
                }
            };
            // A dropped receiver fails the send; stop pulling tokens.
            if tx.send_async(event).await.is_err() {
                return;
            }
        }

        let _ = tx.send_async(ChatEvent::Complete).await;
    }
}
