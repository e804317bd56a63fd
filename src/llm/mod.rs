//! Chat model access behind the [`ChatModel`] seam.
//!
//! Answer generation only needs two operations: a whole completion and a
//! token-delta stream. [`openai::OpenAiChatModel`] is the shipped
//! implementation; [`MockChatModel`] scripts responses for tests.

pub mod openai;

pub use openai::OpenAiChatModel;

use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::Stream;

use crate::message::ChatTurn;
use crate::types::SiteChatError;

/// Token deltas as the model produces them.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, SiteChatError>> + Send>>;

/// External chat completion model.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Runs the conversation to completion and returns the full answer.
    async fn complete(&self, messages: &[ChatTurn]) -> Result<String, SiteChatError>;

    /// Streams the answer as token deltas.
    async fn stream_completion(&self, messages: &[ChatTurn]) -> Result<TokenStream, SiteChatError>;
}

/// Scripted chat model for tests.
///
/// Always answers with the configured text; the streaming variant yields it
/// word by word and counts every token produced, so tests can observe
/// whether a consumer kept pulling or walked away.
pub struct MockChatModel {
    answer: String,
    tokens_produced: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
}

impl MockChatModel {
    pub fn new(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            tokens_produced: Arc::new(AtomicUsize::new(0)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of tokens the streaming variant has produced so far.
    pub fn tokens_produced(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.tokens_produced)
    }

    /// Number of times either completion entry point was called.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl ChatModel for MockChatModel {
    async fn complete(&self, _messages: &[ChatTurn]) -> Result<String, SiteChatError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.answer.clone())
    }

    async fn stream_completion(
        &self,
        _messages: &[ChatTurn],
    ) -> Result<TokenStream, SiteChatError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let words: Vec<String> = self
            .answer
            .split_inclusive(' ')
            .map(|w| w.to_string())
            .collect();
        let counter = Arc::clone(&self.tokens_produced);
        let stream = futures_util::stream::iter(words.into_iter().map(move |word| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(word)
        }));
        Ok(Box::pin(stream))
    }
}
