//! Answer stage: grounded prompt construction and generation.
//!
//! The grounding contract is enforced here: when no passage clears the
//! relevance threshold, the agent returns [`AnswerAgent::INSUFFICIENT_INFORMATION`]
//! with zero sources and never calls the model. Fabricating an answer from
//! nothing is a correctness bug, not a style choice.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::agents::SearchResult;
use crate::llm::{ChatModel, TokenStream};
use crate::message::ChatTurn;
use crate::types::SiteChatError;

const SYSTEM_INSTRUCTION: &str = "\
You are a helpful assistant that answers questions based on website content.

Your task:
1. Answer the user's question using ONLY the information provided in the context
2. Be specific and cite which source you're using
3. If the context doesn't contain enough information, say so
4. Keep answers concise but complete
5. Always reference the source number when using information

Format your answer naturally, mentioning relevant source numbers inline like \
\"According to Source 1...\" or \"As mentioned in Source 2...\".";

/// One cited page: every section of it that contributed a passage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub title: String,
    pub url: String,
    /// Distinct headings of the contributing passages, in passage order.
    pub sections: Vec<String>,
}

/// A complete, non-streaming answer.
#[derive(Clone, Debug, PartialEq)]
pub struct AnswerResponse {
    pub answer: String,
    /// Pages the answer may cite, deduplicated by URL.
    pub sources: Vec<SourceRef>,
    /// The full ranked passage list, so callers never re-derive it.
    pub results: Vec<SearchResult>,
}

/// Generates cited answers from retrieved passages.
pub struct AnswerAgent {
    model: Arc<dyn ChatModel>,
    min_score: f32,
    max_history_turns: usize,
}

impl AnswerAgent {
    /// Canonical response when no passage clears the threshold.
    pub const INSUFFICIENT_INFORMATION: &'static str =
        "I don't have enough information in the indexed website content to answer that question.";

    pub fn new(model: Arc<dyn ChatModel>, min_score: f32) -> Self {
        Self {
            model,
            min_score,
            max_history_turns: 10,
        }
    }

    /// Generates a complete answer in one model call.
    pub async fn answer(
        &self,
        query: &str,
        history: &[ChatTurn],
        results: Vec<SearchResult>,
    ) -> Result<AnswerResponse, SiteChatError> {
        let relevant = self.relevant(&results);
        if relevant.is_empty() {
            info!(query, "no passage cleared the relevance threshold");
            return Ok(AnswerResponse {
                answer: Self::INSUFFICIENT_INFORMATION.to_string(),
                sources: Vec::new(),
                results,
            });
        }

        let messages = self.build_messages(query, history, &relevant);
        let answer = self.model.complete(&messages).await?;
        let sources = collect_sources(&relevant);
        Ok(AnswerResponse {
            answer,
            sources,
            results,
        })
    }

    /// Starts a streaming answer: the cited sources up front, then tokens.
    ///
    /// Below the threshold the canonical answer is streamed as a single
    /// token and the model is never invoked.
    pub async fn answer_stream(
        &self,
        query: &str,
        history: &[ChatTurn],
        results: &[SearchResult],
    ) -> Result<(Vec<SourceRef>, TokenStream), SiteChatError> {
        let relevant = self.relevant(results);
        if relevant.is_empty() {
            info!(query, "no passage cleared the relevance threshold");
            let stream: TokenStream = Box::pin(futures_util::stream::iter([Ok(
                Self::INSUFFICIENT_INFORMATION.to_string(),
            )]));
            return Ok((Vec::new(), stream));
        }

        let messages = self.build_messages(query, history, &relevant);
        let sources = collect_sources(&relevant);
        let stream = self.model.stream_completion(&messages).await?;
        Ok((sources, stream))
    }

    fn relevant(&self, results: &[SearchResult]) -> Vec<SearchResult> {
        let relevant: Vec<SearchResult> = results
            .iter()
            .filter(|result| result.score >= self.min_score)
            .cloned()
            .collect();
        debug!(
            total = results.len(),
            relevant = relevant.len(),
            min_score = self.min_score,
            "filtered passages"
        );
        relevant
    }

    fn build_messages(
        &self,
        query: &str,
        history: &[ChatTurn],
        relevant: &[SearchResult],
    ) -> Vec<ChatTurn> {
        let context = build_context(relevant);
        let prompt = format!(
            "Context from website:\n{context}\n\nUser Question: {query}\n\n\
             Please provide a comprehensive answer based on the context above. \
             Cite your sources by number."
        );

        let mut messages = Vec::with_capacity(history.len().min(self.max_history_turns) + 2);
        messages.push(ChatTurn::system(SYSTEM_INSTRUCTION));
        let clamp_from = history.len().saturating_sub(self.max_history_turns);
        messages.extend_from_slice(&history[clamp_from..]);
        messages.push(ChatTurn::user(prompt));
        messages
    }
}

/// Renders passages as numbered `[Source N]` context blocks.
fn build_context(relevant: &[SearchResult]) -> String {
    let mut blocks = Vec::with_capacity(relevant.len());
    for (i, result) in relevant.iter().enumerate() {
        let heading = if result.heading.is_empty() {
            String::new()
        } else {
            format!(" - {}", result.heading)
        };
        blocks.push(format!(
            "[Source {}] {}{}\nURL: {}\nContent: {}\n",
            i + 1,
            result.title,
            heading,
            result.url,
            result.text
        ));
    }
    blocks.join("\n")
}

/// Aggregates passages into per-page sources, first-seen order, with
/// distinct section headings.
fn collect_sources(relevant: &[SearchResult]) -> Vec<SourceRef> {
    let mut sources: Vec<SourceRef> = Vec::new();
    for result in relevant {
        let position = sources.iter().position(|s| s.url == result.url);
        let index = position.unwrap_or_else(|| {
            sources.push(SourceRef {
                title: result.title.clone(),
                url: result.url.clone(),
                sections: Vec::new(),
            });
            sources.len() - 1
        });
        let entry = &mut sources[index];
        if !result.heading.is_empty() && !entry.sections.contains(&result.heading) {
            entry.sections.push(result.heading.clone());
        }
    }
    sources
}
