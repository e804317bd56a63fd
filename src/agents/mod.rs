//! The two-stage query pipeline: retrieve, then answer.
//!
//! [`retrieval::RetrievalAgent`] turns a query into ranked passages;
//! [`answer::AnswerAgent`] turns passages into a cited answer. The
//! orchestrator in [`crate::workflow`] composes the two and owns nothing
//! else.

pub mod answer;
pub mod retrieval;

pub use answer::{AnswerAgent, AnswerResponse, SourceRef};
pub use retrieval::{Grounding, RetrievalAgent, RetrievalOutcome};

use serde::{Deserialize, Serialize};

use crate::stores::ChunkRecord;

/// One ranked passage returned by retrieval.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub chunk_id: String,
    /// Cosine similarity against the query, higher is better.
    pub score: f32,
    pub url: String,
    pub title: String,
    pub heading: String,
    pub text: String,
}

impl SearchResult {
    pub fn from_record(record: ChunkRecord, score: f32) -> Self {
        Self {
            chunk_id: record.id,
            score,
            url: record.url,
            title: record.title,
            heading: record.heading,
            text: record.content,
        }
    }
}
