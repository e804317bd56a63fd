//! Embedding model access.
//!
//! [`EmbeddingProvider`] is the seam to the external embedding model;
//! [`EmbeddingGateway`] layers batching and dimensionality verification on
//! top of any provider. A wrong-sized vector is a terminal
//! [`SiteChatError::Embedding`] error for the enclosing request; it is never
//! stored or searched with.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::SiteChatError;

/// External embedding model: text in, fixed-dimension vector out.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Identifier of the underlying model, for logs and telemetry.
    fn id(&self) -> &str;

    /// Dimensionality every returned vector must have.
    fn dimensions(&self) -> usize;

    /// Embeds a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SiteChatError>;
}

/// Batches requests to a provider and verifies its output shape.
#[derive(Clone)]
pub struct EmbeddingGateway {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
}

impl EmbeddingGateway {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, batch_size: usize) -> Self {
        Self {
            provider,
            batch_size: batch_size.max(1),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    /// Embeds texts in provider-sized batches, preserving input order.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SiteChatError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let embedded = self.provider.embed(batch).await?;
            if embedded.len() != batch.len() {
                return Err(SiteChatError::Embedding(format!(
                    "model '{}' returned {} vectors for {} inputs",
                    self.provider.id(),
                    embedded.len(),
                    batch.len()
                )));
            }
            for vector in &embedded {
                if vector.len() != self.provider.dimensions() {
                    return Err(SiteChatError::Embedding(format!(
                        "model '{}' returned {}-dimensional vector, expected {}",
                        self.provider.id(),
                        vector.len(),
                        self.provider.dimensions()
                    )));
                }
            }
            vectors.extend(embedded);
        }
        debug!(count = vectors.len(), model = self.provider.id(), "embedded texts");
        Ok(vectors)
    }

    /// Embeds a single query string.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, SiteChatError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| SiteChatError::Embedding("model returned no vector".to_string()))
    }
}

/// OpenAI-compatible `/v1/embeddings` client.
pub struct OpenAiEmbeddings {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    dimensions: usize,
    timeout: Duration,
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

impl OpenAiEmbeddings {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            dimensions,
            timeout: Duration::from_secs(30),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    fn id(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SiteChatError> {
        let url = format!("{}/v1/embeddings", self.base_url.trim_end_matches('/'));
        let request = EmbeddingsRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|err| SiteChatError::Embedding(format!("request failed: {err}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SiteChatError::Embedding(format!(
                "embeddings API returned {status}: {body}"
            )));
        }

        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|err| SiteChatError::Embedding(format!("unparsable response: {err}")))?;

        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

/// Deterministic embedding provider for tests and offline runs.
///
/// Vectors are derived from a seeded hash of the input text: identical
/// texts always embed identically, distinct texts almost never collide.
pub struct MockEmbeddingProvider {
    dimensions: usize,
}

impl MockEmbeddingProvider {
    pub fn new() -> Self {
        Self { dimensions: 16 }
    }

    pub fn with_dimensions(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        // FNV-1a seed, then a splitmix-style stream per dimension.
        let mut seed: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in text.as_bytes() {
            seed ^= u64::from(*byte);
            seed = seed.wrapping_mul(0x0000_0100_0000_01b3);
        }
        let mut vector = Vec::with_capacity(self.dimensions);
        let mut state = seed;
        for _ in 0..self.dimensions {
            state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
            let mut z = state;
            z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
            z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
            z ^= z >> 31;
            vector.push(((z % 2000) as f32 / 1000.0) - 1.0);
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    fn id(&self) -> &str {
        "mock-embeddings"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SiteChatError> {
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct WrongShapeProvider;

    #[async_trait]
    impl EmbeddingProvider for WrongShapeProvider {
        fn id(&self) -> &str {
            "wrong-shape"
        }
        fn dimensions(&self) -> usize {
            4
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SiteChatError> {
            Ok(texts.iter().map(|_| vec![0.0; 3]).collect())
        }
    }

    #[tokio::test]
    async fn mock_embeddings_are_deterministic() {
        let provider = MockEmbeddingProvider::new();
        let inputs = vec!["hello".to_string(), "world".to_string(), "hello".to_string()];
        let first = provider.embed(&inputs).await.unwrap();
        let second = provider.embed(&inputs).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0], first[2]);
        assert_ne!(first[0], first[1]);
    }

    #[tokio::test]
    async fn gateway_preserves_order_across_batches() {
        let gateway = EmbeddingGateway::new(Arc::new(MockEmbeddingProvider::new()), 2);
        let texts: Vec<String> = (0..5).map(|i| format!("text {i}")).collect();
        let batched = gateway.embed_batch(&texts).await.unwrap();
        let unbatched = EmbeddingGateway::new(Arc::new(MockEmbeddingProvider::new()), 64)
            .embed_batch(&texts)
            .await
            .unwrap();
        assert_eq!(batched, unbatched);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_an_embedding_error() {
        let gateway = EmbeddingGateway::new(Arc::new(WrongShapeProvider), 8);
        let err = gateway.embed_query("q").await.unwrap_err();
        assert!(matches!(err, SiteChatError::Embedding(_)));
    }

    #[tokio::test]
    async fn mock_vectors_are_unit_length() {
        let provider = MockEmbeddingProvider::with_dimensions(8);
        let vector = provider.embed(&["abc".to_string()]).await.unwrap().remove(0);
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }
}
