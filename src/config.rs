//! Environment-driven configuration.
//!
//! Every knob has a documented default; the only hard requirement is the
//! model API key. Missing or unparsable required settings fail at startup
//! with [`SiteChatError::Configuration`] rather than surfacing later as a
//! runtime surprise.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::types::SiteChatError;

/// Runtime settings for crawling, chunking, and the query pipeline.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Base URL of the OpenAI-compatible model API.
    pub api_base: String,
    /// API key for the model endpoint. Required.
    pub api_key: String,
    /// Embedding model identifier.
    pub embedding_model: String,
    /// Dimensionality the embedding model is expected to return.
    pub embedding_dimensions: usize,
    /// Generation (chat) model identifier.
    pub chat_model: String,
    /// Path of the sqlite vector database.
    pub db_path: PathBuf,
    /// Table (collection) name chunks are stored under.
    pub collection: String,
    /// Maximum characters per chunk.
    pub chunk_size: usize,
    /// Characters of overlap between consecutive chunks. Must be smaller
    /// than `chunk_size`.
    pub chunk_overlap: usize,
    /// Maximum link depth from the base URL.
    pub max_crawl_depth: usize,
    /// Maximum number of pages indexed per crawl run.
    pub max_pages: usize,
    /// Delay each crawl worker waits before a fetch.
    pub crawl_delay: Duration,
    /// Number of concurrent crawl workers.
    pub crawl_concurrency: usize,
    /// Per-request timeout for page fetches.
    pub fetch_timeout: Duration,
    /// Number of texts sent to the embedding model per call.
    pub embed_batch_size: usize,
    /// Minimum similarity score a passage needs to count as grounding.
    pub min_score: f32,
    /// Default number of passages retrieved per query.
    pub top_k: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com".to_string(),
            api_key: String::new(),
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dimensions: 1536,
            chat_model: "gpt-4o-mini".to_string(),
            db_path: PathBuf::from("./sitechat.sqlite"),
            collection: "chunks".to_string(),
            chunk_size: 1000,
            chunk_overlap: 200,
            max_crawl_depth: 3,
            max_pages: 100,
            crawl_delay: Duration::from_millis(500),
            crawl_concurrency: 4,
            fetch_timeout: Duration::from_secs(10),
            embed_batch_size: 16,
            min_score: 0.25,
            top_k: 5,
        }
    }
}

impl Settings {
    /// Loads a `.env` file when present, then reads [`Settings::from_env`].
    pub fn load() -> Result<Self, SiteChatError> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Loads settings from `SITECHAT_*` environment variables, falling back
    /// to defaults for everything except the API key.
    pub fn from_env() -> Result<Self, SiteChatError> {
        let defaults = Settings::default();

        let api_key = env::var("SITECHAT_API_KEY").map_err(|_| {
            SiteChatError::Configuration("SITECHAT_API_KEY is required but not set".to_string())
        })?;

        let settings = Settings {
            api_base: string_var("SITECHAT_API_BASE", defaults.api_base),
            api_key,
            embedding_model: string_var("SITECHAT_EMBEDDING_MODEL", defaults.embedding_model),
            embedding_dimensions: parsed_var(
                "SITECHAT_EMBEDDING_DIMENSIONS",
                defaults.embedding_dimensions,
            )?,
            chat_model: string_var("SITECHAT_CHAT_MODEL", defaults.chat_model),
            db_path: env::var("SITECHAT_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            collection: string_var("SITECHAT_COLLECTION", defaults.collection),
            chunk_size: parsed_var("SITECHAT_CHUNK_SIZE", defaults.chunk_size)?,
            chunk_overlap: parsed_var("SITECHAT_CHUNK_OVERLAP", defaults.chunk_overlap)?,
            max_crawl_depth: parsed_var("SITECHAT_MAX_CRAWL_DEPTH", defaults.max_crawl_depth)?,
            max_pages: parsed_var("SITECHAT_MAX_PAGES", defaults.max_pages)?,
            crawl_delay: Duration::from_millis(parsed_var(
                "SITECHAT_CRAWL_DELAY_MS",
                defaults.crawl_delay.as_millis() as u64,
            )?),
            crawl_concurrency: parsed_var("SITECHAT_CRAWL_CONCURRENCY", defaults.crawl_concurrency)?,
            fetch_timeout: Duration::from_secs(parsed_var(
                "SITECHAT_FETCH_TIMEOUT_SECS",
                defaults.fetch_timeout.as_secs(),
            )?),
            embed_batch_size: parsed_var("SITECHAT_EMBED_BATCH_SIZE", defaults.embed_batch_size)?,
            min_score: parsed_var("SITECHAT_MIN_SCORE", defaults.min_score)?,
            top_k: parsed_var("SITECHAT_TOP_K", defaults.top_k)?,
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Rejects combinations that would misbehave at runtime.
    pub fn validate(&self) -> Result<(), SiteChatError> {
        if self.chunk_size == 0 {
            return Err(SiteChatError::Configuration(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(SiteChatError::Configuration(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.crawl_concurrency == 0 {
            return Err(SiteChatError::Configuration(
                "crawl_concurrency must be at least 1".to_string(),
            ));
        }
        if self.embed_batch_size == 0 {
            return Err(SiteChatError::Configuration(
                "embed_batch_size must be at least 1".to_string(),
            ));
        }
        if self.top_k == 0 {
            return Err(SiteChatError::Configuration(
                "top_k must be at least 1".to_string(),
            ));
        }
        if self.embedding_dimensions == 0 {
            return Err(SiteChatError::Configuration(
                "embedding_dimensions must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn string_var(key: &str, default: String) -> String {
    env::var(key).unwrap_or(default)
}

fn parsed_var<T: std::str::FromStr>(key: &str, default: T) -> Result<T, SiteChatError> {
    match env::var(key) {
        Ok(raw) => raw.parse::<T>().map_err(|_| {
            SiteChatError::Configuration(format!("{key} has unparsable value '{raw}'"))
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        Settings::default().validate().unwrap();
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let settings = Settings {
            chunk_size: 200,
            chunk_overlap: 200,
            ..Settings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(SiteChatError::Configuration(_))
        ));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let settings = Settings {
            crawl_concurrency: 0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn missing_api_key_is_a_startup_configuration_error() {
        env::remove_var("SITECHAT_API_KEY");
        let err = Settings::from_env().unwrap_err();
        assert!(matches!(err, SiteChatError::Configuration(_)));
        assert!(err.to_string().contains("SITECHAT_API_KEY"));
    }

    #[test]
    fn zero_top_k_is_rejected() {
        let settings = Settings {
            top_k: 0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }
}
