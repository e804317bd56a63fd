//! Single-page fetching over HTTP.
//!
//! The fetcher never panics and never lets transport errors escape as
//! anything other than a tagged [`FetchFailure`]; the scheduler decides
//! whether a failure is fatal.

use std::time::Duration;

use reqwest::Client;
use url::Url;

use crate::types::{FetchFailure, SiteChatError};

/// Raw HTML of a successfully fetched page.
#[derive(Debug, Clone)]
pub struct FetchedHtml {
    pub url: Url,
    pub status: u16,
    pub content_type: String,
    pub body: String,
}

/// Fetches one URL at a time, applying a politeness delay before every
/// request. Each crawl worker owns the delay, so effective request rate
/// scales with worker count; run a single worker for a strictly global
/// delay.
#[derive(Clone, Debug)]
pub struct Fetcher {
    client: Client,
    timeout: Duration,
    delay: Duration,
}

impl Fetcher {
    pub fn new(timeout: Duration, delay: Duration) -> Result<Self, SiteChatError> {
        let client = Client::builder()
            .user_agent(concat!("sitechat/", env!("CARGO_PKG_VERSION")))
            .use_rustls_tls()
            .build()
            .map_err(|err| SiteChatError::Configuration(format!("http client: {err}")))?;
        Ok(Self {
            client,
            timeout,
            delay,
        })
    }

    /// Retrieves one URL, returning HTML or a tagged failure.
    ///
    /// Non-HTML responses are rejected by content-type header before any
    /// body parsing; binary bodies are never interpreted as text.
    pub async fn fetch(&self, url: &Url) -> Result<FetchedHtml, SiteChatError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let response = self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| fetch_error(url, classify(&err)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(url, FetchFailure::Http(status.as_u16())));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !content_type.to_ascii_lowercase().contains("text/html") {
            return Err(fetch_error(url, FetchFailure::NonHtml(content_type)));
        }

        let body = response
            .text()
            .await
            .map_err(|err| fetch_error(url, classify(&err)))?;

        Ok(FetchedHtml {
            url: url.clone(),
            status: status.as_u16(),
            content_type,
            body,
        })
    }
}

fn classify(err: &reqwest::Error) -> FetchFailure {
    if err.is_timeout() {
        FetchFailure::Timeout
    } else {
        FetchFailure::Connect(err.to_string())
    }
}

fn fetch_error(url: &Url, failure: FetchFailure) -> SiteChatError {
    SiteChatError::Fetch {
        url: url.to_string(),
        failure,
    }
}
