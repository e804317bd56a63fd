//! OpenAI-compatible `/v1/chat/completions` client, with SSE streaming.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::llm::{ChatModel, TokenStream};
use crate::message::ChatTurn;
use crate::types::SiteChatError;

pub struct OpenAiChatModel {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl OpenAiChatModel {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            timeout: Duration::from_secs(120),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.base_url.trim_end_matches('/')
        )
    }

    async fn send(
        &self,
        messages: &[ChatTurn],
        stream: bool,
    ) -> Result<reqwest::Response, SiteChatError> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            stream,
        };
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|err| SiteChatError::Generation(format!("request failed: {err}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SiteChatError::Generation(format!(
                "chat API returned {status}: {body}"
            )));
        }
        Ok(response)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatTurn],
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn complete(&self, messages: &[ChatTurn]) -> Result<String, SiteChatError> {
        let response = self.send(messages, false).await?;
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|err| SiteChatError::Generation(format!("unparsable response: {err}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| SiteChatError::Generation("model returned no content".to_string()))
    }

    async fn stream_completion(&self, messages: &[ChatTurn]) -> Result<TokenStream, SiteChatError> {
        let response = self.send(messages, true).await?;
        let stream = stream_lines(response.bytes_stream()).filter_map(|line| async move {
            match line {
                Ok(line) => parse_sse_line(&line),
                Err(err) => Some(Err(err)),
            }
        });
        Ok(Box::pin(stream))
    }
}

/// Parses one SSE line into a token delta. Returns `None` for lines that
/// carry no content: blank keep-alives, `[DONE]`, and role-only chunks.
fn parse_sse_line(line: &str) -> Option<Result<String, SiteChatError>> {
    let data = line.trim().strip_prefix("data: ")?.trim();
    if data == "[DONE]" {
        return None;
    }
    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => {
            let content = chunk
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.delta.content)
                .unwrap_or_default();
            if content.is_empty() {
                None
            } else {
                Some(Ok(content))
            }
        }
        Err(err) => Some(Err(SiteChatError::Generation(format!(
            "unparsable stream chunk: {err}"
        )))),
    }
}

/// Re-frames a byte stream into complete lines, buffering partial reads.
fn stream_lines(
    byte_stream: impl Stream<Item = reqwest::Result<bytes::Bytes>> + Send + 'static,
) -> impl Stream<Item = Result<String, SiteChatError>> + Send {
    futures_util::stream::unfold(
        (Box::pin(byte_stream), String::new()),
        |(mut stream, mut buffer)| async move {
            loop {
                if let Some(newline) = buffer.find('\n') {
                    let line = buffer[..newline].to_string();
                    buffer = buffer[newline + 1..].to_string();
                    if !line.trim().is_empty() {
                        return Some((Ok(line), (stream, buffer)));
                    }
                    continue;
                }
                match stream.next().await {
                    Some(Ok(bytes)) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                    }
                    Some(Err(err)) => {
                        return Some((
                            Err(SiteChatError::Generation(format!("stream read error: {err}"))),
                            (stream, buffer),
                        ));
                    }
                    None => {
                        if !buffer.trim().is_empty() {
                            let rest = std::mem::take(&mut buffer);
                            return Some((Ok(rest), (stream, buffer)));
                        }
                        return None;
                    }
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use httpmock::prelude::*;

    fn sse_body(deltas: &[&str]) -> String {
        let mut body = String::new();
        for delta in deltas {
            body.push_str(&format!(
                "data: {{\"choices\":[{{\"delta\":{{\"content\":\"{delta}\"}}}}]}}\n\n"
            ));
        }
        body.push_str("data: [DONE]\n\n");
        body
    }

    #[tokio::test]
    async fn complete_returns_the_message_content() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(200)
                    .header("content-type", "application/json")
                    .body(r#"{"choices":[{"message":{"content":"an answer"}}]}"#);
            })
            .await;

        let model = OpenAiChatModel::new(Client::new(), server.base_url(), "key", "test-model");
        let answer = model.complete(&[ChatTurn::user("q")]).await.unwrap();
        assert_eq!(answer, "an answer");
    }

    #[tokio::test]
    async fn stream_yields_token_deltas_in_order() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(200)
                    .header("content-type", "text/event-stream")
                    .body(sse_body(&["Hel", "lo ", "world"]));
            })
            .await;

        let model = OpenAiChatModel::new(Client::new(), server.base_url(), "key", "test-model");
        let mut stream = model
            .stream_completion(&[ChatTurn::user("q")])
            .await
            .unwrap();
        let mut collected = String::new();
        while let Some(token) = stream.next().await {
            collected.push_str(&token.unwrap());
        }
        assert_eq!(collected, "Hello world");
    }

    #[tokio::test]
    async fn api_error_status_is_a_generation_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(429).body("rate limited");
            })
            .await;

        let model = OpenAiChatModel::new(Client::new(), server.base_url(), "key", "test-model");
        let err = model.complete(&[ChatTurn::user("q")]).await.unwrap_err();
        assert!(matches!(err, SiteChatError::Generation(_)));
    }

    #[test]
    fn sse_parsing_skips_done_and_empty_deltas() {
        assert!(parse_sse_line("data: [DONE]").is_none());
        assert!(parse_sse_line(": keep-alive").is_none());
        assert!(parse_sse_line(r#"data: {"choices":[{"delta":{}}]}"#).is_none());
        let token = parse_sse_line(r#"data: {"choices":[{"delta":{"content":"hi"}}]}"#);
        assert_eq!(token.unwrap().unwrap(), "hi");
    }
}
