//! Upstream chat-completion backends.
//!
//! [`ChatBackend`] is the seam between the dispatcher and the network:
//! production uses [`OpenAiBackend`] (an OpenAI-compatible SSE client over
//! reqwest), tests substitute scripted mocks.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::config::Credential;
use crate::provider::Provider;
use crate::types::Message;
use crate::{OllamuxError, Result};

/// Open key-value bag of request options, forwarded verbatim upstream.
pub type OptionsMap = serde_json::Map<String, serde_json::Value>;

/// One event from an upstream token stream.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenDelta {
    /// A content fragment.
    Content(String),
    /// The upstream signalled end-of-stream.
    Done,
}

/// A remote backend capable of streaming chat completions.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Backend name for logging/debugging (matches the provider name).
    fn name(&self) -> &str;

    /// Open a streaming completion call.
    ///
    /// Errors returned here (and mid-stream) are transport errors the
    /// dispatch loop recovers from by failing over.
    async fn stream_chat(
        &self,
        model: &str,
        messages: &[Message],
        options: &OptionsMap,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<TokenDelta>> + Send>>>;
}

/// Referer header sent upstream, matching what local clients of the
/// emulated API would present.
const REFERER: &str = "http://localhost:11434";

/// OpenAI-compatible chat-completions client.
///
/// Speaks `POST {base_url}/chat/completions` with `stream: true` and parses
/// the SSE response line-wise. One instance per provider, sharing a single
/// `reqwest::Client` connection pool across the registry.
pub struct OpenAiBackend {
    name: String,
    base_url: String,
    credential: Credential,
    http: reqwest::Client,
}

impl OpenAiBackend {
    /// Build the backend for a configured provider, sharing `http`'s
    /// connection pool.
    pub fn for_provider(provider: &Provider, http: reqwest::Client) -> Self {
        Self {
            name: provider.name().to_string(),
            base_url: provider.base_url().trim_end_matches('/').to_string(),
            credential: provider.credential().clone(),
            http,
        }
    }

    /// A standalone backend (mainly for tests against a local server).
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        credential: Credential,
        http: reqwest::Client,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credential,
            http,
        }
    }

    /// A reqwest client with the timeout profile upstream calls need.
    pub fn default_http_client() -> reqwest::Client {
        reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build HTTP client")
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    #[serde(flatten)]
    options: &'a OptionsMap,
}

#[derive(Deserialize)]
struct StreamEvent {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream_chat(
        &self,
        model: &str,
        messages: &[Message],
        options: &OptionsMap,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<TokenDelta>> + Send>>> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = CompletionRequest {
            model,
            messages,
            stream: true,
            options,
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(self.credential.expose())
            .header("HTTP-Referer", REFERER)
            .header("X-Title", "ollamux")
            .json(&request)
            .send()
            .await
            .map_err(|e| OllamuxError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(OllamuxError::Api {
                status: status.as_u16(),
                message: response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown error".into()),
            });
        }

        let mut body = response.bytes_stream();
        let deltas = async_stream::try_stream! {
            let mut buf = BytesMut::new();
            while let Some(chunk) = body.next().await {
                let chunk = chunk.map_err(|e| OllamuxError::Stream(e.to_string()))?;
                buf.extend_from_slice(&chunk);

                // SSE frames are newline-delimited; a partial line stays
                // buffered until its terminator arrives.
                while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                    let line = buf.split_to(pos + 1);
                    let line = std::str::from_utf8(&line)
                        .map_err(|e| OllamuxError::Stream(e.to_string()))?
                        .trim();
                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim();
                    if data == "[DONE]" {
                        yield TokenDelta::Done;
                        return;
                    }
                    let event: StreamEvent = serde_json::from_str(data)
                        .map_err(|e| OllamuxError::Stream(format!("malformed event: {e}")))?;
                    let delta = event
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|c| c.delta.content);
                    if let Some(content) = delta {
                        if !content.is_empty() {
                            trace!(len = content.len(), "upstream content delta");
                            yield TokenDelta::Content(content);
                        }
                    }
                }
            }
            // Upstream closed the connection without a [DONE] sentinel:
            // treat it as natural completion.
            yield TokenDelta::Done;
        };

        Ok(Box::pin(deltas))
    }
}
