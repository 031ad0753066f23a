use std::collections::VecDeque;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use serde::Serialize;
use tracing::debug;

use super::sse::{LineBuffer, SseLine, parse_line};
use super::{ChunkConnector, ChunkSource};
use crate::config::ProviderConfig;
use crate::errors::{TransportError, TransportErrorKind};

/// A chat message in the request body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

/// Opens a streaming chat completion per attempt.
pub struct HttpConnector {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    request: ChatRequest,
}

impl HttpConnector {
    pub fn new(provider: &ProviderConfig, api_key: Option<String>, messages: Vec<ChatMessage>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(provider.connect_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", provider.base_url.trim_end_matches('/')),
            api_key,
            request: ChatRequest {
                model: provider.model.clone(),
                messages,
                temperature: provider.temperature,
                max_tokens: provider.max_tokens,
                stream: true,
            },
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn request_error(e: reqwest::Error) -> TransportError {
    if e.is_connect() || e.is_timeout() || e.is_request() {
        TransportError::connection_lost(e.to_string())
    } else {
        TransportError::other(e.to_string())
    }
}

fn excerpt(body: &str) -> &str {
    match body.char_indices().nth(200) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[async_trait]
impl ChunkConnector for HttpConnector {
    async fn connect(&self, attempt: u32) -> Result<Box<dyn ChunkSource>, TransportError> {
        debug!(attempt, endpoint = %self.endpoint, model = %self.request.model, "Opening completion stream");

        let mut builder = self
            .client
            .post(&self.endpoint)
            .header("X-Title", "filesmith")
            .json(&self.request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(request_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::new(
                TransportErrorKind::from_status(status.as_u16()),
                format!("HTTP {}: {}", status, excerpt(body.trim())),
            ));
        }

        let body = response.bytes_stream().map_ok(|bytes| bytes.to_vec()).boxed();
        Ok(Box::new(HttpChunkSource::new(body)))
    }
}

/// Chunk source over an SSE response body.
pub(crate) struct HttpChunkSource {
    body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    lines: LineBuffer,
    ready: VecDeque<String>,
    done: bool,
}

impl HttpChunkSource {
    pub(crate) fn new(body: BoxStream<'static, reqwest::Result<Vec<u8>>>) -> Self {
        Self {
            body,
            lines: LineBuffer::new(),
            ready: VecDeque::new(),
            done: false,
        }
    }

    fn handle_line(&mut self, line: &str) -> Result<(), TransportError> {
        if self.done {
            return Ok(());
        }
        match parse_line(line) {
            SseLine::Content(text) => self.ready.push_back(text),
            SseLine::Done => self.done = true,
            SseLine::Error(e) => return Err(e),
            SseLine::Skip => {}
        }
        Ok(())
    }
}

#[async_trait]
impl ChunkSource for HttpChunkSource {
    async fn next_chunk(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            if let Some(text) = self.ready.pop_front() {
                return Ok(Some(text));
            }
            if self.done {
                return Ok(None);
            }

            match self.body.next().await {
                Some(Ok(bytes)) => {
                    for line in self.lines.push(&bytes) {
                        self.handle_line(&line)?;
                    }
                }
                Some(Err(e)) => {
                    return Err(TransportError::connection_lost(format!(
                        "response body interrupted: {}",
                        e
                    )));
                }
                None => {
                    if let Some(rest) = self.lines.finish() {
                        self.handle_line(&rest)?;
                    }
                    self.done = true;
                }
            }
        }
    }
}
