//! Server-sent events from OpenAI-compatible streaming chat endpoints.

use serde::Deserialize;
use serde_json::Value;

use crate::errors::{TransportError, TransportErrorKind};

/// One `data:` payload of a streaming chat completion.
#[derive(Debug, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub delta: Delta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Delta {
    #[serde(default)]
    pub content: Option<String>,
}

/// In-band error reported after the response headers were sent.
#[derive(Debug, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub code: Option<Value>,
    #[serde(default)]
    pub message: String,
}

impl ApiError {
    fn kind(&self) -> TransportErrorKind {
        let status = match &self.code {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.parse::<u64>().ok(),
            _ => None,
        };
        status
            .and_then(|s| u16::try_from(s).ok())
            .map(TransportErrorKind::from_status)
            .unwrap_or(TransportErrorKind::Other)
    }
}

/// What a single SSE line means to the chunk source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseLine {
    /// Text to hand to the decoder
    Content(String),
    /// `data: [DONE]`
    Done,
    Error(TransportError),
    /// Blank, comment, non-data field, or a payload without text
    Skip,
}

/// Interpret one line of an SSE body.
pub fn parse_line(line: &str) -> SseLine {
    let line = line.trim_end_matches('\r');
    if line.is_empty() || line.starts_with(':') {
        return SseLine::Skip;
    }

    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return SseLine::Done;
    }

    let chunk: StreamChunk = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            return SseLine::Error(TransportError::other(format!(
                "unparseable stream payload: {}",
                e
            )));
        }
    };

    if let Some(error) = chunk.error {
        let kind = error.kind();
        return SseLine::Error(TransportError::new(kind, error.message));
    }

    let text: String = chunk
        .choices
        .into_iter()
        .filter_map(|c| c.delta.content)
        .collect();
    if text.is_empty() {
        SseLine::Skip
    } else {
        SseLine::Content(text)
    }
}

/// Splits a byte stream into lines, holding partial lines (and any split
/// UTF-8 sequence) until their terminating `\n` arrives.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes and return every line completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line[..line.len() - 1]).into_owned());
        }
        lines
    }

    /// Remaining unterminated line, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}
