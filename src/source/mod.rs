//! Chunk sources feeding the decoder.
//!
//! | Source                | Used by                               |
//! |-----------------------|---------------------------------------|
//! | [`HttpConnector`]     | `filesmith generate` (live provider)  |
//! | [`ReplayConnector`]   | `filesmith decode` (recorded stream)  |
//! | [`ScriptedConnector`] | tests and demos (per-attempt scripts) |
//!
//! A connector opens one [`ChunkSource`] per attempt. Failures on connect
//! and mid-stream carry the same [`TransportErrorKind`](crate::errors::TransportErrorKind)
//! so the orchestrator classifies them the same way.

mod http;
mod replay;
mod scripted;
pub mod sse;

pub use http::{ChatMessage, HttpConnector};
pub use replay::{ReplayConnector, split_chunks};
pub use scripted::{AttemptScript, ScriptStep, ScriptedConnector};

use async_trait::async_trait;

use crate::errors::TransportError;

/// An ordered, finite stream of text chunks for a single attempt.
#[async_trait]
pub trait ChunkSource: Send {
    /// Next chunk, `Ok(None)` at a clean end of stream.
    async fn next_chunk(&mut self) -> Result<Option<String>, TransportError>;
}

/// Opens a fresh [`ChunkSource`] for each attempt.
#[async_trait]
pub trait ChunkConnector: Send + Sync {
    /// `attempt` is zero-based.
    async fn connect(&self, attempt: u32) -> Result<Box<dyn ChunkSource>, TransportError>;
}

/// In-memory source over pre-split chunks.
#[derive(Debug, Default)]
pub struct VecSource {
    chunks: std::collections::VecDeque<String>,
}

impl VecSource {
    pub fn new<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            chunks: chunks.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl ChunkSource for VecSource {
    async fn next_chunk(&mut self) -> Result<Option<String>, TransportError> {
        Ok(self.chunks.pop_front())
    }
}
