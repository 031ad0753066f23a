use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::{ChunkConnector, ChunkSource};
use crate::errors::TransportError;

/// One step of a scripted stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptStep {
    Chunk(String),
    /// Fail the read with this error
    Fail(TransportError),
    /// Wait before continuing
    Delay(Duration),
    /// Never produce another chunk
    Stall,
}

/// What a single attempt does.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptScript {
    /// The connection itself fails
    Refuse(TransportError),
    Stream(Vec<ScriptStep>),
}

impl AttemptScript {
    /// A stream that yields `chunks` then ends cleanly.
    pub fn chunks<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Stream(chunks.into_iter().map(|c| ScriptStep::Chunk(c.into())).collect())
    }

    /// A stream that yields `chunks` then fails with `error`.
    pub fn fail_after<I, S>(chunks: I, error: TransportError) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut steps: Vec<ScriptStep> = chunks.into_iter().map(|c| ScriptStep::Chunk(c.into())).collect();
        steps.push(ScriptStep::Fail(error));
        Self::Stream(steps)
    }
}

/// Connector driven by per-attempt scripts. Attempts past the end of the
/// list repeat the last script.
#[derive(Debug, Default)]
pub struct ScriptedConnector {
    scripts: Vec<AttemptScript>,
    connections: AtomicU32,
}

impl ScriptedConnector {
    pub fn new(scripts: Vec<AttemptScript>) -> Self {
        Self {
            scripts,
            connections: AtomicU32::new(0),
        }
    }

    /// How many times `connect` has been called.
    pub fn connections(&self) -> u32 {
        self.connections.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChunkConnector for ScriptedConnector {
    async fn connect(&self, attempt: u32) -> Result<Box<dyn ChunkSource>, TransportError> {
        self.connections.fetch_add(1, Ordering::SeqCst);

        let script = usize::try_from(attempt)
            .ok()
            .and_then(|i| self.scripts.get(i))
            .or_else(|| self.scripts.last());

        match script {
            None => Ok(Box::new(ScriptedSource::default())),
            Some(AttemptScript::Refuse(error)) => Err(error.clone()),
            Some(AttemptScript::Stream(steps)) => Ok(Box::new(ScriptedSource {
                steps: steps.iter().cloned().collect(),
            })),
        }
    }
}

#[derive(Debug, Default)]
struct ScriptedSource {
    steps: VecDeque<ScriptStep>,
}

#[async_trait]
impl ChunkSource for ScriptedSource {
    async fn next_chunk(&mut self) -> Result<Option<String>, TransportError> {
        while let Some(step) = self.steps.pop_front() {
            match step {
                ScriptStep::Chunk(text) => return Ok(Some(text)),
                ScriptStep::Fail(error) => return Err(error),
                ScriptStep::Delay(duration) => tokio::time::sleep(duration).await,
                ScriptStep::Stall => std::future::pending::<()>().await,
            }
        }
        Ok(None)
    }
}
