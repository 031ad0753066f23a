//! Streaming artifact decoder.
//!
//! Turns an arbitrarily chunked text stream into artifact events. The input
//! looks like:
//!
//! ```text
//! Some narrative text.
//! START-MARK: manifest.json
//! { ... }END-MARK: manifest.json
//! START-MARK: popup/popup.js
//! "use strict";
//! ...
//! END-MARK:
//! ```
//!
//! Chunk boundaries can fall anywhere, including inside a marker. The
//! decoder keeps one buffer of unconsumed input and only acts on a marker
//! once its whole line is present, so feeding the same text in any chunking
//! yields the same completed artifacts.

mod markers;

pub use markers::{DEFAULT_END_TOKEN, DEFAULT_START_TOKEN, MarkerSyntax};

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::artifact::{Artifact, ArtifactStatus};
use crate::errors::DecodeError;
use crate::normalize::{is_noise_name, normalize_artifact_name};
use markers::partial_suffix_len;

/// Events produced while decoding a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecoderEvent {
    /// A valid start delimiter opened a new artifact.
    ArtifactStarted { name: String, sequence_index: usize },
    /// Provisional content of the pending artifact grew.
    ArtifactProgress { name: String, content: String },
    /// The end delimiter closed the pending artifact.
    ArtifactCompleted(Artifact),
    /// Text outside any artifact.
    NarrativeText(String),
    /// The stream ended cleanly with no artifact pending.
    StreamEnded,
}

/// Buffer-owning state machine that reconstructs artifacts from chunks.
///
/// One decoder serves one attempt. [`ArtifactDecoder::finish`] consumes it,
/// so a decoder can never be reused after its stream ends.
#[derive(Debug)]
pub struct ArtifactDecoder {
    syntax: MarkerSyntax,
    buffer: String,
    current: Option<Artifact>,
    seen_names: HashSet<String>,
    emitted_count: usize,
    /// While an artifact is pending, no end token starts before this offset.
    scan_offset: usize,
    /// Length of the provisional content last reported.
    reported_len: usize,
    /// Whitespace-only narrative waiting for the rest of its run.
    held_narrative: String,
    /// The current narrative run has already produced an event.
    narrative_open: bool,
}

impl Default for ArtifactDecoder {
    fn default() -> Self {
        Self::new(MarkerSyntax::default())
    }
}

impl ArtifactDecoder {
    pub fn new(syntax: MarkerSyntax) -> Self {
        Self {
            syntax,
            buffer: String::new(),
            current: None,
            seen_names: HashSet::new(),
            emitted_count: 0,
            scan_offset: 0,
            reported_len: 0,
            held_narrative: String::new(),
            narrative_open: false,
        }
    }

    /// Create a decoder that treats `names` as already completed.
    ///
    /// Start delimiters for these names are ignored, which lets a retried
    /// attempt skip artifacts kept from an earlier one.
    pub fn with_seen_names<I, S>(syntax: MarkerSyntax, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut decoder = Self::new(syntax);
        decoder.seen_names = names.into_iter().map(Into::into).collect();
        decoder
    }

    /// The artifact currently being built, if any.
    pub fn current(&self) -> Option<&Artifact> {
        self.current.as_ref()
    }

    pub fn seen_names(&self) -> &HashSet<String> {
        &self.seen_names
    }

    /// Number of artifacts started so far.
    pub fn started_count(&self) -> usize {
        self.emitted_count
    }

    /// Bytes of input held but not yet consumed.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Append a chunk and return every event it makes decidable.
    pub fn feed(&mut self, chunk: &str) -> Vec<DecoderEvent> {
        self.buffer.push_str(chunk);

        let mut events = Vec::new();
        self.drive(&mut events, false);
        self.report_progress(&mut events);
        events
    }

    /// Signal end of stream.
    ///
    /// A pending artifact is completed only if its end delimiter is the last
    /// thing in the buffer; otherwise the stream was truncated and the
    /// partial artifact is discarded.
    pub fn finish(mut self) -> Result<Vec<DecoderEvent>, DecodeError> {
        let mut events = Vec::new();
        self.drive(&mut events, true);

        if let Some(current) = self.current.take() {
            let partial_len = self.buffer.len();
            warn!(artifact = %current.name, partial_len, "Stream ended inside artifact");
            return Err(DecodeError::Truncated {
                name: current.name,
                partial_len,
            });
        }

        let rest = std::mem::take(&mut self.buffer);
        self.push_narrative(rest, &mut events);
        self.end_narrative_run(&mut events);
        events.push(DecoderEvent::StreamEnded);
        Ok(events)
    }

    fn drive(&mut self, events: &mut Vec<DecoderEvent>, at_eof: bool) {
        loop {
            let progressed = if self.current.is_some() {
                self.scan_for_end(events, at_eof)
            } else {
                self.scan_for_start(events)
            };
            if !progressed {
                break;
            }
        }
    }

    /// Look for the next valid start delimiter. Returns true once an
    /// artifact has been opened.
    fn scan_for_start(&mut self, events: &mut Vec<DecoderEvent>) -> bool {
        let token_len = self.syntax.start.len();

        loop {
            let Some(pos) = self.buffer.find(self.syntax.start.as_str()) else {
                // Keep a tail that could still grow into a start token
                let keep = partial_suffix_len(&self.buffer, &self.syntax.start);
                self.flush_narrative(self.buffer.len() - keep, events);
                return false;
            };

            let after = pos + token_len;
            let Some(rel) = self.buffer[after..].find('\n') else {
                // Marker line not complete yet
                self.flush_narrative(pos, events);
                return false;
            };

            let raw_name = self.buffer[after..after + rel].to_string();
            self.flush_narrative(pos, events);
            self.end_narrative_run(events);
            self.buffer.drain(..token_len + rel + 1);

            let name = normalize_artifact_name(&raw_name);
            if is_noise_name(&name) {
                debug!(raw = %raw_name.trim(), "Skipping start marker with noise name");
                continue;
            }
            if self.seen_names.contains(&name) {
                warn!(artifact = %name, "Skipping start marker for already completed artifact");
                continue;
            }

            let sequence_index = self.emitted_count;
            self.emitted_count += 1;
            self.scan_offset = 0;
            self.reported_len = 0;
            debug!(artifact = %name, sequence_index, "Artifact started");
            events.push(DecoderEvent::ArtifactStarted {
                name: name.clone(),
                sequence_index,
            });
            self.current = Some(Artifact::pending(name, sequence_index));
            return true;
        }
    }

    /// Look for the end delimiter of the pending artifact. Returns true once
    /// the artifact has been completed.
    fn scan_for_end(&mut self, events: &mut Vec<DecoderEvent>, at_eof: bool) -> bool {
        let Some(name) = self.current.as_ref().map(|a| a.name.clone()) else {
            return false;
        };
        let token_len = self.syntax.end.len();
        let mut search_from = self.scan_offset;

        loop {
            let Some(rel) = self.buffer[search_from..].find(self.syntax.end.as_str()) else {
                let keep = if at_eof {
                    0
                } else {
                    partial_suffix_len(&self.buffer[search_from..], &self.syntax.end)
                };
                self.scan_offset = self.buffer.len() - keep;
                return false;
            };

            let pos = search_from + rel;
            let after = pos + token_len;
            let (line_end, consumed_end) = match self.buffer[after..].find('\n') {
                Some(nl) => (after + nl, after + nl + 1),
                None if at_eof => (self.buffer.len(), self.buffer.len()),
                None => {
                    // End line not complete yet
                    self.scan_offset = pos;
                    return false;
                }
            };

            let end_name = normalize_artifact_name(&self.buffer[after..line_end]);
            if !end_name.is_empty() && end_name != name {
                debug!(artifact = %name, end_name = %end_name, "End marker names another artifact; treating as content");
                search_from = consumed_end;
                continue;
            }

            let content = self.buffer[..pos].trim_end().to_string();
            self.buffer.drain(..consumed_end);
            self.scan_offset = 0;
            self.reported_len = 0;

            let Some(mut artifact) = self.current.take() else {
                return false;
            };
            artifact.content = content;
            artifact.status = ArtifactStatus::Complete;
            self.seen_names.insert(artifact.name.clone());
            debug!(artifact = %artifact.name, len = artifact.content.len(), "Artifact completed");
            events.push(DecoderEvent::ArtifactCompleted(artifact));
            return true;
        }
    }

    /// Publish the pending artifact's provisional content if it grew.
    fn report_progress(&mut self, events: &mut Vec<DecoderEvent>) {
        let Some(current) = self.current.as_mut() else {
            return;
        };
        if self.scan_offset <= self.reported_len {
            return;
        }

        // Each report clones the whole provisional content, so tiny chunks
        // cost O(n^2) in artifact size. The event queue coalesces progress.
        current.content = self.buffer[..self.scan_offset].to_string();
        self.reported_len = self.scan_offset;
        events.push(DecoderEvent::ArtifactProgress {
            name: current.name.clone(),
            content: current.content.clone(),
        });
    }

    fn flush_narrative(&mut self, end: usize, events: &mut Vec<DecoderEvent>) {
        if end == 0 {
            return;
        }
        let text: String = self.buffer.drain(..end).collect();
        self.push_narrative(text, events);
    }

    /// Emit narrative text verbatim. Whitespace-only pieces are held until
    /// the run produces visible text, so the concatenated narrative does not
    /// depend on chunking and runs that are entirely blank emit nothing.
    fn push_narrative(&mut self, text: String, events: &mut Vec<DecoderEvent>) {
        if text.trim().is_empty() {
            self.held_narrative.push_str(&text);
            return;
        }
        let text = if self.held_narrative.is_empty() {
            text
        } else {
            let mut joined = std::mem::take(&mut self.held_narrative);
            joined.push_str(&text);
            joined
        };
        self.narrative_open = true;
        events.push(DecoderEvent::NarrativeText(text));
    }

    /// Close the current narrative run at a start marker or end of stream.
    fn end_narrative_run(&mut self, events: &mut Vec<DecoderEvent>) {
        let held = std::mem::take(&mut self.held_narrative);
        if self.narrative_open && !held.is_empty() {
            events.push(DecoderEvent::NarrativeText(held));
        }
        self.narrative_open = false;
    }
}

/// Decode a complete text in one call. Convenience for tests and tools.
pub fn decode_all(syntax: MarkerSyntax, chunks: &[&str]) -> Result<Vec<DecoderEvent>, DecodeError> {
    let mut decoder = ArtifactDecoder::new(syntax);
    let mut events = Vec::new();
    for chunk in chunks {
        events.extend(decoder.feed(chunk));
    }
    events.extend(decoder.finish()?);
    Ok(events)
}
