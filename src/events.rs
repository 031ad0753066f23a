//! Session events and the non-blocking queue that carries them to displays.
//!
//! The orchestrator never waits on a consumer. Events go into an unbounded
//! queue; a slow consumer only sees fewer `ArtifactProgress` updates, because
//! a queued progress event is overwritten by a newer one for the same
//! artifact. Every other event is delivered exactly once and in order.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::Notify;

use crate::artifact::ArtifactSet;
use crate::validate::RejectReason;

/// Everything a display collaborator can observe about a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A new attempt began; any provisional display state is stale.
    AttemptStarted { attempt: u32 },
    /// The attempt failed transiently and another will follow after `delay_ms`.
    Retrying {
        attempt: u32,
        delay_ms: u64,
        error: String,
        /// Artifacts from the failed attempt that were dropped
        discarded: usize,
    },
    ArtifactStarted { name: String, sequence_index: usize },
    ArtifactProgress { name: String, content: String },
    ArtifactCompleted { name: String, content: String },
    ArtifactRejected { name: String, reason: RejectReason },
    NarrativeText { text: String },
    SessionSucceeded { artifacts: ArtifactSet },
    SessionFailed { reason: String },
}

impl SessionEvent {
    /// Whether this event ends the session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::SessionSucceeded { .. } | Self::SessionFailed { .. })
    }
}

/// Receiver of session events. `emit` must never block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: SessionEvent);
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: SessionEvent) {}
}

#[derive(Debug, Default)]
struct QueueState {
    events: VecDeque<SessionEvent>,
    closed: bool,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<QueueState>,
    notify: Notify,
}

/// Cloneable handle to a shared, unbounded event queue.
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    shared: Arc<Shared>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        // A panic while holding the lock cannot leave the queue half-updated
        self.shared
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Enqueue an event without waiting.
    ///
    /// Progress for an artifact replaces a progress event for the same
    /// artifact still waiting at the back of the queue.
    pub fn publish(&self, event: SessionEvent) {
        {
            let mut state = self.state();
            if state.closed {
                return;
            }

            if let SessionEvent::ArtifactProgress { name, .. } = &event {
                let queued = state
                    .events
                    .iter_mut()
                    .rev()
                    .take_while(|e| matches!(e, SessionEvent::ArtifactProgress { .. }))
                    .find(|e| matches!(e, SessionEvent::ArtifactProgress { name: n, .. } if n == name));
                if let Some(slot) = queued {
                    *slot = event;
                    return;
                }
            }

            state.events.push_back(event);
        }
        self.shared.notify.notify_waiters();
    }

    /// Stop accepting events. Queued events can still be received.
    pub fn close(&self) {
        self.state().closed = true;
        self.shared.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    pub fn try_recv(&self) -> Option<SessionEvent> {
        self.state().events.pop_front()
    }

    /// Wait for the next event. Returns `None` once the queue is closed and
    /// empty.
    pub async fn recv(&self) -> Option<SessionEvent> {
        loop {
            let notified = self.shared.notify.notified();
            {
                let mut state = self.state();
                if let Some(event) = state.events.pop_front() {
                    return Some(event);
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Take every queued event.
    pub fn drain(&self) -> Vec<SessionEvent> {
        self.state().events.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.state().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for EventQueue {
    fn emit(&self, event: SessionEvent) {
        self.publish(event);
    }
}
