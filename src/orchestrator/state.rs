use std::time::Duration;

use super::backoff::BackoffPolicy;
use crate::errors::TransportError;

/// Where a session is in its lifecycle.
///
/// `Attempting → Succeeded`, or `Attempting → Retrying → Attempting …`
/// until `Exhausted`. A fatal error moves straight to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Attempting,
    Retrying,
    Succeeded,
    Exhausted,
    Failed,
}

impl SessionPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Exhausted | Self::Failed)
    }
}

/// The attempt in progress (or about to start).
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptState {
    /// 1-based attempt number
    pub number: u32,
    pub delay_before_this_attempt: Duration,
    /// Error that ended the previous attempt
    pub last_error: Option<TransportError>,
}

impl AttemptState {
    fn first() -> Self {
        Self {
            number: 1,
            delay_before_this_attempt: Duration::ZERO,
            last_error: None,
        }
    }

    /// Zero-based index handed to connectors.
    pub fn index(&self) -> u32 {
        self.number - 1
    }
}

/// Result of recording a transient failure.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    Retry { delay: Duration },
    GiveUp { attempts: u32, last: TransportError },
}

/// Retry bookkeeping for one session.
#[derive(Debug, Clone)]
pub struct SessionState {
    backoff: BackoffPolicy,
    phase: SessionPhase,
    attempt: AttemptState,
    waited: Duration,
}

impl SessionState {
    pub fn new(backoff: BackoffPolicy) -> Self {
        Self {
            backoff,
            phase: SessionPhase::Attempting,
            attempt: AttemptState::first(),
            waited: Duration::ZERO,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn attempt(&self) -> &AttemptState {
        &self.attempt
    }

    /// Backoff time actually waited so far.
    pub fn waited(&self) -> Duration {
        self.waited
    }

    /// Record a retryable failure of the current attempt.
    pub fn record_transient(&mut self, error: TransportError) -> RetryDecision {
        if self.attempt.number >= self.backoff.max_attempts() {
            self.phase = SessionPhase::Exhausted;
            return RetryDecision::GiveUp {
                attempts: self.attempt.number,
                last: error,
            };
        }

        let next = self.attempt.number + 1;
        let delay = self.backoff.delay_before(next - 1);
        self.phase = SessionPhase::Retrying;
        self.attempt = AttemptState {
            number: next,
            delay_before_this_attempt: delay,
            last_error: Some(error),
        };
        RetryDecision::Retry { delay }
    }

    /// The backoff for the pending attempt has elapsed.
    pub fn begin_attempt(&mut self) {
        if self.phase == SessionPhase::Retrying {
            self.waited += self.attempt.delay_before_this_attempt;
        }
        self.phase = SessionPhase::Attempting;
    }

    pub fn succeed(&mut self) {
        self.phase = SessionPhase::Succeeded;
    }

    pub fn fail(&mut self) {
        self.phase = SessionPhase::Failed;
    }
}
