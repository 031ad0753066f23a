//! Typed error hierarchy for filesmith.
//!
//! Four enums cover the subsystems:
//! - `TransportError`: failures reported by a chunk source or connector
//! - `DecodeError`: a stream that ended in the middle of an artifact
//! - `ArtifactSetError`: invariant violations when building an artifact set
//! - `SessionError`: terminal outcomes of a generation session

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a transport failure.
///
/// Only `RateLimited` and `ServerBusy` are retryable; everything else ends
/// the session immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    RateLimited,
    ServerBusy,
    ConnectionLost,
    Other,
}

impl TransportErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::RateLimited | Self::ServerBusy)
    }

    /// Map an HTTP status code onto a transport error kind.
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => Self::RateLimited,
            503 | 529 => Self::ServerBusy,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimited => write!(f, "rate limited"),
            Self::ServerBusy => write!(f, "server busy"),
            Self::ConnectionLost => write!(f, "connection lost"),
            Self::Other => write!(f, "transport error"),
        }
    }
}

/// A failure reported while acquiring or reading a chunk source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::RateLimited, message)
    }

    pub fn server_busy(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::ServerBusy, message)
    }

    pub fn connection_lost(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::ConnectionLost, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Other, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Errors from the artifact decoder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Stream ended before artifact '{name}' was closed ({partial_len} bytes discarded)")]
    Truncated { name: String, partial_len: usize },
}

/// Errors from inserting into an artifact set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArtifactSetError {
    #[error("Artifact '{name}' is already in the set")]
    Duplicate { name: String },

    #[error("Artifact '{name}' is still pending")]
    NotComplete { name: String },
}

/// Terminal failure of a generation session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: TransportError },

    #[error("Fatal transport error on attempt {attempt}: {source}")]
    Transport {
        attempt: u32,
        #[source]
        source: TransportError,
    },

    #[error(transparent)]
    Truncated(#[from] DecodeError),

    #[error("Stream completed without the primary artifact '{name}'")]
    MissingPrimary { name: String },

    #[error("Session timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Session cancelled")]
    Cancelled,
}

impl SessionError {
    /// Number of attempts made before the failure, when known.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::RetriesExhausted { attempts, .. } => Some(*attempts),
            Self::Transport { attempt, .. } => Some(*attempt),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_rate_limited_and_server_busy_are_retryable() {
        assert!(TransportErrorKind::RateLimited.is_retryable());
        assert!(TransportErrorKind::ServerBusy.is_retryable());
        assert!(!TransportErrorKind::ConnectionLost.is_retryable());
        assert!(!TransportErrorKind::Other.is_retryable());
    }

    #[test]
    fn status_codes_map_to_kinds() {
        assert_eq!(TransportErrorKind::from_status(429), TransportErrorKind::RateLimited);
        assert_eq!(TransportErrorKind::from_status(503), TransportErrorKind::ServerBusy);
        assert_eq!(TransportErrorKind::from_status(529), TransportErrorKind::ServerBusy);
        assert_eq!(TransportErrorKind::from_status(500), TransportErrorKind::Other);
        assert_eq!(TransportErrorKind::from_status(401), TransportErrorKind::Other);
    }

    #[test]
    fn transport_error_display_includes_kind_and_message() {
        let err = TransportError::rate_limited("slow down");
        assert_eq!(err.to_string(), "rate limited: slow down");
        assert!(err.is_retryable());
    }

    #[test]
    fn retries_exhausted_carries_attempts_and_last_error() {
        let err = SessionError::RetriesExhausted {
            attempts: 4,
            last: TransportError::server_busy("503"),
        };
        assert_eq!(err.attempts(), Some(4));
        assert!(err.to_string().contains("4 attempts"));
        assert!(err.to_string().contains("server busy"));
    }

    #[test]
    fn session_error_converts_from_decode_error() {
        let inner = DecodeError::Truncated {
            name: "popup.js".to_string(),
            partial_len: 12,
        };
        let err: SessionError = inner.into();
        match &err {
            SessionError::Truncated(DecodeError::Truncated { name, .. }) => {
                assert_eq!(name, "popup.js");
            }
            _ => panic!("Expected SessionError::Truncated"),
        }
        assert!(err.to_string().contains("popup.js"));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&TransportError::other("x"));
        assert_std_error(&DecodeError::Truncated {
            name: "a".into(),
            partial_len: 0,
        });
        assert_std_error(&ArtifactSetError::Duplicate { name: "a".into() });
        assert_std_error(&SessionError::Cancelled);
    }
}
