pub mod backoff;
pub mod runner;
pub mod state;

pub use backoff::BackoffPolicy;
pub use runner::{RetryOrchestrator, SessionReport};
pub use state::{AttemptState, RetryDecision, SessionPhase, SessionState};
