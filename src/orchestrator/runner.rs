use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use super::backoff::BackoffPolicy;
use super::state::{RetryDecision, SessionState};
use crate::artifact::{Artifact, ArtifactSet};
use crate::config::{AttemptPolicy, SessionConfig};
use crate::decoder::{ArtifactDecoder, DecoderEvent};
use crate::errors::{DecodeError, SessionError, TransportError};
use crate::events::{EventSink, SessionEvent};
use crate::normalize::strip_code_fences;
use crate::source::ChunkConnector;
use crate::validate::{ArtifactValidator, Verdict};

/// Outcome of a successful session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub artifacts: ArtifactSet,
    /// Attempts made, including the successful one
    pub attempts: u32,
    /// Total backoff waited between attempts
    pub waited: Duration,
}

/// Why a single attempt stopped early.
#[derive(Debug)]
enum AttemptFailure {
    Transport(TransportError),
    Truncated(DecodeError),
}

impl From<TransportError> for AttemptFailure {
    fn from(e: TransportError) -> Self {
        AttemptFailure::Transport(e)
    }
}

impl From<DecodeError> for AttemptFailure {
    fn from(e: DecodeError) -> Self {
        AttemptFailure::Truncated(e)
    }
}

/// Drives attempts against a [`ChunkConnector`] until the stream completes
/// with the primary artifact, a fatal error occurs, or attempts run out.
///
/// Each attempt gets a fresh decoder. Completed artifacts are validated
/// before joining the set; rejected ones are reported and skipped.
/// Cancellation and the session timeout preempt both backoff waits and
/// in-flight reads.
pub struct RetryOrchestrator {
    config: SessionConfig,
    validator: ArtifactValidator,
    backoff: BackoffPolicy,
    cancel: CancellationToken,
}

impl RetryOrchestrator {
    pub fn new(config: SessionConfig) -> Self {
        let validator = ArtifactValidator::new(config.validation.clone());
        let backoff = BackoffPolicy::new(config.backoff_base, config.max_attempts);
        Self {
            config,
            validator,
            backoff,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that cancels any session run by this orchestrator.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn backoff(&self) -> BackoffPolicy {
        self.backoff
    }

    /// Run one generation session. A terminal `SessionSucceeded` or
    /// `SessionFailed` event is always the last event emitted.
    pub async fn run(
        &self,
        connector: &dyn ChunkConnector,
        sink: &dyn EventSink,
    ) -> Result<SessionReport, SessionError> {
        let session_id = Uuid::new_v4();
        let span = info_span!("session", %session_id);

        let outcome = self
            .drive(session_id, connector, sink)
            .instrument(span.clone())
            .await;

        let _entered = span.enter();
        match &outcome {
            Ok(report) => {
                info!(
                    attempts = report.attempts,
                    artifacts = report.artifacts.len(),
                    waited_ms = report.waited.as_millis() as u64,
                    "Session succeeded"
                );
                sink.emit(SessionEvent::SessionSucceeded {
                    artifacts: report.artifacts.clone(),
                });
            }
            Err(e) => {
                error!(error = %e, "Session failed");
                sink.emit(SessionEvent::SessionFailed { reason: e.to_string() });
            }
        }
        outcome
    }

    async fn drive(
        &self,
        session_id: Uuid,
        connector: &dyn ChunkConnector,
        sink: &dyn EventSink,
    ) -> Result<SessionReport, SessionError> {
        let deadline = self.config.timeout.map(|t| Instant::now() + t);
        let mut state = SessionState::new(self.backoff);
        let mut artifacts = ArtifactSet::new();

        loop {
            let delay = state.attempt().delay_before_this_attempt;
            if !delay.is_zero() {
                self.guard(tokio::time::sleep(delay), deadline).await?;
            }
            state.begin_attempt();

            let number = state.attempt().number;
            info!(attempt = number, "Attempt started");
            sink.emit(SessionEvent::AttemptStarted { attempt: number });

            let result = self
                .guard(
                    self.run_attempt(connector, state.attempt().index(), &mut artifacts, sink),
                    deadline,
                )
                .await?;

            match result {
                Ok(()) => {
                    if !artifacts.contains(&self.config.primary_artifact) {
                        state.fail();
                        return Err(SessionError::MissingPrimary {
                            name: self.config.primary_artifact.clone(),
                        });
                    }
                    state.succeed();
                    return Ok(SessionReport {
                        session_id,
                        artifacts,
                        attempts: number,
                        waited: state.waited(),
                    });
                }
                Err(AttemptFailure::Truncated(e)) => {
                    state.fail();
                    return Err(SessionError::Truncated(e));
                }
                Err(AttemptFailure::Transport(e)) if e.is_retryable() => {
                    let message = e.to_string();
                    match state.record_transient(e) {
                        RetryDecision::GiveUp { attempts, last } => {
                            warn!(attempts, error = %last, "Retries exhausted");
                            return Err(SessionError::RetriesExhausted { attempts, last });
                        }
                        RetryDecision::Retry { delay } => {
                            let discarded = match self.config.attempt_policy {
                                AttemptPolicy::RestartFromZero => std::mem::take(&mut artifacts).len(),
                                AttemptPolicy::KeepConfirmed => 0,
                            };
                            warn!(
                                attempt = number,
                                delay_ms = delay.as_millis() as u64,
                                discarded,
                                error = %message,
                                "Transient failure, will retry after backoff"
                            );
                            sink.emit(SessionEvent::Retrying {
                                attempt: number,
                                delay_ms: delay.as_millis() as u64,
                                error: message,
                                discarded,
                            });
                        }
                    }
                }
                Err(AttemptFailure::Transport(e)) => {
                    state.fail();
                    return Err(SessionError::Transport {
                        attempt: number,
                        source: e,
                    });
                }
            }
        }
    }

    /// Race `fut` against cancellation and the session deadline.
    async fn guard<F: Future>(&self, fut: F, deadline: Option<Instant>) -> Result<F::Output, SessionError> {
        let expired = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(SessionError::Cancelled),
            _ = expired => Err(SessionError::TimedOut(self.config.timeout.unwrap_or_default())),
            out = fut => Ok(out),
        }
    }

    async fn run_attempt(
        &self,
        connector: &dyn ChunkConnector,
        index: u32,
        artifacts: &mut ArtifactSet,
        sink: &dyn EventSink,
    ) -> Result<(), AttemptFailure> {
        let mut source = connector.connect(index).await?;

        let mut decoder = match self.config.attempt_policy {
            AttemptPolicy::RestartFromZero => ArtifactDecoder::new(self.config.markers.clone()),
            AttemptPolicy::KeepConfirmed => {
                ArtifactDecoder::with_seen_names(self.config.markers.clone(), artifacts.names())
            }
        };

        while let Some(chunk) = source.next_chunk().await? {
            for event in decoder.feed(&chunk) {
                self.handle_event(event, artifacts, sink);
            }
        }

        for event in decoder.finish()? {
            self.handle_event(event, artifacts, sink);
        }
        Ok(())
    }

    fn handle_event(&self, event: DecoderEvent, artifacts: &mut ArtifactSet, sink: &dyn EventSink) {
        match event {
            DecoderEvent::ArtifactStarted { name, sequence_index } => {
                sink.emit(SessionEvent::ArtifactStarted { name, sequence_index });
            }
            DecoderEvent::ArtifactProgress { name, content } => {
                sink.emit(SessionEvent::ArtifactProgress { name, content });
            }
            DecoderEvent::ArtifactCompleted(artifact) => self.accept_or_reject(artifact, artifacts, sink),
            DecoderEvent::NarrativeText(text) => {
                sink.emit(SessionEvent::NarrativeText { text });
            }
            DecoderEvent::StreamEnded => debug!("Stream ended cleanly"),
        }
    }

    fn accept_or_reject(&self, mut artifact: Artifact, artifacts: &mut ArtifactSet, sink: &dyn EventSink) {
        if self.config.validation.strip_code_fences {
            artifact.content = strip_code_fences(&artifact.content);
        }

        match self.validator.validate(&artifact) {
            Verdict::Accept => {
                let name = artifact.name.clone();
                let content = artifact.content.clone();
                match artifacts.insert(artifact) {
                    Ok(()) => {
                        info!(artifact = %name, len = content.len(), "Artifact accepted");
                        sink.emit(SessionEvent::ArtifactCompleted { name, content });
                    }
                    Err(e) => warn!(artifact = %name, error = %e, "Artifact not added"),
                }
            }
            Verdict::Reject(reason) => {
                warn!(artifact = %artifact.name, %reason, "Artifact rejected");
                sink.emit(SessionEvent::ArtifactRejected {
                    name: artifact.name,
                    reason,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::MarkerSyntax;
    use crate::events::EventQueue;
    use crate::source::{AttemptScript, ReplayConnector, ScriptStep, ScriptedConnector};
    use crate::validate::{RejectReason, ValidationPolicy};

    const MANIFEST: &str = r#"{
  "manifest_version": 3,
  "name": "Tab Counter",
  "version": "1.0.0",
  "action": { "default_popup": "popup.html" }
}"#;

    const SCRIPT: &str = "\"use strict\";\n\ndocument.addEventListener('DOMContentLoaded', () => {\n  console.log('ready');\n});";

    fn file(name: &str, content: &str) -> String {
        format!("START-MARK: {}\n{}\nEND-MARK: {}\n", name, content, name)
    }

    fn full_stream() -> String {
        format!(
            "Here are your files.\n{}{}Done.\n",
            file("manifest.json", MANIFEST),
            file("popup.js", SCRIPT)
        )
    }

    fn config(max_attempts: u32, base_ms: u64) -> SessionConfig {
        SessionConfig {
            max_attempts,
            backoff_base: Duration::from_millis(base_ms),
            timeout: None,
            ..SessionConfig::default()
        }
    }

    fn names(report: &SessionReport) -> Vec<String> {
        report.artifacts.names().map(String::from).collect()
    }

    fn count<F: Fn(&SessionEvent) -> bool>(events: &[SessionEvent], f: F) -> usize {
        events.iter().filter(|e| f(e)).count()
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let orchestrator = RetryOrchestrator::new(config(4, 100));
        let connector = ReplayConnector::new(&full_stream(), 7);
        let queue = EventQueue::new();

        let report = orchestrator.run(&connector, &queue).await.unwrap();
        assert_eq!(report.attempts, 1);
        assert_eq!(report.waited, Duration::ZERO);
        assert_eq!(names(&report), vec!["manifest.json", "popup.js"]);
        assert_eq!(report.artifacts.get("popup.js").unwrap().content, SCRIPT);

        let events = queue.drain();
        assert_eq!(events.first(), Some(&SessionEvent::AttemptStarted { attempt: 1 }));
        assert!(matches!(events.last(), Some(SessionEvent::SessionSucceeded { artifacts }) if artifacts.len() == 2));
        assert!(count(&events, |e| matches!(e, SessionEvent::NarrativeText { .. })) >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_then_success() {
        let base = Duration::from_millis(100);
        for r in 0..4u32 {
            let mut scripts: Vec<AttemptScript> = (0..r)
                .map(|i| {
                    if i % 2 == 0 {
                        AttemptScript::Refuse(TransportError::rate_limited("429 Too Many Requests"))
                    } else {
                        AttemptScript::Refuse(TransportError::server_busy("503 Service Unavailable"))
                    }
                })
                .collect();
            scripts.push(AttemptScript::chunks([full_stream()]));
            let connector = ScriptedConnector::new(scripts);
            let orchestrator = RetryOrchestrator::new(config(4, 100));
            let queue = EventQueue::new();

            let start = Instant::now();
            let report = orchestrator.run(&connector, &queue).await.unwrap();
            let expected: Duration = (1..=r).map(|k| base * 2u32.pow(k)).sum();

            assert_eq!(report.attempts, r + 1);
            assert_eq!(report.waited, expected);
            assert_eq!(start.elapsed(), expected);
            assert_eq!(connector.connections(), r + 1);

            let events = queue.drain();
            assert_eq!(
                count(&events, |e| matches!(e, SessionEvent::Retrying { .. })),
                r as usize
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_after_max_attempts() {
        let connector = ScriptedConnector::new(vec![AttemptScript::Refuse(TransportError::server_busy(
            "529 overloaded",
        ))]);
        let orchestrator = RetryOrchestrator::new(config(4, 10));
        let queue = EventQueue::new();

        let err = orchestrator.run(&connector, &queue).await.unwrap_err();
        match err {
            SessionError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 4);
                assert_eq!(last.message, "529 overloaded");
            }
            other => panic!("Expected RetriesExhausted, got {:?}", other),
        }
        assert_eq!(connector.connections(), 4);

        let events = queue.drain();
        assert_eq!(count(&events, |e| matches!(e, SessionEvent::AttemptStarted { .. })), 4);
        assert_eq!(count(&events, |e| matches!(e, SessionEvent::Retrying { .. })), 3);
        assert!(matches!(events.last(), Some(SessionEvent::SessionFailed { .. })));
    }

    #[tokio::test]
    async fn test_fatal_errors_are_not_retried() {
        for error in [
            TransportError::other("401 Unauthorized"),
            TransportError::connection_lost("connection reset"),
        ] {
            let connector = ScriptedConnector::new(vec![
                AttemptScript::Refuse(error.clone()),
                AttemptScript::chunks([full_stream()]),
            ]);
            let orchestrator = RetryOrchestrator::new(config(4, 10));
            let err = orchestrator.run(&connector, &EventQueue::new()).await.unwrap_err();
            assert_eq!(err, SessionError::Transport { attempt: 1, source: error });
            assert_eq!(connector.connections(), 1);
        }
    }

    #[tokio::test]
    async fn test_missing_primary_is_fatal() {
        let connector = ScriptedConnector::new(vec![AttemptScript::chunks([file("popup.js", SCRIPT)])]);
        let orchestrator = RetryOrchestrator::new(config(4, 10));

        let err = orchestrator.run(&connector, &EventQueue::new()).await.unwrap_err();
        assert_eq!(
            err,
            SessionError::MissingPrimary {
                name: "manifest.json".to_string()
            }
        );
        assert_eq!(connector.connections(), 1);
    }

    #[tokio::test]
    async fn test_clean_end_with_pending_artifact_is_fatal() {
        let truncated = format!("{}START-MARK: popup.js\n{}", file("manifest.json", MANIFEST), SCRIPT);
        let connector = ScriptedConnector::new(vec![AttemptScript::chunks([truncated])]);
        let orchestrator = RetryOrchestrator::new(config(4, 10));
        let queue = EventQueue::new();

        let err = orchestrator.run(&connector, &queue).await.unwrap_err();
        assert!(matches!(err, SessionError::Truncated(DecodeError::Truncated { ref name, .. }) if name == "popup.js"));
        assert_eq!(connector.connections(), 1);

        let events = queue.drain();
        assert_eq!(
            count(&events, |e| matches!(e, SessionEvent::ArtifactCompleted { name, .. } if name == "popup.js")),
            0
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_mid_stream_transient_failure_is_retried() {
        let connector = ScriptedConnector::new(vec![
            AttemptScript::fail_after(
                ["START-MARK: manifest.json\n{\"manif"],
                TransportError::rate_limited("rate limited mid-stream"),
            ),
            AttemptScript::chunks([full_stream()]),
        ]);
        let orchestrator = RetryOrchestrator::new(config(4, 100));
        let queue = EventQueue::new();

        let report = orchestrator.run(&connector, &queue).await.unwrap();
        assert_eq!(report.attempts, 2);
        assert_eq!(report.waited, Duration::from_millis(200));
        assert_eq!(report.artifacts.get("manifest.json").unwrap().content, MANIFEST);

        let events = queue.drain();
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::Retrying { attempt: 1, delay_ms: 200, discarded: 0, .. }
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_policy_discards_earlier_artifacts() {
        let partial = format!("{}START-MARK: popup.js\n", file("manifest.json", MANIFEST));
        let connector = ScriptedConnector::new(vec![
            AttemptScript::fail_after([partial], TransportError::server_busy("503")),
            AttemptScript::chunks([full_stream()]),
        ]);
        let orchestrator = RetryOrchestrator::new(config(4, 10));
        let queue = EventQueue::new();

        let report = orchestrator.run(&connector, &queue).await.unwrap();
        assert_eq!(names(&report), vec!["manifest.json", "popup.js"]);

        let events = queue.drain();
        assert!(events.iter().any(|e| matches!(e, SessionEvent::Retrying { discarded: 1, .. })));
        assert_eq!(
            count(&events, |e| matches!(e, SessionEvent::ArtifactStarted { name, .. } if name == "manifest.json")),
            2
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_policy_skips_confirmed_artifacts() {
        let first = format!("{}START-MARK: popup.js\n", file("manifest.json", MANIFEST));
        let changed_manifest = MANIFEST.replace("Tab Counter", "Other Name");
        let second = format!(
            "{}{}",
            file("manifest.json", &changed_manifest),
            file("popup.js", SCRIPT)
        );
        let connector = ScriptedConnector::new(vec![
            AttemptScript::fail_after([first], TransportError::rate_limited("429")),
            AttemptScript::chunks([second]),
        ]);
        let mut session = config(4, 10);
        session.attempt_policy = AttemptPolicy::KeepConfirmed;
        let orchestrator = RetryOrchestrator::new(session);
        let queue = EventQueue::new();

        let report = orchestrator.run(&connector, &queue).await.unwrap();
        assert_eq!(names(&report), vec!["manifest.json", "popup.js"]);
        assert_eq!(report.artifacts.get("manifest.json").unwrap().content, MANIFEST);

        let events = queue.drain();
        assert!(events.iter().any(|e| matches!(e, SessionEvent::Retrying { discarded: 0, .. })));
        assert_eq!(
            count(&events, |e| matches!(e, SessionEvent::ArtifactStarted { name, .. } if name == "manifest.json")),
            1
        );
    }

    #[tokio::test]
    async fn test_duplicate_start_name_is_ignored() {
        let mut session = config(1, 10);
        session.primary_artifact = "a.json".to_string();
        session.validation = ValidationPolicy {
            min_content_len: 5,
            ..ValidationPolicy::default()
        };
        let stream = "START-MARK: a.json\n{\"x\":1}END-MARK: a.json\nSTART-MARK: a.json\n{\"x\":2}END-MARK: a.json\n";
        let connector = ReplayConnector::new(stream, 1);
        let orchestrator = RetryOrchestrator::new(session);
        let queue = EventQueue::new();

        let report = orchestrator.run(&connector, &queue).await.unwrap();
        assert_eq!(
            report.artifacts.into_pairs(),
            vec![("a.json".to_string(), "{\"x\":1}".to_string())]
        );
        let events = queue.drain();
        assert_eq!(count(&events, |e| matches!(e, SessionEvent::ArtifactStarted { .. })), 1);
    }

    #[tokio::test]
    async fn test_short_artifacts_are_rejected_not_fatal() {
        let stream = format!("{}{}", file("manifest.json", MANIFEST), file("tiny.txt", "hi"));
        let connector = ReplayConnector::new(&stream, 5);
        let orchestrator = RetryOrchestrator::new(config(4, 10));
        let queue = EventQueue::new();

        let report = orchestrator.run(&connector, &queue).await.unwrap();
        assert!(!report.artifacts.contains("tiny.txt"));

        let events = queue.drain();
        assert!(events.contains(&SessionEvent::ArtifactRejected {
            name: "tiny.txt".to_string(),
            reason: RejectReason::TooShort { len: 2, min: 50 },
        }));
    }

    #[tokio::test]
    async fn test_code_fences_are_stripped_before_validation() {
        let fenced = format!("```json\n{}\n```", MANIFEST);
        let connector = ReplayConnector::new(&file("manifest.json", &fenced), 16);
        let orchestrator = RetryOrchestrator::new(config(1, 10));

        let report = orchestrator.run(&connector, &EventQueue::new()).await.unwrap();
        assert_eq!(report.artifacts.get("manifest.json").unwrap().content, MANIFEST);
    }

    #[tokio::test]
    async fn test_custom_markers() {
        let mut session = config(1, 10);
        session.markers = MarkerSyntax::new("<<FILE", "FILE>>");
        let stream = format!("<<FILE manifest.json\n{}\nFILE>>\n", MANIFEST);
        let connector = ReplayConnector::new(&stream, 3);

        let report = RetryOrchestrator::new(session)
            .run(&connector, &EventQueue::new())
            .await
            .unwrap();
        assert_eq!(report.artifacts.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_preempts_backoff() {
        let connector = ScriptedConnector::new(vec![AttemptScript::Refuse(TransportError::rate_limited("429"))]);
        let mut session = config(4, 1000);
        session.timeout = Some(Duration::from_secs(1));
        let orchestrator = RetryOrchestrator::new(session);
        let queue = EventQueue::new();

        let start = Instant::now();
        let err = orchestrator.run(&connector, &queue).await.unwrap_err();
        assert_eq!(err, SessionError::TimedOut(Duration::from_secs(1)));
        assert_eq!(start.elapsed(), Duration::from_secs(1));
        assert_eq!(connector.connections(), 1);
        assert!(matches!(queue.drain().last(), Some(SessionEvent::SessionFailed { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_preempts_stalled_read() {
        let connector = ScriptedConnector::new(vec![AttemptScript::Stream(vec![
            ScriptStep::Chunk("START-MARK: manifest.json\n{".to_string()),
            ScriptStep::Stall,
        ])]);
        let mut session = config(4, 10);
        session.timeout = Some(Duration::from_secs(30));
        let orchestrator = RetryOrchestrator::new(session);

        let err = orchestrator.run(&connector, &EventQueue::new()).await.unwrap_err();
        assert_eq!(err, SessionError::TimedOut(Duration::from_secs(30)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_preempts_backoff() {
        let connector = ScriptedConnector::new(vec![AttemptScript::Refuse(TransportError::server_busy("503"))]);
        let orchestrator = RetryOrchestrator::new(config(4, 1000));
        let token = orchestrator.cancellation_token();
        let queue = EventQueue::new();

        let start = Instant::now();
        let (result, ()) = tokio::join!(orchestrator.run(&connector, &queue), async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            token.cancel();
        });

        assert_eq!(result.unwrap_err(), SessionError::Cancelled);
        assert_eq!(start.elapsed(), Duration::from_millis(500));
        assert_eq!(connector.connections(), 1);
    }
}
