use std::io::Write;
use std::time::Duration;

use console::{Term, style};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::events::SessionEvent;
use crate::ui::icons::{CHECK, CLOCK, CROSS, FILE_NEW, FILE_REJECTED, RETRY, SPARKLE, WRITING};

/// Output mode for session events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UiMode {
    /// Spinner plus one line per finished artifact
    #[default]
    Full,
    /// Plain lines, no terminal control
    Minimal,
    /// One JSON object per event on stdout
    Json,
}

impl std::str::FromStr for UiMode {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "json" => Self::Json,
            "minimal" => Self::Minimal,
            _ => Self::Full,
        })
    }
}

impl UiMode {
    /// JSON when requested, otherwise Full on a terminal and Minimal when
    /// output is redirected.
    pub fn detect(json: bool) -> Self {
        if json {
            Self::Json
        } else if Term::stderr().is_term() {
            Self::Full
        } else {
            Self::Minimal
        }
    }
}

/// Terminal display of a generation session, fed from the event queue.
pub struct SessionUI {
    mode: UiMode,
    multi: MultiProgress,
    bar: ProgressBar,
    term: Term,
    verbose: bool,
}

impl SessionUI {
    pub fn new(mode: UiMode, verbose: bool) -> Self {
        let multi = MultiProgress::new();
        let bar = if mode == UiMode::Full {
            let bar = multi.add(ProgressBar::new_spinner());
            bar.set_style(
                ProgressStyle::default_spinner()
                    .template("{prefix:.bold.dim} {spinner} {msg} {elapsed:.dim}")
                    .expect("progress bar template is a valid static string"),
            );
            bar.set_prefix("filesmith");
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        } else {
            ProgressBar::hidden()
        };

        Self {
            mode,
            multi,
            bar,
            term: Term::stdout(),
            verbose,
        }
    }

    pub fn mode(&self) -> UiMode {
        self.mode
    }

    /// Render one event.
    pub fn handle_event(&self, event: &SessionEvent) {
        match self.mode {
            UiMode::Json => self.handle_json(event),
            UiMode::Minimal => self.handle_minimal(event),
            UiMode::Full => self.handle_full(event),
        }
    }

    fn handle_json(&self, event: &SessionEvent) {
        if let Ok(json) = serde_json::to_string(event) {
            let _ = writeln!(&self.term, "{}", json);
        }
    }

    fn handle_minimal(&self, event: &SessionEvent) {
        let line = match event {
            SessionEvent::AttemptStarted { attempt } if *attempt > 1 => format!("attempt {}", attempt),
            SessionEvent::ArtifactCompleted { name, content } => {
                format!("+ {} ({} bytes)", name, content.len())
            }
            SessionEvent::ArtifactRejected { name, reason } => format!("! {} rejected: {}", name, reason),
            SessionEvent::Retrying { attempt, delay_ms, error, .. } => {
                format!("attempt {} failed ({}), retrying in {} ms", attempt, error, delay_ms)
            }
            SessionEvent::NarrativeText { text } if self.verbose => text.trim().to_string(),
            SessionEvent::SessionSucceeded { artifacts } => format!("done: {} artifacts", artifacts.len()),
            SessionEvent::SessionFailed { reason } => format!("failed: {}", reason),
            _ => return,
        };
        let _ = writeln!(&self.term, "{}", line);
    }

    fn handle_full(&self, event: &SessionEvent) {
        match event {
            SessionEvent::AttemptStarted { attempt } => {
                let label = if *attempt > 1 {
                    format!("Attempt {}", style(attempt).cyan())
                } else {
                    "Waiting for the model...".to_string()
                };
                self.bar.set_message(label);
            }
            SessionEvent::ArtifactStarted { name, .. } => {
                self.bar.set_message(format!("{} {}", WRITING, style(name).yellow()));
            }
            SessionEvent::ArtifactProgress { name, content } => {
                self.bar.set_message(format!(
                    "{} {} {}",
                    WRITING,
                    style(name).yellow(),
                    style(format!("({} bytes)", content.len())).dim()
                ));
            }
            SessionEvent::ArtifactCompleted { name, content } => {
                self.print_line(format!(
                    "  {} {} {}",
                    FILE_NEW,
                    style(name).green(),
                    style(format!("({} bytes)", content.len())).dim()
                ));
            }
            SessionEvent::ArtifactRejected { name, reason } => {
                self.print_line(format!(
                    "  {} {} {}",
                    FILE_REJECTED,
                    style(name).red(),
                    style(reason).dim()
                ));
            }
            SessionEvent::NarrativeText { text } => {
                if self.verbose {
                    self.print_line(format!("  {}", style(text.trim()).dim()));
                }
            }
            SessionEvent::Retrying {
                attempt,
                delay_ms,
                error,
                discarded,
            } => {
                self.print_line(format!(
                    "  {} Attempt {} failed: {}",
                    RETRY,
                    attempt,
                    style(error).yellow()
                ));
                let mut detail = format!("  {} Retrying in {:.1}s", CLOCK, *delay_ms as f64 / 1000.0);
                if *discarded > 0 {
                    detail.push_str(&format!(" ({} artifacts discarded)", discarded));
                }
                self.print_line(style(detail).dim().to_string());
                self.bar.set_message("Backing off...");
            }
            SessionEvent::SessionSucceeded { artifacts } => {
                self.bar.finish_with_message(format!(
                    "{} {} {} artifacts",
                    CHECK,
                    SPARKLE,
                    style(artifacts.len()).green().bold()
                ));
            }
            SessionEvent::SessionFailed { reason } => {
                self.bar
                    .abandon_with_message(format!("{} {}", CROSS, style(reason).red()));
            }
        }
    }

    fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }
}
