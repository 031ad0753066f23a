//! Replay of a recorded stream: `filesmith decode`.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use filesmith::config::FilesmithToml;
use filesmith::orchestrator::RetryOrchestrator;
use filesmith::source::ReplayConnector;
use filesmith::ui::{SessionUI, UiMode};

use super::session::{finish, run_with_ui};

/// Options for `filesmith decode`.
pub struct DecodeArgs {
    pub file: PathBuf,
    pub chunk_size: usize,
    pub out: Option<PathBuf>,
    pub json: bool,
    pub primary: Option<String>,
}

pub async fn cmd_decode(project_dir: &Path, args: DecodeArgs, verbose: bool) -> Result<()> {
    let text = std::fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read recorded stream: {}", args.file.display()))?;

    let mut toml = FilesmithToml::load_or_default(project_dir)?;
    toml.apply_env_overrides()?;
    if let Some(primary) = &args.primary {
        toml.session.primary_artifact = primary.clone();
    }

    let connector = ReplayConnector::new(&text, args.chunk_size);
    tracing::debug!(
        file = %args.file.display(),
        chunks = connector.chunks().len(),
        "Replaying recorded stream"
    );

    let orchestrator = RetryOrchestrator::new(toml.session_config());
    let ui = SessionUI::new(UiMode::detect(args.json), verbose);

    let report = run_with_ui(&orchestrator, &connector, &ui)
        .await
        .context("Decoding failed")?;
    finish(report, args.out.as_deref(), args.json)
}
