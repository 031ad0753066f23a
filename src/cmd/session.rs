//! Shared plumbing for commands that run a generation session.

use anyhow::{Context, Result, bail};
use std::path::{Component, Path, PathBuf};

use filesmith::artifact::ArtifactSet;
use filesmith::errors::SessionError;
use filesmith::events::EventQueue;
use filesmith::orchestrator::{RetryOrchestrator, SessionReport};
use filesmith::source::ChunkConnector;
use filesmith::ui::SessionUI;

/// Run a session while rendering its events. Ctrl-C cancels the session.
pub async fn run_with_ui(
    orchestrator: &RetryOrchestrator,
    connector: &dyn ChunkConnector,
    ui: &SessionUI,
) -> Result<SessionReport, SessionError> {
    let queue = EventQueue::new();

    let token = orchestrator.cancellation_token();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    let run = async {
        let result = orchestrator.run(connector, &queue).await;
        queue.close();
        result
    };
    let render = async {
        while let Some(event) = queue.recv().await {
            ui.handle_event(&event);
        }
    };

    let (result, ()) = tokio::join!(run, render);
    ctrl_c.abort();
    result
}

/// Resolve an artifact name to a path under `out_dir`, refusing names that
/// would escape it.
pub fn artifact_path(out_dir: &Path, name: &str) -> Result<PathBuf> {
    let relative = Path::new(name);
    let escapes = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes || name.contains('\\') {
        bail!("Refusing to write artifact outside the output directory: '{}'", name);
    }
    Ok(out_dir.join(relative))
}

/// Write every artifact under `out_dir`, creating parent directories.
pub fn write_artifacts(out_dir: &Path, artifacts: &ArtifactSet) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(artifacts.len());
    for artifact in artifacts.iter() {
        let path = artifact_path(out_dir, &artifact.name)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        std::fs::write(&path, &artifact.content)
            .with_context(|| format!("Failed to write artifact: {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}

/// Print a short summary and optionally write the artifacts.
pub fn finish(report: SessionReport, out: Option<&Path>, json: bool) -> Result<()> {
    if let Some(dir) = out {
        let written = write_artifacts(dir, &report.artifacts)?;
        if !json {
            println!();
            for path in &written {
                println!("  wrote {}", path.display());
            }
        }
    } else if !json {
        println!();
        for artifact in report.artifacts.iter() {
            println!("  {} ({} bytes)", artifact.name, artifact.content.len());
        }
    }

    if !json {
        println!();
        println!(
            "{} artifacts in {} attempt(s)",
            report.artifacts.len(),
            report.attempts
        );
    }
    Ok(())
}
