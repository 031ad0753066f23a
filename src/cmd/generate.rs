//! Live generation against the configured provider: `filesmith generate`.

use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};

use filesmith::config::FilesmithToml;
use filesmith::decoder::MarkerSyntax;
use filesmith::orchestrator::RetryOrchestrator;
use filesmith::source::{ChatMessage, HttpConnector};
use filesmith::ui::{SessionUI, UiMode};

use super::session::{finish, run_with_ui};

/// Options for `filesmith generate`.
pub struct GenerateArgs {
    pub prompt: Option<String>,
    pub prompt_file: Option<PathBuf>,
    pub out: Option<PathBuf>,
    pub json: bool,
    pub model: Option<String>,
    pub max_attempts: Option<u32>,
    pub primary: Option<String>,
}

/// Instructions telling the model how to delimit files.
pub fn system_prompt(markers: &MarkerSyntax, primary: &str) -> String {
    format!(
        r#"You generate complete project files. Output every file in this exact form:

{start} path/to/file.ext
<raw file content>
{end} path/to/file.ext

RULES:
1. Write the start line on its own line, followed by the full file content
2. Close every file with the end line before starting the next one
3. Never wrap content in markdown code fences
4. Never add explanations inside a file
5. Always include {primary}
"#,
        start = markers.start,
        end = markers.end,
        primary = primary
    )
}

fn read_prompt(args: &GenerateArgs) -> Result<String> {
    let prompt = match (&args.prompt, &args.prompt_file) {
        (Some(text), _) => text.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read prompt file: {}", path.display()))?,
        (None, None) => bail!("Provide a prompt or --prompt-file"),
    };
    if prompt.trim().is_empty() {
        bail!("Prompt is empty");
    }
    Ok(prompt)
}

pub async fn cmd_generate(project_dir: &Path, args: GenerateArgs, verbose: bool) -> Result<()> {
    let prompt = read_prompt(&args)?;

    let mut toml = FilesmithToml::load_or_default(project_dir)?;
    toml.apply_env_overrides()?;
    if let Some(model) = &args.model {
        toml.provider.model = model.clone();
    }
    if let Some(max_attempts) = args.max_attempts {
        toml.session.max_attempts = max_attempts;
    }
    if let Some(primary) = &args.primary {
        toml.session.primary_artifact = primary.clone();
    }
    for warning in toml.validate() {
        tracing::warn!("{}", warning);
    }

    let api_key = toml.provider.api_key();
    if api_key.is_none() {
        tracing::warn!(
            env = %toml.provider.api_key_env,
            "No API key found; the request will be sent unauthenticated"
        );
    }

    let messages = vec![
        ChatMessage::system(system_prompt(&toml.markers, &toml.session.primary_artifact)),
        ChatMessage::user(prompt),
    ];
    let connector = HttpConnector::new(&toml.provider, api_key, messages)?;
    let orchestrator = RetryOrchestrator::new(toml.session_config());
    let ui = SessionUI::new(UiMode::detect(args.json), verbose);

    let report = run_with_ui(&orchestrator, &connector, &ui)
        .await
        .context("Generation failed")?;
    finish(report, args.out.as_deref(), args.json)
}
