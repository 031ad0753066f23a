use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod cmd;

#[derive(Parser)]
#[command(name = "filesmith")]
#[command(version, about = "Stream multi-file model output into validated artifacts")]
pub struct Cli {
    /// Debug logging and narrative text in the display
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate files from a prompt using the configured provider
    Generate {
        /// Prompt text
        #[arg(conflicts_with = "prompt_file")]
        prompt: Option<String>,

        /// Read the prompt from a file
        #[arg(long)]
        prompt_file: Option<PathBuf>,

        /// Write accepted artifacts under this directory
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Print session events as JSON lines
        #[arg(long)]
        json: bool,

        /// Override provider.model
        #[arg(long)]
        model: Option<String>,

        /// Override session.max_attempts
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Override session.primary_artifact
        #[arg(long)]
        primary: Option<String>,
    },
    /// Decode a recorded stream through the same pipeline
    Decode {
        /// File containing the raw stream text
        file: PathBuf,

        /// Replay chunk size in bytes
        #[arg(long, default_value = "64")]
        chunk_size: usize,

        /// Write accepted artifacts under this directory
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Print session events as JSON lines
        #[arg(long)]
        json: bool,

        /// Override session.primary_artifact
        #[arg(long)]
        primary: Option<String>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default filesmith.toml file
    Init,
}

/// Install the stderr log subscriber. `FILESMITH_LOG` takes an `EnvFilter`
/// directive; `--verbose` forces debug.
fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose {
        EnvFilter::new("filesmith=debug")
    } else {
        EnvFilter::try_from_env("FILESMITH_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    // A missing .env is fine; variables may come from the environment
    if let Err(e) = dotenvy::from_path(project_dir.join(".env"))
        && !e.not_found()
    {
        tracing::warn!(error = %e, "Failed to load .env");
    }

    match cli.command {
        Commands::Generate {
            prompt,
            prompt_file,
            out,
            json,
            model,
            max_attempts,
            primary,
        } => {
            let args = cmd::GenerateArgs {
                prompt,
                prompt_file,
                out,
                json,
                model,
                max_attempts,
                primary,
            };
            cmd::cmd_generate(&project_dir, args, cli.verbose).await?;
        }
        Commands::Decode {
            file,
            chunk_size,
            out,
            json,
            primary,
        } => {
            let args = cmd::DecodeArgs {
                file,
                chunk_size,
                out,
                json,
                primary,
            };
            cmd::cmd_decode(&project_dir, args, cli.verbose).await?;
        }
        Commands::Config { command } => cmd::cmd_config(&project_dir, command)?,
    }

    Ok(())
}
