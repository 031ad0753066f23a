//! Configuration view and validation commands: `filesmith config`.

use anyhow::{Context, Result};
use std::path::Path;

use filesmith::config::{CONFIG_FILE, FilesmithToml};

use super::super::ConfigCommands;

pub fn cmd_config(project_dir: &Path, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = FilesmithToml::path_in(project_dir);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("filesmith configuration");
            println!("=======================");
            println!();

            let mut config = if config_path.exists() {
                println!("Config file: {}", config_path.display());
                FilesmithToml::load(&config_path)?
            } else {
                println!("No {} found at {}", CONFIG_FILE, config_path.display());
                println!("Using default configuration.");
                FilesmithToml::default()
            };
            println!();

            config.apply_env_overrides()?;
            println!("Effective values (with env overrides):");
            println!();
            let rendered = toml::to_string_pretty(&config).context("Failed to render configuration")?;
            for line in rendered.lines() {
                println!("  {}", line);
            }
            println!();

            let key_status = if config.provider.api_key().is_some() {
                "set"
            } else {
                "not set"
            };
            println!("API key (${}): {}", config.provider.api_key_env, key_status);
            println!();

            if !config_path.exists() {
                println!("Run 'filesmith config init' to create {}.", CONFIG_FILE);
                println!();
            }
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No {} found. Using defaults (valid).", CONFIG_FILE);
                return Ok(());
            }

            let toml = FilesmithToml::load(&config_path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("{} already exists at {}", CONFIG_FILE, config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            if let Some(dir) = config_path.parent() {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
            }

            FilesmithToml::default().save(&config_path)?;

            println!("Created {} at {}", CONFIG_FILE, config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [provider] base_url, model, api_key_env");
            println!("  - [session] max_attempts, backoff_base_ms, attempt_policy");
            println!("  - [markers] start, end");
            println!("  - [validation] thresholds and [validation.manifest] rules");
            println!();
        }
    }

    Ok(())
}
