//! Configuration for filesmith, read from `.filesmith/filesmith.toml`.
//!
//! Layering is file → environment → CLI. Every field has a default, so an
//! empty or missing file is a valid configuration.
//!
//! # Configuration File Format
//!
//! ```toml
//! [provider]
//! base_url = "https://openrouter.ai/api/v1"
//! model = "xiaomi/mimo-v2-flash"
//! api_key_env = "OPENROUTER_API_KEY"
//! temperature = 0.7
//! max_tokens = 8000
//! connect_timeout_secs = 15
//!
//! [session]
//! max_attempts = 4
//! backoff_base_ms = 1000
//! timeout_secs = 300
//! attempt_policy = "restart"
//! primary_artifact = "manifest.json"
//!
//! [markers]
//! start = "START-MARK:"
//! end = "END-MARK:"
//!
//! [validation]
//! min_content_len = 50
//! structured_extensions = ["json"]
//! conversational_lines = 3
//! strip_code_fences = true
//!
//! [validation.manifest]
//! name = "manifest.json"
//! required_keys = ["manifest_version", "name", "version"]
//! version_key = "manifest_version"
//! version_value = 3
//! string_fields = ["action.default_popup", "background.service_worker"]
//! ```
//!
//! Environment overrides: `FILESMITH_MODEL`, `FILESMITH_BASE_URL`,
//! `FILESMITH_MAX_ATTEMPTS`. The provider API key is read from the variable
//! named by `provider.api_key_env`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::decoder::MarkerSyntax;
use crate::validate::ValidationPolicy;

/// Directory holding project configuration.
pub const CONFIG_DIR: &str = ".filesmith";
/// Configuration file name inside [`CONFIG_DIR`].
pub const CONFIG_FILE: &str = "filesmith.toml";

pub const ENV_MODEL: &str = "FILESMITH_MODEL";
pub const ENV_BASE_URL: &str = "FILESMITH_BASE_URL";
pub const ENV_MAX_ATTEMPTS: &str = "FILESMITH_MAX_ATTEMPTS";

/// How successive attempts treat artifacts accepted earlier.
///
/// | Policy            | TOML        | Behavior                                          |
/// |-------------------|-------------|---------------------------------------------------|
/// | `RestartFromZero` | `"restart"` | Each attempt starts with an empty artifact set    |
/// | `KeepConfirmed`   | `"keep"`    | Accepted artifacts survive; repeats are skipped   |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AttemptPolicy {
    #[default]
    #[serde(rename = "restart")]
    RestartFromZero,
    #[serde(rename = "keep")]
    KeepConfirmed,
}

impl std::fmt::Display for AttemptPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptPolicy::RestartFromZero => write!(f, "restart"),
            AttemptPolicy::KeepConfirmed => write!(f, "keep"),
        }
    }
}

impl std::str::FromStr for AttemptPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "restart" => Ok(AttemptPolicy::RestartFromZero),
            "keep" => Ok(AttemptPolicy::KeepConfirmed),
            _ => anyhow::bail!("Invalid attempt policy '{}'. Valid values: restart, keep", s),
        }
    }
}

/// Streaming chat provider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of an OpenAI-compatible API
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_model() -> String {
    "xiaomi/mimo-v2-flash".to_string()
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    8000
}

fn default_connect_timeout_secs() -> u64 {
    15
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl ProviderConfig {
    /// API key from the configured environment variable, if set and non-empty.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

/// Retry and completion settings for a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSection {
    /// Total tries including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Backoff base; the wait before attempt k is base * 2^k
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Whole-session deadline in seconds (0 disables it)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub attempt_policy: AttemptPolicy,
    /// Artifact that must be present for the session to succeed
    #[serde(default = "default_primary_artifact")]
    pub primary_artifact: String,
}

fn default_max_attempts() -> u32 {
    4
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_primary_artifact() -> String {
    "manifest.json".to_string()
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            timeout_secs: default_timeout_secs(),
            attempt_policy: AttemptPolicy::default(),
            primary_artifact: default_primary_artifact(),
        }
    }
}

/// The complete filesmith.toml configuration structure.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FilesmithToml {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub session: SessionSection,
    /// Artifact delimiter tokens
    #[serde(default)]
    pub markers: MarkerSyntax,
    #[serde(default)]
    pub validation: ValidationPolicy,
}

impl FilesmithToml {
    /// Location of the config file for a project directory.
    pub fn path_in(project_dir: &Path) -> PathBuf {
        project_dir.join(CONFIG_DIR).join(CONFIG_FILE)
    }

    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse filesmith.toml")
    }

    /// Load configuration from `.filesmith/filesmith.toml` under `project_dir`.
    /// Returns default configuration if the file doesn't exist.
    pub fn load_or_default(project_dir: &Path) -> Result<Self> {
        let config_path = Self::path_in(project_dir);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize filesmith.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply `FILESMITH_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides using `lookup` in place of the process environment.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup(ENV_MODEL).filter(|v| !v.is_empty()) {
            self.provider.model = model;
        }
        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.is_empty()) {
            self.provider.base_url = url;
        }
        if let Some(raw) = lookup(ENV_MAX_ATTEMPTS).filter(|v| !v.is_empty()) {
            self.session.max_attempts = raw
                .trim()
                .parse()
                .with_context(|| format!("{} must be a positive integer, got '{}'", ENV_MAX_ATTEMPTS, raw))?;
        }
        Ok(())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.session.max_attempts == 0 {
            warnings.push("session.max_attempts is 0; treated as 1".to_string());
        }
        if self.session.primary_artifact.trim().is_empty() {
            warnings.push("session.primary_artifact must not be empty".to_string());
        }
        if self.provider.base_url.trim().is_empty() {
            warnings.push("provider.base_url must not be empty".to_string());
        }
        if !(0.0..=2.0).contains(&self.provider.temperature) {
            warnings.push(format!(
                "provider.temperature {} is outside 0.0-2.0",
                self.provider.temperature
            ));
        }

        warnings.extend(self.markers.validate());
        warnings.extend(self.validation.validate());
        warnings
    }

    /// Resolve the settings a session runs with.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            max_attempts: self.session.max_attempts,
            backoff_base: Duration::from_millis(self.session.backoff_base_ms),
            timeout: (self.session.timeout_secs > 0).then(|| Duration::from_secs(self.session.timeout_secs)),
            attempt_policy: self.session.attempt_policy,
            primary_artifact: self.session.primary_artifact.clone(),
            markers: self.markers.clone(),
            validation: self.validation.clone(),
        }
    }
}

/// Resolved settings for one generation session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    /// Deadline measured from session start
    pub timeout: Option<Duration>,
    pub attempt_policy: AttemptPolicy,
    pub primary_artifact: String,
    pub markers: MarkerSyntax,
    pub validation: ValidationPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        FilesmithToml::default().session_config()
    }
}
