//! Acceptance rules for completed artifacts.
//!
//! A completed artifact passes through [`ArtifactValidator::validate`] before
//! it joins the artifact set. Checks run in order and the first failure
//! decides the verdict:
//!
//! 1. Minimum trimmed length
//! 2. Structured formats (by extension) must parse
//! 3. The manifest must carry the required keys and version
//! 4. The leading lines must not read like conversation
//! 5. Text formats with a [`TextRule`] must have the expected shape

mod chatter;
mod manifest;
mod rules;
mod structure;

pub use chatter::{default_markers as default_conversational_markers, find_conversational_line};
pub use manifest::ManifestPolicy;
pub use rules::{TextRule, default_rules as default_structure_rules};
pub use structure::StructuredFormat;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::artifact::Artifact;

/// Tunable thresholds for artifact acceptance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationPolicy {
    /// Minimum length (characters) of trimmed content
    #[serde(default = "default_min_content_len")]
    pub min_content_len: usize,
    /// Extensions whose content must parse as structured data
    #[serde(default = "default_structured_extensions")]
    pub structured_extensions: Vec<String>,
    /// How many leading non-blank lines to inspect for conversation
    #[serde(default = "default_conversational_lines")]
    pub conversational_lines: usize,
    /// Line prefixes that mark conversational text
    #[serde(default = "default_conversational_markers")]
    pub conversational_markers: Vec<String>,
    /// Remove a wrapping markdown code fence before validation
    #[serde(default = "default_strip_code_fences")]
    pub strip_code_fences: bool,
    /// Manifest requirements
    #[serde(default)]
    pub manifest: ManifestPolicy,
    /// Shape rules for text formats, keyed by extension
    #[serde(default = "default_structure_rules")]
    pub structure: BTreeMap<String, TextRule>,
}

fn default_min_content_len() -> usize {
    50
}

fn default_structured_extensions() -> Vec<String> {
    vec!["json".to_string()]
}

fn default_conversational_lines() -> usize {
    3
}

fn default_strip_code_fences() -> bool {
    true
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            min_content_len: default_min_content_len(),
            structured_extensions: default_structured_extensions(),
            conversational_lines: default_conversational_lines(),
            conversational_markers: default_conversational_markers(),
            strip_code_fences: default_strip_code_fences(),
            manifest: ManifestPolicy::default(),
            structure: default_structure_rules(),
        }
    }
}

impl ValidationPolicy {
    /// Configuration problems, as readable warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.min_content_len == 0 {
            warnings.push("validation.min_content_len is 0: empty artifacts will be accepted".to_string());
        }
        for ext in &self.structured_extensions {
            if StructuredFormat::from_extension(&ext.to_ascii_lowercase()).is_none() {
                warnings.push(format!(
                    "validation.structured_extensions: no parser for '{}' (known: json, toml, yaml, yml)",
                    ext
                ));
            }
        }
        for ext in self.structure.keys() {
            if ext.is_empty() || ext.starts_with('.') {
                warnings.push(format!(
                    "validation.structure: '{}' is not a bare extension (write \"css\", not \".css\")",
                    ext
                ));
            }
        }
        if self.manifest.name.trim().is_empty() {
            warnings.push("validation.manifest.name must not be empty".to_string());
        }
        warnings
    }

    fn structured_format(&self, artifact: &Artifact) -> Option<StructuredFormat> {
        let ext = artifact.extension()?;
        self.structured_extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(&ext))
            .then(|| StructuredFormat::from_extension(&ext))
            .flatten()
    }

    fn text_rule(&self, artifact: &Artifact) -> Option<(&str, &TextRule)> {
        let ext = artifact.extension()?;
        self.structure
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(&ext))
            .map(|(key, rule)| (key.as_str(), rule))
    }
}

/// Why an artifact was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectReason {
    #[error("content too short ({len} < {min} characters)")]
    TooShort { len: usize, min: usize },

    #[error("malformed {format}: {message}")]
    MalformedStructure { format: String, message: String },

    #[error("invalid manifest: {detail}")]
    InvalidManifest { detail: String },

    #[error("conversational text instead of content: \"{line}\"")]
    Conversational { line: String },
}

/// Outcome of validating one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject(RejectReason),
}

impl Verdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, Verdict::Accept)
    }
}

/// Pure acceptance check of completed artifacts against a policy.
#[derive(Debug, Clone, Default)]
pub struct ArtifactValidator {
    policy: ValidationPolicy,
}

impl ArtifactValidator {
    pub fn new(policy: ValidationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    pub fn validate(&self, artifact: &Artifact) -> Verdict {
        match self.check(artifact) {
            Ok(()) => Verdict::Accept,
            Err(reason) => Verdict::Reject(reason),
        }
    }

    fn check(&self, artifact: &Artifact) -> Result<(), RejectReason> {
        let content = &artifact.content;

        let len = content.trim().chars().count();
        if len < self.policy.min_content_len {
            return Err(RejectReason::TooShort {
                len,
                min: self.policy.min_content_len,
            });
        }

        if let Some(format) = self.policy.structured_format(artifact) {
            format
                .check(content)
                .map_err(|message| RejectReason::MalformedStructure {
                    format: format.to_string(),
                    message,
                })?;
        }

        if artifact.name == self.policy.manifest.name {
            self.policy
                .manifest
                .check(content)
                .map_err(|detail| RejectReason::InvalidManifest { detail })?;
        }

        if let Some(line) = find_conversational_line(
            content,
            &self.policy.conversational_markers,
            self.policy.conversational_lines,
        ) {
            return Err(RejectReason::Conversational {
                line: line.to_string(),
            });
        }

        if let Some((ext, rule)) = self.policy.text_rule(artifact) {
            rule.check(content)
                .map_err(|message| RejectReason::MalformedStructure {
                    format: ext.to_string(),
                    message,
                })?;
        }

        Ok(())
    }
}
