//! Delimiter tokens and the matching helpers the decoder builds on.

use serde::{Deserialize, Serialize};

/// Default token opening an artifact: `START-MARK: <name>\n`.
pub const DEFAULT_START_TOKEN: &str = "START-MARK:";

/// Default token closing an artifact: `END-MARK: <name-or-blank>`.
pub const DEFAULT_END_TOKEN: &str = "END-MARK:";

/// The pair of tokens bounding artifacts in the raw stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerSyntax {
    #[serde(default = "default_start")]
    pub start: String,
    #[serde(default = "default_end")]
    pub end: String,
}

fn default_start() -> String {
    DEFAULT_START_TOKEN.to_string()
}

fn default_end() -> String {
    DEFAULT_END_TOKEN.to_string()
}

impl Default for MarkerSyntax {
    fn default() -> Self {
        Self {
            start: default_start(),
            end: default_end(),
        }
    }
}

impl MarkerSyntax {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    /// Problems that would make the tokens ambiguous, as readable warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.start.trim().is_empty() {
            warnings.push("markers.start must not be empty".to_string());
        }
        if self.end.trim().is_empty() {
            warnings.push("markers.end must not be empty".to_string());
        }
        if self.start.contains('\n') || self.end.contains('\n') {
            warnings.push("markers must not contain line breaks".to_string());
        }
        if !self.start.is_empty()
            && !self.end.is_empty()
            && (self.start.contains(&self.end) || self.end.contains(&self.start))
        {
            warnings.push(format!(
                "markers.start '{}' and markers.end '{}' overlap",
                self.start, self.end
            ));
        }
        warnings
    }

    /// Render a complete start line for `name`.
    pub fn start_line(&self, name: &str) -> String {
        format!("{} {}\n", self.start, name)
    }

    /// Render a complete end line for `name`.
    pub fn end_line(&self, name: &str) -> String {
        format!("{} {}\n", self.end, name)
    }
}

/// Length of the longest proper prefix of `token` that `haystack` ends with.
///
/// A non-zero result means the tail of the buffer may be the beginning of a
/// token split across chunks and must not be consumed yet.
pub(crate) fn partial_suffix_len(haystack: &str, token: &str) -> usize {
    let max = token.len().saturating_sub(1).min(haystack.len());
    (1..=max)
        .rev()
        .find(|&k| token.is_char_boundary(k) && haystack.ends_with(&token[..k]))
        .unwrap_or(0)
}
