//! Structural rules for text formats that are checked without a full parser.
//!
//! Each rule applies to one file extension and is configured under
//! `[validation.structure.<ext>]`:
//!
//! ```toml
//! [validation.structure.css]
//! required = [":", ";"]
//! min_blocks = 3
//! forbidden_line_prefixes = ["## ", "**"]
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Cheap shape checks for one text format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRule {
    /// Substrings that must all appear (case-insensitive)
    #[serde(default)]
    pub required: Vec<String>,
    /// At least one of these must appear (case-insensitive); empty disables
    #[serde(default)]
    pub required_any: Vec<String>,
    /// Minimum number of `{ }` pairs
    #[serde(default)]
    pub min_blocks: usize,
    /// Largest allowed difference between opening and closing `{}` and `()`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_imbalance: Option<usize>,
    /// Line starts (after indentation) that mean markdown leaked into the file
    #[serde(default)]
    pub forbidden_line_prefixes: Vec<String>,
}

impl TextRule {
    /// Returns a description of the first violation.
    pub fn check(&self, content: &str) -> Result<(), String> {
        let lower = content.to_lowercase();

        if let Some(missing) = self
            .required
            .iter()
            .find(|needle| !lower.contains(&needle.to_lowercase()))
        {
            return Err(format!("missing '{}'", missing));
        }

        if !self.required_any.is_empty()
            && !self
                .required_any
                .iter()
                .any(|needle| lower.contains(&needle.to_lowercase()))
        {
            return Err(format!("expected one of {}", quoted(&self.required_any)));
        }

        let opens = content.matches('{').count();
        let closes = content.matches('}').count();
        if opens.min(closes) < self.min_blocks {
            return Err(format!(
                "only {} {{ }} blocks, expected at least {}",
                opens.min(closes),
                self.min_blocks
            ));
        }

        if let Some(max) = self.max_imbalance {
            for (open, close) in [('{', '}'), ('(', ')')] {
                let diff = content.matches(open).count().abs_diff(content.matches(close).count());
                if diff > max {
                    return Err(format!("unbalanced '{}' and '{}' (off by {})", open, close, diff));
                }
            }
        }

        if let Some(line) = content.lines().map(str::trim_start).find(|line| {
            self.forbidden_line_prefixes
                .iter()
                .any(|prefix| line.starts_with(prefix.as_str()))
        }) {
            return Err(format!("markdown line \"{}\"", line.trim_end()));
        }

        Ok(())
    }
}

fn quoted(items: &[String]) -> String {
    items
        .iter()
        .map(|i| format!("'{}'", i))
        .collect::<Vec<_>>()
        .join(", ")
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Built-in rules for the web formats a browser extension is made of.
pub fn default_rules() -> BTreeMap<String, TextRule> {
    let markdown = strings(&["## ", "**"]);

    let html = TextRule {
        required: strings(&["<!doctype", "<html", "<head", "<body", "<link", "<script"]),
        forbidden_line_prefixes: markdown.clone(),
        ..TextRule::default()
    };
    let css = TextRule {
        required: strings(&[":", ";"]),
        min_blocks: 3,
        forbidden_line_prefixes: markdown.clone(),
        ..TextRule::default()
    };
    let js = TextRule {
        required_any: strings(&["function", "=>", "class "]),
        max_imbalance: Some(2),
        forbidden_line_prefixes: markdown,
        ..TextRule::default()
    };

    BTreeMap::from([
        ("html".to_string(), html),
        ("css".to_string(), css),
        ("js".to_string(), js),
    ])
}
