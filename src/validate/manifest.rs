//! Checks for the distinguished manifest artifact.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a valid manifest must contain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestPolicy {
    /// Artifact name of the manifest
    #[serde(default = "default_manifest_name")]
    pub name: String,
    /// Top-level keys that must be present
    #[serde(default = "default_required_keys")]
    pub required_keys: Vec<String>,
    /// Key whose value pins the manifest format version
    #[serde(default = "default_version_key")]
    pub version_key: String,
    /// Required value of `version_key`
    #[serde(default = "default_version_value")]
    pub version_value: Value,
    /// Dotted paths that, when present, must be non-empty strings
    #[serde(default = "default_string_fields")]
    pub string_fields: Vec<String>,
}

fn default_manifest_name() -> String {
    "manifest.json".to_string()
}

fn default_required_keys() -> Vec<String> {
    vec![
        "manifest_version".to_string(),
        "name".to_string(),
        "version".to_string(),
    ]
}

fn default_version_key() -> String {
    "manifest_version".to_string()
}

fn default_version_value() -> Value {
    Value::from(3)
}

fn default_string_fields() -> Vec<String> {
    vec![
        "action.default_popup".to_string(),
        "background.service_worker".to_string(),
    ]
}

impl Default for ManifestPolicy {
    fn default() -> Self {
        Self {
            name: default_manifest_name(),
            required_keys: default_required_keys(),
            version_key: default_version_key(),
            version_value: default_version_value(),
            string_fields: default_string_fields(),
        }
    }
}

impl ManifestPolicy {
    /// Check a manifest body. Returns a description of the first violation.
    pub fn check(&self, content: &str) -> Result<(), String> {
        let value: Value =
            serde_json::from_str(content).map_err(|e| format!("not valid JSON: {}", e))?;
        let Some(object) = value.as_object() else {
            return Err("top level is not an object".to_string());
        };

        if let Some(missing) = self.required_keys.iter().find(|k| !object.contains_key(k.as_str())) {
            return Err(format!("missing required key '{}'", missing));
        }

        if !self.version_key.is_empty() {
            match object.get(&self.version_key) {
                Some(v) if *v == self.version_value => {}
                Some(v) => {
                    return Err(format!(
                        "'{}' is {} (expected {})",
                        self.version_key, v, self.version_value
                    ));
                }
                None => return Err(format!("missing required key '{}'", self.version_key)),
            }
        }

        for path in &self.string_fields {
            if let Some(field) = lookup_path(&value, path) {
                match field.as_str() {
                    Some(s) if !s.trim().is_empty() => {}
                    _ => return Err(format!("'{}' must be a non-empty string", path)),
                }
            }
        }

        Ok(())
    }
}

fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |current, segment| current.as_object()?.get(segment))
}
