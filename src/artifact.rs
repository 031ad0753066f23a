//! Artifacts and the ordered set a session accumulates.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::errors::ArtifactSetError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactStatus {
    /// Start delimiter seen, content may still grow
    Pending,
    /// End delimiter seen, content is final
    Complete,
}

/// One named, delimiter-bounded unit of generated output (a "file").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,
    pub content: String,
    pub status: ArtifactStatus,
    /// Order in which the decoder started this artifact within its attempt.
    pub sequence_index: usize,
}

impl Artifact {
    pub fn pending(name: impl Into<String>, sequence_index: usize) -> Self {
        Self {
            name: name.into(),
            content: String::new(),
            status: ArtifactStatus::Pending,
            sequence_index,
        }
    }

    pub fn complete(name: impl Into<String>, content: impl Into<String>, sequence_index: usize) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            status: ArtifactStatus::Complete,
            sequence_index,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == ArtifactStatus::Complete
    }

    /// File extension of the artifact name, lowercased, if any.
    pub fn extension(&self) -> Option<String> {
        let file_name = self.name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(&self.name);
        let (stem, ext) = file_name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }
}

/// Ordered collection of accepted artifacts, keyed by name.
///
/// Names are unique. The set only grows through [`ArtifactSet::insert`] and
/// only shrinks through [`ArtifactSet::discard`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactSet {
    artifacts: IndexMap<String, Artifact>,
}

impl ArtifactSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a complete artifact. Duplicate or pending artifacts are refused.
    pub fn insert(&mut self, artifact: Artifact) -> Result<(), ArtifactSetError> {
        if !artifact.is_complete() {
            return Err(ArtifactSetError::NotComplete {
                name: artifact.name,
            });
        }
        if self.artifacts.contains_key(&artifact.name) {
            return Err(ArtifactSetError::Duplicate {
                name: artifact.name,
            });
        }
        self.artifacts.insert(artifact.name.clone(), artifact);
        Ok(())
    }

    /// Remove an artifact, preserving the order of the rest.
    pub fn discard(&mut self, name: &str) -> Option<Artifact> {
        self.artifacts.shift_remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Artifact> {
        self.artifacts.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.artifacts.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.artifacts.keys().map(String::as_str)
    }

    /// `(name, content)` pairs in acceptance order, for persistence.
    pub fn into_pairs(self) -> Vec<(String, String)> {
        self.artifacts
            .into_values()
            .map(|a| (a.name, a.content))
            .collect()
    }
}

#[derive(Serialize, Deserialize)]
struct ArtifactEntry {
    name: String,
    content: String,
}

impl Serialize for ArtifactSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeSeq;

        let mut seq = serializer.serialize_seq(Some(self.artifacts.len()))?;
        for artifact in self.artifacts.values() {
            seq.serialize_element(&ArtifactEntry {
                name: artifact.name.clone(),
                content: artifact.content.clone(),
            })?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for ArtifactSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = Vec::<ArtifactEntry>::deserialize(deserializer)?;
        let mut set = ArtifactSet::new();
        for (index, entry) in entries.into_iter().enumerate() {
            set.insert(Artifact::complete(entry.name, entry.content, index))
                .map_err(serde::de::Error::custom)?;
        }
        Ok(set)
    }
}
