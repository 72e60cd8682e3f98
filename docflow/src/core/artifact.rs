//! The rendered artifact at the end of the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// An artifact written by the render stage.
///
/// The path doubles as the artifact identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Identifier of the originating source.
    pub source_id: String,
    /// Where the artifact was written.
    pub path: PathBuf,
    /// Number of bytes written.
    pub bytes: usize,
    /// When the artifact was written (ISO 8601).
    pub created_at: String,
}

impl Artifact {
    /// Creates a new artifact record.
    #[must_use]
    pub fn new(source_id: impl Into<String>, path: impl Into<PathBuf>, bytes: usize) -> Self {
        Self {
            source_id: source_id.into(),
            path: path.into(),
            bytes,
            created_at: crate::utils::iso_timestamp(),
        }
    }

    /// Returns the artifact identifier.
    #[must_use]
    pub fn id(&self) -> String {
        self.path.display().to_string()
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_creation() {
        let artifact = Artifact::new("A", "output/42.html", 128);

        assert_eq!(artifact.source_id, "A");
        assert_eq!(artifact.id(), "output/42.html");
        assert_eq!(artifact.bytes, 128);
        assert!(artifact.created_at.contains('T'));
    }

    #[test]
    fn test_artifact_serialization() {
        let artifact = Artifact::new("A", "output/a.html", 1);

        let json = serde_json::to_string(&artifact).unwrap();
        let deserialized: Artifact = serde_json::from_str(&json).unwrap();

        assert_eq!(artifact, deserialized);
    }
}
