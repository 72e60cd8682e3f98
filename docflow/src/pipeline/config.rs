//! Pipeline configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::StageKind;
use crate::errors::DocflowError;
use crate::stages::{FetchConfig, ParseConfig};

/// Worker counts, queue sizes and collaborator settings for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Concurrent fetch workers.
    #[serde(default = "default_fetch_workers")]
    pub fetch_workers: usize,
    /// Concurrent parse workers.
    #[serde(default = "default_parse_workers")]
    pub parse_workers: usize,
    /// Concurrent render workers.
    #[serde(default = "default_render_workers")]
    pub render_workers: usize,
    /// Capacity of every sequence. When unset, each sequence holds as many
    /// items as its consuming stage has workers.
    #[serde(default)]
    pub channel_capacity: Option<usize>,
    /// HTTP settings for the fetch stage.
    #[serde(default)]
    pub fetch: FetchConfig,
    /// Selectors for the parse stage.
    #[serde(default)]
    pub parse: ParseConfig,
}

fn default_fetch_workers() -> usize {
    10
}

fn default_parse_workers() -> usize {
    50
}

fn default_render_workers() -> usize {
    5
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fetch_workers: default_fetch_workers(),
            parse_workers: default_parse_workers(),
            render_workers: default_render_workers(),
            channel_capacity: None,
            fetch: FetchConfig::default(),
            parse: ParseConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with the default worker counts (10/50/5).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a configuration from a JSON file. Missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, DocflowError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            DocflowError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Sets the fetch worker count.
    #[must_use]
    pub fn with_fetch_workers(mut self, workers: usize) -> Self {
        self.fetch_workers = workers;
        self
    }

    /// Sets the parse worker count.
    #[must_use]
    pub fn with_parse_workers(mut self, workers: usize) -> Self {
        self.parse_workers = workers;
        self
    }

    /// Sets the render worker count.
    #[must_use]
    pub fn with_render_workers(mut self, workers: usize) -> Self {
        self.render_workers = workers;
        self
    }

    /// Sets one capacity for every sequence.
    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = Some(capacity);
        self
    }

    /// Sets the fetch collaborator settings.
    #[must_use]
    pub fn with_fetch(mut self, fetch: FetchConfig) -> Self {
        self.fetch = fetch;
        self
    }

    /// Sets the parse collaborator settings.
    #[must_use]
    pub fn with_parse(mut self, parse: ParseConfig) -> Self {
        self.parse = parse;
        self
    }

    /// Worker count of a stage, never below one.
    #[must_use]
    pub fn workers(&self, stage: StageKind) -> usize {
        let workers = match stage {
            StageKind::Fetch => self.fetch_workers,
            StageKind::Parse => self.parse_workers,
            StageKind::Render => self.render_workers,
        };
        workers.max(1)
    }

    /// Capacity of the sequence feeding `stage`, never below one.
    #[must_use]
    pub fn capacity_into(&self, stage: StageKind) -> usize {
        self.channel_capacity.unwrap_or_else(|| self.workers(stage)).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.workers(StageKind::Fetch), 10);
        assert_eq!(config.workers(StageKind::Parse), 50);
        assert_eq!(config.workers(StageKind::Render), 5);
        assert_eq!(config.capacity_into(StageKind::Parse), 50);
    }

    #[test]
    fn test_builder_and_clamping() {
        let config = PipelineConfig::new()
            .with_fetch_workers(0)
            .with_parse_workers(2)
            .with_render_workers(3)
            .with_channel_capacity(0);

        assert_eq!(config.workers(StageKind::Fetch), 1);
        assert_eq!(config.workers(StageKind::Parse), 2);
        assert_eq!(config.capacity_into(StageKind::Render), 1);
    }

    #[test]
    fn test_from_json_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"parse_workers": 8, "fetch": {{"timeout_seconds": 5}}, "parse": {{"post_selector": "div.l_post"}}}}"#
        )
        .unwrap();

        let config = PipelineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.parse_workers, 8);
        assert_eq!(config.fetch_workers, 10);
        assert_eq!(config.fetch.timeout_seconds, 5);
        assert_eq!(config.parse.post_selector, "div.l_post");
        assert_eq!(config.channel_capacity, None);
    }

    #[test]
    fn test_from_json_file_errors() {
        let missing = PipelineConfig::from_json_file("/no/such/pipeline.json").unwrap_err();
        assert!(matches!(missing, DocflowError::Config(_)));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let invalid = PipelineConfig::from_json_file(file.path()).unwrap_err();
        assert!(matches!(invalid, DocflowError::Serialization(_)));
    }
}
