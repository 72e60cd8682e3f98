//! Error types for the docflow pipeline.
//!
//! Two families exist: [`DocflowError`] for setup failures that abort a run
//! before any item is processed, and [`ItemError`] for a single work item that
//! failed a stage. Item errors travel to the orchestrator wrapped in a
//! [`StageError`] and never stop the batch.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The main error type for docflow setup and configuration.
#[derive(Debug, Error)]
pub enum DocflowError {
    /// The render template could not be loaded or parsed.
    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    /// A CSS selector in the parse configuration is invalid.
    #[error("Invalid selector `{selector}`: {message}")]
    InvalidSelector {
        /// The offending selector.
        selector: String,
        /// The parser message.
        message: String,
    },

    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    /// Configuration could not be read.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The cause of a single work item failing a stage.
#[derive(Debug, Error)]
pub enum ItemError {
    /// The request could not be sent or the body could not be read.
    #[error("request failed: {0}")]
    Transport(String),

    /// The server answered with a non-success status code.
    #[error("unexpected status {status} from {url}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// The requested URL.
        url: String,
    },

    /// The content could not be turned into a document.
    #[error("unparseable content: {0}")]
    Parse(String),

    /// The template failed to render.
    #[error("render failed: {0}")]
    Render(String),

    /// Writing or reading a local file failed.
    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),

    /// The transform panicked.
    #[error("worker panicked: {0}")]
    Panicked(String),

    /// Any other failure.
    #[error("{0}")]
    Other(String),
}

impl ItemError {
    /// Creates a generic item error from a message.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Returns a short, stable kind label used in logs and reports.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) => ErrorKind::Transport,
            Self::Status { .. } => ErrorKind::Status,
            Self::Parse(_) => ErrorKind::Parse,
            Self::Render(_) => ErrorKind::Render,
            Self::Io(_) => ErrorKind::Io,
            Self::Panicked(_) => ErrorKind::Panicked,
            Self::Other(_) => ErrorKind::Other,
        }
    }
}

impl From<tera::Error> for ItemError {
    fn from(err: tera::Error) -> Self {
        // tera nests the useful message in the source chain
        let mut message = err.to_string();
        let mut source = std::error::Error::source(&err);
        while let Some(inner) = source {
            message.push_str(": ");
            message.push_str(&inner.to_string());
            source = inner.source();
        }
        Self::Render(message)
    }
}

/// Kind label of an [`ItemError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Transport failure.
    Transport,
    /// Non-success status.
    Status,
    /// Parse failure.
    Parse,
    /// Render failure.
    Render,
    /// Filesystem failure.
    Io,
    /// Worker panic.
    Panicked,
    /// Anything else.
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport => write!(f, "transport"),
            Self::Status => write!(f, "status"),
            Self::Parse => write!(f, "parse"),
            Self::Render => write!(f, "render"),
            Self::Io => write!(f, "io"),
            Self::Panicked => write!(f, "panicked"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// A stage-tagged failure record for a single work item.
///
/// Immutable once created: fields are private and only exposed by reference.
#[derive(Debug, Error)]
#[error("[{stage}] {item}: {cause}")]
pub struct StageError {
    stage: String,
    item: String,
    #[source]
    cause: ItemError,
}

impl StageError {
    /// Creates a new stage error.
    #[must_use]
    pub fn new(stage: impl Into<String>, item: impl Into<String>, cause: ItemError) -> Self {
        Self {
            stage: stage.into(),
            item: item.into(),
            cause,
        }
    }

    /// The name of the stage that failed the item.
    #[must_use]
    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// The identifier of the failed item.
    #[must_use]
    pub fn item(&self) -> &str {
        &self.item
    }

    /// The underlying cause.
    #[must_use]
    pub fn cause(&self) -> &ItemError {
        &self.cause
    }

    /// Converts to a dictionary representation for structured sinks.
    #[must_use]
    pub fn to_dict(&self) -> serde_json::Value {
        serde_json::json!({
            "stage": self.stage,
            "item": self.item,
            "kind": self.cause.kind(),
            "cause": self.cause.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_stage_error_display() {
        let err = StageError::new(
            "fetch",
            "https://example.com/p/1",
            ItemError::Status {
                status: 404,
                url: "https://example.com/p/1".to_string(),
            },
        );

        assert_eq!(
            err.to_string(),
            "[fetch] https://example.com/p/1: unexpected status 404 from https://example.com/p/1"
        );
        assert_eq!(err.stage(), "fetch");
        assert_eq!(err.cause().kind(), ErrorKind::Status);
    }

    #[test]
    fn test_stage_error_source_is_cause() {
        let err = StageError::new("parse", "a", ItemError::Parse("no title".into()));
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source, Some("unparseable content: no title".to_string()));
    }

    #[test]
    fn test_stage_error_to_dict() {
        let err = StageError::new("render", "b", ItemError::other("disk full"));
        let dict = err.to_dict();

        assert_eq!(dict["stage"], "render");
        assert_eq!(dict["item"], "b");
        assert_eq!(dict["kind"], "other");
        assert_eq!(dict["cause"], "disk full");
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: ItemError = io.into();
        assert_eq!(err.kind(), ErrorKind::Io);

        let setup: DocflowError = std::io::Error::new(std::io::ErrorKind::Other, "x").into();
        assert!(setup.to_string().starts_with("IO error"));
    }
}
