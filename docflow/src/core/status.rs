//! Stage kinds and error-sequence observer state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The three stages of the document pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Retrieves raw content for a source.
    Fetch,
    /// Turns raw content into a structured document.
    Parse,
    /// Writes a document to an output artifact.
    Render,
}

impl StageKind {
    /// All stages in pipeline order.
    pub const ALL: [Self; 3] = [Self::Fetch, Self::Parse, Self::Render];

    /// Returns the stage tag used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Parse => "parse",
            Self::Render => "render",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of the orchestrator's observer on one stage's error sequence.
///
/// `Active` until the sequence reports closed, then `Closed` for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObserverState {
    /// The stage may still report errors.
    #[default]
    Active,
    /// The stage's error sequence is closed.
    Closed,
}

impl ObserverState {
    /// Whether the sequence is still live.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }

    /// Transitions to `Closed`. Returns `true` only on the first call.
    pub fn close(&mut self) -> bool {
        let was_active = self.is_active();
        *self = Self::Closed;
        was_active
    }
}

impl fmt::Display for ObserverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Closed => write!(f, "closed"),
        }
    }
}
