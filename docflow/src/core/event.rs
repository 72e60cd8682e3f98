//! Pipeline events reported by the orchestrator.

use serde::{Deserialize, Serialize};

use super::{Artifact, StageKind};
use crate::errors::StageError;

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEventKind {
    /// An item failed a stage and was dropped from the pipeline.
    ItemFailed {
        /// Stage tag.
        stage: String,
        /// Identifier of the failed item.
        item: String,
        /// Rendered cause.
        cause: String,
    },
    /// The render stage produced an artifact.
    ArtifactRendered {
        /// Identifier of the originating source.
        source_id: String,
        /// Artifact identifier.
        path: String,
    },
    /// A stage closed its error sequence.
    StageCompleted {
        /// Stage tag.
        stage: StageKind,
    },
    /// Every stage has completed.
    JobDone {
        /// Number of artifacts rendered.
        rendered: usize,
        /// Number of item failures across all stages.
        failed: usize,
        /// Whether the run was cancelled before its input was exhausted.
        cancelled: bool,
    },
}

/// An event emitted by the orchestrator's event loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// When the event occurred (ISO 8601).
    pub timestamp: String,
    /// The event payload.
    #[serde(flatten)]
    pub kind: PipelineEventKind,
}

impl PipelineEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(kind: PipelineEventKind) -> Self {
        Self {
            timestamp: crate::utils::iso_timestamp(),
            kind,
        }
    }

    /// An item failure.
    #[must_use]
    pub fn item_failed(error: &StageError) -> Self {
        Self::new(PipelineEventKind::ItemFailed {
            stage: error.stage().to_string(),
            item: error.item().to_string(),
            cause: error.cause().to_string(),
        })
    }

    /// A rendered artifact.
    #[must_use]
    pub fn artifact_rendered(artifact: &Artifact) -> Self {
        Self::new(PipelineEventKind::ArtifactRendered {
            source_id: artifact.source_id.clone(),
            path: artifact.id(),
        })
    }

    /// A stage completion.
    #[must_use]
    pub fn stage_completed(stage: StageKind) -> Self {
        Self::new(PipelineEventKind::StageCompleted { stage })
    }

    /// The final completion.
    #[must_use]
    pub fn job_done(rendered: usize, failed: usize, cancelled: bool) -> Self {
        Self::new(PipelineEventKind::JobDone {
            rendered,
            failed,
            cancelled,
        })
    }

    /// Returns the dotted event type (e.g. `stage.completed`).
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self.kind {
            PipelineEventKind::ItemFailed { .. } => "item.failed",
            PipelineEventKind::ArtifactRendered { .. } => "artifact.rendered",
            PipelineEventKind::StageCompleted { .. } => "stage.completed",
            PipelineEventKind::JobDone { .. } => "job.done",
        }
    }
}
