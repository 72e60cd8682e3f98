//! Core domain model types for docflow.
//!
//! This module contains the values that flow through the pipeline:
//! - Work items handed from stage to stage
//! - The rendered artifact at the end of the pipeline
//! - Pipeline events reported by the orchestrator
//! - Observer state for the per-stage error sequences

mod artifact;
mod event;
mod item;
mod status;

pub use artifact::Artifact;
pub use event::{PipelineEvent, PipelineEventKind};
pub use item::{Document, Post, RawPage, Source, WorkItem};
pub use status::{ObserverState, StageKind};
