//! Testing utilities for docflow pipelines.
//!
//! This module provides:
//! - Mock stages (concurrency probe, failing, panicking, blocking, artifact)
//! - Fixtures for sources, sinks and configurations
//! - Assertions over pipeline reports

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{assert_one_outcome_per_source, assert_rendered, assert_stage_failed};
pub use fixtures::{collecting_sink, small_config, sources, sources_from};
pub use mocks::{ArtifactStage, BlockingStage, ConcurrencyProbe, FailingStage, PanickingStage};
