//! Pipeline configuration and execution.
//!
//! This module provides:
//! - Pipeline configuration (worker counts, queue sizes, collaborator settings)
//! - Source list loading and the producer feeding the fetch stage
//! - The orchestrator that wires the stages and drains their error sequences

mod config;
mod orchestrator;
mod source;

#[cfg(test)]
mod integration_tests;

pub use config::PipelineConfig;
pub use orchestrator::{Pipeline, PipelineReport, PipelineStats};
pub use source::{parse_source_list, read_source_list};
