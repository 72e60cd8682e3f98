//! # Docflow
//!
//! A bounded, cancellable fetch → parse → render pipeline for batches of
//! documents.
//!
//! Docflow provides:
//!
//! - **Stage runners**: a fixed pool of workers per stage, bounded queues that
//!   backpressure upstream, and a strict close discipline for every sequence
//! - **Error isolation**: per-item failures travel on dedicated per-stage error
//!   sequences and never stop the batch
//! - **Cancellation**: one broadcast token unwinds every in-flight task
//! - **Collaborators**: an HTTP fetcher, a CSS-selector extractor and a
//!   template renderer, all swappable behind the [`Stage`](stages::Stage) trait
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use docflow::prelude::*;
//! use std::sync::Arc;
//!
//! let config = PipelineConfig::default();
//! let templates = Arc::new(TemplateSet::from_file("template/template1.html")?);
//!
//! let pipeline = Pipeline::new(
//!     config.clone(),
//!     FetchStage::new(HttpClient::new(&config.fetch)?),
//!     ParseStage::new(&config.parse)?,
//!     RenderStage::new(templates, RenderConfig::new("./output"))?,
//! );
//!
//! let report = pipeline.run(read_source_list("url.txt").await?).await;
//! println!("{} rendered, {} failed", report.rendered.len(), report.failed());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod core;
pub mod errors;
pub mod events;
pub mod pipeline;
pub mod stages;
pub mod template;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::{CancellationObserver, CancellationToken};
    pub use crate::core::{
        Artifact, Document, PipelineEvent, Post, RawPage, Source, StageKind, WorkItem,
    };
    pub use crate::errors::{DocflowError, ItemError, StageError};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::pipeline::{read_source_list, Pipeline, PipelineConfig, PipelineReport};
    #[cfg(feature = "http")]
    pub use crate::stages::HttpClient;
    pub use crate::stages::{
        FetchConfig, FetchStage, FnStage, ParseConfig, ParseStage, RenderConfig, RenderStage,
        Stage,
    };
    pub use crate::template::TemplateSet;
    pub use crate::utils::{format_local_time, iso_timestamp};
}
