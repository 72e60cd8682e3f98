//! Event sinks for pipeline reporting.
//!
//! The orchestrator reports every item failure, rendered artifact, stage
//! completion and the final "Job done" through an [`EventSink`]. Production
//! runs log through `tracing`; tests collect events for inspection.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
