//! Test fixtures for pipeline testing.

use std::sync::Arc;

use crate::core::Source;
use crate::events::CollectingEventSink;
use crate::pipeline::PipelineConfig;

/// `n` sources named `item-0` to `item-{n-1}`.
#[must_use]
pub fn sources(n: usize) -> Vec<Source> {
    (0..n).map(|i| Source::new(format!("item-{i}"))).collect()
}

/// Sources with the given ids, in order.
#[must_use]
pub fn sources_from<I, S>(ids: I) -> Vec<Source>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    ids.into_iter().map(Source::new).collect()
}

/// A shared collecting sink, ready to hand to a pipeline.
#[must_use]
pub fn collecting_sink() -> Arc<CollectingEventSink> {
    Arc::new(CollectingEventSink::new())
}

/// A configuration with the same small worker count for every stage.
#[must_use]
pub fn small_config(workers: usize) -> PipelineConfig {
    PipelineConfig::new()
        .with_fetch_workers(workers)
        .with_parse_workers(workers)
        .with_render_workers(workers)
}
