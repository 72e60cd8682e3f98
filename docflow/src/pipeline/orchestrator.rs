//! The orchestrator: three stage runners in series and one event loop.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use super::config::PipelineConfig;
use super::source::spawn_source_reader;
use crate::cancellation::CancellationToken;
use crate::core::{Artifact, ObserverState, PipelineEvent, Source, StageKind};
use crate::errors::StageError;
use crate::events::{EventSink, LoggingEventSink};
use crate::stages::{Stage, StageHandle, StageRunner, StageStatsSnapshot};

/// Per-stage counters at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Fetch stage counters.
    pub fetch: StageStatsSnapshot,
    /// Parse stage counters.
    pub parse: StageStatsSnapshot,
    /// Render stage counters.
    pub render: StageStatsSnapshot,
}

impl PipelineStats {
    /// Counters of one stage.
    #[must_use]
    pub fn stage(&self, stage: StageKind) -> &StageStatsSnapshot {
        match stage {
            StageKind::Fetch => &self.fetch,
            StageKind::Parse => &self.parse,
            StageKind::Render => &self.render,
        }
    }
}

/// Outcome of one pipeline run.
#[derive(Debug)]
pub struct PipelineReport {
    /// Identifier of the run, also recorded on the `pipeline` span.
    pub run_id: Uuid,
    /// Artifacts produced by the render stage, in completion order.
    pub rendered: Vec<Artifact>,
    /// Every item failure, in the order the event loop received them.
    pub errors: Vec<StageError>,
    /// Per-stage counters.
    pub stats: PipelineStats,
    /// Whether the token closed before the stages finished on their own.
    pub cancelled: bool,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

impl PipelineReport {
    /// Number of item failures across all stages.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.errors.len()
    }

    /// Failures raised by one stage.
    pub fn errors_for(&self, stage: StageKind) -> impl Iterator<Item = &StageError> {
        self.errors.iter().filter(move |e| e.stage() == stage.as_str())
    }

    /// JSON summary suitable for logs and dashboards.
    #[must_use]
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "run_id": self.run_id.to_string(),
            "rendered": self.rendered.len(),
            "failed": self.failed(),
            "cancelled": self.cancelled,
            "elapsed_ms": u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX),
            "stats": self.stats,
            "errors": self.errors.iter().map(StageError::to_dict).collect::<Vec<_>>(),
        })
    }
}

/// Fetch, parse and render stages wired in series.
///
/// The stage types are chained by their associated item types, so a pipeline
/// whose stages do not fit together does not compile.
pub struct Pipeline<F, P, R> {
    config: PipelineConfig,
    fetch: Arc<F>,
    parse: Arc<P>,
    render: Arc<R>,
    sink: Arc<dyn EventSink>,
}

impl<F, P, R> std::fmt::Debug for Pipeline<F, P, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<F, P, R> Pipeline<F, P, R>
where
    F: Stage<Input = Source>,
    P: Stage<Input = F::Output>,
    R: Stage<Input = P::Output, Output = Artifact>,
{
    /// Creates a pipeline reporting to a [`LoggingEventSink`].
    pub fn new(config: PipelineConfig, fetch: F, parse: P, render: R) -> Self {
        Self::from_shared(config, Arc::new(fetch), Arc::new(parse), Arc::new(render))
    }

    /// Creates a pipeline around stages the caller keeps handles to.
    pub fn from_shared(config: PipelineConfig, fetch: Arc<F>, parse: Arc<P>, render: Arc<R>) -> Self {
        Self {
            config,
            fetch,
            parse,
            render,
            sink: Arc::new(LoggingEventSink::default()),
        }
    }

    /// Replaces the event sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs the batch with a fresh token.
    pub async fn run(&self, sources: Vec<Source>) -> PipelineReport {
        let token = CancellationToken::new();
        self.run_with_token(sources, &token).await
    }

    /// Runs the batch under a caller-supplied token.
    ///
    /// Closing the token from outside stops every stage at its next
    /// suspension point. The token is closed when this call returns.
    pub async fn run_with_token(
        &self,
        sources: Vec<Source>,
        token: &CancellationToken,
    ) -> PipelineReport {
        let run_id = Uuid::now_v7();
        let span = info_span!("pipeline", run_id = %run_id);
        self.execute(run_id, sources, token).instrument(span).await
    }

    async fn execute(
        &self,
        run_id: Uuid,
        sources: Vec<Source>,
        token: &CancellationToken,
    ) -> PipelineReport {
        let started = Instant::now();
        let _teardown = token.drop_guard("pipeline teardown");
        let cancel = token.observe();
        let config = &self.config;

        info!(
            sources = sources.len(),
            fetch_workers = config.workers(StageKind::Fetch),
            parse_workers = config.workers(StageKind::Parse),
            render_workers = config.workers(StageKind::Render),
            "Pipeline started"
        );

        let (source_rx, reader) = spawn_source_reader(
            sources,
            config.capacity_into(StageKind::Fetch),
            cancel.clone(),
        );

        let StageHandle {
            output: fetched,
            errors: mut fetch_errors,
            stats: fetch_stats,
            supervisor: fetch_supervisor,
            ..
        } = StageRunner::from_arc(Arc::clone(&self.fetch))
            .with_workers(config.workers(StageKind::Fetch))
            .with_capacity(config.capacity_into(StageKind::Parse))
            .spawn(source_rx, cancel.clone());

        let StageHandle {
            output: parsed,
            errors: mut parse_errors,
            stats: parse_stats,
            supervisor: parse_supervisor,
            ..
        } = StageRunner::from_arc(Arc::clone(&self.parse))
            .with_workers(config.workers(StageKind::Parse))
            .with_capacity(config.capacity_into(StageKind::Render))
            .spawn(fetched, cancel.clone());

        let StageHandle {
            output: mut artifacts,
            errors: mut render_errors,
            stats: render_stats,
            supervisor: render_supervisor,
            ..
        } = StageRunner::from_arc(Arc::clone(&self.render))
            .with_workers(config.workers(StageKind::Render))
            .with_capacity(config.capacity_into(StageKind::Render))
            .spawn(parsed, cancel.clone());

        let mut fetch_state = ObserverState::default();
        let mut parse_state = ObserverState::default();
        let mut render_state = ObserverState::default();
        let mut output_open = true;
        let mut rendered = Vec::new();
        let mut errors = Vec::new();

        // At least one branch stays enabled while any observer is active.
        while fetch_state.is_active() || parse_state.is_active() || render_state.is_active() {
            tokio::select! {
                received = fetch_errors.recv(), if fetch_state.is_active() => {
                    self.on_error(StageKind::Fetch, received, &mut fetch_state, &mut errors).await;
                }
                received = parse_errors.recv(), if parse_state.is_active() => {
                    self.on_error(StageKind::Parse, received, &mut parse_state, &mut errors).await;
                }
                received = render_errors.recv(), if render_state.is_active() => {
                    self.on_error(StageKind::Render, received, &mut render_state, &mut errors).await;
                }
                received = artifacts.recv(), if output_open => match received {
                    Some(artifact) => self.on_artifact(artifact, &mut rendered).await,
                    None => output_open = false,
                },
            }
        }

        // The render stage closes its output together with its errors, so
        // this drains whatever is left and then ends.
        if output_open {
            self.drain_artifacts(&mut artifacts, &mut rendered).await;
        }

        for (stage, supervisor) in [
            (StageKind::Fetch, fetch_supervisor),
            (StageKind::Parse, parse_supervisor),
            (StageKind::Render, render_supervisor),
        ] {
            if let Err(e) = supervisor.await {
                error!(stage = %stage, error = %e, "Stage supervisor failed");
            }
        }
        match reader.await {
            Ok(sent) => debug!(sent, "Source reader joined"),
            Err(e) => error!(error = %e, "Source reader failed"),
        }

        let cancelled = token.is_cancelled();
        self.sink
            .emit(&PipelineEvent::job_done(rendered.len(), errors.len(), cancelled))
            .await;

        PipelineReport {
            run_id,
            rendered,
            errors,
            stats: PipelineStats {
                fetch: fetch_stats.snapshot(),
                parse: parse_stats.snapshot(),
                render: render_stats.snapshot(),
            },
            cancelled,
            elapsed: started.elapsed(),
        }
    }

    async fn on_error(
        &self,
        stage: StageKind,
        received: Option<StageError>,
        state: &mut ObserverState,
        errors: &mut Vec<StageError>,
    ) {
        match received {
            Some(failure) => {
                self.sink.emit(&PipelineEvent::item_failed(&failure)).await;
                errors.push(failure);
            }
            None => {
                if state.close() {
                    self.sink.emit(&PipelineEvent::stage_completed(stage)).await;
                }
            }
        }
    }

    async fn on_artifact(&self, artifact: Artifact, rendered: &mut Vec<Artifact>) {
        self.sink.emit(&PipelineEvent::artifact_rendered(&artifact)).await;
        rendered.push(artifact);
    }

    async fn drain_artifacts(
        &self,
        artifacts: &mut mpsc::Receiver<Artifact>,
        rendered: &mut Vec<Artifact>,
    ) {
        while let Some(artifact) = artifacts.recv().await {
            self.on_artifact(artifact, rendered).await;
        }
    }
}
