//! End-to-end tests for pipeline execution.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use crate::cancellation::CancellationToken;
use crate::core::{Artifact, PipelineEventKind, Source, StageKind};
use crate::errors::ItemError;
use crate::pipeline::{Pipeline, PipelineConfig};
use crate::stages::fetch::MockPageClient;
use crate::stages::{
    FetchStage, FnStage, PageResponse, ParseConfig, ParseStage, RenderConfig, RenderStage, Stage,
};
use crate::template::TemplateSet;
use crate::testing::{
    assert_one_outcome_per_source, assert_rendered, assert_stage_failed, collecting_sink,
    small_config, sources, sources_from, ArtifactStage, BlockingStage, ConcurrencyProbe,
    FailingStage, PanickingStage,
};

const BOUND: Duration = Duration::from_secs(5);

fn passthrough(name: &'static str) -> impl Stage<Input = Source, Output = Source> {
    FnStage::new(name, |s: Source| async move { Ok::<_, ItemError>(s) })
}

#[tokio::test]
async fn test_empty_batch_terminates() {
    let sink = collecting_sink();
    let pipeline = Pipeline::new(
        small_config(3),
        passthrough("fetch"),
        passthrough("parse"),
        ArtifactStage::<Source>::new("render"),
    )
    .with_sink(sink.clone());

    let report = tokio::time::timeout(BOUND, pipeline.run(Vec::new()))
        .await
        .expect("empty batch should terminate");

    assert!(report.rendered.is_empty());
    assert!(report.errors.is_empty());
    assert!(!report.cancelled);
    assert_eq!(
        sink.event_types(),
        vec!["stage.completed", "stage.completed", "stage.completed", "job.done"]
    );
}

#[tokio::test]
async fn test_fetch_failures_are_isolated() {
    let batch = sources(20);
    let failing = ["item-1", "item-4", "item-9", "item-13", "item-19"];

    let parse = Arc::new(ConcurrencyProbe::<Source>::new("parse", Duration::ZERO));
    let pipeline = Pipeline::from_shared(
        small_config(4),
        Arc::new(FailingStage::<Source>::new("fetch", failing)),
        Arc::clone(&parse),
        Arc::new(ArtifactStage::<Source>::new("render")),
    )
    .with_sink(collecting_sink());

    let report = pipeline.run(batch.clone()).await;

    assert_stage_failed(&report, StageKind::Fetch, &failing);
    assert_eq!(parse.calls(), 15);
    assert_eq!(report.rendered.len(), 15);
    assert_eq!(report.stats.fetch.failed, 5);
    assert_eq!(report.stats.parse.started, 15);
    assert_one_outcome_per_source(&report, &batch);
}

#[tokio::test]
async fn test_exactly_one_outcome_per_item() {
    let batch = sources(30);
    let render = FnStage::new("render", |s: Source| async move {
        if s.id.ends_with('7') {
            Err(ItemError::Render(format!("template failed for {}", s.id)))
        } else {
            Ok(Artifact::new(s.id.clone(), format!("memory/{}", s.id), 0))
        }
    });

    let sink = collecting_sink();
    let pipeline = Pipeline::new(
        small_config(3).with_channel_capacity(1),
        FailingStage::<Source>::new("fetch", ["item-0", "item-10"]),
        FailingStage::<Source>::new("parse", ["item-5", "item-15", "item-25"]),
        render,
    )
    .with_sink(sink.clone());

    let report = pipeline.run(batch.clone()).await;

    assert_stage_failed(&report, StageKind::Fetch, &["item-0", "item-10"]);
    assert_stage_failed(&report, StageKind::Parse, &["item-5", "item-15", "item-25"]);
    assert_stage_failed(&report, StageKind::Render, &["item-7", "item-17", "item-27"]);
    assert_eq!(report.rendered.len(), 22);
    assert_one_outcome_per_source(&report, &batch);

    assert_eq!(sink.events_of_type("item.failed").len(), 8);
    assert_eq!(sink.events_of_type("artifact.rendered").len(), 22);
}

#[tokio::test]
async fn test_worker_pool_bound() {
    let fetch = Arc::new(ConcurrencyProbe::<Source>::new("fetch", Duration::from_millis(5)));
    let parse = Arc::new(ConcurrencyProbe::<Source>::new("parse", Duration::from_millis(10)));
    let config = PipelineConfig::new()
        .with_fetch_workers(4)
        .with_parse_workers(2)
        .with_render_workers(1);

    let pipeline = Pipeline::from_shared(
        config,
        Arc::clone(&fetch),
        Arc::clone(&parse),
        Arc::new(ArtifactStage::<Source>::new("render")),
    )
    .with_sink(collecting_sink());

    let report = pipeline.run(sources(40)).await;

    assert_eq!(report.rendered.len(), 40);
    assert!(fetch.max_concurrent() <= 4, "fetch overlap {}", fetch.max_concurrent());
    assert!(parse.max_concurrent() <= 2, "parse overlap {}", parse.max_concurrent());
    assert!(report.stats.render.peak_in_flight <= 1);
    assert!(report.stats.parse.peak_in_flight <= 2);
}

#[tokio::test]
async fn test_cancel_mid_batch_shuts_down() {
    let sink = collecting_sink();
    let parse = Arc::new(BlockingStage::<Source>::new("parse"));
    let pipeline = Arc::new(
        Pipeline::from_shared(
            small_config(4),
            Arc::new(passthrough("fetch")),
            Arc::clone(&parse),
            Arc::new(ArtifactStage::<Source>::new("render")),
        )
        .with_sink(sink.clone()),
    );

    let token = CancellationToken::new();
    let running = {
        let pipeline = Arc::clone(&pipeline);
        let token = token.clone();
        tokio::spawn(async move { pipeline.run_with_token(sources(1000), &token).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(parse.entered() > 0);
    token.cancel("operator abort");

    let report = tokio::time::timeout(BOUND, running)
        .await
        .expect("cancelled pipeline should shut down promptly")
        .expect("pipeline task should not panic");

    assert!(report.cancelled);
    assert!(report.rendered.is_empty());
    assert!(report.stats.fetch.started < 1000);
    assert_eq!(token.reason().as_deref(), Some("operator abort"));
    assert_eq!(sink.events_of_type("stage.completed").len(), 3);
    assert_eq!(sink.events_of_type("job.done").len(), 1);
}

#[tokio::test]
async fn test_panicking_transform_keeps_close_discipline() {
    let batch = sources(20);
    let sink = collecting_sink();
    let pipeline = Pipeline::new(
        small_config(3),
        passthrough("fetch"),
        PanickingStage::<Source>::new("parse", ["item-2", "item-12", "item-18"]),
        ArtifactStage::<Source>::new("render"),
    )
    .with_sink(sink.clone());

    let report = tokio::time::timeout(BOUND, pipeline.run(batch.clone()))
        .await
        .expect("panics must not wedge the pipeline");

    assert_stage_failed(&report, StageKind::Parse, &["item-12", "item-18", "item-2"]);
    assert!(report
        .errors
        .iter()
        .all(|e| matches!(e.cause(), ItemError::Panicked(msg) if msg.starts_with("induced panic"))));
    assert_one_outcome_per_source(&report, &batch);
    assert_eq!(sink.events_of_type("job.done").len(), 1);
}

const THREAD: &str = r#"
    <html><body>
      <h1>Thread</h1>
      <div class="post">
        <span class="author">alice</span>
        <div class="content">hello</div>
        <time datetime="1696512000"></time>
      </div>
    </body></html>
"#;

#[tokio::test]
async fn test_end_to_end_with_unreachable_source() {
    let output = tempfile::tempdir().unwrap();

    let mut client = MockPageClient::new();
    client.expect_get().times(3).returning(|url| {
        if url == "B" {
            Err(ItemError::Transport("connection refused".to_string()))
        } else {
            Ok(PageResponse {
                status_code: 200,
                final_url: url.to_string(),
                body: THREAD.to_string(),
            })
        }
    });

    let templates = Arc::new(TemplateSet::builtin().unwrap());
    let sink = collecting_sink();
    let pipeline = Pipeline::new(
        PipelineConfig::default(),
        FetchStage::new(client),
        ParseStage::new(&ParseConfig::default()).unwrap(),
        RenderStage::new(templates, RenderConfig::new(output.path())).unwrap(),
    )
    .with_sink(sink.clone());

    let report = tokio::time::timeout(BOUND, pipeline.run(sources_from(["A", "B", "C"])))
        .await
        .expect("pipeline should finish");

    assert_rendered(&report, &["A", "C"]);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].stage(), "fetch");
    assert_eq!(report.errors[0].item(), "B");
    for artifact in &report.rendered {
        let html = std::fs::read_to_string(&artifact.path).unwrap();
        assert!(html.contains("alice"));
    }

    let types = sink.event_types();
    assert_eq!(types.iter().filter(|t| **t == "job.done").count(), 1);
    assert_eq!(types.last(), Some(&"job.done"));

    let completed: Vec<StageKind> = sink
        .events_of_type("stage.completed")
        .into_iter()
        .filter_map(|e| match e.kind {
            PipelineEventKind::StageCompleted { stage } => Some(stage),
            _ => None,
        })
        .collect();
    assert_eq!(completed.len(), 3);
    assert!(completed.contains(&StageKind::Parse));
    assert!(completed.contains(&StageKind::Render));

    match &sink.events_of_type("job.done")[0].kind {
        PipelineEventKind::JobDone {
            rendered,
            failed,
            cancelled,
        } => {
            assert_eq!((*rendered, *failed, *cancelled), (2, 1, false));
        }
        other => panic!("unexpected event {other:?}"),
    }
}
