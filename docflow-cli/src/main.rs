//! `docflow` command-line entry point.
//!
//! Startup concerns live here: argument parsing, logging, output directory,
//! template loading and Ctrl-C handling. Item-level failures are logged and
//! never change the exit code; only setup errors do.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use docflow::cancellation::CancellationToken;
use docflow::pipeline::{read_source_list, Pipeline, PipelineConfig};
use docflow::stages::{FetchStage, HttpClient, ParseStage, RenderConfig, RenderStage};
use docflow::template::TemplateSet;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Fetch, parse and render a batch of discussion threads.
#[derive(Debug, Parser)]
#[command(name = "docflow", version, about)]
struct Cli {
    /// Line-delimited list of source URLs.
    #[arg(long, value_name = "PATH", default_value = "url.txt")]
    sources: PathBuf,

    /// Template used to render each document.
    #[arg(long, value_name = "PATH", default_value = "template/template1.html")]
    template: PathBuf,

    /// Directory receiving the rendered files.
    #[arg(long, value_name = "DIR", default_value = "./output")]
    output: PathBuf,

    /// Pipeline configuration as JSON.
    #[arg(long, value_name = "PATH", env = "DOCFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Override the number of fetch workers.
    #[arg(long, value_name = "COUNT")]
    fetch_workers: Option<usize>,

    /// Override the number of parse workers.
    #[arg(long, value_name = "COUNT")]
    parse_workers: Option<usize>,

    /// Override the number of render workers.
    #[arg(long, value_name = "COUNT")]
    render_workers: Option<usize>,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Print a JSON summary of the run to stdout.
    #[arg(long)]
    summary: bool,
}

impl Cli {
    fn pipeline_config(&self) -> anyhow::Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)
                .with_context(|| format!("loading pipeline config {}", path.display()))?,
            None => PipelineConfig::default(),
        };
        if let Some(workers) = self.fetch_workers {
            config = config.with_fetch_workers(workers);
        }
        if let Some(workers) = self.parse_workers {
            config = config.with_parse_workers(workers);
        }
        if let Some(workers) = self.render_workers {
            config = config.with_render_workers(workers);
        }
        Ok(config)
    }
}

fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy();
    let timer = fmt::time::ChronoUtc::new(TIME_FORMAT.to_string());

    let fmt_layer = match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_timer(timer)
            .with_current_span(true)
            .with_target(true)
            .boxed(),
        LogFormat::Text => fmt::layer().with_timer(timer).with_target(false).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .context("failed to install tracing subscriber")
}

/// Closes the token on Ctrl-C. Returns once either happens.
async fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::select! {
        () = token.cancelled() => {}
        signalled = tokio::signal::ctrl_c() => match signalled {
            Ok(()) => {
                warn!("Ctrl-C received, shutting down");
                token.cancel("interrupted");
            }
            Err(e) => warn!(error = %e, "Failed to install Ctrl-C handler"),
        },
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format)?;
    println!("docflow v{}", env!("CARGO_PKG_VERSION"));

    let config = cli.pipeline_config()?;
    tokio::fs::create_dir_all(&cli.output)
        .await
        .with_context(|| format!("creating output directory {}", cli.output.display()))?;
    let templates = TemplateSet::from_file(&cli.template)
        .with_context(|| format!("loading template {}", cli.template.display()))?;
    let sources = read_source_list(&cli.sources)
        .await
        .with_context(|| format!("reading source list {}", cli.sources.display()))?;

    let pipeline = Pipeline::new(
        config.clone(),
        FetchStage::new(HttpClient::new(&config.fetch)?),
        ParseStage::new(&config.parse)?,
        RenderStage::new(Arc::new(templates), RenderConfig::new(&cli.output))?,
    );

    let token = CancellationToken::new();
    let interrupt = tokio::spawn(cancel_on_ctrl_c(token.clone()));

    info!(sources = sources.len(), output = %cli.output.display(), "Starting");
    let report = pipeline.run_with_token(sources, &token).await;
    // The pipeline closes the token on return, which ends the Ctrl-C task.
    if let Err(e) = interrupt.await {
        debug!(error = %e, "Ctrl-C task ended abnormally");
    }

    if cli.summary {
        println!("{}", serde_json::to_string_pretty(&report.summary())?);
    }
    Ok(())
}
