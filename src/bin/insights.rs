//! Replay a recorded session through the insight pipeline
//!
//! Prints the workflow result as JSON on stdout; logs go to stderr.

use anyhow::{Context, Result};
use clap::Parser;
use insight_pipeline::cache::PipelineCaches;
use insight_pipeline::config::PipelineConfig;
use insight_pipeline::pipeline::PipelineProgress;
use insight_pipeline::replay::{ReplayCollaborators, ReplayFixture};
use insight_pipeline::AgentContext;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "insights")]
#[command(about = "Run the NL analytics pipeline against a recorded fixture")]
struct Args {
    /// Question to ask (defaults to the fixture's recorded question)
    question: Option<String>,

    /// Fixture file with recorded schema, SQL, rows and LLM responses
    #[arg(short, long)]
    fixture: PathBuf,

    /// Data source id (defaults to the fixture's, then "replay")
    #[arg(short, long)]
    data_source: Option<String>,

    /// JSON config file (defaults plus INSIGHTS_* environment overrides otherwise)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print pipeline metrics after the result
    #[arg(long)]
    metrics: bool,

    /// Log every progress update
    #[arg(long)]
    progress: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::from_env().context("reading INSIGHTS_* environment")?,
    };
    let fixture = ReplayFixture::from_file(&args.fixture)
        .with_context(|| format!("loading fixture {}", args.fixture.display()))?;

    let question = args
        .question
        .clone()
        .unwrap_or_else(|| fixture.question.clone());
    let data_source = args
        .data_source
        .clone()
        .or_else(|| fixture.data_source_id.clone())
        .unwrap_or_else(|| "replay".to_string());

    info!("Question: {}", question);
    info!("Data source: {}", data_source);

    let caches = Arc::new(PipelineCaches::new(
        config.schema_cache_ttl(),
        config.query_cache_ttl(),
    ));
    let replay = ReplayCollaborators::new(fixture);
    let orchestrator = replay.orchestrator(caches, config);

    let callback: Option<insight_pipeline::ProgressCallback> = if args.progress {
        Some(Arc::new(|progress: PipelineProgress| {
            info!(
                "progress {}% at {}: {}",
                progress.progress_percent, progress.stage, progress.current_step
            );
        }))
    } else {
        None
    };

    let result = orchestrator
        .execute_workflow(&question, &data_source, &AgentContext::default(), callback)
        .await;
    println!("{}", serde_json::to_string_pretty(&result)?);

    if args.metrics {
        let snapshot = orchestrator.metrics().snapshot();
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    }

    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}
