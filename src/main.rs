use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use ontopop_pipeline::app::diff_use_case::DiffUseCase;
use ontopop_pipeline::app::ingest_use_case::{IngestUseCase, Submission};
use ontopop_pipeline::config::AppConfig;
use ontopop_pipeline::pipeline::{PipelineConfig, PipelineCoordinator, StageConsumer, StageKind};
use ontopop_pipeline::{logging, metrics, OntologyMessage, PipelineContext};
use std::path::PathBuf;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "ontopop")]
#[command(about = "Ontology post-ingestion pipeline")]
#[command(version = "0.1.0")]
struct Cli {
    /// Config file (defaults to ontopop.toml when present)
    #[arg(long, env = "ONTOPOP_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Consume one stage's input channel until interrupted
    RunStage {
        /// validator, triplestore-loader, parser, modeller, graph-loader or indexer
        #[arg(long)]
        stage: StageKind,
    },
    /// Consume every stage's input channel in this process
    RunAll,
    /// Drive one message through the stages in order
    Pipeline {
        /// Full OntologyMessage JSON
        #[arg(long, conflicts_with_all = ["ontology_id", "webhook_id"])]
        message: Option<String>,
        #[arg(long, requires = "webhook_id")]
        ontology_id: Option<i64>,
        #[arg(long, requires = "ontology_id")]
        webhook_id: Option<i64>,
        /// full, graph-only or validate-only
        #[arg(long, default_value = "full")]
        pipeline: String,
    },
    /// Record a webhook delivery for an ontology file and publish it
    Submit {
        #[arg(long)]
        ontology_id: i64,
        #[arg(long)]
        name: String,
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        repo_path: Option<String>,
        #[arg(long)]
        commit: Option<String>,
        /// Also run the full pipeline in this process
        #[arg(long)]
        run: bool,
    },
    /// Compare two stored states of an ontology
    Diff {
        #[arg(long)]
        ontology_id: i64,
        /// State before this time against the latest (e.g. 2024-03-01T12:00:00)
        #[arg(long, conflicts_with_all = ["webhook_id", "left"])]
        at: Option<String>,
        /// This webhook against the latest
        #[arg(long, conflicts_with = "left")]
        webhook_id: Option<i64>,
        #[arg(long, requires = "right")]
        left: Option<i64>,
        #[arg(long, requires = "left")]
        right: Option<i64>,
    },
    /// List recorded webhooks of an ontology
    ListWebhooks {
        #[arg(long)]
        ontology_id: i64,
    },
}

fn pipeline_config(name: &str) -> Result<PipelineConfig> {
    match name {
        "full" => Ok(PipelineConfig::default_full_pipeline()),
        "graph-only" => Ok(PipelineConfig::graph_only()),
        "validate-only" => Ok(PipelineConfig::validate_only()),
        other => bail!("Unknown pipeline '{}'. Available: full, graph-only, validate-only", other),
    }
}

fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    if let Ok(at) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Ok(at.naive_utc());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
        .with_context(|| format!("Invalid timestamp '{}'", raw))
}

async fn run_pipeline(ctx: PipelineContext, config: PipelineConfig, message: OntologyMessage) -> Result<()> {
    let result = PipelineCoordinator::new(ctx).run_pipeline(&config, message).await?;

    println!("\n📊 Pipeline '{}' for {}:", result.pipeline_name, result.processed_filename);
    for name in &result.executed {
        if let Some(step) = result.step_results.get(name) {
            let mark = if step.success { "✅" } else { "❌" };
            println!("   {} {}: {}", mark, name, step.message);
        }
    }
    if let Some(duration) = result.duration() {
        println!("   Duration: {}ms", duration.num_milliseconds());
    }
    if !result.success {
        bail!("Pipeline '{}' failed", result.pipeline_name);
    }
    if result.halted {
        println!("⏹️  Pipeline stopped early");
    }
    Ok(())
}

async fn consume(ctx: PipelineContext, stages: &[StageKind]) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut consumers = JoinSet::new();
    for kind in stages.iter().copied() {
        let consumer = StageConsumer::new(ctx.clone(), kind);
        let mut rx = shutdown_rx.clone();
        consumers.spawn(async move {
            let shutdown = async move {
                let _ = rx.changed().await;
            };
            (kind, consumer.run(shutdown).await)
        });
    }

    let mut failure = None;
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);
    while !consumers.is_empty() {
        tokio::select! {
            signal = &mut interrupt => {
                signal.context("Failed to listen for Ctrl-C")?;
                info!("Interrupt received, stopping {} consumer(s)", consumers.len());
                break;
            }
            Some(joined) = consumers.join_next() => match joined {
                Ok((_, Ok(()))) => {}
                Ok((kind, Err(e))) => {
                    error!("Consumer {} stopped with error: {}", kind, e);
                    failure = Some(anyhow::anyhow!("Consumer {} failed: {}", kind, e));
                    break;
                }
                Err(e) => {
                    error!("Consumer task panicked: {}", e);
                    failure = Some(anyhow::anyhow!("Consumer task panicked: {}", e));
                    break;
                }
            }
        }
    }

    let _ = shutdown_tx.send(true);
    while let Some(joined) = consumers.join_next().await {
        match joined {
            Ok((_, Ok(()))) => {}
            Ok((kind, Err(e))) => error!("Consumer {} stopped with error: {}", kind, e),
            Err(e) => error!("Consumer task panicked: {}", e),
        }
    }
    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    logging::init_logging();
    metrics::init_metrics();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let ctx = PipelineContext::from_config(&config).context("Failed to build pipeline context")?;

    match cli.command {
        Commands::RunStage { stage } => {
            println!("🔄 Running {} consumer...", stage);
            consume(ctx, &[stage]).await?;
        }
        Commands::RunAll => {
            println!("🚀 Running all stage consumers...");
            consume(ctx, &StageKind::ALL).await?;
        }
        Commands::Pipeline {
            message,
            ontology_id,
            webhook_id,
            pipeline,
        } => {
            let message = match (message, ontology_id, webhook_id) {
                (Some(json), _, _) => OntologyMessage::from_json(&json)?,
                (None, Some(ontology_id), Some(webhook_id)) => OntologyMessage::new(ontology_id, webhook_id),
                _ => bail!("Provide --message or both --ontology-id and --webhook-id"),
            };
            run_pipeline(ctx, pipeline_config(&pipeline)?, message).await?;
        }
        Commands::Submit {
            ontology_id,
            name,
            file,
            repo_path,
            commit,
            run,
        } => {
            let mut submission = Submission::new(ontology_id, name, file);
            submission.repo_resource_path = repo_path;
            submission.commit_id = commit;
            let (webhook, message) = IngestUseCase::new(ctx.clone()).submit(&submission).await?;
            println!("📥 Recorded webhook {} as {}", webhook.id, message.processed_filename);
            if run {
                run_pipeline(ctx, PipelineConfig::default_full_pipeline(), message).await?;
            }
        }
        Commands::Diff {
            ontology_id,
            at,
            webhook_id,
            left,
            right,
        } => {
            let diffs = DiffUseCase::new(ctx);
            let output = match (at, webhook_id, left, right) {
                (Some(at), _, _, _) => {
                    serde_json::to_string_pretty(&diffs.diff_by_timestamp(ontology_id, parse_timestamp(&at)?).await?)?
                }
                (None, Some(webhook_id), _, _) => {
                    serde_json::to_string_pretty(&diffs.diff_by_webhook(ontology_id, webhook_id).await?)?
                }
                (None, None, Some(left), Some(right)) => {
                    serde_json::to_string_pretty(&diffs.diff_left_right(ontology_id, left, right).await?)?
                }
                _ => bail!("Provide --at, --webhook-id, or --left with --right"),
            };
            println!("{}", output);
        }
        Commands::ListWebhooks { ontology_id } => {
            let webhooks = IngestUseCase::new(ctx).list_webhooks(ontology_id)?;
            println!("{}", serde_json::to_string_pretty(&webhooks)?);
        }
    }
    Ok(())
}
