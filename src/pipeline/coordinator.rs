use crate::config::ConsistencyMode;
use crate::context::PipelineContext;
use crate::error::Result;
use crate::message::OntologyMessage;
use crate::metrics::CoordinatorMetrics;
use crate::pipeline::pipeline_config::PipelineConfig;
use crate::pipeline::runner::StageRunner;
use crate::pipeline::stage::{StageKind, StageOutcome};
use crate::pipeline::stages::create_stage;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How the coordinator tolerates storage that is only eventually consistent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsistencyPolicy {
    /// Poll for the next stage's input, doubling the interval, up to `max_wait`.
    Poll { interval: Duration, max_wait: Duration },
    FixedDelay(Duration),
}

impl ConsistencyPolicy {
    pub fn from_config(config: &crate::config::CoordinatorConfig) -> Self {
        match config.consistency {
            ConsistencyMode::Poll => ConsistencyPolicy::Poll {
                interval: Duration::from_millis(config.poll_interval_ms.max(1)),
                max_wait: Duration::from_millis(config.max_wait_ms),
            },
            ConsistencyMode::FixedDelay => ConsistencyPolicy::FixedDelay(Duration::from_millis(config.delay_ms)),
        }
    }
}

/// Result of one stage inside a coordinated run.
#[derive(Debug, Clone)]
pub struct StepResult {
    pub success: bool,
    pub outcome: Option<StageOutcome>,
    pub message: String,
}

impl StepResult {
    pub fn from_outcome(outcome: StageOutcome) -> Self {
        let message = match &outcome {
            StageOutcome::Completed { artifact, .. } => format!("wrote {}", artifact),
            StageOutcome::Rejected { .. } => "ontology is inconsistent".to_string(),
            StageOutcome::Skipped => "skipped, ontology not validated".to_string(),
            StageOutcome::Superseded { committed_webhook_event_id } => {
                format!("superseded by webhook {}", committed_webhook_event_id)
            }
        };
        Self {
            success: true,
            outcome: Some(outcome),
            message,
        }
    }

    pub fn failure(message: String) -> Self {
        Self {
            success: false,
            outcome: None,
            message,
        }
    }
}

/// Result of executing a complete pipeline
#[derive(Debug, Clone)]
pub struct PipelineExecutionResult {
    pub pipeline_name: String,
    pub processed_filename: String,
    pub success: bool,
    /// Stopped early without error (invalid or superseded ontology).
    pub halted: bool,
    pub step_results: HashMap<String, StepResult>,
    /// Stage names in execution order.
    pub executed: Vec<String>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl PipelineExecutionResult {
    pub fn new(pipeline_name: String, processed_filename: String) -> Self {
        Self {
            pipeline_name,
            processed_filename,
            success: true,
            halted: false,
            step_results: HashMap::new(),
            executed: Vec::new(),
            started_at: chrono::Utc::now(),
            completed_at: None,
        }
    }

    pub fn add_step_result(&mut self, stage: StageKind, result: StepResult) {
        self.executed.push(stage.name().to_string());
        self.step_results.insert(stage.name().to_string(), result);
    }

    pub fn step(&self, stage: StageKind) -> Option<&StepResult> {
        self.step_results.get(stage.name())
    }

    pub fn complete(&mut self) {
        self.completed_at = Some(chrono::Utc::now());
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        self.completed_at.map(|end| end - self.started_at)
    }
}

/// Runs every stage of a pipeline in one process, in order, for one message.
#[derive(Clone)]
pub struct PipelineCoordinator {
    ctx: PipelineContext,
    policy: ConsistencyPolicy,
}

impl PipelineCoordinator {
    pub fn new(ctx: PipelineContext) -> Self {
        let policy = ConsistencyPolicy::from_config(&ctx.config.coordinator);
        Self { ctx, policy }
    }

    pub fn with_policy(mut self, policy: ConsistencyPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Fire-and-forget trigger: returns as soon as the run is scheduled.
    pub fn spawn_pipeline(
        &self,
        config: PipelineConfig,
        message: OntologyMessage,
    ) -> JoinHandle<Result<PipelineExecutionResult>> {
        let coordinator = self.clone();
        tokio::spawn(async move { coordinator.run_pipeline(&config, message).await })
    }

    /// Run synchronously, stopping at the first failing stage.
    pub async fn run_pipeline(
        &self,
        config: &PipelineConfig,
        message: OntologyMessage,
    ) -> Result<PipelineExecutionResult> {
        info!("🚀 Starting pipeline '{}' for {}", config.name, message.processed_filename);
        config.validate()?;

        let started = Instant::now();
        let runner = StageRunner::new(&self.ctx);
        let mut execution_result =
            PipelineExecutionResult::new(config.name.clone(), message.processed_filename.clone());
        let mut current = message;

        for (step_index, kind) in config.stages.iter().copied().enumerate() {
            if step_index > 0 {
                if let Err(e) = self.wait_for_input(kind, &current).await {
                    error!("❌ Waiting for '{}' input failed with error: {}", kind, e);
                    execution_result.add_step_result(kind, StepResult::failure(e.to_string()));
                    execution_result.success = false;
                    break;
                }
            }
            info!("🔄 Executing step {}/{}: {}", step_index + 1, config.stages.len(), kind);

            let stage = create_stage(kind);
            match runner.run(stage.as_ref(), &current).await {
                Ok(outcome) => {
                    let next = outcome.published().cloned();
                    let halt = !matches!(outcome, StageOutcome::Completed { .. });
                    let step_result = StepResult::from_outcome(outcome);
                    info!("✅ Step '{}' completed: {}", kind, step_result.message);
                    execution_result.add_step_result(kind, step_result);
                    if halt {
                        warn!("⏹️ Stopping pipeline after '{}'", kind);
                        execution_result.halted = true;
                        break;
                    }
                    if let Some(next) = next {
                        current = next;
                    }
                }
                Err(e) => {
                    error!("❌ Step '{}' failed with error: {}", kind, e);
                    execution_result.add_step_result(kind, StepResult::failure(e.to_string()));
                    execution_result.success = false;
                    break;
                }
            }
        }

        execution_result.complete();
        CoordinatorMetrics::record_run(execution_result.success, started.elapsed().as_secs_f64());
        if execution_result.success {
            info!(
                "🎉 Pipeline '{}' finished for {} after {} step(s)",
                config.name,
                execution_result.processed_filename,
                execution_result.executed.len()
            );
        } else {
            error!(
                "💥 Pipeline '{}' failed for {}",
                config.name, execution_result.processed_filename
            );
        }
        Ok(execution_result)
    }

    /// Wait until the next stage's input is visible. Times out quietly; the
    /// stage's own download then reports the missing artifact.
    async fn wait_for_input(&self, kind: StageKind, message: &OntologyMessage) -> Result<()> {
        let started = Instant::now();
        match self.policy {
            ConsistencyPolicy::FixedDelay(delay) => tokio::time::sleep(delay).await,
            ConsistencyPolicy::Poll { interval, max_wait } => {
                if kind != StageKind::Validator && !message.semantically_valid {
                    return Ok(());
                }
                let container = kind.input_container();
                let name = kind.input_name(message);
                let mut interval = interval;
                loop {
                    if self.ctx.storage.object_exists(container, &name).await? {
                        break;
                    }
                    let waited = started.elapsed();
                    if waited >= max_wait {
                        warn!("{}/{} still not visible after {:?}", container, name, waited);
                        break;
                    }
                    debug!("Waiting {:?} for {}/{}", interval, container, name);
                    tokio::time::sleep(interval.min(max_wait - waited)).await;
                    interval = interval.saturating_mul(2);
                }
            }
        }
        CoordinatorMetrics::record_consistency_wait(started.elapsed().as_secs_f64());
        Ok(())
    }
}
