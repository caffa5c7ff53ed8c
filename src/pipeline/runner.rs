use crate::context::PipelineContext;
use crate::error::Result;
use crate::message::OntologyMessage;
use crate::metrics::StageMetrics;
use crate::pipeline::meta::VersionClaim;
use crate::pipeline::stage::{PipelineStage, StageKind, StageOutcome, Transformed};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Per-run scratch directory, removed on every exit path.
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    pub fn create(root: &Path, stage: StageKind) -> Result<Self> {
        let path = root.join(format!("{}-{}", stage.name(), uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            debug!("Could not remove scratch dir {}: {}", self.path.display(), e);
        }
    }
}

/// Runs one stage against one message through the shared protocol:
/// setup, download, claim, transform, persist, publish, cleanup.
pub struct StageRunner<'a> {
    ctx: &'a PipelineContext,
}

impl<'a> StageRunner<'a> {
    pub fn new(ctx: &'a PipelineContext) -> Self {
        Self { ctx }
    }

    pub async fn run(&self, stage: &dyn PipelineStage, message: &OntologyMessage) -> Result<StageOutcome> {
        let kind = stage.kind();
        let span = info_span!(
            "stage_run",
            stage = kind.name(),
            ontology_id = message.ontology_id,
            webhook_event_id = message.webhook_event_id,
            processed_filename = %message.processed_filename,
        );
        let started = Instant::now();

        let result = self.execute(stage, message).instrument(span.clone()).await;
        // Cleanup happens whatever the run produced.
        let cleanup = stage.cleanup(self.ctx).instrument(span.clone()).await;
        let storage_cleanup = self.ctx.storage.cleanup().await;

        StageMetrics::record_duration(kind.name(), started.elapsed().as_secs_f64());
        match &result {
            Ok(outcome) => {
                StageMetrics::record_outcome(kind.name(), outcome.as_str());
                info!("Stage {} {} {}", kind, outcome.as_str(), message.processed_filename);
            }
            Err(e) => {
                StageMetrics::record_outcome(kind.name(), "failed");
                StageMetrics::record_failure(kind.name(), e.kind().as_str());
                error!("Stage {} failed for {}: {}", kind, message.processed_filename, e);
            }
        }
        for cleanup_result in [cleanup, storage_cleanup] {
            if let Err(e) = cleanup_result {
                warn!("Stage {} cleanup failed: {}", kind, e);
            }
        }
        result
    }

    async fn execute(&self, stage: &dyn PipelineStage, message: &OntologyMessage) -> Result<StageOutcome> {
        let kind = stage.kind();

        if kind != StageKind::Validator && !message.semantically_valid {
            info!("Skipping {}: ontology was not validated", message.processed_filename);
            return Ok(StageOutcome::Skipped);
        }

        if let Some(committed) = self.ctx.meta.committed_version(message.ontology_id, kind.name())? {
            if committed > message.webhook_event_id {
                return Ok(self.superseded(kind, message, committed));
            }
        }

        // Runs of this stage for this ontology take turns from the claim to
        // the publish.
        let _turn = self.ctx.meta.lock_stage(message.ontology_id, kind.name()).await?;

        // 1. Setup
        let storage = &self.ctx.storage;
        storage.create_container(kind.output_container()).await?;
        let scratch = ScratchDir::create(&self.ctx.scratch_root, kind)?;

        // 2. Download
        let input_name = kind.input_name(message);
        let input_path = scratch.path().join(&input_name);
        storage
            .download_object(kind.input_container(), &input_name, &input_path)
            .await?;
        let work_dir = scratch.path().join("out");
        tokio::fs::create_dir_all(&work_dir).await?;

        // 3. Claim the version, then transform. Backend writes happen only
        // under a claim no newer webhook has overtaken.
        let claim = self
            .ctx
            .meta
            .claim_version(message.ontology_id, kind.name(), message.webhook_event_id)?;
        if let VersionClaim::Superseded { committed } = claim {
            return Ok(self.superseded(kind, message, committed));
        }
        let transformed = stage.transform(self.ctx, message, &input_path, &work_dir).await?;

        // 4. Persist
        let (published, outcome) = match transformed {
            Transformed::Artifact { path, message: next } => {
                let output_name = kind.output_name(&next);
                let uploaded = storage
                    .upload_object(&path, kind.output_container(), &output_name)
                    .await?;
                if !uploaded {
                    debug!("{}/{} already up to date", kind.output_container(), output_name);
                }
                let artifact = format!("{}/{}", kind.output_container(), output_name);
                (next.clone(), StageOutcome::Completed { artifact, message: next })
            }
            Transformed::PublishOnly { message: next } => {
                (next.clone(), StageOutcome::Rejected { message: next })
            }
        };

        // 5. Publish
        let payload = published.to_json()?;
        self.ctx.bus.publish(kind.output_channel(), payload).await?;

        Ok(outcome)
    }

    fn superseded(&self, kind: StageKind, message: &OntologyMessage, committed: i64) -> StageOutcome {
        warn!(
            "Ignoring webhook {} for ontology {}: {} already committed webhook {}",
            message.webhook_event_id, message.ontology_id, kind, committed
        );
        StageOutcome::Superseded {
            committed_webhook_event_id: committed,
        }
    }
}
