use crate::context::PipelineContext;
use crate::error::{PipelineError, Result};
use crate::message::{Channel, Container, OntologyMessage};
use crate::model::GitWebhook;
use chrono::NaiveDateTime;
use std::path::PathBuf;
use tracing::info;

/// One Git webhook delivery carrying a changed ontology file.
#[derive(Debug, Clone)]
pub struct Submission {
    pub ontology_id: i64,
    pub name: String,
    pub repo_resource_path: Option<String>,
    pub owl_path: PathBuf,
    pub commit_id: Option<String>,
    /// Delivery time; now when absent.
    pub received_at: Option<NaiveDateTime>,
}

impl Submission {
    pub fn new(ontology_id: i64, name: impl Into<String>, owl_path: impl Into<PathBuf>) -> Self {
        Self {
            ontology_id,
            name: name.into(),
            repo_resource_path: None,
            owl_path: owl_path.into(),
            commit_id: None,
            received_at: None,
        }
    }

    pub fn received_at(mut self, at: NaiveDateTime) -> Self {
        self.received_at = Some(at);
        self
    }
}

/// Records webhook deliveries and starts the pipeline for them.
pub struct IngestUseCase {
    ctx: PipelineContext,
}

impl IngestUseCase {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }

    /// Register the ontology if new, record the webhook, store the file in
    /// `ingested` and announce it on the `ingested` channel.
    pub async fn submit(&self, submission: &Submission) -> Result<(GitWebhook, OntologyMessage)> {
        if !submission.owl_path.is_file() {
            return Err(PipelineError::InvalidRequest(format!(
                "ontology file '{}' does not exist",
                submission.owl_path.display()
            )));
        }

        let meta = &self.ctx.meta;
        meta.register_ontology(
            submission.ontology_id,
            &submission.name,
            submission.repo_resource_path.as_deref(),
        )?;
        let received_at = submission
            .received_at
            .unwrap_or_else(|| chrono::Utc::now().naive_utc());
        let webhook = meta.record_webhook(
            submission.ontology_id,
            received_at,
            submission.commit_id.as_deref(),
        )?;

        let message = OntologyMessage::new(submission.ontology_id, webhook.id);
        self.ctx.storage.create_container(Container::Ingested).await?;
        self.ctx
            .storage
            .upload_object(&submission.owl_path, Container::Ingested, &message.processed_filename)
            .await?;
        self.ctx.bus.publish(Channel::Ingested, message.to_json()?).await?;

        info!(
            "Ingested {} for ontology {} (webhook {})",
            message.processed_filename, submission.ontology_id, webhook.id
        );
        Ok((webhook, message))
    }

    /// Webhooks of one ontology ordered by id.
    pub fn list_webhooks(&self, ontology_id: i64) -> Result<Vec<GitWebhook>> {
        if self.ctx.meta.get_ontology(ontology_id)?.is_none() {
            return Err(PipelineError::OntologyNotFound(ontology_id));
        }
        self.ctx.meta.webhooks_for(ontology_id)
    }
}
