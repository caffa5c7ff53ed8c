use crate::context::PipelineContext;
use crate::error::{PipelineError, Result};
use crate::message::{processed_filename, Container};
use crate::model::webhook::{earliest, latest, latest_before};
use crate::model::{
    GitWebhook, OntologyChanges, OntologyLeftRightDiff, OntologyTimestampDiff, SimpleOntology,
};
use crate::pipeline::runner::ScratchDir;
use crate::pipeline::stage::StageKind;
use chrono::NaiveDateTime;
use tracing::{debug, info};

/// Time-travel queries over the loaded artifacts of an ontology.
pub struct DiffUseCase {
    ctx: PipelineContext,
}

impl DiffUseCase {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }

    fn webhooks(&self, ontology_id: i64) -> Result<Vec<GitWebhook>> {
        if self.ctx.meta.get_ontology(ontology_id)?.is_none() {
            return Err(PipelineError::OntologyNotFound(ontology_id));
        }
        self.ctx.meta.webhooks_for(ontology_id)
    }

    fn find(webhooks: &[GitWebhook], webhook_id: i64) -> Result<GitWebhook> {
        webhooks
            .iter()
            .find(|w| w.id == webhook_id)
            .cloned()
            .ok_or(PipelineError::GitWebhookNotFound(webhook_id))
    }

    /// Parse the OWL artifact that the loaders stored for one webhook.
    async fn load(&self, webhook: &GitWebhook) -> Result<SimpleOntology> {
        let name = processed_filename(webhook.ontology_id, webhook.id);
        let scratch = ScratchDir::create(&self.ctx.scratch_root, StageKind::Parser)?;
        let local = scratch.path().join(&name);
        self.ctx
            .storage
            .download_object(Container::Loaded, &name, &local)
            .await?;
        let ontology = self.ctx.semantics.parse(&local).await?;
        debug!("Loaded {} for diff", name);
        Ok(ontology.with_ids(webhook.ontology_id, webhook.id))
    }

    async fn changes(&self, before: &GitWebhook, after: &GitWebhook) -> Result<OntologyChanges> {
        if before.id == after.id {
            return Ok(OntologyChanges::default());
        }
        let left = self.load(before).await?;
        let right = self.load(after).await?;
        Ok(OntologyChanges::between(&left, &right))
    }

    /// State before `requested` against the latest state. With no webhook
    /// earlier than `requested` the earliest one stands in.
    pub async fn diff_by_timestamp(
        &self,
        ontology_id: i64,
        requested: NaiveDateTime,
    ) -> Result<OntologyTimestampDiff> {
        let webhooks = self.webhooks(ontology_id)?;
        let before = latest_before(&webhooks, requested)
            .or_else(|| earliest(&webhooks))
            .cloned();
        let after = latest(&webhooks).cloned();
        self.timestamp_diff(ontology_id, requested, before, after).await
    }

    /// One webhook against the latest, reported in the timestamp shape with
    /// the webhook's own creation time as the requested timestamp.
    pub async fn diff_by_webhook(&self, ontology_id: i64, webhook_id: i64) -> Result<OntologyTimestampDiff> {
        let webhooks = self.webhooks(ontology_id)?;
        let before = Self::find(&webhooks, webhook_id)?;
        let after = latest(&webhooks).cloned();
        let requested = before.date_created;
        self.timestamp_diff(ontology_id, requested, Some(before), after).await
    }

    async fn timestamp_diff(
        &self,
        ontology_id: i64,
        requested: NaiveDateTime,
        before: Option<GitWebhook>,
        after: Option<GitWebhook>,
    ) -> Result<OntologyTimestampDiff> {
        let (updates_exist, changes) = match (&before, &after) {
            (Some(before), Some(after)) => {
                (before.id != after.id, self.changes(before, after).await?)
            }
            _ => (false, OntologyChanges::default()),
        };
        info!(
            "Diff of ontology {} at {}: before={:?} after={:?} updates={}",
            ontology_id,
            requested,
            before.as_ref().map(|w| w.id),
            after.as_ref().map(|w| w.id),
            updates_exist
        );

        Ok(OntologyTimestampDiff {
            id: ontology_id,
            requested_timestamp: requested,
            latest_git_webhook_id_before_requested_timestamp: before.as_ref().map(|w| w.id),
            latest_git_webhook_timestamp_before_requested_timestamp: before.as_ref().map(|w| w.date_created),
            latest_git_webhook_id_after_requested_timestamp: after.as_ref().map(|w| w.id),
            latest_git_webhook_timestamp_after_requested_timestamp: after.as_ref().map(|w| w.date_created),
            updates_exist,
            changes,
        })
    }

    pub async fn diff_left_right(
        &self,
        ontology_id: i64,
        left_webhook_id: i64,
        right_webhook_id: i64,
    ) -> Result<OntologyLeftRightDiff> {
        let webhooks = self.webhooks(ontology_id)?;
        let left = Self::find(&webhooks, left_webhook_id)?;
        let right = Self::find(&webhooks, right_webhook_id)?;
        if left.id > right.id {
            return Err(PipelineError::InvalidRequest(format!(
                "left webhook {} is newer than right webhook {}",
                left.id, right.id
            )));
        }
        self.left_right(ontology_id, left, right).await
    }

    async fn left_right(
        &self,
        ontology_id: i64,
        left: GitWebhook,
        right: GitWebhook,
    ) -> Result<OntologyLeftRightDiff> {
        let changes = self.changes(&left, &right).await?;
        Ok(OntologyLeftRightDiff {
            id: ontology_id,
            left_git_webhook_id: left.id,
            left_git_webhook_timestamp: left.date_created,
            right_git_webhook_id: right.id,
            right_git_webhook_timestamp: right.date_created,
            updates_exist: left.id != right.id,
            changes,
        })
    }
}
