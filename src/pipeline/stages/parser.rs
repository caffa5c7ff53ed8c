use crate::context::PipelineContext;
use crate::error::Result;
use crate::message::OntologyMessage;
use crate::metrics::StageMetrics;
use crate::pipeline::stage::{PipelineStage, StageKind, Transformed};
use async_trait::async_trait;
use std::path::Path;
use tracing::{info, warn};

/// Extracts a `SimpleOntology` and stores it as JSON.
pub struct ParserStage;

#[async_trait]
impl PipelineStage for ParserStage {
    fn kind(&self) -> StageKind {
        StageKind::Parser
    }

    async fn transform(
        &self,
        ctx: &PipelineContext,
        message: &OntologyMessage,
        input: &Path,
        work_dir: &Path,
    ) -> Result<Transformed> {
        let ontology = ctx
            .semantics
            .parse(input)
            .await?
            .with_ids(message.ontology_id, message.webhook_event_id);

        for iri in ontology.external_references() {
            warn!("{} references unmodelled IRI {}", message.processed_filename, iri);
        }
        info!(
            "Parsed {}: {} annotation properties, {} object properties, {} classes",
            message.processed_filename,
            ontology.annotation_properties.len(),
            ontology.object_properties.len(),
            ontology.classes.len()
        );
        let stage = self.kind().name();
        StageMetrics::record_entities(stage, "annotation_property", ontology.annotation_properties.len());
        StageMetrics::record_entities(stage, "object_property", ontology.object_properties.len());
        StageMetrics::record_entities(stage, "class", ontology.classes.len());

        let path = work_dir.join(message.json_processed_filename());
        tokio::fs::write(&path, serde_json::to_vec_pretty(&ontology)?).await?;
        Ok(Transformed::Artifact {
            path,
            message: message.clone(),
        })
    }
}
