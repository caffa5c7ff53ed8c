use crate::context::PipelineContext;
use crate::error::{PipelineError, Result};
use crate::infra::standard_schema::standard_annotation_properties;
use crate::message::OntologyMessage;
use crate::metrics::StageMetrics;
use crate::model::{SimpleOntology, SimpleOntologyPropertyGraph};
use crate::pipeline::stage::{PipelineStage, StageKind, Transformed};
use async_trait::async_trait;
use std::path::Path;
use tracing::info;

/// Merges the standard schemas into the parsed ontology and emits the
/// property graph.
pub struct ModellerStage;

#[async_trait]
impl PipelineStage for ModellerStage {
    fn kind(&self) -> StageKind {
        StageKind::Modeller
    }

    async fn transform(
        &self,
        _ctx: &PipelineContext,
        message: &OntologyMessage,
        input: &Path,
        work_dir: &Path,
    ) -> Result<Transformed> {
        let bytes = tokio::fs::read(input).await?;
        let ontology: SimpleOntology = serde_json::from_slice(&bytes)
            .map_err(|e| PipelineError::Model(format!("unreadable parsed ontology: {}", e)))?;
        if ontology.id != message.ontology_id {
            return Err(PipelineError::Model(format!(
                "parsed artifact belongs to ontology {}, message names {}",
                ontology.id, message.ontology_id
            )));
        }

        let graph = SimpleOntologyPropertyGraph::from_ontology(&ontology, standard_annotation_properties());
        info!(
            "Modelled {}: {} vertices, {} edges, {} annotation properties",
            message.processed_filename,
            graph.vertices.len(),
            graph.edges.len(),
            graph.annotation_properties.len()
        );
        StageMetrics::record_entities(self.kind().name(), "vertex", graph.vertices.len());
        StageMetrics::record_entities(self.kind().name(), "edge", graph.edges.len());

        let path = work_dir.join(message.json_processed_filename());
        tokio::fs::write(&path, serde_json::to_vec(&graph)?).await?;
        Ok(Transformed::Artifact {
            path,
            message: message.clone(),
        })
    }
}
