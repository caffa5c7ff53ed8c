use crate::context::PipelineContext;
use crate::error::Result;
use crate::message::OntologyMessage;
use crate::pipeline::stage::{PipelineStage, StageKind, Transformed};
use async_trait::async_trait;
use std::path::Path;
use tracing::info;

/// Loads the validated RDF/XML into the triplestore dataset of the ontology.
pub struct TriplestoreLoaderStage;

#[async_trait]
impl PipelineStage for TriplestoreLoaderStage {
    fn kind(&self) -> StageKind {
        StageKind::TriplestoreLoader
    }

    async fn transform(
        &self,
        ctx: &PipelineContext,
        message: &OntologyMessage,
        input: &Path,
        _work_dir: &Path,
    ) -> Result<Transformed> {
        ctx.triplestore
            .load_ontology_owl_rdf_xml(message.ontology_id, input)
            .await?;
        info!(
            "Loaded {} into {} triplestore",
            message.processed_filename,
            ctx.triplestore.service_name()
        );
        Ok(Transformed::Artifact {
            path: input.to_path_buf(),
            message: message.clone(),
        })
    }

    async fn cleanup(&self, ctx: &PipelineContext) -> Result<()> {
        ctx.triplestore.cleanup().await
    }
}
