use crate::app::ports::SearchDocument;
use crate::context::PipelineContext;
use crate::error::{PipelineError, Result};
use crate::message::OntologyMessage;
use crate::metrics::StageMetrics;
use crate::model::SimpleOntologyPropertyGraph;
use crate::pipeline::stage::{PipelineStage, StageKind, Transformed};
use async_trait::async_trait;
use std::path::Path;
use tracing::info;

/// Full reindex: clear the ontology's index, then bulk-index one flattened
/// document per vertex.
pub struct IndexerStage;

pub fn search_documents(graph: &SimpleOntologyPropertyGraph) -> Vec<SearchDocument> {
    graph
        .vertices
        .values()
        .map(|vertex| SearchDocument {
            id: vertex.vertex_key.clone(),
            body: vertex.to_document(),
        })
        .collect()
}

#[async_trait]
impl PipelineStage for IndexerStage {
    fn kind(&self) -> StageKind {
        StageKind::Indexer
    }

    async fn transform(
        &self,
        ctx: &PipelineContext,
        message: &OntologyMessage,
        input: &Path,
        _work_dir: &Path,
    ) -> Result<Transformed> {
        let bytes = tokio::fs::read(input).await?;
        let graph: SimpleOntologyPropertyGraph = serde_json::from_slice(&bytes)
            .map_err(|e| PipelineError::Model(format!("unreadable property graph: {}", e)))?;

        let search = &ctx.config.search;
        let index = search.index_name(message.ontology_id);
        ctx.search.create_index(&index, search.shards, search.replicas).await?;
        let deleted = ctx.search.delete_all_documents(&index).await?;
        let indexed = ctx
            .search
            .index_documents(&index, search_documents(&graph))
            .await?;
        info!("Reindexed '{}': {} removed, {} indexed", index, deleted, indexed);
        StageMetrics::record_entities(self.kind().name(), "document", indexed);

        Ok(Transformed::Artifact {
            path: input.to_path_buf(),
            message: message.clone(),
        })
    }

    async fn cleanup(&self, ctx: &PipelineContext) -> Result<()> {
        ctx.search.cleanup().await
    }
}
