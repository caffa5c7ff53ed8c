use crate::context::PipelineContext;
use crate::error::{PipelineError, Result};
use crate::message::OntologyMessage;
use crate::model::SimpleOntologyPropertyGraph;
use crate::pipeline::stage::{PipelineStage, StageKind, Transformed};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Replaces the ontology's vertices and edges in one committed transaction.
pub struct GraphLoaderStage;

async fn replace_graph(ctx: &PipelineContext, graph: &SimpleOntologyPropertyGraph) -> Result<(usize, usize)> {
    let removed = ctx.graph.delete_ontology(graph.ontology_id).await?;
    let vertices: Vec<_> = graph.vertices.values().cloned().collect();
    let added_vertices = ctx.graph.add_vertices(&vertices).await?;
    let added_edges = ctx.graph.add_edges(&graph.edges).await?;
    if added_edges < graph.edges.len() {
        warn!("{} edge(s) skipped for missing endpoints", graph.edges.len() - added_edges);
    }
    ctx.graph.commit().await?;
    info!(
        "Replaced {} vertices of ontology {} with {} vertices and {} edges",
        removed, graph.ontology_id, added_vertices, added_edges
    );
    Ok((added_vertices, added_edges))
}

#[async_trait]
impl PipelineStage for GraphLoaderStage {
    fn kind(&self) -> StageKind {
        StageKind::GraphLoader
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

        let seconds = ctx.config.graph.evaluation_timeout_seconds;
        let loaded = tokio::time::timeout(Duration::from_secs(seconds), replace_graph(ctx, &graph)).await;
        let result = match loaded {
            Ok(result) => result,
            Err(_) => Err(PipelineError::Timeout {
                operation: "graph load".to_string(),
                seconds,
            }),
        };
        if let Err(e) = result {
            if let Err(rollback) = ctx.graph.rollback().await {
                warn!("Graph rollback failed: {}", rollback);
            }
            return Err(e);
        }

        Ok(Transformed::Artifact {
            path: input.to_path_buf(),
            message: message.clone(),
        })
    }
}
