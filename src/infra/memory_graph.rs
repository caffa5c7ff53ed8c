use crate::app::ports::GraphDatabasePort;
use crate::error::{PipelineError, Result};
use crate::model::{Edge, Vertex};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

#[derive(Debug, Clone, Default)]
struct GraphData {
    vertices: BTreeMap<String, Vertex>,
    /// Edges tagged with the ontology of their source vertex.
    edges: Vec<(i64, Edge)>,
}

#[derive(Debug, Default)]
struct GraphState {
    committed: GraphData,
    staged: Option<GraphData>,
}

impl GraphState {
    fn stage(&mut self) -> &mut GraphData {
        let committed = &self.committed;
        self.staged.get_or_insert_with(|| committed.clone())
    }
}

/// Transactional in-process property graph. Mutations land in a staged copy
/// that readers never see until `commit`.
#[derive(Default)]
pub struct InMemoryGraphDatabase {
    state: Mutex<GraphState>,
}

impl InMemoryGraphDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, GraphState>> {
        self.state
            .lock()
            .map_err(|_| PipelineError::lock_poisoned("graph state"))
    }

    pub fn vertex(&self, vertex_key: &str) -> Result<Option<Vertex>> {
        Ok(self.state()?.committed.vertices.get(vertex_key).cloned())
    }

    pub fn edges_from(&self, vertex_key: &str) -> Result<Vec<Edge>> {
        Ok(self
            .state()?
            .committed
            .edges
            .iter()
            .filter(|(_, e)| e.source_vertex_key == vertex_key)
            .map(|(_, e)| e.clone())
            .collect())
    }
}

#[async_trait]
impl GraphDatabasePort for InMemoryGraphDatabase {
    fn service_name(&self) -> &'static str {
        "memory"
    }

    async fn delete_ontology(&self, ontology_id: i64) -> Result<usize> {
        let mut state = self.state()?;
        let stage = state.stage();
        let before = stage.vertices.len();
        stage.vertices.retain(|_, v| v.ontology_id != ontology_id);
        stage.edges.retain(|(id, _)| *id != ontology_id);
        let removed = before - stage.vertices.len();
        debug!("Staged removal of {} vertices of ontology {}", removed, ontology_id);
        Ok(removed)
    }

    async fn add_vertices(&self, vertices: &[Vertex]) -> Result<usize> {
        let mut state = self.state()?;
        let stage = state.stage();
        for vertex in vertices {
            stage.vertices.insert(vertex.vertex_key.clone(), vertex.clone());
        }
        Ok(vertices.len())
    }

    async fn add_edges(&self, edges: &[Edge]) -> Result<usize> {
        let mut state = self.state()?;
        let stage = state.stage();
        let mut added = 0;
        for edge in edges {
            let source = stage.vertices.get(&edge.source_vertex_key).map(|v| v.ontology_id);
            match source {
                Some(ontology_id) if stage.vertices.contains_key(&edge.target_vertex_key) => {
                    stage.edges.push((ontology_id, edge.clone()));
                    added += 1;
                }
                _ => debug!(
                    "Skipping edge {} -> {}: endpoint missing",
                    edge.source_vertex_key, edge.target_vertex_key
                ),
            }
        }
        Ok(added)
    }

    async fn commit(&self) -> Result<()> {
        let mut state = self.state()?;
        if let Some(staged) = state.staged.take() {
            state.committed = staged;
        }
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        self.state()?.staged = None;
        Ok(())
    }

    async fn vertex_count(&self, ontology_id: i64) -> Result<usize> {
        Ok(self
            .state()?
            .committed
            .vertices
            .values()
            .filter(|v| v.ontology_id == ontology_id)
            .count())
    }

    async fn edge_count(&self, ontology_id: i64) -> Result<usize> {
        Ok(self
            .state()?
            .committed
            .edges
            .iter()
            .filter(|(id, _)| *id == ontology_id)
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VertexLabel;

    fn vertex(iri: &str, ontology_id: i64) -> Vertex {
        Vertex::new(VertexLabel::Class, iri, ontology_id, 1, BTreeMap::new())
    }

    fn edge(from: &Vertex, to: &Vertex) -> Edge {
        Edge {
            source_vertex_key: from.vertex_key.clone(),
            target_vertex_key: to.vertex_key.clone(),
            label: "subClassOf".into(),
            properties: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn staged_changes_are_invisible_until_commit() {
        let graph = InMemoryGraphDatabase::new();
        let (a, b) = (vertex("http://ex.org/A", 1), vertex("http://ex.org/B", 1));
        graph.add_vertices(&[a.clone(), b.clone()]).await.unwrap();
        assert_eq!(graph.add_edges(&[edge(&a, &b)]).await.unwrap(), 1);
        assert_eq!(graph.vertex_count(1).await.unwrap(), 0);

        graph.commit().await.unwrap();
        assert_eq!(graph.vertex_count(1).await.unwrap(), 2);
        assert_eq!(graph.edge_count(1).await.unwrap(), 1);
        assert_eq!(graph.edges_from(&a.vertex_key).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rollback_keeps_previous_version() {
        let graph = InMemoryGraphDatabase::new();
        graph.add_vertices(&[vertex("http://ex.org/A", 1)]).await.unwrap();
        graph.commit().await.unwrap();

        assert_eq!(graph.delete_ontology(1).await.unwrap(), 1);
        graph.rollback().await.unwrap();
        assert_eq!(graph.vertex_count(1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn edges_to_missing_vertices_are_skipped() {
        let graph = InMemoryGraphDatabase::new();
        let (a, b) = (vertex("http://ex.org/A", 1), vertex("http://ex.org/B", 1));
        graph.add_vertices(&[a.clone()]).await.unwrap();
        assert_eq!(graph.add_edges(&[edge(&a, &b)]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_only_touches_one_ontology() {
        let graph = InMemoryGraphDatabase::new();
        graph
            .add_vertices(&[vertex("http://ex.org/A", 1), vertex("http://ex.org/A", 2)])
            .await
            .unwrap();
        graph.delete_ontology(1).await.unwrap();
        graph.commit().await.unwrap();
        assert_eq!(graph.vertex_count(1).await.unwrap(), 0);
        assert_eq!(graph.vertex_count(2).await.unwrap(), 1);
    }
}
