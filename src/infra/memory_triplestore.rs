use crate::app::ports::TriplestorePort;
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

/// One dataset per ontology id holding the last loaded RDF/XML document.
#[derive(Default)]
pub struct InMemoryTriplestore {
    datasets: Mutex<HashMap<i64, Vec<u8>>>,
}

impl InMemoryTriplestore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dataset_count(&self) -> Result<usize> {
        Ok(self
            .datasets
            .lock()
            .map_err(|_| PipelineError::lock_poisoned("triplestore datasets"))?
            .len())
    }
}

#[async_trait]
impl TriplestorePort for InMemoryTriplestore {
    fn service_name(&self) -> &'static str {
        "memory"
    }

    async fn load_ontology_owl_rdf_xml(&self, ontology_id: i64, owl_path: &Path) -> Result<()> {
        let bytes = tokio::fs::read(owl_path).await?;
        debug!("Loading {} bytes into dataset {}", bytes.len(), ontology_id);
        self.datasets
            .lock()
            .map_err(|_| PipelineError::lock_poisoned("triplestore datasets"))?
            .insert(ontology_id, bytes);
        Ok(())
    }

    async fn has_ontology(&self, ontology_id: i64) -> Result<bool> {
        Ok(self
            .datasets
            .lock()
            .map_err(|_| PipelineError::lock_poisoned("triplestore datasets"))?
            .contains_key(&ontology_id))
    }

    async fn cleanup(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reloading_replaces_the_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1_1.owl");
        std::fs::write(&path, "<rdf:RDF/>").unwrap();

        let store = InMemoryTriplestore::new();
        assert!(!store.has_ontology(1).await.unwrap());
        store.load_ontology_owl_rdf_xml(1, &path).await.unwrap();
        store.load_ontology_owl_rdf_xml(1, &path).await.unwrap();
        assert!(store.has_ontology(1).await.unwrap());
        assert_eq!(store.dataset_count().unwrap(), 1);
    }
}
