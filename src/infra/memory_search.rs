use crate::app::ports::{SearchDocument, SearchPort};
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

/// Indexes keyed by name, documents keyed by id.
#[derive(Default)]
pub struct InMemorySearch {
    indexes: Mutex<HashMap<String, BTreeMap<String, Map<String, Value>>>>,
}

impl InMemorySearch {
    pub fn new() -> Self {
        Self::default()
    }

    fn indexes(&self) -> Result<MutexGuard<'_, HashMap<String, BTreeMap<String, Map<String, Value>>>>> {
        self.indexes
            .lock()
            .map_err(|_| PipelineError::lock_poisoned("search indexes"))
    }

    pub fn document(&self, index: &str, id: &str) -> Result<Option<Map<String, Value>>> {
        Ok(self.indexes()?.get(index).and_then(|docs| docs.get(id)).cloned())
    }
}

#[async_trait]
impl SearchPort for InMemorySearch {
    fn service_name(&self) -> &'static str {
        "memory"
    }

    async fn create_index(&self, name: &str, _shards: Option<u32>, _replicas: Option<u32>) -> Result<()> {
        self.indexes()?.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn delete_all_documents(&self, name: &str) -> Result<usize> {
        let mut indexes = self.indexes()?;
        Ok(match indexes.get_mut(name) {
            Some(docs) => {
                let removed = docs.len();
                docs.clear();
                removed
            }
            None => 0,
        })
    }

    async fn index_documents(&self, name: &str, documents: Vec<SearchDocument>) -> Result<usize> {
        let mut indexes = self.indexes()?;
        let index = indexes
            .get_mut(name)
            .ok_or_else(|| PipelineError::Backend(format!("index '{}' does not exist", name)))?;
        let count = documents.len();
        for doc in documents {
            index.insert(doc.id, doc.body);
        }
        Ok(count)
    }

    async fn count_documents(&self, name: &str) -> Result<usize> {
        Ok(self.indexes()?.get(name).map(|docs| docs.len()).unwrap_or(0))
    }

    async fn cleanup(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str) -> SearchDocument {
        let mut body = Map::new();
        body.insert("iri".into(), Value::String(format!("http://ex.org/{}", id)));
        SearchDocument { id: id.to_string(), body }
    }

    #[tokio::test]
    async fn reindexing_replaces_documents() {
        let search = InMemorySearch::new();
        search.create_index("ontopop-1", Some(1), Some(0)).await.unwrap();
        search.index_documents("ontopop-1", vec![doc("a"), doc("b")]).await.unwrap();
        assert_eq!(search.count_documents("ontopop-1").await.unwrap(), 2);

        assert_eq!(search.delete_all_documents("ontopop-1").await.unwrap(), 2);
        search.index_documents("ontopop-1", vec![doc("a")]).await.unwrap();
        assert_eq!(search.count_documents("ontopop-1").await.unwrap(), 1);
        assert!(search.document("ontopop-1", "a").unwrap().is_some());
    }

    #[tokio::test]
    async fn indexing_into_missing_index_fails() {
        let search = InMemorySearch::new();
        assert!(search.index_documents("nope", vec![doc("a")]).await.is_err());
        assert_eq!(search.count_documents("nope").await.unwrap(), 0);
    }
}
