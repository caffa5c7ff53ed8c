use crate::error::Result;
use crate::message::{Channel, Container};
use crate::model::{Edge, SimpleOntology, Vertex};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

// Storage-side ports
#[async_trait]
pub trait ObjectStoragePort: Send + Sync {
    fn service_name(&self) -> &'static str;
    async fn does_container_exist(&self, container: Container) -> Result<bool>;
    /// Create if not exists. Never errors when the container is already there.
    async fn create_container(&self, container: Container) -> Result<()>;
    async fn object_exists(&self, container: Container, name: &str) -> Result<bool>;
    /// Fetch an object to `local_path`. Missing objects are `ArtifactMissing`.
    async fn download_object(&self, container: Container, name: &str, local_path: &Path) -> Result<PathBuf>;
    /// Upload; returns false when an identical object was already stored.
    async fn upload_object(&self, local_path: &Path, container: Container, name: &str) -> Result<bool>;
    async fn delete_object(&self, container: Container, name: &str) -> Result<()>;
    async fn cleanup(&self) -> Result<()>;
}

#[async_trait]
pub trait OntologySemanticsPort: Send + Sync {
    /// Ok(false) for a well-formed but inconsistent ontology; Err when the
    /// document cannot be loaded at all.
    async fn is_consistent(&self, owl_path: &Path) -> Result<bool>;
    async fn parse(&self, owl_path: &Path) -> Result<SimpleOntology>;
}

// Messaging ports
#[derive(Debug, Clone)]
pub struct Delivery {
    pub delivery_id: uuid::Uuid,
    pub channel: Channel,
    pub payload: String,
    /// Log position to commit once acknowledged, for durable buses.
    pub offset: Option<u64>,
}

impl Delivery {
    pub fn new(channel: Channel, payload: String) -> Self {
        Self {
            delivery_id: uuid::Uuid::new_v4(),
            channel,
            payload,
            offset: None,
        }
    }
}

pub trait Acknowledger: Send + Sync {
    fn ack(&self, delivery: &Delivery) -> Result<()>;
}

/// Stream of deliveries for one consumer group on one channel.
pub struct Subscription {
    receiver: mpsc::Receiver<Delivery>,
    acknowledger: Option<Arc<dyn Acknowledger>>,
}

impl Subscription {
    pub fn new(receiver: mpsc::Receiver<Delivery>, acknowledger: Option<Arc<dyn Acknowledger>>) -> Self {
        Self { receiver, acknowledger }
    }

    pub async fn next(&mut self) -> Option<Delivery> {
        self.receiver.recv().await
    }

    pub fn ack(&self, delivery: &Delivery) -> Result<()> {
        match &self.acknowledger {
            Some(acknowledger) => acknowledger.ack(delivery),
            None => Ok(()),
        }
    }
}

#[async_trait]
pub trait MessageBusPort: Send + Sync {
    fn service_name(&self) -> &'static str;
    async fn publish(&self, channel: Channel, payload: String) -> Result<()>;
    /// Every consumer group receives every message published after it
    /// subscribed (durable buses also replay anything not yet acknowledged).
    async fn subscribe(&self, channel: Channel, consumer: &str) -> Result<Subscription>;
}

// Load-side ports
#[async_trait]
pub trait TriplestorePort: Send + Sync {
    fn service_name(&self) -> &'static str;
    async fn load_ontology_owl_rdf_xml(&self, ontology_id: i64, owl_path: &Path) -> Result<()>;
    async fn has_ontology(&self, ontology_id: i64) -> Result<bool>;
    async fn cleanup(&self) -> Result<()>;
}

#[async_trait]
pub trait GraphDatabasePort: Send + Sync {
    fn service_name(&self) -> &'static str;
    /// Stage removal of every vertex and edge of the ontology.
    async fn delete_ontology(&self, ontology_id: i64) -> Result<usize>;
    async fn add_vertices(&self, vertices: &[Vertex]) -> Result<usize>;
    /// Edges whose endpoints are absent are skipped, not errors.
    async fn add_edges(&self, edges: &[Edge]) -> Result<usize>;
    async fn commit(&self) -> Result<()>;
    /// Drop anything staged and not committed.
    async fn rollback(&self) -> Result<()>;
    async fn vertex_count(&self, ontology_id: i64) -> Result<usize>;
    async fn edge_count(&self, ontology_id: i64) -> Result<usize>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchDocument {
    pub id: String,
    pub body: Map<String, Value>,
}

#[async_trait]
pub trait SearchPort: Send + Sync {
    fn service_name(&self) -> &'static str;
    async fn create_index(&self, name: &str, shards: Option<u32>, replicas: Option<u32>) -> Result<()>;
    async fn delete_all_documents(&self, name: &str) -> Result<usize>;
    async fn index_documents(&self, name: &str, documents: Vec<SearchDocument>) -> Result<usize>;
    async fn count_documents(&self, name: &str) -> Result<usize>;
    async fn cleanup(&self) -> Result<()>;
}
