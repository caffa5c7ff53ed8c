use crate::app::ports::ObjectStoragePort;
use crate::error::{PipelineError, Result};
use crate::infra::local_storage::sha256_hex;
use crate::message::Container;
use crate::metrics::StorageMetrics;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// In-memory object storage for development/testing
#[derive(Default)]
pub struct InMemoryObjectStorage {
    containers: Arc<Mutex<HashSet<Container>>>,
    objects: Arc<Mutex<HashMap<(Container, String), Vec<u8>>>>,
}

impl InMemoryObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object_count(&self, container: Container) -> usize {
        self.objects
            .lock()
            .map(|objects| objects.keys().filter(|(c, _)| *c == container).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl ObjectStoragePort for InMemoryObjectStorage {
    fn service_name(&self) -> &'static str {
        "memory"
    }

    async fn does_container_exist(&self, container: Container) -> Result<bool> {
        let containers = self
            .containers
            .lock()
            .map_err(|_| PipelineError::lock_poisoned("containers"))?;
        Ok(containers.contains(&container))
    }

    async fn create_container(&self, container: Container) -> Result<()> {
        let mut containers = self
            .containers
            .lock()
            .map_err(|_| PipelineError::lock_poisoned("containers"))?;
        containers.insert(container);
        Ok(())
    }

    async fn object_exists(&self, container: Container, name: &str) -> Result<bool> {
        let objects = self
            .objects
            .lock()
            .map_err(|_| PipelineError::lock_poisoned("objects"))?;
        Ok(objects.contains_key(&(container, name.to_string())))
    }

    async fn download_object(&self, container: Container, name: &str, local_path: &Path) -> Result<PathBuf> {
        let bytes = {
            let objects = self
                .objects
                .lock()
                .map_err(|_| PipelineError::lock_poisoned("objects"))?;
            objects.get(&(container, name.to_string())).cloned()
        };
        let bytes = match bytes {
            Some(bytes) => bytes,
            None => {
                StorageMetrics::record_missing_artifact(container.as_str());
                return Err(PipelineError::ArtifactMissing {
                    container: container.to_string(),
                    name: name.to_string(),
                });
            }
        };
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(local_path, &bytes).await?;
        StorageMetrics::record_download(container.as_str(), bytes.len());
        Ok(local_path.to_path_buf())
    }

    async fn upload_object(&self, local_path: &Path, container: Container, name: &str) -> Result<bool> {
        let bytes = tokio::fs::read(local_path).await?;
        let mut objects = self
            .objects
            .lock()
            .map_err(|_| PipelineError::lock_poisoned("objects"))?;
        let key = (container, name.to_string());
        if let Some(existing) = objects.get(&key) {
            if sha256_hex(existing) == sha256_hex(&bytes) {
                StorageMetrics::record_upload_skipped(container.as_str());
                return Ok(false);
            }
        }
        StorageMetrics::record_upload(container.as_str(), bytes.len());
        objects.insert(key, bytes);
        Ok(true)
    }

    async fn delete_object(&self, container: Container, name: &str) -> Result<()> {
        let mut objects = self
            .objects
            .lock()
            .map_err(|_| PipelineError::lock_poisoned("objects"))?;
        objects.remove(&(container, name.to_string()));
        Ok(())
    }

    async fn cleanup(&self) -> Result<()> {
        Ok(())
    }
}
