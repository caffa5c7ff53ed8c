use crate::app::ports::ObjectStoragePort;
use crate::error::{PipelineError, Result};
use crate::message::Container;
use crate::metrics::StorageMetrics;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Containers are directories under `root`; objects are files within them.
pub struct LocalObjectStorage {
    root: PathBuf,
}

impl LocalObjectStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn container_path(&self, container: Container) -> PathBuf {
        self.root.join(container.as_str())
    }

    fn object_path(&self, container: Container, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains('/') || name.contains('\\') || name.starts_with('.') {
            return Err(PipelineError::Storage(format!("invalid object name '{}'", name)));
        }
        Ok(self.container_path(container).join(name))
    }
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[async_trait]
impl ObjectStoragePort for LocalObjectStorage {
    fn service_name(&self) -> &'static str {
        "local"
    }

    async fn does_container_exist(&self, container: Container) -> Result<bool> {
        Ok(fs::metadata(self.container_path(container))
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false))
    }

    async fn create_container(&self, container: Container) -> Result<()> {
        fs::create_dir_all(self.container_path(container)).await?;
        Ok(())
    }

    async fn object_exists(&self, container: Container, name: &str) -> Result<bool> {
        let path = self.object_path(container, name)?;
        Ok(fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false))
    }

    async fn download_object(&self, container: Container, name: &str, local_path: &Path) -> Result<PathBuf> {
        let source = self.object_path(container, name)?;
        let bytes = match fs::read(&source).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                StorageMetrics::record_missing_artifact(container.as_str());
                return Err(PipelineError::ArtifactMissing {
                    container: container.to_string(),
                    name: name.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(local_path, &bytes).await?;
        StorageMetrics::record_download(container.as_str(), bytes.len());
        Ok(local_path.to_path_buf())
    }

    async fn upload_object(&self, local_path: &Path, container: Container, name: &str) -> Result<bool> {
        let bytes = fs::read(local_path).await?;
        let target = self.object_path(container, name)?;

        if let Ok(existing) = fs::read(&target).await {
            if sha256_hex(&existing) == sha256_hex(&bytes) {
                debug!("{}/{} unchanged, skipping upload", container, name);
                StorageMetrics::record_upload_skipped(container.as_str());
                return Ok(false);
            }
        }

        fs::create_dir_all(self.container_path(container)).await?;
        // Write then rename so readers never observe a partial object.
        let staging = target.with_file_name(format!(".{}.{}.part", name, uuid::Uuid::new_v4()));
        fs::write(&staging, &bytes).await?;
        fs::rename(&staging, &target).await?;
        StorageMetrics::record_upload(container.as_str(), bytes.len());
        Ok(true)
    }

    async fn delete_object(&self, container: Container, name: &str) -> Result<()> {
        match fs::remove_file(self.object_path(container, name)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn cleanup(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_container_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalObjectStorage::new(dir.path());
        assert!(!storage.does_container_exist(Container::Parsed).await.unwrap());
        storage.create_container(Container::Parsed).await.unwrap();
        storage.create_container(Container::Parsed).await.unwrap();
        assert!(storage.does_container_exist(Container::Parsed).await.unwrap());
    }

    #[tokio::test]
    async fn identical_upload_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalObjectStorage::new(dir.path().join("store"));
        let local = dir.path().join("a.owl");
        std::fs::write(&local, b"<rdf:RDF/>").unwrap();

        assert!(storage.upload_object(&local, Container::Validated, "1_1.owl").await.unwrap());
        assert!(!storage.upload_object(&local, Container::Validated, "1_1.owl").await.unwrap());

        std::fs::write(&local, b"<rdf:RDF></rdf:RDF>").unwrap();
        assert!(storage.upload_object(&local, Container::Validated, "1_1.owl").await.unwrap());

        let entries = std::fs::read_dir(dir.path().join("store").join("validated"))
            .unwrap()
            .count();
        assert_eq!(entries, 1);
    }

    #[tokio::test]
    async fn missing_object_is_artifact_missing() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalObjectStorage::new(dir.path());
        let err = storage
            .download_object(Container::Validated, "9_9.owl", &dir.path().join("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ArtifactMissing { .. }));
    }

    #[tokio::test]
    async fn rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalObjectStorage::new(dir.path());
        assert!(storage.object_exists(Container::Loaded, "../secret").await.is_err());
    }
}
