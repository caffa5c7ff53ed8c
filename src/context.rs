//! Process-wide dependencies handed to every stage run.

use crate::app::ports::{
    GraphDatabasePort, MessageBusPort, ObjectStoragePort, OntologySemanticsPort, SearchPort,
    TriplestorePort,
};
use crate::config::AppConfig;
use crate::error::Result;
use crate::infra::factory;
use crate::pipeline::meta::PipelineMeta;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Built once at startup from configuration and shared by reference; stages
/// never reach for global clients.
#[derive(Clone)]
pub struct PipelineContext {
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn ObjectStoragePort>,
    pub semantics: Arc<dyn OntologySemanticsPort>,
    pub bus: Arc<dyn MessageBusPort>,
    pub triplestore: Arc<dyn TriplestorePort>,
    pub graph: Arc<dyn GraphDatabasePort>,
    pub search: Arc<dyn SearchPort>,
    pub meta: Arc<PipelineMeta>,
    pub scratch_root: PathBuf,
}

impl PipelineContext {
    /// Resolve every configured backend. Unknown labels fail here, before
    /// any stage starts.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        config.validate()?;
        let meta = Arc::new(PipelineMeta::open(&config.meta.path)?);
        let ctx = Self {
            config: Arc::new(config.clone()),
            storage: factory::create_storage(&config.storage)?,
            semantics: factory::create_semantics(&config.semantics)?,
            bus: factory::create_bus(&config.bus, meta.clone())?,
            triplestore: factory::create_triplestore(&config.triplestore)?,
            graph: factory::create_graph(&config.graph)?,
            search: factory::create_search(&config.search)?,
            meta,
            scratch_root: config.scratch.root.clone(),
        };
        info!(
            "Pipeline context ready: storage={} bus={} triplestore={} graph={} search={}",
            ctx.storage.service_name(),
            ctx.bus.service_name(),
            ctx.triplestore.service_name(),
            ctx.graph.service_name(),
            ctx.search.service_name()
        );
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;

    #[test]
    fn builds_in_memory_context() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = PipelineContext::from_config(&AppConfig::in_memory(dir.path())).unwrap();
        assert_eq!(ctx.storage.service_name(), "memory");
        assert_eq!(ctx.bus.service_name(), "memory");
        assert_eq!(ctx.scratch_root, dir.path().join("scratch"));
    }

    #[test]
    fn unknown_backend_stops_startup() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::in_memory(dir.path());
        config.search.service = "azure".into();
        let err = PipelineContext::from_config(&config).err().unwrap();
        assert!(matches!(err, PipelineError::UnknownBackend { kind: "search", .. }));
    }
}
