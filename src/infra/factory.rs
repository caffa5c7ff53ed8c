//! Backend selection. Each port has a closed set of adapters picked by the
//! `service` label in configuration.

use crate::app::ports::{
    GraphDatabasePort, MessageBusPort, ObjectStoragePort, OntologySemanticsPort, SearchPort,
    TriplestorePort,
};
use crate::config::{
    BusConfig, GraphConfig, SearchConfig, SemanticsConfig, StorageConfig, TriplestoreConfig,
};
use crate::error::{PipelineError, Result};
use crate::infra::elasticsearch_search::ElasticsearchSearch;
use crate::infra::fuseki_triplestore::FusekiTriplestore;
use crate::infra::local_storage::LocalObjectStorage;
use crate::infra::log_bus::LogMessageBus;
use crate::infra::memory_bus::InMemoryMessageBus;
use crate::infra::memory_graph::InMemoryGraphDatabase;
use crate::infra::memory_search::InMemorySearch;
use crate::infra::memory_storage::InMemoryObjectStorage;
use crate::infra::memory_triplestore::InMemoryTriplestore;
use crate::infra::rdfxml_semantics::RdfXmlSemantics;
use crate::pipeline::meta::PipelineMeta;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

fn unknown(kind: &'static str, label: &str) -> PipelineError {
    PipelineError::UnknownBackend {
        kind,
        label: label.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Local,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "filesystem" => Ok(StorageBackend::Local),
            "memory" => Ok(StorageBackend::Memory),
            _ => Err(unknown("storage", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusBackend {
    Log,
    Memory,
}

impl FromStr for BusBackend {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "log" => Ok(BusBackend::Log),
            "memory" => Ok(BusBackend::Memory),
            _ => Err(unknown("bus", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemanticsBackend {
    RdfXml,
}

impl FromStr for SemanticsBackend {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rdfxml" | "rdf-xml" => Ok(SemanticsBackend::RdfXml),
            _ => Err(unknown("semantics", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriplestoreBackend {
    Memory,
    Fuseki,
}

impl FromStr for TriplestoreBackend {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(TriplestoreBackend::Memory),
            "fuseki" | "jena-fuseki" => Ok(TriplestoreBackend::Fuseki),
            _ => Err(unknown("triplestore", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphBackend {
    Memory,
}

impl FromStr for GraphBackend {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(GraphBackend::Memory),
            _ => Err(unknown("graph", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchBackend {
    Memory,
    Elasticsearch,
}

impl FromStr for SearchBackend {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(SearchBackend::Memory),
            "elasticsearch" => Ok(SearchBackend::Elasticsearch),
            _ => Err(unknown("search", s)),
        }
    }
}

pub fn create_storage(config: &StorageConfig) -> Result<Arc<dyn ObjectStoragePort>> {
    Ok(match config.service.parse::<StorageBackend>()? {
        StorageBackend::Local => Arc::new(LocalObjectStorage::new(&config.root)),
        StorageBackend::Memory => Arc::new(InMemoryObjectStorage::default()),
    })
}

pub fn create_bus(config: &BusConfig, meta: Arc<PipelineMeta>) -> Result<Arc<dyn MessageBusPort>> {
    Ok(match config.service.parse::<BusBackend>()? {
        BusBackend::Log => Arc::new(LogMessageBus::new(
            &config.root,
            meta,
            Duration::from_millis(config.poll_interval_ms),
        )),
        BusBackend::Memory => Arc::new(InMemoryMessageBus::new()),
    })
}

pub fn create_semantics(config: &SemanticsConfig) -> Result<Arc<dyn OntologySemanticsPort>> {
    Ok(match config.service.parse::<SemanticsBackend>()? {
        SemanticsBackend::RdfXml => Arc::new(RdfXmlSemantics::new(Duration::from_secs(
            config.reasoner_timeout_seconds,
        ))),
    })
}

pub fn create_triplestore(config: &TriplestoreConfig) -> Result<Arc<dyn TriplestorePort>> {
    Ok(match config.service.parse::<TriplestoreBackend>()? {
        TriplestoreBackend::Memory => Arc::new(InMemoryTriplestore::new()),
        TriplestoreBackend::Fuseki => Arc::new(FusekiTriplestore::new(
            &config.endpoint,
            Duration::from_secs(config.timeout_seconds),
        )?),
    })
}

pub fn create_graph(config: &GraphConfig) -> Result<Arc<dyn GraphDatabasePort>> {
    Ok(match config.service.parse::<GraphBackend>()? {
        GraphBackend::Memory => Arc::new(InMemoryGraphDatabase::new()),
    })
}

pub fn create_search(config: &SearchConfig) -> Result<Arc<dyn SearchPort>> {
    Ok(match config.service.parse::<SearchBackend>()? {
        SearchBackend::Memory => Arc::new(InMemorySearch::new()),
        SearchBackend::Elasticsearch => Arc::new(ElasticsearchSearch::new(
            &config.endpoint,
            Duration::from_secs(config.timeout_seconds),
        )?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_case_insensitive() {
        assert_eq!("Local".parse::<StorageBackend>().unwrap(), StorageBackend::Local);
        assert_eq!("FUSEKI".parse::<TriplestoreBackend>().unwrap(), TriplestoreBackend::Fuseki);
        assert_eq!(" memory ".parse::<BusBackend>().unwrap(), BusBackend::Memory);
    }

    #[test]
    fn unknown_labels_name_their_port() {
        let err = "azure".parse::<StorageBackend>().unwrap_err();
        assert!(matches!(err, PipelineError::UnknownBackend { kind: "storage", .. }));
        let err = "solr".parse::<SearchBackend>().unwrap_err();
        assert!(matches!(err, PipelineError::UnknownBackend { kind: "search", .. }));
    }

    #[test]
    fn builds_adapters_for_configured_labels() {
        let storage = StorageConfig {
            service: "memory".into(),
            ..StorageConfig::default()
        };
        assert_eq!(create_storage(&storage).unwrap().service_name(), "memory");

        let search = SearchConfig {
            service: "elasticsearch".into(),
            endpoint: "http://localhost:9200".into(),
            ..SearchConfig::default()
        };
        assert_eq!(create_search(&search).unwrap().service_name(), "elasticsearch");
    }
}
