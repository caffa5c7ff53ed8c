use crate::error::{PipelineError, Result};
use crate::infra::factory::{
    BusBackend, GraphBackend, SearchBackend, SemanticsBackend, StorageBackend, TriplestoreBackend,
};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub const DEFAULT_CONFIG_PATH: &str = "ontopop.toml";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub bus: BusConfig,
    pub semantics: SemanticsConfig,
    pub triplestore: TriplestoreConfig,
    pub graph: GraphConfig,
    pub search: SearchConfig,
    pub retry: RetryConfig,
    pub coordinator: CoordinatorConfig,
    pub meta: MetaConfig,
    pub scratch: ScratchConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub service: String,
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            service: "local".to_string(),
            root: PathBuf::from("data/storage"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub service: String,
    pub root: PathBuf,
    pub poll_interval_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            service: "log".to_string(),
            root: PathBuf::from("data/bus"),
            poll_interval_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SemanticsConfig {
    pub service: String,
    pub reasoner_timeout_seconds: u64,
}

impl Default for SemanticsConfig {
    fn default() -> Self {
        Self {
            service: "rdfxml".to_string(),
            reasoner_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TriplestoreConfig {
    pub service: String,
    pub endpoint: String,
    pub timeout_seconds: u64,
}

impl Default for TriplestoreConfig {
    fn default() -> Self {
        Self {
            service: "memory".to_string(),
            endpoint: "http://localhost:3030".to_string(),
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub service: String,
    pub evaluation_timeout_seconds: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            service: "memory".to_string(),
            evaluation_timeout_seconds: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub service: String,
    pub endpoint: String,
    pub index_prefix: String,
    pub shards: Option<u32>,
    pub replicas: Option<u32>,
    pub timeout_seconds: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            service: "memory".to_string(),
            endpoint: "http://localhost:9200".to_string(),
            index_prefix: "ontopop-".to_string(),
            shards: None,
            replicas: None,
            timeout_seconds: 30,
        }
    }
}

impl SearchConfig {
    pub fn index_name(&self, ontology_id: i64) -> String {
        format!("{}{}", self.index_prefix, ontology_id)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
        }
    }
}

impl RetryConfig {
    /// Delay before redelivery number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(20);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyMode {
    Poll,
    FixedDelay,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub consistency: ConsistencyMode,
    pub delay_ms: u64,
    pub poll_interval_ms: u64,
    pub max_wait_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            consistency: ConsistencyMode::Poll,
            delay_ms: 5_000,
            poll_interval_ms: 100,
            max_wait_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetaConfig {
    pub path: PathBuf,
}

impl Default for MetaConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/meta.db"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScratchConfig {
    pub root: PathBuf,
}

impl Default for ScratchConfig {
    fn default() -> Self {
        Self {
            root: std::env::temp_dir().join("ontopop"),
        }
    }
}

impl AppConfig {
    /// Load from `path`, or from `ontopop.toml` when no path is given.
    ///
    /// A missing default file falls back to built-in defaults; a missing
    /// explicitly requested file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (config_path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };

        if !config_path.exists() {
            if explicit {
                return Err(PipelineError::Config(format!(
                    "Config file '{}' does not exist",
                    config_path.display()
                )));
            }
            info!("No {} found, using built-in defaults", DEFAULT_CONFIG_PATH);
            return Ok(Self::default());
        }

        let config_content = fs::read_to_string(&config_path).map_err(|e| {
            PipelineError::Config(format!(
                "Failed to read config file '{}': {}",
                config_path.display(),
                e
            ))
        })?;

        let config: AppConfig = toml::from_str(&config_content)?;
        Ok(config)
    }

    /// Every backend in memory, with storage, metadata and scratch under `root`.
    pub fn in_memory(root: &Path) -> Self {
        let mut config = Self::default();
        config.storage.service = "memory".to_string();
        config.storage.root = root.join("storage");
        config.bus.service = "memory".to_string();
        config.bus.root = root.join("bus");
        config.meta.path = root.join("meta.db");
        config.scratch.root = root.join("scratch");
        config.retry.initial_backoff_ms = 10;
        config.retry.max_backoff_ms = 50;
        config.coordinator.poll_interval_ms = 10;
        config.coordinator.max_wait_ms = 1_000;
        config
    }

    /// Resolve every backend label. Any unknown label is a startup error.
    pub fn validate(&self) -> Result<()> {
        self.storage.service.parse::<StorageBackend>()?;
        self.bus.service.parse::<BusBackend>()?;
        self.semantics.service.parse::<SemanticsBackend>()?;
        self.triplestore.service.parse::<TriplestoreBackend>()?;
        self.graph.service.parse::<GraphBackend>()?;
        self.search.service.parse::<SearchBackend>()?;
        if self.retry.max_attempts == 0 {
            return Err(PipelineError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
