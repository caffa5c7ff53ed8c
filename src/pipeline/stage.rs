use crate::context::PipelineContext;
use crate::error::{PipelineError, Result};
use crate::message::{Channel, Container, OntologyMessage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// The six pipeline stages, in coordinator order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Validator,
    TriplestoreLoader,
    Parser,
    Modeller,
    GraphLoader,
    Indexer,
}

impl StageKind {
    pub const ALL: [StageKind; 6] = [
        StageKind::Validator,
        StageKind::TriplestoreLoader,
        StageKind::Parser,
        StageKind::Modeller,
        StageKind::GraphLoader,
        StageKind::Indexer,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StageKind::Validator => "validator",
            StageKind::TriplestoreLoader => "triplestore_loader",
            StageKind::Parser => "parser",
            StageKind::Modeller => "modeller",
            StageKind::GraphLoader => "graph_loader",
            StageKind::Indexer => "indexer",
        }
    }

    pub fn input_channel(&self) -> Channel {
        match self {
            StageKind::Validator => Channel::Ingested,
            StageKind::TriplestoreLoader | StageKind::Parser => Channel::Validated,
            StageKind::Modeller => Channel::Parsed,
            StageKind::GraphLoader => Channel::Modelled,
            StageKind::Indexer => Channel::GraphLoaded,
        }
    }

    pub fn output_channel(&self) -> Channel {
        match self {
            StageKind::Validator => Channel::Validated,
            StageKind::TriplestoreLoader => Channel::TriplestoreLoaded,
            StageKind::Parser => Channel::Parsed,
            StageKind::Modeller => Channel::Modelled,
            StageKind::GraphLoader => Channel::GraphLoaded,
            StageKind::Indexer => Channel::Indexed,
        }
    }

    pub fn input_container(&self) -> Container {
        match self {
            StageKind::Validator => Container::Ingested,
            StageKind::TriplestoreLoader | StageKind::Parser => Container::Validated,
            StageKind::Modeller => Container::Parsed,
            StageKind::GraphLoader => Container::Modelled,
            StageKind::Indexer => Container::Loaded,
        }
    }

    pub fn output_container(&self) -> Container {
        match self {
            StageKind::Validator => Container::Validated,
            StageKind::TriplestoreLoader | StageKind::GraphLoader => Container::Loaded,
            StageKind::Parser => Container::Parsed,
            StageKind::Modeller => Container::Modelled,
            StageKind::Indexer => Container::Indexed,
        }
    }

    fn reads_json(&self) -> bool {
        matches!(self, StageKind::Modeller | StageKind::GraphLoader | StageKind::Indexer)
    }

    fn writes_json(&self) -> bool {
        !matches!(self, StageKind::Validator | StageKind::TriplestoreLoader)
    }

    pub fn input_name(&self, message: &OntologyMessage) -> String {
        if self.reads_json() {
            message.json_processed_filename()
        } else {
            message.processed_filename.clone()
        }
    }

    pub fn output_name(&self, message: &OntologyMessage) -> String {
        if self.writes_json() {
            message.json_processed_filename()
        } else {
            message.processed_filename.clone()
        }
    }

    pub fn dependencies(&self) -> Vec<StageKind> {
        match self {
            StageKind::Validator => vec![],
            StageKind::TriplestoreLoader | StageKind::Parser => vec![StageKind::Validator],
            StageKind::Modeller => vec![StageKind::Parser],
            StageKind::GraphLoader => vec![StageKind::Modeller],
            StageKind::Indexer => vec![StageKind::GraphLoader],
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StageKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        StageKind::ALL
            .into_iter()
            .find(|kind| kind.name() == normalized)
            .ok_or_else(|| PipelineError::Config(format!("unknown stage '{}'", s)))
    }
}

/// What a stage's transform produced.
#[derive(Debug)]
pub enum Transformed {
    /// Upload `path` to the output container, then publish `message`.
    Artifact { path: PathBuf, message: OntologyMessage },
    /// Nothing to persist; publish `message` only.
    PublishOnly { message: OntologyMessage },
}

/// How one stage run ended without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Completed { artifact: String, message: OntologyMessage },
    /// Validator found the ontology inconsistent; the message was still
    /// published with `semanticallyValid=false`.
    Rejected { message: OntologyMessage },
    /// Upstream marked the ontology invalid; nothing was done.
    Skipped,
    /// A newer webhook for this ontology was already committed.
    Superseded { committed_webhook_event_id: i64 },
}

impl StageOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageOutcome::Completed { .. } => "completed",
            StageOutcome::Rejected { .. } => "rejected",
            StageOutcome::Skipped => "skipped",
            StageOutcome::Superseded { .. } => "superseded",
        }
    }

    /// The message published by this run, if any.
    pub fn published(&self) -> Option<&OntologyMessage> {
        match self {
            StageOutcome::Completed { message, .. } | StageOutcome::Rejected { message } => Some(message),
            StageOutcome::Skipped | StageOutcome::Superseded { .. } => None,
        }
    }
}

/// Stage-specific transform. Download, persist, publish and cleanup are
/// shared and live in the runner.
#[async_trait]
pub trait PipelineStage: Send + Sync {
    fn kind(&self) -> StageKind;

    /// `input` is the downloaded upstream artifact; write any new artifact
    /// under `work_dir`.
    async fn transform(
        &self,
        ctx: &PipelineContext,
        message: &OntologyMessage,
        input: &Path,
        work_dir: &Path,
    ) -> Result<Transformed>;

    /// Release backend resources after every run, successful or not.
    async fn cleanup(&self, _ctx: &PipelineContext) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_names_follow_the_channel_table() {
        let message = OntologyMessage::new(4, 9);
        assert_eq!(StageKind::Validator.input_name(&message), "4_9.owl");
        assert_eq!(StageKind::Validator.output_name(&message), "4_9.owl");
        assert_eq!(StageKind::TriplestoreLoader.output_name(&message), "4_9.owl");
        assert_eq!(StageKind::Parser.input_name(&message), "4_9.owl");
        assert_eq!(StageKind::Parser.output_name(&message), "4_9.owl.json");
        assert_eq!(StageKind::Indexer.input_name(&message), "4_9.owl.json");
        assert_eq!(StageKind::Indexer.input_container(), Container::Loaded);
    }

    #[test]
    fn every_stage_reads_what_its_dependency_writes() {
        for kind in StageKind::ALL {
            for dep in kind.dependencies() {
                assert_eq!(dep.output_container(), kind.input_container(), "{}", kind);
                assert_eq!(dep.output_channel(), kind.input_channel(), "{}", kind);
            }
        }
    }

    #[test]
    fn parses_cli_names() {
        assert_eq!("graph-loader".parse::<StageKind>().unwrap(), StageKind::GraphLoader);
        assert_eq!("Indexer".parse::<StageKind>().unwrap(), StageKind::Indexer);
        assert!("reasoner".parse::<StageKind>().is_err());
    }
}
