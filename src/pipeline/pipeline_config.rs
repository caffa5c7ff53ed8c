use crate::error::{PipelineError, Result};
use crate::pipeline::stage::StageKind;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Ordered stage list for one coordinator run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    pub description: String,
    pub stages: Vec<StageKind>,
}

impl PipelineConfig {
    /// Validate, load the triplestore, parse, model, load the graph, index.
    pub fn default_full_pipeline() -> Self {
        Self {
            name: "full_pipeline".to_string(),
            description: "Ontology post-ingestion pipeline from validation to search index".to_string(),
            stages: StageKind::ALL.to_vec(),
        }
    }

    /// Everything except the triplestore branch.
    pub fn graph_only() -> Self {
        Self {
            name: "graph_only".to_string(),
            description: "Validate, parse, model, load the property graph and index".to_string(),
            stages: vec![
                StageKind::Validator,
                StageKind::Parser,
                StageKind::Modeller,
                StageKind::GraphLoader,
                StageKind::Indexer,
            ],
        }
    }

    pub fn validate_only() -> Self {
        Self {
            name: "validate_only".to_string(),
            description: "Consistency check only".to_string(),
            stages: vec![StageKind::Validator],
        }
    }

    /// Reject empty pipelines, repeated stages and stages placed before
    /// their dependencies.
    pub fn validate(&self) -> Result<()> {
        if self.stages.is_empty() {
            return Err(PipelineError::Config(format!(
                "pipeline '{}' must have at least one stage",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for stage in &self.stages {
            for dep in stage.dependencies() {
                if !seen.contains(&dep) {
                    return Err(PipelineError::Config(format!(
                        "stage '{}' depends on '{}' which does not run before it",
                        stage, dep
                    )));
                }
            }
            if !seen.insert(*stage) {
                return Err(PipelineError::Config(format!("stage '{}' appears twice", stage)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_pipelines_are_valid() {
        PipelineConfig::default_full_pipeline().validate().unwrap();
        PipelineConfig::graph_only().validate().unwrap();
        PipelineConfig::validate_only().validate().unwrap();
        assert_eq!(
            PipelineConfig::default_full_pipeline().stages,
            vec![
                StageKind::Validator,
                StageKind::TriplestoreLoader,
                StageKind::Parser,
                StageKind::Modeller,
                StageKind::GraphLoader,
                StageKind::Indexer,
            ]
        );
    }

    #[test]
    fn dependency_order_is_enforced() {
        let config = PipelineConfig {
            name: "backwards".into(),
            description: String::new(),
            stages: vec![StageKind::Validator, StageKind::Modeller, StageKind::Parser],
        };
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn empty_and_repeated_stages_are_rejected() {
        let mut config = PipelineConfig::validate_only();
        config.stages.clear();
        assert!(config.validate().is_err());
        config.stages = vec![StageKind::Validator, StageKind::Validator];
        assert!(config.validate().is_err());
    }
}
