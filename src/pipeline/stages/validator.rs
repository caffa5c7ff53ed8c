use crate::context::PipelineContext;
use crate::error::Result;
use crate::message::OntologyMessage;
use crate::pipeline::stage::{PipelineStage, StageKind, Transformed};
use async_trait::async_trait;
use std::path::Path;
use tracing::{info, warn};

/// Runs consistency reasoning. Only a consistent ontology is copied into
/// `validated`; the verdict is published either way.
pub struct ValidatorStage;

#[async_trait]
impl PipelineStage for ValidatorStage {
    fn kind(&self) -> StageKind {
        StageKind::Validator
    }

    async fn transform(
        &self,
        ctx: &PipelineContext,
        message: &OntologyMessage,
        input: &Path,
        _work_dir: &Path,
    ) -> Result<Transformed> {
        let consistent = ctx.semantics.is_consistent(input).await?;
        let next = message.with_semantic_validity(consistent);
        if consistent {
            info!("Ontology {} is consistent", message.processed_filename);
            Ok(Transformed::Artifact {
                path: input.to_path_buf(),
                message: next,
            })
        } else {
            warn!(
                "Ontology {} is inconsistent, not propagating to validated",
                message.processed_filename
            );
            Ok(Transformed::PublishOnly { message: next })
        }
    }
}
