pub mod graph_loader;
pub mod indexer;
pub mod modeller;
pub mod parser;
pub mod triplestore_loader;
pub mod validator;

pub use graph_loader::GraphLoaderStage;
pub use indexer::IndexerStage;
pub use modeller::ModellerStage;
pub use parser::ParserStage;
pub use triplestore_loader::TriplestoreLoaderStage;
pub use validator::ValidatorStage;

use crate::pipeline::stage::{PipelineStage, StageKind};

/// Compiled-in stage for each kind.
pub fn create_stage(kind: StageKind) -> Box<dyn PipelineStage> {
    match kind {
        StageKind::Validator => Box::new(ValidatorStage),
        StageKind::TriplestoreLoader => Box::new(TriplestoreLoaderStage),
        StageKind::Parser => Box::new(ParserStage),
        StageKind::Modeller => Box::new(ModellerStage),
        StageKind::GraphLoader => Box::new(GraphLoaderStage),
        StageKind::Indexer => Box::new(IndexerStage),
    }
}
