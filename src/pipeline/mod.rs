// Stage protocol, the six stages, and the two ways of driving them:
// bus consumers and the single-process coordinator.

pub mod consumer;
pub mod coordinator;
pub mod meta;
pub mod pipeline_config;
pub mod runner;
pub mod stage;
pub mod stages;

pub use consumer::{DeliveryOutcome, StageConsumer};
pub use coordinator::{ConsistencyPolicy, PipelineCoordinator, PipelineExecutionResult};
pub use pipeline_config::PipelineConfig;
pub use runner::StageRunner;
pub use stage::{PipelineStage, StageKind, StageOutcome};
