pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod message;
pub mod metrics;

// Layered boundaries: ports and use cases, adapters, and the pipeline proper
pub mod app;
pub mod infra;
pub mod pipeline;

// Domain data shapes shared across layers
pub mod model;

pub use context::PipelineContext;
pub use error::{PipelineError, Result};
pub use message::OntologyMessage;
