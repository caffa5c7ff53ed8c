#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use ontopop_pipeline::app::ingest_use_case::{IngestUseCase, Submission};
use ontopop_pipeline::config::AppConfig;
use ontopop_pipeline::message::Container;
use ontopop_pipeline::model::SimpleOntology;
use ontopop_pipeline::{OntologyMessage, PipelineContext};
use std::path::{Path, PathBuf};

pub const CLASSES_IN_V1: usize = 5;

pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("resources")
        .join(name)
}

/// In-memory backends with metadata and scratch under `root`.
pub fn memory_context(root: &Path) -> PipelineContext {
    PipelineContext::from_config(&AppConfig::in_memory(root)).unwrap()
}

pub fn at(day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, day)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
}

/// Record a webhook for `fixture_name` and return the ingested message.
pub async fn submit(ctx: &PipelineContext, ontology_id: i64, fixture_name: &str, received_at: NaiveDateTime) -> OntologyMessage {
    let submission = Submission::new(ontology_id, "pizza", fixture(fixture_name)).received_at(received_at);
    let (_, message) = IngestUseCase::new(ctx.clone()).submit(&submission).await.unwrap();
    message
}

pub async fn read_parsed(ctx: &PipelineContext, message: &OntologyMessage, scratch: &Path) -> SimpleOntology {
    let name = message.json_processed_filename();
    let local = scratch.join(&name);
    ctx.storage
        .download_object(Container::Parsed, &name, &local)
        .await
        .unwrap();
    serde_json::from_slice(&std::fs::read(local).unwrap()).unwrap()
}
