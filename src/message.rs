//! Wire contracts shared by every stage: the `OntologyMessage` envelope,
//! the artifact naming convention, storage containers and bus channels.

use crate::error::{PipelineError, Result};
use jsonschema::JSONSchema;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub const MESSAGE_SCHEMA_JSON: &str = include_str!("../schemas/ontology_message.v1.json");

static MESSAGE_SCHEMA: Lazy<Option<JSONSchema>> = Lazy::new(|| {
    let schema: Value = serde_json::from_str(MESSAGE_SCHEMA_JSON).ok()?;
    // jsonschema 0.17 wants a 'static schema; this one lives for the process.
    let schema_static: &'static Value = Box::leak(Box::new(schema));
    JSONSchema::options().compile(schema_static).ok()
});

pub const OWL_EXTENSION: &str = ".owl";
pub const JSON_EXTENSION: &str = ".json";

/// Deterministic artifact name for one webhook delivery of one ontology.
pub fn processed_filename(ontology_id: i64, webhook_event_id: i64) -> String {
    format!("{}_{}{}", ontology_id, webhook_event_id, OWL_EXTENSION)
}

/// Unit of work flowing through every stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OntologyMessage {
    pub ontology_id: i64,
    pub webhook_event_id: i64,
    pub processed_filename: String,
    #[serde(default)]
    pub semantically_valid: bool,
}

impl OntologyMessage {
    pub fn new(ontology_id: i64, webhook_event_id: i64) -> Self {
        Self {
            ontology_id,
            webhook_event_id,
            processed_filename: processed_filename(ontology_id, webhook_event_id),
            semantically_valid: false,
        }
    }

    pub fn json_processed_filename(&self) -> String {
        format!("{}{}", self.processed_filename, JSON_EXTENSION)
    }

    /// Copy with the validator-owned flag set.
    pub fn with_semantic_validity(&self, valid: bool) -> Self {
        Self {
            semantically_valid: valid,
            ..self.clone()
        }
    }

    /// Parse a bus payload, rejecting anything that breaks the envelope schema
    /// or whose filename does not match its ids.
    pub fn from_json(payload: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(payload)
            .map_err(|e| PipelineError::InvalidMessage(format!("not JSON: {}", e)))?;
        validate_message_value(&value)?;
        let message: OntologyMessage = serde_json::from_value(value)
            .map_err(|e| PipelineError::InvalidMessage(e.to_string()))?;
        let expected = processed_filename(message.ontology_id, message.webhook_event_id);
        if message.processed_filename != expected {
            return Err(PipelineError::InvalidMessage(format!(
                "processedFilename '{}' does not match ids (expected '{}')",
                message.processed_filename, expected
            )));
        }
        Ok(message)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Validate a JSON value against the v1 envelope schema.
pub fn validate_message_value(value: &Value) -> Result<()> {
    let schema = MESSAGE_SCHEMA
        .as_ref()
        .ok_or_else(|| PipelineError::InvalidMessage("message schema failed to compile".into()))?;
    if let Err(errors) = schema.validate(value) {
        let details: Vec<String> = errors
            .map(|e| format!("{} at {}", e, e.instance_path))
            .collect();
        return Err(PipelineError::InvalidMessage(details.join("; ")));
    }
    Ok(())
}

/// One storage container per pipeline phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Container {
    Ingested,
    Validated,
    Parsed,
    Modelled,
    Loaded,
    Indexed,
}

impl Container {
    pub const ALL: [Container; 6] = [
        Container::Ingested,
        Container::Validated,
        Container::Parsed,
        Container::Modelled,
        Container::Loaded,
        Container::Indexed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Container::Ingested => "ingested",
            Container::Validated => "validated",
            Container::Parsed => "parsed",
            Container::Modelled => "modelled",
            Container::Loaded => "loaded",
            Container::Indexed => "indexed",
        }
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bus channels at each stage boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Ingested,
    Validated,
    TriplestoreLoaded,
    Parsed,
    Modelled,
    GraphLoaded,
    Indexed,
    DeadLetter,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Ingested => "ingested",
            Channel::Validated => "validated",
            Channel::TriplestoreLoaded => "triplestore-loaded",
            Channel::Parsed => "parsed",
            Channel::Modelled => "modelled",
            Channel::GraphLoaded => "graph-loaded",
            Channel::Indexed => "indexed",
            Channel::DeadLetter => "dead-letter",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Published on the dead-letter channel when a delivery cannot be processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub stage: String,
    pub consumer: String,
    pub delivery_id: uuid::Uuid,
    pub attempts: u32,
    pub error: String,
    pub error_kind: String,
    pub failed_at: chrono::DateTime<chrono::Utc>,
    /// Original payload, kept verbatim so it can be replayed.
    pub payload: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processed_filename_is_deterministic() {
        assert_eq!(processed_filename(3, 42), "3_42.owl");
        assert_eq!(processed_filename(3, 42), processed_filename(3, 42));
        assert_ne!(processed_filename(3, 42), processed_filename(3, 43));
    }

    #[test]
    fn wire_format_is_camel_case() {
        let message = OntologyMessage::new(1, 7).with_semantic_validity(true);
        let json: Value = serde_json::from_str(&message.to_json().unwrap()).unwrap();
        assert_eq!(json["ontologyId"], 1);
        assert_eq!(json["webhookEventId"], 7);
        assert_eq!(json["processedFilename"], "1_7.owl");
        assert_eq!(json["semanticallyValid"], true);
        assert_eq!(message.json_processed_filename(), "1_7.owl.json");
    }

    #[test]
    fn absent_validity_defaults_to_false() {
        let message = OntologyMessage::from_json(
            r#"{"ontologyId": 2, "webhookEventId": 5, "processedFilename": "2_5.owl"}"#,
        )
        .unwrap();
        assert!(!message.semantically_valid);
    }

    #[test]
    fn mismatched_filename_is_rejected() {
        let err = OntologyMessage::from_json(
            r#"{"ontologyId": 2, "webhookEventId": 5, "processedFilename": "2_6.owl"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidMessage(_)));
    }

    #[test]
    fn validity_flag_is_the_only_change() {
        let original = OntologyMessage::new(4, 11);
        let validated = original.with_semantic_validity(true);
        assert_eq!(validated.processed_filename, original.processed_filename);
        assert_eq!(validated.ontology_id, original.ontology_id);
        assert_eq!(validated.webhook_event_id, original.webhook_event_id);
        assert!(!original.semantically_valid);
    }
}
