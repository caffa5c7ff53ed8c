use jsonschema::JSONSchema;
use ontopop_pipeline::OntologyMessage;
use serde_json::json;

fn compiled_schema() -> JSONSchema {
    let schema = include_str!("../schemas/ontology_message.v1.json");
    let schema_json: serde_json::Value = serde_json::from_str(schema).unwrap();
    let schema_static: &'static serde_json::Value = Box::leak(Box::new(schema_json));
    JSONSchema::options().compile(schema_static).unwrap()
}

#[test]
fn ingested_example_is_valid() {
    let instance: serde_json::Value =
        serde_json::from_str(include_str!("resources/message_ingested.json")).unwrap();
    assert!(compiled_schema().is_valid(&instance));
}

#[test]
fn validated_example_is_valid() {
    let instance: serde_json::Value =
        serde_json::from_str(include_str!("resources/message_validated.json")).unwrap();
    assert!(compiled_schema().is_valid(&instance));

    let message = OntologyMessage::from_json(include_str!("resources/message_validated.json")).unwrap();
    assert!(message.semantically_valid);
    assert_eq!(message.json_processed_filename(), "7_42.owl.json");
}

#[test]
fn missing_semantic_flag_defaults_to_false() {
    let message = OntologyMessage::from_json(include_str!("resources/message_ingested.json")).unwrap();
    assert!(!message.semantically_valid);
}

#[test]
fn malformed_filename_is_rejected() {
    let mut invalid: serde_json::Value =
        serde_json::from_str(include_str!("resources/message_ingested.json")).unwrap();
    invalid["processedFilename"] = json!("7-42.rdf");
    assert!(!compiled_schema().is_valid(&invalid), "filename pattern should fail");
}

#[test]
fn unknown_fields_are_rejected() {
    let mut extra: serde_json::Value =
        serde_json::from_str(include_str!("resources/message_ingested.json")).unwrap();
    extra["payload"] = json!("<rdf:RDF/>");
    assert!(!compiled_schema().is_valid(&extra));
}

#[test]
fn filename_must_agree_with_ids() {
    // Schema-valid, but names another webhook's artifact
    let payload = json!({
        "ontologyId": 7,
        "webhookEventId": 42,
        "processedFilename": "7_41.owl",
    });
    assert!(compiled_schema().is_valid(&payload));
    assert!(OntologyMessage::from_json(&payload.to_string()).is_err());
}
