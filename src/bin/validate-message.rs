use anyhow::{Context, Result};
use clap::Parser;
use ontopop_pipeline::message::{OntologyMessage, MESSAGE_SCHEMA_JSON};
use jsonschema::JSONSchema;
use serde_json::Value;
use std::{fs, path::PathBuf};

/// Validate an OntologyMessage JSON file against the v1 message schema.
#[derive(Parser, Debug)]
#[command(name = "validate-message", version, about = "Validate OntologyMessage JSON against schema")]
struct Cli {
    /// Path to the message JSON file to validate
    path: PathBuf,

    /// Optional schema file (defaults to the built-in ontology_message.v1 schema)
    #[arg(long)]
    schema: Option<PathBuf>,
}

fn load_json(path: &PathBuf) -> Result<Value> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let json: Value = serde_json::from_str(&data)
        .with_context(|| format!("Failed to parse JSON in {}", path.display()))?;
    Ok(json)
}

fn main() -> Result<()> {
    let args = Cli::parse();

    let schema_json = match &args.schema {
        Some(path) => load_json(path)?,
        None => serde_json::from_str(MESSAGE_SCHEMA_JSON).context("Built-in schema is not JSON")?,
    };
    let instance = load_json(&args.path)?;

    // jsonschema 0.17 expects a 'static schema; leak it for the CLI lifetime
    let schema_static: &'static Value = Box::leak(Box::new(schema_json));
    let compiled = JSONSchema::options()
        .compile(schema_static)
        .context("Failed to compile JSON Schema")?;

    if let Err(errors) = compiled.validate(&instance) {
        eprintln!("invalid:");
        for error in errors {
            eprintln!("- {} at {}", error, error.instance_path);
        }
        std::process::exit(1)
    }

    // Schema-valid but with a filename that disagrees with its ids
    if args.schema.is_none() {
        if let Err(e) = OntologyMessage::from_json(&instance.to_string()) {
            eprintln!("invalid:\n- {}", e);
            std::process::exit(1)
        }
    }

    println!("valid");
    Ok(())
}
