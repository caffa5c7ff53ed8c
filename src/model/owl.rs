use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Separator used wherever several values collapse into one string.
pub const VALUE_SEPARATOR: &str = " | ";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleAnnotationProperty {
    pub iri: String,
    pub label: Option<String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleObjectProperty {
    pub iri: String,
    pub label: Option<String>,
    pub parent_object_property_iri: Option<String>,
    #[serde(default)]
    pub domain: Vec<String>,
    #[serde(default)]
    pub range: Vec<String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleClass {
    pub iri: String,
    pub label: Option<String>,
    /// Parent class IRI to the restricting object property IRI(s), if any.
    #[serde(default)]
    pub parent_classes: BTreeMap<String, Option<String>>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleNamedIndividual {
    pub iri: String,
    pub label: Option<String>,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

/// Normalized extraction of one OWL document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleOntology {
    pub id: i64,
    pub latest_git_webhook_id: i64,
    #[serde(default)]
    pub annotation_properties: BTreeMap<String, SimpleAnnotationProperty>,
    #[serde(default)]
    pub object_properties: BTreeMap<String, SimpleObjectProperty>,
    #[serde(default)]
    pub classes: BTreeMap<String, SimpleClass>,
    #[serde(default)]
    pub named_individuals: BTreeMap<String, SimpleNamedIndividual>,
}

impl SimpleOntology {
    pub fn with_ids(mut self, ontology_id: i64, webhook_event_id: i64) -> Self {
        self.id = ontology_id;
        self.latest_git_webhook_id = webhook_event_id;
        self
    }

    /// IRIs referenced from domains, ranges and superclasses that this
    /// ontology does not itself declare.
    pub fn external_references(&self) -> Vec<&str> {
        let mut refs: Vec<&str> = Vec::new();
        for prop in self.object_properties.values() {
            for iri in prop.domain.iter().chain(prop.range.iter()) {
                if !self.classes.contains_key(iri) {
                    refs.push(iri);
                }
            }
        }
        for class in self.classes.values() {
            for parent in class.parent_classes.keys() {
                if !self.classes.contains_key(parent) {
                    refs.push(parent);
                }
            }
        }
        refs.sort_unstable();
        refs.dedup();
        refs
    }
}

/// Append `value` to `existing`, joining repeats with the separator.
pub fn join_value(existing: Option<&String>, value: &str) -> String {
    match existing {
        Some(current) if current.split(VALUE_SEPARATOR).any(|v| v == value) => current.clone(),
        Some(current) => format!("{}{}{}", current, VALUE_SEPARATOR, value),
        None => value.to_string(),
    }
}

/// Local name of an IRI: the part after the last `#` or `/`.
pub fn iri_local_name(iri: &str) -> &str {
    iri.rsplit(|c| c == '#' || c == '/')
        .find(|s| !s.is_empty())
        .unwrap_or(iri)
}
