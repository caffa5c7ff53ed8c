//! Property-graph form of a `SimpleOntology`, ready for graph loading and
//! for flattening into search documents.

use crate::model::owl::{
    iri_local_name, SimpleAnnotationProperty, SimpleOntology, VALUE_SEPARATOR,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::debug;

pub const SUBCLASS_OF_EDGE: &str = "subClassOf";
pub const INSTANCE_OF_EDGE: &str = "instanceOf";
pub const RELATIONSHIP_PROPERTY: &str = "relationship";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VertexLabel {
    Class,
    NamedIndividual,
}

impl VertexLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            VertexLabel::Class => "class",
            VertexLabel::NamedIndividual => "namedIndividual",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vertex {
    pub vertex_id: String,
    pub vertex_key: String,
    pub label: VertexLabel,
    pub iri: String,
    pub ontology_id: i64,
    pub latest_git_webhook_id: i64,
    pub properties: BTreeMap<String, String>,
}

impl Vertex {
    pub fn new(
        label: VertexLabel,
        iri: &str,
        ontology_id: i64,
        latest_git_webhook_id: i64,
        properties: BTreeMap<String, String>,
    ) -> Self {
        Self {
            vertex_id: vertex_id(iri, ontology_id),
            vertex_key: vertex_key(iri, ontology_id),
            label,
            iri: iri.to_string(),
            ontology_id,
            latest_git_webhook_id,
            properties,
        }
    }

    /// Annotation properties plus the identifying keys every backend stores.
    pub fn loading_properties(&self) -> Map<String, Value> {
        let mut props: Map<String, Value> = self
            .properties
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        props.insert("iri".into(), Value::String(self.iri.clone()));
        props.insert("ontologyId".into(), Value::from(self.ontology_id));
        props.insert("vertexKey".into(), Value::String(self.vertex_key.clone()));
        props.insert("vertexId".into(), Value::String(self.vertex_id.clone()));
        props.insert(
            "latestGitWebhookId".into(),
            Value::from(self.latest_git_webhook_id),
        );
        props
    }

    /// Flattened search document body.
    pub fn to_document(&self) -> Map<String, Value> {
        let mut doc = self.loading_properties();
        doc.insert("vertexLabel".into(), Value::String(self.label.as_str().into()));
        doc
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub source_vertex_key: String,
    pub target_vertex_key: String,
    pub label: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleOntologyPropertyGraph {
    pub ontology_id: i64,
    pub latest_git_webhook_id: i64,
    /// Ontology annotation properties merged with the standard schemas.
    pub annotation_properties: BTreeMap<String, SimpleAnnotationProperty>,
    pub vertices: BTreeMap<String, Vertex>,
    pub edges: Vec<Edge>,
}

impl SimpleOntologyPropertyGraph {
    /// Build the graph. Standard properties never override the ontology's own.
    pub fn from_ontology(
        ontology: &SimpleOntology,
        standard_properties: &BTreeMap<String, SimpleAnnotationProperty>,
    ) -> Self {
        let mut annotation_properties = standard_properties.clone();
        for (iri, prop) in &ontology.annotation_properties {
            annotation_properties.insert(iri.clone(), prop.clone());
        }

        let ontology_id = ontology.id;
        let webhook_id = ontology.latest_git_webhook_id;
        let mut vertices = BTreeMap::new();

        for class in ontology.classes.values() {
            let props = vertex_properties(&class.annotations, &annotation_properties);
            let vertex = Vertex::new(VertexLabel::Class, &class.iri, ontology_id, webhook_id, props);
            vertices.insert(vertex.vertex_key.clone(), vertex);
        }
        for individual in ontology.named_individuals.values() {
            let props = vertex_properties(&individual.annotations, &annotation_properties);
            let vertex = Vertex::new(
                VertexLabel::NamedIndividual,
                &individual.iri,
                ontology_id,
                webhook_id,
                props,
            );
            vertices.insert(vertex.vertex_key.clone(), vertex);
        }

        let mut edges = Vec::new();
        for class in ontology.classes.values() {
            let source = vertex_key(&class.iri, ontology_id);
            for (parent_iri, restriction) in &class.parent_classes {
                let target = vertex_key(parent_iri, ontology_id);
                if !vertices.contains_key(&target) {
                    debug!("Skipping subClassOf edge to unmodelled class {}", parent_iri);
                    continue;
                }
                let relationship = match restriction {
                    Some(props) => props
                        .split(VALUE_SEPARATOR)
                        .map(|iri| object_property_label(ontology, iri))
                        .collect::<Vec<_>>()
                        .join(VALUE_SEPARATOR),
                    None => SUBCLASS_OF_EDGE.to_string(),
                };
                let mut properties = BTreeMap::new();
                properties.insert(RELATIONSHIP_PROPERTY.to_string(), relationship);
                edges.push(Edge {
                    source_vertex_key: source.clone(),
                    target_vertex_key: target,
                    label: SUBCLASS_OF_EDGE.to_string(),
                    properties,
                });
            }
        }
        for individual in ontology.named_individuals.values() {
            let source = vertex_key(&individual.iri, ontology_id);
            for type_iri in &individual.types {
                let target = vertex_key(type_iri, ontology_id);
                if !vertices.contains_key(&target) {
                    debug!("Skipping instanceOf edge to unmodelled class {}", type_iri);
                    continue;
                }
                edges.push(Edge {
                    source_vertex_key: source.clone(),
                    target_vertex_key: target,
                    label: INSTANCE_OF_EDGE.to_string(),
                    properties: BTreeMap::new(),
                });
            }
        }

        Self {
            ontology_id,
            latest_git_webhook_id: webhook_id,
            annotation_properties,
            vertices,
            edges,
        }
    }
}

fn object_property_label(ontology: &SimpleOntology, iri: &str) -> String {
    ontology
        .object_properties
        .get(iri)
        .and_then(|p| p.label.clone())
        .unwrap_or_else(|| iri_local_name(iri).to_string())
}

fn vertex_properties(
    annotations: &BTreeMap<String, String>,
    dictionary: &BTreeMap<String, SimpleAnnotationProperty>,
) -> BTreeMap<String, String> {
    let mut props = BTreeMap::new();
    for (iri, value) in annotations {
        let name = dictionary
            .get(iri)
            .and_then(|p| p.label.as_deref())
            .map(camel_case)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| camel_case(iri_local_name(iri)));
        props.insert(name, value.clone());
    }
    props
}

pub fn vertex_key(iri: &str, ontology_id: i64) -> String {
    format!("{}_{}", iri, ontology_id)
}

/// Stable numeric id: digest of the IRI, a `0` separator, then the ontology id.
pub fn vertex_id(iri: &str, ontology_id: i64) -> String {
    let digest = Sha256::digest(iri.as_bytes());
    let prefix = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    format!("{}0{}", prefix, ontology_id)
}

/// "preferred label" -> "preferredLabel", "has-Part" -> "hasPart".
pub fn camel_case(label: &str) -> String {
    let mut out = String::new();
    for (i, word) in label
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .enumerate()
    {
        let lower = word.to_lowercase();
        if i == 0 {
            out.push_str(&lower);
        } else {
            let mut chars = lower.chars();
            if let Some(first) = chars.next() {
                out.extend(first.to_uppercase());
                out.push_str(chars.as_str());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::owl::{SimpleClass, SimpleObjectProperty};

    fn class(iri: &str, label: &str, parents: &[(&str, Option<&str>)]) -> SimpleClass {
        let mut annotations = BTreeMap::new();
        annotations.insert(
            "http://www.w3.org/2000/01/rdf-schema#label".to_string(),
            label.to_string(),
        );
        SimpleClass {
            iri: iri.to_string(),
            label: Some(label.to_string()),
            parent_classes: parents
                .iter()
                .map(|(p, r)| (p.to_string(), r.map(|s| s.to_string())))
                .collect(),
            annotations,
        }
    }

    fn sample() -> SimpleOntology {
        let mut ontology = SimpleOntology::default().with_ids(4, 10);
        for c in [
            class("http://x.org#Animal", "Animal", &[]),
            class("http://x.org#Dog", "Dog", &[("http://x.org#Animal", None)]),
            class(
                "http://x.org#Tail",
                "Tail",
                &[
                    ("http://x.org#Dog", Some("http://x.org#partOf")),
                    ("http://elsewhere.org#Thing", None),
                ],
            ),
        ] {
            ontology.classes.insert(c.iri.clone(), c);
        }
        ontology.object_properties.insert(
            "http://x.org#partOf".to_string(),
            SimpleObjectProperty {
                iri: "http://x.org#partOf".to_string(),
                label: Some("part of".to_string()),
                parent_object_property_iri: None,
                domain: vec![],
                range: vec![],
                annotations: BTreeMap::new(),
            },
        );
        ontology
    }

    #[test]
    fn one_vertex_per_class_and_unresolved_parents_skipped() {
        let graph = SimpleOntologyPropertyGraph::from_ontology(&sample(), &BTreeMap::new());
        assert_eq!(graph.vertices.len(), 3);
        assert_eq!(graph.edges.len(), 2);
        let restricted = graph
            .edges
            .iter()
            .find(|e| e.source_vertex_key == "http://x.org#Tail_4")
            .unwrap();
        assert_eq!(restricted.properties[RELATIONSHIP_PROPERTY], "part of");
        let plain = graph
            .edges
            .iter()
            .find(|e| e.source_vertex_key == "http://x.org#Dog_4")
            .unwrap();
        assert_eq!(plain.properties[RELATIONSHIP_PROPERTY], SUBCLASS_OF_EDGE);
    }

    #[test]
    fn vertex_ids_are_stable_and_scoped_by_ontology() {
        assert_eq!(vertex_id("http://x.org#Dog", 4), vertex_id("http://x.org#Dog", 4));
        assert!(vertex_id("http://x.org#Dog", 4).ends_with("04"));
        assert_ne!(vertex_key("http://x.org#Dog", 4), vertex_key("http://x.org#Dog", 5));
    }

    #[test]
    fn properties_use_camel_cased_labels() {
        assert_eq!(camel_case("preferred label"), "preferredLabel");
        assert_eq!(camel_case("has-Part"), "hasPart");
        assert_eq!(camel_case("label"), "label");

        let mut dictionary = BTreeMap::new();
        dictionary.insert(
            "http://www.w3.org/2000/01/rdf-schema#label".to_string(),
            SimpleAnnotationProperty {
                iri: "http://www.w3.org/2000/01/rdf-schema#label".to_string(),
                label: Some("label".to_string()),
                annotations: BTreeMap::new(),
            },
        );
        let graph = SimpleOntologyPropertyGraph::from_ontology(&sample(), &dictionary);
        let dog = &graph.vertices["http://x.org#Dog_4"];
        assert_eq!(dog.properties["label"], "Dog");
        let doc = dog.to_document();
        assert_eq!(doc["vertexKey"], "http://x.org#Dog_4");
        assert_eq!(doc["ontologyId"], 4);
        assert_eq!(doc["latestGitWebhookId"], 10);
        assert_eq!(doc["vertexLabel"], "class");
    }
}
