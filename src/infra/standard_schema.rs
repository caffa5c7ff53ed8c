//! Annotation properties of the standard vocabularies merged into every
//! property graph: RDF Schema, SKOS and DCMI (elements and terms).

use crate::model::SimpleAnnotationProperty;
use once_cell::sync::Lazy;
use std::collections::BTreeMap;

pub const SKOS: &str = "http://www.w3.org/2004/02/skos/core#";
pub const DC_ELEMENTS: &str = "http://purl.org/dc/elements/1.1/";
pub const DC_TERMS: &str = "http://purl.org/dc/terms/";
use crate::infra::rdfxml::RDFS;

/// The three vocabularies, in merge order. Later entries win on clashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandardSchema {
    Skos,
    RdfSchema,
    Dcmi,
}

impl StandardSchema {
    pub const ALL: [StandardSchema; 3] = [StandardSchema::Skos, StandardSchema::RdfSchema, StandardSchema::Dcmi];

    fn terms(&self) -> Vec<(String, &'static str)> {
        match self {
            StandardSchema::Skos => [
                ("prefLabel", "preferred label"),
                ("altLabel", "alternative label"),
                ("hiddenLabel", "hidden label"),
                ("definition", "definition"),
                ("note", "note"),
                ("scopeNote", "scope note"),
                ("example", "example"),
                ("editorialNote", "editorial note"),
                ("changeNote", "change note"),
                ("historyNote", "history note"),
                ("notation", "notation"),
            ]
            .iter()
            .map(|(local, label)| (format!("{}{}", SKOS, local), *label))
            .collect(),
            StandardSchema::RdfSchema => [
                ("label", "label"),
                ("comment", "comment"),
                ("seeAlso", "see also"),
                ("isDefinedBy", "is defined by"),
            ]
            .iter()
            .map(|(local, label)| (format!("{}{}", RDFS, local), *label))
            .collect(),
            StandardSchema::Dcmi => {
                let elements = [
                    "title", "creator", "subject", "description", "publisher", "contributor",
                    "date", "type", "format", "identifier", "source", "language", "relation",
                    "coverage", "rights",
                ];
                let mut terms: Vec<(String, &'static str)> = elements
                    .iter()
                    .map(|local| (format!("{}{}", DC_ELEMENTS, local), *local))
                    .collect();
                terms.extend(
                    elements
                        .iter()
                        .chain(["license", "created", "modified", "abstract"].iter())
                        .map(|local| (format!("{}{}", DC_TERMS, local), *local)),
                );
                terms
            }
        }
    }

    pub fn annotation_properties(&self) -> BTreeMap<String, SimpleAnnotationProperty> {
        self.terms()
            .into_iter()
            .map(|(iri, label)| {
                let prop = SimpleAnnotationProperty {
                    iri: iri.clone(),
                    label: Some(label.to_string()),
                    annotations: BTreeMap::new(),
                };
                (iri, prop)
            })
            .collect()
    }
}

static STANDARD_PROPERTIES: Lazy<BTreeMap<String, SimpleAnnotationProperty>> = Lazy::new(|| {
    let mut merged = BTreeMap::new();
    for schema in StandardSchema::ALL {
        merged.extend(schema.annotation_properties());
    }
    merged
});

/// Every standard annotation property keyed by IRI.
pub fn standard_annotation_properties() -> &'static BTreeMap<String, SimpleAnnotationProperty> {
    &STANDARD_PROPERTIES
}

pub fn is_standard_annotation_property(iri: &str) -> bool {
    STANDARD_PROPERTIES.contains_key(iri)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_all_three_vocabularies() {
        let props = standard_annotation_properties();
        assert!(props.contains_key("http://www.w3.org/2000/01/rdf-schema#label"));
        assert!(props.contains_key("http://www.w3.org/2004/02/skos/core#prefLabel"));
        assert!(props.contains_key("http://purl.org/dc/terms/creator"));
        assert!(props.contains_key("http://purl.org/dc/elements/1.1/creator"));
        for schema in StandardSchema::ALL {
            assert!(!schema.annotation_properties().is_empty());
        }
    }

    #[test]
    fn labels_are_human_readable() {
        let props = standard_annotation_properties();
        assert_eq!(
            props["http://www.w3.org/2004/02/skos/core#prefLabel"].label.as_deref(),
            Some("preferred label")
        );
    }
}
