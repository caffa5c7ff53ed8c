// Domain data shapes shared across layers

pub mod diff;
pub mod graph;
pub mod owl;
pub mod webhook;

pub use diff::{ChangeSet, DiffEntry, OntologyChanges, OntologyLeftRightDiff, OntologyTimestampDiff};
pub use graph::{Edge, SimpleOntologyPropertyGraph, Vertex, VertexLabel};
pub use owl::{
    SimpleAnnotationProperty, SimpleClass, SimpleNamedIndividual, SimpleObjectProperty,
    SimpleOntology,
};
pub use webhook::{GitWebhook, Ontology};
