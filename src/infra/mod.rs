// Adapters behind the ports in `app::ports`, selected by `factory`.

pub mod elasticsearch_search;
pub mod factory;
pub mod fuseki_triplestore;
pub mod local_storage;
pub mod log_bus;
pub mod memory_bus;
pub mod memory_graph;
pub mod memory_search;
pub mod memory_storage;
pub mod memory_triplestore;
pub mod rdfxml;
pub mod rdfxml_semantics;
pub mod standard_schema;
