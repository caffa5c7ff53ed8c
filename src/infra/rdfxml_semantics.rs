use crate::app::ports::OntologySemanticsPort;
use crate::error::{PipelineError, Result};
use crate::infra::rdfxml::{parse_rdf_xml, Term, Triple, OWL, RDF, RDFS, RDF_FIRST, RDF_NIL, RDF_REST, RDF_TYPE};
use crate::infra::standard_schema::is_standard_annotation_property;
use crate::model::owl::join_value;
use crate::model::{
    SimpleAnnotationProperty, SimpleClass, SimpleNamedIndividual, SimpleObjectProperty,
    SimpleOntology,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

const OBJECT_PROPERTY_TYPES: [&str; 7] = [
    "ObjectProperty",
    "TransitiveProperty",
    "SymmetricProperty",
    "AsymmetricProperty",
    "ReflexiveProperty",
    "IrreflexiveProperty",
    "InverseFunctionalProperty",
];

fn owl(local: &str) -> String {
    format!("{}{}", OWL, local)
}

fn rdfs(local: &str) -> String {
    format!("{}{}", RDFS, local)
}

/// Triples of one document indexed by subject.
pub struct OwlDocument {
    by_subject: HashMap<Term, Vec<(String, Term)>>,
    subjects: Vec<Term>,
}

impl OwlDocument {
    pub fn from_triples(triples: Vec<Triple>) -> Self {
        let mut by_subject: HashMap<Term, Vec<(String, Term)>> = HashMap::new();
        let mut subjects = Vec::new();
        for triple in triples {
            let entry = by_subject.entry(triple.subject.clone()).or_insert_with(|| {
                subjects.push(triple.subject.clone());
                Vec::new()
            });
            entry.push((triple.predicate, triple.object));
        }
        Self { by_subject, subjects }
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        Ok(Self::from_triples(parse_rdf_xml(bytes)?))
    }

    fn objects<'a>(&'a self, subject: &Term, predicate: &'a str) -> impl Iterator<Item = &'a Term> + 'a {
        self.by_subject
            .get(subject)
            .into_iter()
            .flatten()
            .filter(move |(p, _)| p == predicate)
            .map(|(_, o)| o)
    }

    fn first_iri(&self, subject: &Term, predicate: &str) -> Option<String> {
        self.objects(subject, predicate)
            .find_map(|o| o.as_iri())
            .map(str::to_string)
    }

    fn types(&self, subject: &Term) -> Vec<&str> {
        self.objects(subject, RDF_TYPE).filter_map(Term::as_iri).collect()
    }

    fn has_type(&self, subject: &Term, type_iri: &str) -> bool {
        self.types(subject).contains(&type_iri)
    }

    fn iri_subjects_of_type(&self, type_iris: &[String]) -> Vec<String> {
        let mut found: Vec<String> = self
            .subjects
            .iter()
            .filter(|s| self.types(s).iter().any(|t| type_iris.iter().any(|x| x == t)))
            .filter_map(|s| s.as_iri().map(str::to_string))
            .collect();
        found.sort();
        found.dedup();
        found
    }

    /// Items of an RDF collection, stopping at rdf:nil or a broken link.
    fn list_items(&self, head: &Term) -> Vec<Term> {
        let mut items = Vec::new();
        let mut node = head.clone();
        let mut seen = HashSet::new();
        while node.as_iri() != Some(RDF_NIL) && seen.insert(node.clone()) {
            match self.objects(&node, RDF_FIRST).next() {
                Some(first) => items.push(first.clone()),
                None => break,
            }
            match self.objects(&node, RDF_REST).next() {
                Some(rest) => node = rest.clone(),
                None => break,
            }
        }
        items
    }

    fn label(&self, subject: &Term) -> Option<String> {
        let label_iri = rdfs("label");
        let mut fallback = None;
        for object in self.objects(subject, &label_iri) {
            if let Term::Literal { value, lang } = object {
                match lang.as_deref() {
                    None | Some("en") => return Some(value.clone()),
                    Some(_) if fallback.is_none() => fallback = Some(value.clone()),
                    Some(_) => {}
                }
            }
        }
        fallback
    }

    fn annotations(&self, subject: &Term, annotation_iris: &BTreeSet<String>) -> BTreeMap<String, String> {
        let mut annotations = BTreeMap::new();
        for (predicate, object) in self.by_subject.get(subject).into_iter().flatten() {
            if !annotation_iris.contains(predicate) {
                continue;
            }
            let value = match object {
                Term::Literal { value, .. } => value.as_str(),
                Term::Iri(iri) => iri.as_str(),
                Term::Blank(_) => continue,
            };
            let joined = join_value(annotations.get(predicate), value);
            annotations.insert(predicate.clone(), joined);
        }
        annotations
    }

    /// Extract annotation properties, object properties, classes and named
    /// individuals. Ids are filled in by the caller.
    pub fn to_simple_ontology(&self) -> SimpleOntology {
        let declared_annotation = self.iri_subjects_of_type(&[owl("AnnotationProperty")]);
        let mut annotation_iris: BTreeSet<String> = declared_annotation.iter().cloned().collect();
        for subject in &self.subjects {
            for (predicate, _) in self.by_subject.get(subject).into_iter().flatten() {
                if is_standard_annotation_property(predicate) {
                    annotation_iris.insert(predicate.clone());
                }
            }
        }

        let mut ontology = SimpleOntology::default();

        for iri in declared_annotation {
            let subject = Term::Iri(iri.clone());
            ontology.annotation_properties.insert(
                iri.clone(),
                SimpleAnnotationProperty {
                    iri,
                    label: self.label(&subject),
                    annotations: self.annotations(&subject, &annotation_iris),
                },
            );
        }

        let property_types: Vec<String> = OBJECT_PROPERTY_TYPES.iter().map(|t| owl(t)).collect();
        for iri in self.iri_subjects_of_type(&property_types) {
            let subject = Term::Iri(iri.clone());
            let collect_iris = |predicate: String| -> Vec<String> {
                let mut iris: Vec<String> = self
                    .objects(&subject, &predicate)
                    .filter_map(Term::as_iri)
                    .map(str::to_string)
                    .collect();
                iris.sort();
                iris.dedup();
                iris
            };
            ontology.object_properties.insert(
                iri.clone(),
                SimpleObjectProperty {
                    iri: iri.clone(),
                    label: self.label(&subject),
                    parent_object_property_iri: self.first_iri(&subject, &rdfs("subPropertyOf")),
                    domain: collect_iris(rdfs("domain")),
                    range: collect_iris(rdfs("range")),
                    annotations: self.annotations(&subject, &annotation_iris),
                },
            );
        }

        let class_types = [owl("Class"), rdfs("Class")];
        let class_iris = self.iri_subjects_of_type(&class_types);
        for iri in &class_iris {
            let subject = Term::Iri(iri.clone());
            ontology.classes.insert(
                iri.clone(),
                SimpleClass {
                    iri: iri.clone(),
                    label: self.label(&subject),
                    parent_classes: self.parent_classes(&subject),
                    annotations: self.annotations(&subject, &annotation_iris),
                },
            );
        }

        let named_individual = owl("NamedIndividual");
        for subject in &self.subjects {
            let Some(iri) = subject.as_iri() else { continue };
            let types = self.types(subject);
            let declared = types.contains(&named_individual.as_str());
            let asserted: Vec<String> = types
                .iter()
                .filter(|t| class_iris.iter().any(|c| c == *t))
                .map(|t| t.to_string())
                .collect();
            if !declared && asserted.is_empty() {
                continue;
            }
            if ontology.classes.contains_key(iri) || ontology.object_properties.contains_key(iri) {
                continue;
            }
            ontology.named_individuals.insert(
                iri.to_string(),
                SimpleNamedIndividual {
                    iri: iri.to_string(),
                    label: self.label(subject),
                    types: asserted,
                    annotations: self.annotations(subject, &annotation_iris),
                },
            );
        }

        ontology
    }

    fn parent_classes(&self, class: &Term) -> BTreeMap<String, Option<String>> {
        let mut parents: BTreeMap<String, Option<String>> = BTreeMap::new();
        let on_property = owl("onProperty");
        let fillers = [owl("someValuesFrom"), owl("allValuesFrom"), owl("onClass")];
        for parent in self.objects(class, &rdfs("subClassOf")) {
            match parent {
                Term::Iri(iri) => {
                    parents.entry(iri.clone()).or_insert(None);
                }
                Term::Blank(_) => {
                    let Some(property) = self.first_iri(parent, &on_property) else { continue };
                    let Some(filler) = fillers.iter().find_map(|f| self.first_iri(parent, f)) else {
                        continue;
                    };
                    let entry = parents.entry(filler).or_insert(None);
                    let joined = join_value(entry.as_ref(), &property);
                    *entry = Some(joined);
                }
                Term::Literal { .. } => {}
            }
        }
        parents
    }

    /// Structural consistency: no individual may be typed, through the
    /// subclass and equivalence closure, as owl:Nothing or as two classes
    /// declared disjoint.
    pub fn check_consistency(&self) -> bool {
        let nothing = owl("Nothing");
        let subclass = rdfs("subClassOf");
        let equivalent = owl("equivalentClass");
        let disjoint_with = owl("disjointWith");

        let mut supers: HashMap<&str, Vec<&str>> = HashMap::new();
        let mut disjoint: HashSet<(String, String)> = HashSet::new();
        let mut add_disjoint = |a: &str, b: &str| {
            if a != b {
                disjoint.insert((a.to_string(), b.to_string()));
                disjoint.insert((b.to_string(), a.to_string()));
            }
        };

        for subject in &self.subjects {
            let Some(s) = subject.as_iri() else {
                if self.has_type(subject, &owl("AllDisjointClasses")) {
                    for members in self.objects(subject, &owl("members")) {
                        let items: Vec<String> = self
                            .list_items(members)
                            .iter()
                            .filter_map(|t| t.as_iri().map(str::to_string))
                            .collect();
                        for (i, a) in items.iter().enumerate() {
                            for b in &items[i + 1..] {
                                add_disjoint(a, b);
                            }
                        }
                    }
                }
                continue;
            };
            for (predicate, object) in self.by_subject.get(subject).into_iter().flatten() {
                let Some(o) = object.as_iri() else { continue };
                if *predicate == subclass {
                    supers.entry(s).or_default().push(o);
                } else if *predicate == equivalent {
                    supers.entry(s).or_default().push(o);
                    supers.entry(o).or_default().push(s);
                } else if *predicate == disjoint_with {
                    add_disjoint(s, o);
                }
            }
        }

        for subject in &self.subjects {
            let asserted: Vec<&str> = self
                .types(subject)
                .into_iter()
                .filter(|t| *t == nothing || !is_vocabulary(t))
                .collect();
            if asserted.is_empty() {
                continue;
            }
            let mut closure: HashSet<&str> = HashSet::new();
            let mut queue: VecDeque<&str> = asserted.into_iter().collect();
            while let Some(class) = queue.pop_front() {
                if !closure.insert(class) {
                    continue;
                }
                if let Some(parents) = supers.get(class) {
                    queue.extend(parents.iter().copied());
                }
            }
            if closure.contains(nothing.as_str()) {
                debug!("{:?} is an instance of owl:Nothing", subject);
                return false;
            }
            for a in &closure {
                for b in &closure {
                    if disjoint.contains(&(a.to_string(), b.to_string())) {
                        debug!("{:?} is an instance of disjoint classes {} and {}", subject, a, b);
                        return false;
                    }
                }
            }
        }
        true
    }
}

fn is_vocabulary(iri: &str) -> bool {
    iri.starts_with(OWL) || iri.starts_with(RDF) || iri.starts_with(RDFS)
}

/// Ontology semantics over RDF/XML documents. Consistency checks run on the
/// blocking pool under a reasoner timeout.
pub struct RdfXmlSemantics {
    reasoner_timeout: Duration,
}

impl RdfXmlSemantics {
    pub fn new(reasoner_timeout: Duration) -> Self {
        Self { reasoner_timeout }
    }

    async fn load(&self, owl_path: &Path) -> Result<Vec<u8>> {
        tokio::fs::read(owl_path).await.map_err(|e| {
            PipelineError::OntologyLoad(format!("cannot read {}: {}", owl_path.display(), e))
        })
    }

    async fn run_blocking<T, F>(&self, operation: &str, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let handle = tokio::task::spawn_blocking(work);
        match tokio::time::timeout(self.reasoner_timeout, handle).await {
            Ok(joined) => joined.map_err(|e| PipelineError::Backend(format!("{} task failed: {}", operation, e)))?,
            Err(_) => {
                warn!("{} exceeded {:?}", operation, self.reasoner_timeout);
                Err(PipelineError::Timeout {
                    operation: operation.to_string(),
                    seconds: self.reasoner_timeout.as_secs(),
                })
            }
        }
    }
}

#[async_trait]
impl OntologySemanticsPort for RdfXmlSemantics {
    async fn is_consistent(&self, owl_path: &Path) -> Result<bool> {
        let bytes = self.load(owl_path).await?;
        let consistent = self
            .run_blocking("consistency check", move || {
                Ok(OwlDocument::parse(&bytes)?.check_consistency())
            })
            .await?;
        info!("Consistency of {}: {}", owl_path.display(), consistent);
        Ok(consistent)
    }

    async fn parse(&self, owl_path: &Path) -> Result<SimpleOntology> {
        let bytes = self.load(owl_path).await?;
        let ontology = self
            .run_blocking("ontology parse", move || {
                Ok(OwlDocument::parse(&bytes)?.to_simple_ontology())
            })
            .await?;
        debug!(
            "Parsed {}: {} classes, {} object properties, {} individuals",
            owl_path.display(),
            ontology.classes.len(),
            ontology.object_properties.len(),
            ontology.named_individuals.len()
        );
        Ok(ontology)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PIZZA: &str = r#"<?xml version="1.0"?>
<rdf:RDF xmlns="http://example.org/pizza#"
     xml:base="http://example.org/pizza"
     xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
     xmlns:owl="http://www.w3.org/2002/07/owl#"
     xmlns:rdfs="http://www.w3.org/2000/01/rdf-schema#"
     xmlns:skos="http://www.w3.org/2004/02/skos/core#">
    <owl:Ontology rdf:about="http://example.org/pizza"/>
    <owl:AnnotationProperty rdf:about="http://example.org/pizza#note">
        <rdfs:label>note</rdfs:label>
    </owl:AnnotationProperty>
    <owl:ObjectProperty rdf:about="http://example.org/pizza#hasTopping">
        <rdfs:label xml:lang="en">has topping</rdfs:label>
        <rdfs:domain rdf:resource="http://example.org/pizza#Pizza"/>
        <rdfs:range rdf:resource="http://example.org/pizza#Topping"/>
    </owl:ObjectProperty>
    <owl:Class rdf:about="http://example.org/pizza#Food"/>
    <owl:Class rdf:about="http://example.org/pizza#Pizza">
        <rdfs:subClassOf rdf:resource="http://example.org/pizza#Food"/>
        <rdfs:subClassOf>
            <owl:Restriction>
                <owl:onProperty rdf:resource="http://example.org/pizza#hasTopping"/>
                <owl:someValuesFrom rdf:resource="http://example.org/pizza#Topping"/>
            </owl:Restriction>
        </rdfs:subClassOf>
        <rdfs:label xml:lang="de">Pizza DE</rdfs:label>
        <rdfs:label xml:lang="en">Pizza</rdfs:label>
        <skos:altLabel>Pie</skos:altLabel>
        <skos:altLabel>Flatbread</skos:altLabel>
        <note>tasty</note>
    </owl:Class>
    <owl:Class rdf:about="http://example.org/pizza#Topping">
        <rdfs:subClassOf rdf:resource="http://example.org/pizza#Food"/>
        <owl:disjointWith rdf:resource="http://example.org/pizza#Pizza"/>
    </owl:Class>
    <owl:NamedIndividual rdf:about="http://example.org/pizza#margherita">
        <rdf:type rdf:resource="http://example.org/pizza#Pizza"/>
    </owl:NamedIndividual>
</rdf:RDF>"#;

    fn doc() -> OwlDocument {
        OwlDocument::parse(PIZZA.as_bytes()).unwrap()
    }

    #[test]
    fn extracts_classes_with_restriction_parents() {
        let ontology = doc().to_simple_ontology();
        assert_eq!(ontology.classes.len(), 3);
        let pizza = &ontology.classes["http://example.org/pizza#Pizza"];
        assert_eq!(pizza.label.as_deref(), Some("Pizza"));
        assert_eq!(pizza.parent_classes["http://example.org/pizza#Food"], None);
        assert_eq!(
            pizza.parent_classes["http://example.org/pizza#Topping"].as_deref(),
            Some("http://example.org/pizza#hasTopping")
        );
        assert_eq!(
            pizza.annotations["http://www.w3.org/2004/02/skos/core#altLabel"],
            "Pie | Flatbread"
        );
        assert_eq!(pizza.annotations["http://example.org/pizza#note"], "tasty");
    }

    #[test]
    fn extracts_properties_and_individuals() {
        let ontology = doc().to_simple_ontology();
        let prop = &ontology.object_properties["http://example.org/pizza#hasTopping"];
        assert_eq!(prop.domain, vec!["http://example.org/pizza#Pizza".to_string()]);
        assert_eq!(prop.range, vec!["http://example.org/pizza#Topping".to_string()]);
        assert!(ontology.annotation_properties.contains_key("http://example.org/pizza#note"));

        let margherita = &ontology.named_individuals["http://example.org/pizza#margherita"];
        assert_eq!(margherita.types, vec!["http://example.org/pizza#Pizza".to_string()]);
    }

    #[test]
    fn consistent_document_passes() {
        assert!(doc().check_consistency());
    }

    #[test]
    fn individual_of_disjoint_classes_is_inconsistent() {
        let broken = PIZZA.replace(
            r##"<rdf:type rdf:resource="http://example.org/pizza#Pizza"/>"##,
            r##"<rdf:type rdf:resource="http://example.org/pizza#Pizza"/>
        <rdf:type rdf:resource="http://example.org/pizza#Topping"/>"##,
        );
        assert!(!OwlDocument::parse(broken.as_bytes()).unwrap().check_consistency());
    }

    #[test]
    fn all_disjoint_classes_axiom_is_honoured() {
        let xml = r#"<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
     xmlns:owl="http://www.w3.org/2002/07/owl#">
    <owl:Class rdf:about="http://ex.org/A"/>
    <owl:Class rdf:about="http://ex.org/B"/>
    <owl:AllDisjointClasses>
        <owl:members rdf:parseType="Collection">
            <rdf:Description rdf:about="http://ex.org/A"/>
            <rdf:Description rdf:about="http://ex.org/B"/>
        </owl:members>
    </owl:AllDisjointClasses>
    <owl:NamedIndividual rdf:about="http://ex.org/x">
        <rdf:type rdf:resource="http://ex.org/A"/>
        <rdf:type rdf:resource="http://ex.org/B"/>
    </owl:NamedIndividual>
</rdf:RDF>"#;
        assert!(!OwlDocument::parse(xml.as_bytes()).unwrap().check_consistency());
    }

    #[tokio::test]
    async fn unreadable_file_is_a_load_error() {
        let semantics = RdfXmlSemantics::new(Duration::from_secs(5));
        let err = semantics
            .is_consistent(Path::new("/definitely/not/here.owl"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::OntologyLoad(_)));
    }

    #[tokio::test]
    async fn parses_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1_1.owl");
        std::fs::write(&path, PIZZA).unwrap();
        let semantics = RdfXmlSemantics::new(Duration::from_secs(5));
        assert!(semantics.is_consistent(&path).await.unwrap());
        assert_eq!(semantics.parse(&path).await.unwrap().classes.len(), 3);
    }
}
