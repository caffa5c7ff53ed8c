//! Streaming RDF/XML reader producing a flat list of triples.

use crate::error::{PipelineError, Result};
use once_cell::sync::Lazy;
use quick_xml::events::{BytesStart, Event};
use regex::Regex;
use std::collections::HashMap;

pub const RDF: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const RDFS: &str = "http://www.w3.org/2000/01/rdf-schema#";
pub const OWL: &str = "http://www.w3.org/2002/07/owl#";
pub const XML: &str = "http://www.w3.org/XML/1998/namespace";

pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
pub const RDF_FIRST: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#first";
pub const RDF_REST: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#rest";
pub const RDF_NIL: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#nil";

static ENTITY_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<!ENTITY\s+([A-Za-z_][\w.-]*)\s+(?:"([^"]*)"|'([^']*)')\s*>"#)
        .expect("entity declaration pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Term {
    Iri(String),
    Blank(String),
    Literal { value: String, lang: Option<String> },
}

impl Term {
    pub fn as_iri(&self) -> Option<&str> {
        match self {
            Term::Iri(iri) => Some(iri),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Term::Literal { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn is_resource(&self) -> bool {
        !matches!(self, Term::Literal { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Triple {
    pub subject: Term,
    pub predicate: String,
    pub object: Term,
}

enum Frame {
    Root,
    Node {
        subject: Term,
    },
    Property {
        subject: Term,
        predicate: String,
        object: Option<Term>,
        text: String,
        lang: Option<String>,
        collection: Option<Vec<Term>>,
    },
    XmlLiteral {
        subject: Term,
        predicate: String,
        text: String,
    },
    Skip,
}

struct Attr {
    iri: String,
    value: String,
}

struct Parser {
    entities: HashMap<String, String>,
    scopes: Vec<HashMap<String, String>>,
    frames: Vec<Frame>,
    li_counters: Vec<u32>,
    base: String,
    lang: Option<String>,
    blank_counter: u64,
    triples: Vec<Triple>,
}

/// Parse an RDF/XML document into triples.
pub fn parse_rdf_xml(bytes: &[u8]) -> Result<Vec<Triple>> {
    let mut parser = Parser {
        entities: HashMap::new(),
        scopes: vec![HashMap::new()],
        frames: Vec::new(),
        li_counters: Vec::new(),
        base: String::new(),
        lang: None,
        blank_counter: 0,
        triples: Vec::new(),
    };
    let mut reader = quick_xml::Reader::from_reader(bytes);
    let mut buf = Vec::new();
    let mut seen_element = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::DocType(dt)) => {
                let text = String::from_utf8_lossy(&dt).into_owned();
                for cap in ENTITY_DECL.captures_iter(&text) {
                    let value = cap.get(2).or_else(|| cap.get(3)).map(|m| m.as_str()).unwrap_or("");
                    parser.entities.insert(cap[1].to_string(), value.to_string());
                }
            }
            Ok(Event::Start(e)) => {
                seen_element = true;
                parser.start(&e, false)?;
            }
            Ok(Event::Empty(e)) => {
                seen_element = true;
                parser.start(&e, true)?;
            }
            Ok(Event::End(_)) => parser.end(),
            Ok(Event::Text(t)) => {
                let raw = String::from_utf8_lossy(&t).into_owned();
                let text = parser.unescape(&raw)?;
                parser.text(&text);
            }
            Ok(Event::CData(c)) => {
                let text = String::from_utf8_lossy(&c).into_owned();
                parser.text(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(PipelineError::OntologyLoad(format!(
                    "XML error at byte {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }
    if !seen_element {
        return Err(PipelineError::OntologyLoad("document has no elements".into()));
    }
    if !parser.frames.is_empty() {
        return Err(PipelineError::OntologyLoad("document ended inside an element".into()));
    }
    Ok(parser.triples)
}

fn predefined_entity(name: &str) -> Option<&'static str> {
    match name {
        "lt" => Some("<"),
        "gt" => Some(">"),
        "amp" => Some("&"),
        "apos" => Some("'"),
        "quot" => Some("\""),
        _ => None,
    }
}

impl Parser {
    fn unescape(&self, raw: &str) -> Result<String> {
        let mut out = String::with_capacity(raw.len());
        let mut rest = raw;
        while let Some(start) = rest.find('&') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let end = after
                .find(';')
                .ok_or_else(|| PipelineError::OntologyLoad(format!("unterminated entity in '{}'", raw)))?;
            let name = &after[..end];
            if let Some(code) = name.strip_prefix('#') {
                let parsed = match code.strip_prefix('x') {
                    Some(hex) => u32::from_str_radix(hex, 16).ok(),
                    None => code.parse::<u32>().ok(),
                };
                let ch = parsed
                    .and_then(char::from_u32)
                    .ok_or_else(|| PipelineError::OntologyLoad(format!("bad character reference &{};", name)))?;
                out.push(ch);
            } else if let Some(value) = predefined_entity(name) {
                out.push_str(value);
            } else if let Some(value) = self.entities.get(name) {
                out.push_str(value);
            } else {
                return Err(PipelineError::OntologyLoad(format!("undeclared entity &{};", name)));
            }
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }

    fn resolve_qname(&self, qname: &str, scope: &HashMap<String, String>, is_attribute: bool) -> Option<String> {
        match qname.split_once(':') {
            Some(("xml", local)) => Some(format!("{}{}", XML, local)),
            Some((prefix, local)) => scope.get(prefix).map(|ns| format!("{}{}", ns, local)),
            None if is_attribute => match qname {
                // Unqualified RDF attributes are deprecated but still seen.
                "about" | "ID" | "resource" | "nodeID" | "datatype" | "parseType" => {
                    Some(format!("{}{}", RDF, qname))
                }
                _ => None,
            },
            None => scope.get("").map(|ns| format!("{}{}", ns, qname)),
        }
    }

    fn resolve_iri(&self, reference: &str) -> String {
        if reference.contains("://") || reference.starts_with("urn:") || reference.starts_with("mailto:") {
            return reference.to_string();
        }
        let base = self.base.split('#').next().unwrap_or("");
        if reference.is_empty() {
            return base.to_string();
        }
        if reference.starts_with('#') {
            return format!("{}{}", base, reference);
        }
        match base.rfind('/') {
            Some(idx) => format!("{}{}", &base[..=idx], reference),
            None => format!("{}{}", base, reference),
        }
    }

    fn fresh_blank(&mut self) -> Term {
        self.blank_counter += 1;
        Term::Blank(format!("genid{}", self.blank_counter))
    }

    fn emit(&mut self, subject: Term, predicate: &str, object: Term) {
        self.triples.push(Triple {
            subject,
            predicate: predicate.to_string(),
            object,
        });
    }

    fn start(&mut self, e: &BytesStart<'_>, empty: bool) -> Result<()> {
        let qname = String::from_utf8_lossy(e.name().as_ref()).into_owned();

        let mut scope = self.scopes.last().cloned().unwrap_or_default();
        let mut raw_attrs = Vec::new();
        for attr in e.attributes() {
            let attr = attr.map_err(|err| PipelineError::OntologyLoad(format!("bad attribute: {}", err)))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = self.unescape(&String::from_utf8_lossy(&attr.value))?;
            if key == "xmlns" {
                scope.insert(String::new(), value);
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                scope.insert(prefix.to_string(), value);
            } else {
                raw_attrs.push((key, value));
            }
        }

        let mut attrs = Vec::new();
        for (key, value) in raw_attrs {
            if let Some(iri) = self.resolve_qname(&key, &scope, true) {
                attrs.push(Attr { iri, value });
            }
        }
        let element = self.resolve_qname(&qname, &scope, false).ok_or_else(|| {
            PipelineError::OntologyLoad(format!("undeclared namespace prefix in <{}>", qname))
        })?;

        if let Some(base) = attrs.iter().find(|a| a.iri == format!("{}base", XML)) {
            self.base = base.value.clone();
        }
        let lang = attrs
            .iter()
            .find(|a| a.iri == format!("{}lang", XML))
            .map(|a| a.value.clone());
        if self.frames.is_empty() {
            if let Some(lang) = &lang {
                self.lang = Some(lang.clone());
            }
        }

        let frame = match self.frames.last() {
            None if element == format!("{}RDF", RDF) => Frame::Root,
            None | Some(Frame::Root) => self.node_element(&element, &attrs)?,
            Some(Frame::Node { subject }) => {
                let subject = subject.clone();
                self.property_element(subject, &element, &attrs, lang, empty)?
            }
            Some(Frame::Property { .. }) => {
                let frame = self.node_element(&element, &attrs)?;
                if let Frame::Node { subject } = &frame {
                    self.attach_object(subject.clone());
                }
                frame
            }
            Some(Frame::XmlLiteral { .. }) | Some(Frame::Skip) => Frame::Skip,
        };

        if empty {
            self.close(frame);
        } else {
            self.scopes.push(scope);
            self.li_counters.push(0);
            self.frames.push(frame);
        }
        Ok(())
    }

    fn attach_object(&mut self, object: Term) {
        let mut emit = None;
        if let Some(Frame::Property {
            subject,
            predicate,
            object: slot,
            collection,
            ..
        }) = self.frames.last_mut()
        {
            match collection {
                Some(items) => items.push(object),
                None => {
                    *slot = Some(object.clone());
                    emit = Some((subject.clone(), predicate.clone(), object));
                }
            }
        }
        if let Some((s, p, o)) = emit {
            self.emit(s, &p, o);
        }
    }

    fn node_element(&mut self, element: &str, attrs: &[Attr]) -> Result<Frame> {
        let mut subject = None;
        for attr in attrs {
            if attr.iri == format!("{}about", RDF) {
                subject = Some(Term::Iri(self.resolve_iri(&attr.value)));
            } else if attr.iri == format!("{}ID", RDF) {
                subject = Some(Term::Iri(self.resolve_iri(&format!("#{}", attr.value))));
            } else if attr.iri == format!("{}nodeID", RDF) {
                subject = Some(Term::Blank(attr.value.clone()));
            }
        }
        let subject = match subject {
            Some(s) => s,
            None => self.fresh_blank(),
        };

        if element != format!("{}Description", RDF) {
            self.emit(subject.clone(), RDF_TYPE, Term::Iri(element.to_string()));
        }
        for attr in attrs {
            if attr.iri.starts_with(XML) || is_syntax_attribute(&attr.iri) {
                continue;
            }
            if attr.iri == RDF_TYPE {
                let object = Term::Iri(self.resolve_iri(&attr.value));
                self.emit(subject.clone(), RDF_TYPE, object);
            } else {
                let object = Term::Literal {
                    value: attr.value.clone(),
                    lang: self.lang.clone(),
                };
                self.emit(subject.clone(), &attr.iri, object);
            }
        }
        Ok(Frame::Node { subject })
    }

    fn property_element(
        &mut self,
        subject: Term,
        element: &str,
        attrs: &[Attr],
        lang: Option<String>,
        empty: bool,
    ) -> Result<Frame> {
        let predicate = if element == format!("{}li", RDF) {
            let counter = self.li_counters.last_mut().map(|c| {
                *c += 1;
                *c
            });
            format!("{}_{}", RDF, counter.unwrap_or(1))
        } else {
            element.to_string()
        };

        let find = |name: &str| attrs.iter().find(|a| a.iri == format!("{}{}", RDF, name));

        if let Some(resource) = find("resource") {
            let object = Term::Iri(self.resolve_iri(&resource.value));
            self.emit(subject.clone(), &predicate, object.clone());
            return Ok(property_frame(subject, predicate, Some(object), lang, None));
        }
        if let Some(node_id) = find("nodeID") {
            let object = Term::Blank(node_id.value.clone());
            self.emit(subject.clone(), &predicate, object.clone());
            return Ok(property_frame(subject, predicate, Some(object), lang, None));
        }
        match find("parseType").map(|a| a.value.as_str()) {
            Some("Resource") => {
                let object = self.fresh_blank();
                self.emit(subject, &predicate, object.clone());
                return Ok(Frame::Node { subject: object });
            }
            Some("Collection") => {
                return Ok(property_frame(subject, predicate, None, lang, Some(Vec::new())));
            }
            Some(_) => {
                return Ok(Frame::XmlLiteral {
                    subject,
                    predicate,
                    text: String::new(),
                });
            }
            None => {}
        }

        let property_attrs: Vec<&Attr> = attrs
            .iter()
            .filter(|a| !a.iri.starts_with(XML) && !is_syntax_attribute(&a.iri))
            .collect();
        if empty && !property_attrs.is_empty() {
            let object = self.fresh_blank();
            self.emit(subject.clone(), &predicate, object.clone());
            for attr in property_attrs {
                let value = Term::Literal {
                    value: attr.value.clone(),
                    lang: lang.clone().or_else(|| self.lang.clone()),
                };
                self.emit(object.clone(), &attr.iri, value);
            }
            return Ok(property_frame(subject, predicate, Some(object), lang, None));
        }

        Ok(property_frame(subject, predicate, None, lang, None))
    }

    fn text(&mut self, text: &str) {
        match self.frames.last_mut() {
            Some(Frame::Property { text: buf, .. }) => buf.push_str(text),
            Some(Frame::XmlLiteral { text: buf, .. }) => buf.push_str(text),
            _ => {}
        }
    }

    fn end(&mut self) {
        self.scopes.pop();
        self.li_counters.pop();
        if let Some(frame) = self.frames.pop() {
            self.close(frame);
        }
    }

    fn close(&mut self, frame: Frame) {
        match frame {
            Frame::Property {
                subject,
                predicate,
                object: None,
                text,
                lang,
                collection: None,
            } => {
                let lang = lang.or_else(|| self.lang.clone());
                self.emit(subject, &predicate, Term::Literal { value: text, lang });
            }
            Frame::Property {
                subject,
                predicate,
                collection: Some(items),
                ..
            } => {
                let head = self.build_list(items);
                self.emit(subject, &predicate, head);
            }
            Frame::XmlLiteral {
                subject,
                predicate,
                text,
            } => {
                self.emit(subject, &predicate, Term::Literal { value: text, lang: None });
            }
            _ => {}
        }
    }

    fn build_list(&mut self, items: Vec<Term>) -> Term {
        let mut head = Term::Iri(RDF_NIL.to_string());
        for item in items.into_iter().rev() {
            let cell = self.fresh_blank();
            self.emit(cell.clone(), RDF_FIRST, item);
            self.emit(cell.clone(), RDF_REST, head);
            head = cell;
        }
        head
    }
}

fn property_frame(
    subject: Term,
    predicate: String,
    object: Option<Term>,
    lang: Option<String>,
    collection: Option<Vec<Term>>,
) -> Frame {
    Frame::Property {
        subject,
        predicate,
        object,
        text: String::new(),
        lang,
        collection,
    }
}

fn is_syntax_attribute(iri: &str) -> bool {
    match iri.strip_prefix(RDF) {
        Some(local) => matches!(local, "about" | "ID" | "nodeID" | "resource" | "parseType" | "datatype"),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r##"<?xml version="1.0"?>
<!DOCTYPE rdf:RDF [
    <!ENTITY ex "http://example.org/zoo#" >
]>
<rdf:RDF xmlns="http://example.org/zoo#"
     xml:base="http://example.org/zoo"
     xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
     xmlns:rdfs="http://www.w3.org/2000/01/rdf-schema#"
     xmlns:owl="http://www.w3.org/2002/07/owl#">
    <owl:Class rdf:about="&ex;Dog">
        <rdfs:label xml:lang="en">Dog &amp; puppy</rdfs:label>
        <rdfs:subClassOf rdf:resource="#Animal"/>
        <rdfs:subClassOf>
            <owl:Restriction>
                <owl:onProperty rdf:resource="&ex;hasPart"/>
                <owl:someValuesFrom rdf:resource="&ex;Tail"/>
            </owl:Restriction>
        </rdfs:subClassOf>
    </owl:Class>
    <owl:AllDisjointClasses>
        <owl:members rdf:parseType="Collection">
            <rdf:Description rdf:about="#Dog"/>
            <rdf:Description rdf:about="#Cat"/>
        </owl:members>
    </owl:AllDisjointClasses>
    <Dog rdf:ID="rex"/>
</rdf:RDF>"##;

    fn has(triples: &[Triple], s: &Term, p: &str, o: &Term) -> bool {
        triples.iter().any(|t| &t.subject == s && t.predicate == p && &t.object == o)
    }

    #[test]
    fn reads_classes_restrictions_and_entities() {
        let triples = parse_rdf_xml(DOC.as_bytes()).unwrap();
        let dog = Term::Iri("http://example.org/zoo#Dog".into());
        assert!(has(&triples, &dog, RDF_TYPE, &Term::Iri(format!("{}Class", OWL))));
        assert!(has(
            &triples,
            &dog,
            &format!("{}label", RDFS),
            &Term::Literal {
                value: "Dog & puppy".into(),
                lang: Some("en".into())
            }
        ));
        assert!(has(
            &triples,
            &dog,
            &format!("{}subClassOf", RDFS),
            &Term::Iri("http://example.org/zoo#Animal".into())
        ));
        let restriction = triples
            .iter()
            .find(|t| t.subject == dog && t.predicate == format!("{}subClassOf", RDFS) && t.object.as_iri().is_none())
            .map(|t| t.object.clone())
            .unwrap();
        assert!(has(
            &triples,
            &restriction,
            &format!("{}someValuesFrom", OWL),
            &Term::Iri("http://example.org/zoo#Tail".into())
        ));
    }

    #[test]
    fn reads_collections_and_typed_nodes() {
        let triples = parse_rdf_xml(DOC.as_bytes()).unwrap();
        let firsts: Vec<&Term> = triples
            .iter()
            .filter(|t| t.predicate == RDF_FIRST)
            .map(|t| &t.object)
            .collect();
        assert_eq!(firsts.len(), 2);
        assert!(has(
            &triples,
            &Term::Iri("http://example.org/zoo#rex".into()),
            RDF_TYPE,
            &Term::Iri("http://example.org/zoo#Dog".into())
        ));
    }

    #[test]
    fn malformed_xml_is_a_load_error() {
        let err = parse_rdf_xml(b"<rdf:RDF xmlns:rdf=\"x\"><owl:Class>").unwrap_err();
        assert!(matches!(err, PipelineError::OntologyLoad(_)));
        assert!(parse_rdf_xml(b"").is_err());
    }
}
