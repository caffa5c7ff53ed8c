use crate::model::owl::{SimpleAnnotationProperty, SimpleClass, SimpleObjectProperty, SimpleOntology};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffEntry<T> {
    pub before: Option<T>,
    pub after: Option<T>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSet<T> {
    pub created: Vec<DiffEntry<T>>,
    pub updated: Vec<DiffEntry<T>>,
    pub deleted: Vec<DiffEntry<T>>,
}

impl<T> Default for ChangeSet<T> {
    fn default() -> Self {
        Self {
            created: Vec::new(),
            updated: Vec::new(),
            deleted: Vec::new(),
        }
    }
}

impl<T> ChangeSet<T> {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

fn diff_maps<T: Clone + PartialEq>(
    left: &BTreeMap<String, T>,
    right: &BTreeMap<String, T>,
) -> ChangeSet<T> {
    let mut changes = ChangeSet::default();
    for (iri, after) in right {
        match left.get(iri) {
            None => changes.created.push(DiffEntry {
                before: None,
                after: Some(after.clone()),
            }),
            Some(before) if before != after => changes.updated.push(DiffEntry {
                before: Some(before.clone()),
                after: Some(after.clone()),
            }),
            Some(_) => {}
        }
    }
    for (iri, before) in left {
        if !right.contains_key(iri) {
            changes.deleted.push(DiffEntry {
                before: Some(before.clone()),
                after: None,
            });
        }
    }
    changes
}

/// Structural difference between two parses of the same ontology.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OntologyChanges {
    pub annotation_properties: ChangeSet<SimpleAnnotationProperty>,
    pub object_properties: ChangeSet<SimpleObjectProperty>,
    pub classes: ChangeSet<SimpleClass>,
}

impl OntologyChanges {
    pub fn between(left: &SimpleOntology, right: &SimpleOntology) -> Self {
        Self {
            annotation_properties: diff_maps(&left.annotation_properties, &right.annotation_properties),
            object_properties: diff_maps(&left.object_properties, &right.object_properties),
            classes: diff_maps(&left.classes, &right.classes),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.annotation_properties.is_empty()
            && self.object_properties.is_empty()
            && self.classes.is_empty()
    }
}

/// Diff between the state at a requested timestamp and the latest state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OntologyTimestampDiff {
    pub id: i64,
    pub requested_timestamp: NaiveDateTime,
    pub latest_git_webhook_id_before_requested_timestamp: Option<i64>,
    pub latest_git_webhook_timestamp_before_requested_timestamp: Option<NaiveDateTime>,
    pub latest_git_webhook_id_after_requested_timestamp: Option<i64>,
    pub latest_git_webhook_timestamp_after_requested_timestamp: Option<NaiveDateTime>,
    pub updates_exist: bool,
    pub changes: OntologyChanges,
}

/// Diff between two explicit webhook deliveries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OntologyLeftRightDiff {
    pub id: i64,
    pub left_git_webhook_id: i64,
    pub left_git_webhook_timestamp: NaiveDateTime,
    pub right_git_webhook_id: i64,
    pub right_git_webhook_timestamp: NaiveDateTime,
    pub updates_exist: bool,
    pub changes: OntologyChanges,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn class(iri: &str, label: &str) -> SimpleClass {
        SimpleClass {
            iri: iri.to_string(),
            label: Some(label.to_string()),
            parent_classes: BTreeMap::new(),
            annotations: BTreeMap::new(),
        }
    }

    fn ontology(classes: &[(&str, &str)]) -> SimpleOntology {
        let mut o = SimpleOntology::default();
        for (iri, label) in classes {
            o.classes.insert(iri.to_string(), class(iri, label));
        }
        o
    }

    fn iris(entries: &[DiffEntry<SimpleClass>]) -> BTreeSet<String> {
        entries
            .iter()
            .map(|e| e.after.as_ref().or(e.before.as_ref()).unwrap().iri.clone())
            .collect()
    }

    #[test]
    fn created_updated_deleted() {
        let a = ontology(&[("x#A", "A"), ("x#B", "B")]);
        let b = ontology(&[("x#B", "Bee"), ("x#C", "C")]);
        let changes = OntologyChanges::between(&a, &b);
        assert_eq!(iris(&changes.classes.created), BTreeSet::from(["x#C".to_string()]));
        assert_eq!(iris(&changes.classes.deleted), BTreeSet::from(["x#A".to_string()]));
        assert_eq!(changes.classes.updated.len(), 1);
        assert_eq!(
            changes.classes.updated[0].before.as_ref().unwrap().label.as_deref(),
            Some("B")
        );
    }

    #[test]
    fn created_mirrors_deleted() {
        let a = ontology(&[("x#A", "A"), ("x#B", "B"), ("x#D", "D")]);
        let b = ontology(&[("x#B", "B"), ("x#C", "C"), ("x#E", "E")]);
        let forward = OntologyChanges::between(&a, &b);
        let backward = OntologyChanges::between(&b, &a);
        assert_eq!(iris(&forward.classes.created), iris(&backward.classes.deleted));
        assert_eq!(iris(&forward.classes.deleted), iris(&backward.classes.created));
    }

    #[test]
    fn identical_ontologies_have_no_changes() {
        let a = ontology(&[("x#A", "A")]);
        assert!(OntologyChanges::between(&a, &a.clone()).is_empty());
    }
}
