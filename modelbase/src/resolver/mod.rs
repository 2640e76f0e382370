//! Relationship Resolver: human-readable labels for objects and their
//! relationship values, computed from a read-only snapshot.

use crate::object::DataObject;
use crate::registry::{Model, ModelRegistry, Property, PropertyKind};
use crate::value::{FieldValue, RelationshipValue};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Label used when a referenced object or model no longer exists.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Joins display property values.
pub const DISPLAY_SEPARATOR: &str = " - ";

/// How many relationship hops a label may follow before falling back to ids.
const MAX_DEPTH: usize = 3;

/// Models plus the objects of each model, indexed for id lookups.
/// Object ids are unique across models.
pub struct Snapshot<'a> {
    registry: &'a ModelRegistry,
    objects_by_model: &'a HashMap<String, Vec<DataObject>>,
    index: HashMap<&'a str, &'a DataObject>,
}

impl<'a> Snapshot<'a> {
    pub fn new(
        registry: &'a ModelRegistry,
        objects_by_model: &'a HashMap<String, Vec<DataObject>>,
    ) -> Self {
        let index = objects_by_model
            .values()
            .flatten()
            .map(|o| (o.id.as_str(), o))
            .collect();

        Snapshot {
            registry,
            objects_by_model,
            index,
        }
    }

    pub fn registry(&self) -> &'a ModelRegistry {
        self.registry
    }

    pub fn object(&self, model_id: &str, id: &str) -> Option<&'a DataObject> {
        self.index
            .get(id)
            .copied()
            .filter(|o| o.model_id == model_id)
    }

    pub fn objects(&self, model_id: &str) -> &'a [DataObject] {
        self.objects_by_model
            .get(model_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// The label of an object: its display properties joined in authored order,
/// else its `Name`/`Title` property, else its id.
pub fn display_value(object: &DataObject, model: &Model, snapshot: &Snapshot<'_>) -> String {
    let mut visited = HashSet::new();
    label(object, model, snapshot, &mut visited, 0)
}

fn label(
    object: &DataObject,
    model: &Model,
    snapshot: &Snapshot<'_>,
    visited: &mut HashSet<(String, String)>,
    depth: usize,
) -> String {
    let key = (model.id.clone(), object.id.clone());
    if depth > MAX_DEPTH || !visited.insert(key.clone()) {
        return object.id.clone();
    }

    let text = if model.display_properties.is_empty() {
        conventional_label_property(model)
            .and_then(|p| object.values.get(&p.id).map(|v| (p, v)))
            .map(|(p, v)| render(v, p, snapshot, visited, depth))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| object.id.clone())
    } else {
        let parts: Vec<String> = model
            .display_properties
            .iter()
            .filter_map(|name| model.property(name))
            .filter_map(|p| object.values.get(&p.id).map(|v| render(v, p, snapshot, visited, depth)))
            .filter(|s| !s.is_empty())
            .collect();
        if parts.is_empty() {
            object.id.clone()
        } else {
            parts.join(DISPLAY_SEPARATOR)
        }
    };

    visited.remove(&key);
    text
}

fn conventional_label_property(model: &Model) -> Option<&Property> {
    ["name", "title"].iter().find_map(|wanted| {
        model
            .properties
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(wanted))
    })
}

fn render(
    value: &FieldValue,
    property: &Property,
    snapshot: &Snapshot<'_>,
    visited: &mut HashSet<(String, String)>,
    depth: usize,
) -> String {
    match (value, &property.kind) {
        (FieldValue::Relationship(rel), PropertyKind::Relationship { related_model_id, .. }) => {
            let ids = rel.ids();
            let Some(first) = ids.first() else {
                return String::new();
            };
            let first_label = target_label(related_model_id, first, snapshot, visited, depth + 1);
            match rel {
                RelationshipValue::Many(all) if all.len() > 1 => {
                    format!("{first_label} (+{} more)", all.len() - 1)
                }
                _ => first_label,
            }
        }
        _ => value.plain_text(&property.kind),
    }
}

fn target_label(
    model_id: &str,
    id: &str,
    snapshot: &Snapshot<'_>,
    visited: &mut HashSet<(String, String)>,
    depth: usize,
) -> String {
    let Some(model) = snapshot.registry.get(model_id) else {
        return UNKNOWN_LABEL.to_string();
    };
    match snapshot.object(model_id, id) {
        Some(target) if !target.is_deleted => label(target, model, snapshot, visited, depth),
        _ => UNKNOWN_LABEL.to_string(),
    }
}

/// Text for one property of an object. A many-relationship shows only its
/// first target plus a count; see [`expand_many`] for the full list.
pub fn field_display(object: &DataObject, property: &Property, snapshot: &Snapshot<'_>) -> String {
    let mut visited = HashSet::new();
    visited.insert((object.model_id.clone(), object.id.clone()));
    object
        .values
        .get(&property.id)
        .map(|v| render(v, property, snapshot, &mut visited, 0))
        .unwrap_or_default()
}

/// Every target label of a relationship property, resolved on demand.
pub fn expand_many(object: &DataObject, property: &Property, snapshot: &Snapshot<'_>) -> Vec<String> {
    let PropertyKind::Relationship { related_model_id, .. } = &property.kind else {
        return Vec::new();
    };
    let Some(rel) = object.values.get(&property.id).and_then(FieldValue::as_relationship) else {
        return Vec::new();
    };

    rel.ids()
        .into_iter()
        .map(|id| {
            let mut visited = HashSet::new();
            visited.insert((object.model_id.clone(), object.id.clone()));
            target_label(related_model_id, id, snapshot, &mut visited, 1)
        })
        .collect()
}

/// An object that points at the inspected object through a relationship.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncomingReference {
    pub model_id: String,
    pub model_name: String,
    pub property_name: String,
    pub object_id: String,
    pub display_value: String,
}

/// Reverse edges into `object`: scans every relationship property targeting
/// its model, then every object of the owning model. Cost grows with total
/// objects times relationship properties, so this belongs on detail views.
pub fn incoming_references(object: &DataObject, snapshot: &Snapshot<'_>) -> Vec<IncomingReference> {
    let mut found = Vec::new();

    for (model, property) in snapshot.registry.referencing_properties(&object.model_id) {
        for source in snapshot.objects(&model.id) {
            if source.is_deleted {
                continue;
            }
            let references = source
                .values
                .get(&property.id)
                .and_then(FieldValue::as_relationship)
                .is_some_and(|rel| rel.references(&object.id));
            if references {
                found.push(IncomingReference {
                    model_id: model.id.clone(),
                    model_name: model.name.clone(),
                    property_name: property.name.clone(),
                    object_id: source.id.clone(),
                    display_value: display_value(source, model, snapshot),
                });
            }
        }
    }

    found
}
