//! Typed property values.
//!
//! Stored values are plain JSON (strings, numbers, booleans, arrays); the
//! owning [`PropertyKind`] decides how a stored JSON value is read back.

use crate::error::{ModelbaseError, Result};
use crate::registry::{PropertyKind, RelationshipType};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

/// A value held by one property of one object.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// `string` and `markdown` properties.
    String(String),
    Number(f64),
    Boolean(bool),
    Date(DateValue),
    Relationship(RelationshipValue),
    Rating(u8),
    /// `image` and `file` properties.
    Attachment(Attachment),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DateValue {
    Parsed(DateTime<Utc>),
    /// A stored or default value that did not parse as a date; kept verbatim.
    Raw(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RelationshipValue {
    One(String),
    Many(Vec<String>),
}

impl RelationshipValue {
    /// Referenced ids in stored order.
    pub fn ids(&self) -> Vec<&str> {
        match self {
            RelationshipValue::One(id) => vec![id.as_str()],
            RelationshipValue::Many(ids) => ids.iter().map(String::as_str).collect(),
        }
    }

    pub fn references(&self, id: &str) -> bool {
        match self {
            RelationshipValue::One(one) => one == id,
            RelationshipValue::Many(ids) => ids.iter().any(|i| i == id),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Attachment {
    /// Path of an already stored file, relative to the data directory.
    Stored(String),
    /// A new upload; the store writes it out and replaces it with `Stored`.
    Upload(Upload),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Raw input for a property, before coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Json(serde_json::Value),
    Upload(Upload),
}

impl From<serde_json::Value> for RawValue {
    fn from(value: serde_json::Value) -> Self {
        RawValue::Json(value)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Json(serde_json::Value::String(value.to_string()))
    }
}

impl FieldValue {
    /// Serialize for the stored JSON map.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(match self {
            FieldValue::String(s) => serde_json::Value::String(s.clone()),
            FieldValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .ok_or_else(|| ModelbaseError::Other(format!("Cannot store number {n}")))?,
            FieldValue::Boolean(b) => serde_json::Value::Bool(*b),
            FieldValue::Date(DateValue::Parsed(dt)) => serde_json::Value::String(dt.to_rfc3339()),
            FieldValue::Date(DateValue::Raw(raw)) => serde_json::Value::String(raw.clone()),
            FieldValue::Relationship(RelationshipValue::One(id)) => {
                serde_json::Value::String(id.clone())
            }
            FieldValue::Relationship(RelationshipValue::Many(ids)) => serde_json::Value::Array(
                ids.iter().cloned().map(serde_json::Value::String).collect(),
            ),
            FieldValue::Rating(r) => serde_json::Value::from(*r),
            FieldValue::Attachment(Attachment::Stored(path)) => {
                serde_json::Value::String(path.clone())
            }
            FieldValue::Attachment(Attachment::Upload(upload)) => {
                return Err(ModelbaseError::Other(format!(
                    "Upload '{}' was not written before storing",
                    upload.file_name
                )))
            }
        })
    }

    /// Read a stored JSON value back as the given kind. Returns `None` when
    /// the stored shape does not fit the kind (e.g. after a type change).
    pub fn from_stored(kind: &PropertyKind, json: &serde_json::Value) -> Option<FieldValue> {
        use serde_json::Value;

        match (kind, json) {
            (_, Value::Null) => None,
            (PropertyKind::String { .. } | PropertyKind::Markdown, Value::String(s)) => {
                Some(FieldValue::String(s.clone()))
            }
            (PropertyKind::Number { .. }, Value::Number(n)) => n.as_f64().map(FieldValue::Number),
            (PropertyKind::Boolean, Value::Bool(b)) => Some(FieldValue::Boolean(*b)),
            (PropertyKind::Date { .. }, Value::String(s)) => {
                Some(FieldValue::Date(parse_date(s).map_or_else(
                    || DateValue::Raw(s.clone()),
                    DateValue::Parsed,
                )))
            }
            (PropertyKind::Relationship { relationship_type, .. }, value) => {
                match (relationship_type, value) {
                    (RelationshipType::One, Value::String(id)) => {
                        Some(FieldValue::Relationship(RelationshipValue::One(id.clone())))
                    }
                    (RelationshipType::Many, Value::Array(items)) => {
                        let ids = items
                            .iter()
                            .filter_map(|v| v.as_str().map(str::to_string))
                            .collect();
                        Some(FieldValue::Relationship(RelationshipValue::Many(ids)))
                    }
                    _ => None,
                }
            }
            (PropertyKind::Rating, Value::Number(n)) => n
                .as_u64()
                .filter(|r| *r <= 5)
                .map(|r| FieldValue::Rating(r as u8)),
            (PropertyKind::Image | PropertyKind::File, Value::String(path)) => {
                Some(FieldValue::Attachment(Attachment::Stored(path.clone())))
            }
            _ => None,
        }
    }

    /// Human-readable text for non-relationship values. Relationship values
    /// render their raw ids here; the resolver turns them into labels.
    pub fn plain_text(&self, kind: &PropertyKind) -> String {
        match self {
            FieldValue::String(s) => s.clone(),
            FieldValue::Number(n) => {
                let (precision, unit) = match kind {
                    PropertyKind::Number { precision, unit, .. } => (*precision, unit.as_deref()),
                    _ => (None, None),
                };
                let text = match precision {
                    Some(p) => format!("{:.*}", p as usize, n),
                    None => format!("{n}"),
                };
                match unit {
                    Some(unit) if !unit.is_empty() => format!("{text} {unit}"),
                    _ => text,
                }
            }
            FieldValue::Boolean(true) => "Yes".to_string(),
            FieldValue::Boolean(false) => "No".to_string(),
            FieldValue::Date(DateValue::Parsed(dt)) => {
                if dt.time() == NaiveTime::MIN {
                    dt.format("%Y-%m-%d").to_string()
                } else {
                    dt.format("%Y-%m-%d %H:%M").to_string()
                }
            }
            FieldValue::Date(DateValue::Raw(raw)) => raw.clone(),
            FieldValue::Relationship(rel) => rel.ids().join(", "),
            FieldValue::Rating(r) => format!("{r}/5"),
            FieldValue::Attachment(Attachment::Stored(path)) => path.clone(),
            FieldValue::Attachment(Attachment::Upload(upload)) => upload.file_name.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::String(s) => s.is_empty(),
            FieldValue::Relationship(RelationshipValue::One(id)) => id.is_empty(),
            FieldValue::Relationship(RelationshipValue::Many(ids)) => ids.is_empty(),
            FieldValue::Date(DateValue::Raw(raw)) => raw.is_empty(),
            FieldValue::Attachment(Attachment::Stored(path)) => path.is_empty(),
            _ => false,
        }
    }

    pub fn as_relationship(&self) -> Option<&RelationshipValue> {
        match self {
            FieldValue::Relationship(rel) => Some(rel),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Parse RFC 3339, `YYYY-MM-DDTHH:MM` or `YYYY-MM-DD` into UTC.
pub fn parse_date(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
}

/// Split a list of ids given either as a JSON array or comma-separated text.
/// Blank entries are dropped and duplicates removed, keeping first occurrence.
pub fn parse_id_list(input: &str) -> Vec<String> {
    let raw: Vec<String> = match serde_json::from_str::<Vec<String>>(input) {
        Ok(items) => items,
        Err(_) => input.split(',').map(str::to_string).collect(),
    };
    dedup_ids(raw.into_iter().map(|s| s.trim().to_string()))
}

pub(crate) fn dedup_ids(ids: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for id in ids {
        if !id.is_empty() && !out.contains(&id) {
            out.push(id);
        }
    }
    out
}
