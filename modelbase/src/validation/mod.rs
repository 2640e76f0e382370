//! Schema Compiler: turns a model's properties into per-field coercion rules
//! and default values.

use crate::error::{ModelbaseError, Result};
use crate::object::ObjectData;
use crate::registry::{Model, Property, PropertyKind, RelationshipType, RulesetRegistry};
use crate::value::{
    dedup_ids, parse_date, parse_id_list, Attachment, DateValue, FieldValue, RawValue,
    RelationshipValue,
};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// A field-level validation failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{property}: {message}")]
pub struct FieldError {
    pub property: String,
    pub message: String,
}

impl FieldError {
    fn new(property: &Property, message: impl Into<String>) -> Self {
        FieldError {
            property: property.name.clone(),
            message: message.into(),
        }
    }

    fn required(property: &Property) -> Self {
        FieldError::new(property, format!("{} is required", property.name))
    }
}

/// How much of an object an input map describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// A new object: every property is checked and defaults fill the gaps.
    Create,
    /// A partial update: only supplied properties are checked.
    Partial,
}

/// The compiled rule for a single property.
#[derive(Debug, Clone)]
pub struct FieldRule {
    property: Property,
    pattern: Option<Regex>,
}

impl FieldRule {
    pub fn property(&self) -> &Property {
        &self.property
    }

    /// Coerce and validate one raw input. `Ok(None)` means the property ends
    /// up unset.
    pub fn apply(&self, raw: Option<&RawValue>) -> std::result::Result<Option<FieldValue>, FieldError> {
        let property = &self.property;

        match &property.kind {
            PropertyKind::String { .. } | PropertyKind::Markdown => {
                let Some(text) = text_input(property, raw)? else {
                    return self.blank();
                };
                if let Some(pattern) = &self.pattern {
                    if !pattern.is_match(&text) {
                        return Err(FieldError::new(
                            property,
                            format!("{} does not match the required format", property.name),
                        ));
                    }
                }
                Ok(Some(FieldValue::String(text)))
            }
            PropertyKind::Number { min_value, max_value, .. } => {
                let Some(number) = number_input(property, raw)? else {
                    return self.blank();
                };
                if let Some(min) = min_value {
                    if number < *min {
                        return Err(FieldError::new(
                            property,
                            format!("{} must be at least {min}", property.name),
                        ));
                    }
                }
                if let Some(max) = max_value {
                    if number > *max {
                        return Err(FieldError::new(
                            property,
                            format!("{} must be at most {max}", property.name),
                        ));
                    }
                }
                Ok(Some(FieldValue::Number(number)))
            }
            PropertyKind::Boolean => match raw {
                None | Some(RawValue::Json(Value::Null)) if !property.required => {
                    Ok(Some(FieldValue::Boolean(false)))
                }
                None | Some(RawValue::Json(Value::Null)) => Err(FieldError::required(property)),
                Some(RawValue::Json(Value::Bool(b))) => Ok(Some(FieldValue::Boolean(*b))),
                Some(RawValue::Json(Value::String(s))) => match s.trim().to_lowercase().as_str() {
                    "true" | "1" => Ok(Some(FieldValue::Boolean(true))),
                    "false" | "0" => Ok(Some(FieldValue::Boolean(false))),
                    "" if !property.required => Ok(Some(FieldValue::Boolean(false))),
                    "" => Err(FieldError::required(property)),
                    _ => Err(FieldError::new(
                        property,
                        format!("{} must be true or false", property.name),
                    )),
                },
                Some(_) => Err(FieldError::new(
                    property,
                    format!("{} must be true or false", property.name),
                )),
            },
            PropertyKind::Date { .. } if property.is_auto_date() => Ok(None),
            PropertyKind::Date { .. } => {
                let Some(text) = text_input(property, raw)? else {
                    return self.blank();
                };
                parse_date(&text)
                    .map(|dt| Some(FieldValue::Date(DateValue::Parsed(dt))))
                    .ok_or_else(|| {
                        FieldError::new(property, format!("{} must be a date", property.name))
                    })
            }
            PropertyKind::Relationship { relationship_type: RelationshipType::One, .. } => {
                match raw {
                    None | Some(RawValue::Json(Value::Null)) => self.blank(),
                    Some(RawValue::Json(Value::String(id))) if id.trim().is_empty() => self.blank(),
                    Some(RawValue::Json(Value::String(id))) => Ok(Some(FieldValue::Relationship(
                        RelationshipValue::One(id.trim().to_string()),
                    ))),
                    Some(_) => Err(FieldError::new(
                        property,
                        format!("{} must be a single reference id", property.name),
                    )),
                }
            }
            PropertyKind::Relationship { relationship_type: RelationshipType::Many, .. } => {
                let ids = match raw {
                    None | Some(RawValue::Json(Value::Null)) => Vec::new(),
                    Some(RawValue::Json(Value::String(s))) => parse_id_list(s),
                    Some(RawValue::Json(Value::Array(items))) => {
                        let mut ids = Vec::with_capacity(items.len());
                        for item in items {
                            match item {
                                Value::String(s) => ids.push(s.trim().to_string()),
                                _ => {
                                    return Err(FieldError::new(
                                        property,
                                        format!("{} must be a list of reference ids", property.name),
                                    ))
                                }
                            }
                        }
                        dedup_ids(ids)
                    }
                    Some(_) => {
                        return Err(FieldError::new(
                            property,
                            format!("{} must be a list of reference ids", property.name),
                        ))
                    }
                };
                if ids.is_empty() {
                    if property.required {
                        return Err(FieldError::new(
                            property,
                            format!("{} needs at least one reference", property.name),
                        ));
                    }
                    return Ok(None);
                }
                Ok(Some(FieldValue::Relationship(RelationshipValue::Many(ids))))
            }
            PropertyKind::Rating => {
                let rating = match raw {
                    None | Some(RawValue::Json(Value::Null)) => 0,
                    Some(RawValue::Json(Value::String(s))) if s.trim().is_empty() => 0,
                    Some(RawValue::Json(Value::String(s))) => parse_rating(property, s.trim())?,
                    Some(RawValue::Json(Value::Number(n))) => match n.as_f64() {
                        Some(f) if f.fract() == 0.0 && (0.0..=5.0).contains(&f) => f as u8,
                        _ => return Err(rating_error(property)),
                    },
                    Some(_) => return Err(rating_error(property)),
                };
                if property.required && rating == 0 {
                    return Err(FieldError::new(
                        property,
                        format!("{} needs a rating of at least 1", property.name),
                    ));
                }
                Ok(Some(FieldValue::Rating(rating)))
            }
            PropertyKind::Image | PropertyKind::File => match raw {
                Some(RawValue::Upload(upload)) => {
                    Ok(Some(FieldValue::Attachment(Attachment::Upload(upload.clone()))))
                }
                None | Some(RawValue::Json(Value::Null)) => self.blank(),
                Some(RawValue::Json(Value::String(path))) if path.is_empty() => self.blank(),
                Some(RawValue::Json(Value::String(path))) => {
                    Ok(Some(FieldValue::Attachment(Attachment::Stored(path.clone()))))
                }
                Some(_) => Err(FieldError::new(
                    property,
                    format!("{} must be an upload or a stored file path", property.name),
                )),
            },
        }
    }

    fn blank(&self) -> std::result::Result<Option<FieldValue>, FieldError> {
        if self.property.required {
            Err(FieldError::required(&self.property))
        } else {
            Ok(None)
        }
    }
}

/// Text input for string-like properties. `None` for absent, null or empty.
fn text_input(
    property: &Property,
    raw: Option<&RawValue>,
) -> std::result::Result<Option<String>, FieldError> {
    match raw {
        None | Some(RawValue::Json(Value::Null)) => Ok(None),
        Some(RawValue::Json(Value::String(s))) if s.is_empty() => Ok(None),
        Some(RawValue::Json(Value::String(s))) => Ok(Some(s.clone())),
        Some(RawValue::Json(Value::Number(n))) => Ok(Some(n.to_string())),
        Some(RawValue::Json(Value::Bool(b))) => Ok(Some(b.to_string())),
        Some(_) => Err(FieldError::new(
            property,
            format!("{} expects text", property.name),
        )),
    }
}

fn number_input(
    property: &Property,
    raw: Option<&RawValue>,
) -> std::result::Result<Option<f64>, FieldError> {
    let invalid = || FieldError::new(property, format!("{} must be a number", property.name));
    let number = match raw {
        None | Some(RawValue::Json(Value::Null)) => return Ok(None),
        Some(RawValue::Json(Value::String(s))) if s.trim().is_empty() => return Ok(None),
        Some(RawValue::Json(Value::String(s))) => s.trim().parse::<f64>().map_err(|_| invalid())?,
        Some(RawValue::Json(Value::Number(n))) => n.as_f64().ok_or_else(invalid)?,
        Some(_) => return Err(invalid()),
    };
    if !number.is_finite() {
        return Err(invalid());
    }
    Ok(Some(number))
}

fn parse_rating(property: &Property, text: &str) -> std::result::Result<u8, FieldError> {
    match text.parse::<u8>() {
        Ok(r) if r <= 5 => Ok(r),
        _ => Err(rating_error(property)),
    }
}

fn rating_error(property: &Property) -> FieldError {
    FieldError::new(
        property,
        format!("{} must be a whole number from 0 to 5", property.name),
    )
}

/// Compiled rules for every property of a model, in property order.
#[derive(Debug, Clone)]
pub struct CompiledSchema {
    model_name: String,
    rules: Vec<FieldRule>,
}

impl CompiledSchema {
    pub fn rules(&self) -> &[FieldRule] {
        &self.rules
    }

    /// The rule for a property, by property name.
    pub fn rule(&self, name: &str) -> Option<&FieldRule> {
        self.rules.iter().find(|r| r.property.name == name)
    }

    /// Validate a name-keyed input map. Every problem is collected; the
    /// result is keyed by property id. In `Partial` mode a supplied
    /// property that coerces to "unset" maps to `None` so callers can clear it.
    pub fn validate_input(
        &self,
        input: &BTreeMap<String, RawValue>,
        mode: InputMode,
    ) -> std::result::Result<BTreeMap<String, Option<FieldValue>>, Vec<FieldError>> {
        let mut values = BTreeMap::new();
        let mut errors = Vec::new();

        for rule in &self.rules {
            let property = &rule.property;
            let raw = input.get(&property.name);

            // Stamped by the store; user input neither sets nor clears them.
            if property.is_auto_date() {
                continue;
            }
            if mode == InputMode::Partial && raw.is_none() {
                continue;
            }
            if mode == InputMode::Create && raw.is_none() {
                if let Some(default) = parse_default(property) {
                    values.insert(property.id.clone(), Some(default));
                    continue;
                }
            }

            match rule.apply(raw) {
                Ok(value) => {
                    if value.is_some() || mode == InputMode::Partial {
                        values.insert(property.id.clone(), value);
                    }
                }
                Err(e) => errors.push(e),
            }
        }

        for key in input.keys() {
            if self.rule(key).is_none() {
                errors.push(FieldError {
                    property: key.clone(),
                    message: format!("Unknown property '{key}' on model '{}'", self.model_name),
                });
            }
        }

        if errors.is_empty() {
            Ok(values)
        } else {
            Err(errors)
        }
    }
}

/// Compile a model's properties into field rules, resolving ruleset patterns.
pub fn compile(model: &Model, rulesets: &RulesetRegistry) -> Result<CompiledSchema> {
    let mut rules = Vec::with_capacity(model.properties.len());

    for property in &model.properties {
        let pattern = match &property.kind {
            PropertyKind::String {
                validation_ruleset_id: Some(ruleset_id),
                ..
            } => Some(rulesets.require(ruleset_id)?.compile()?),
            _ => None,
        };
        rules.push(FieldRule {
            property: property.clone(),
            pattern,
        });
    }

    Ok(CompiledSchema {
        model_name: model.name.clone(),
        rules,
    })
}

/// Parse a property's authored default according to its type.
pub fn parse_default(property: &Property) -> Option<FieldValue> {
    let raw = property.default_value.as_deref()?;
    if raw.is_empty() {
        return None;
    }

    match &property.kind {
        PropertyKind::String { .. } | PropertyKind::Markdown => {
            Some(FieldValue::String(raw.to_string()))
        }
        PropertyKind::Number { .. } => raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(FieldValue::Number),
        PropertyKind::Boolean => Some(FieldValue::Boolean(raw == "true")),
        PropertyKind::Date { .. } if property.is_auto_date() => None,
        PropertyKind::Date { .. } => Some(FieldValue::Date(
            parse_date(raw).map_or_else(|| DateValue::Raw(raw.to_string()), DateValue::Parsed),
        )),
        PropertyKind::Relationship { relationship_type: RelationshipType::One, .. } => Some(
            FieldValue::Relationship(RelationshipValue::One(raw.trim().to_string())),
        ),
        PropertyKind::Relationship { relationship_type: RelationshipType::Many, .. } => {
            let ids = parse_id_list(raw);
            (!ids.is_empty()).then_some(FieldValue::Relationship(RelationshipValue::Many(ids)))
        }
        PropertyKind::Rating => raw
            .trim()
            .parse::<u8>()
            .ok()
            .filter(|r| *r <= 5)
            .map(FieldValue::Rating),
        PropertyKind::Image | PropertyKind::File => {
            Some(FieldValue::Attachment(Attachment::Stored(raw.to_string())))
        }
    }
}

/// Reject authored defaults that can never parse for their type, or that
/// the property's own rule would refuse as user input.
pub fn check_default(rule: &FieldRule) -> Result<()> {
    let property = &rule.property;
    let Some(raw) = property.default_value.as_deref().filter(|d| !d.is_empty()) else {
        return Ok(());
    };

    let ok = match property.kind {
        PropertyKind::Number { .. } | PropertyKind::Rating => parse_default(property).is_some(),
        PropertyKind::Boolean => raw == "true" || raw == "false",
        _ => true,
    };

    if !ok {
        return Err(ModelbaseError::Definition(format!(
            "Default '{raw}' is not a valid {} for property '{}'",
            property.property_type(),
            property.name
        )));
    }

    if matches!(
        property.kind,
        PropertyKind::String { .. } | PropertyKind::Markdown | PropertyKind::Number { .. } | PropertyKind::Rating
    ) {
        rule.apply(Some(&RawValue::Json(Value::String(raw.to_string()))))
            .map_err(|e| {
                ModelbaseError::Definition(format!(
                    "Default '{raw}' for property '{}' is invalid: {}",
                    property.name, e.message
                ))
            })?;
    }
    Ok(())
}

/// Inject parsed defaults for properties absent from `values`. Never
/// overwrites a present key. Returns the ids of the properties filled.
pub fn apply_defaults(model: &Model, values: &mut ObjectData) -> Vec<String> {
    let mut filled = Vec::new();
    for property in &model.properties {
        if values.contains_key(&property.id) {
            continue;
        }
        if let Some(default) = parse_default(property) {
            values.insert(property.id.clone(), default);
            filled.push(property.id.clone());
        }
    }
    filled
}

/// When auto-set dates are stamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stamp {
    Create,
    Update,
}

/// Write `now` into auto-set date properties. On create both flags apply.
pub fn stamp_auto_dates(model: &Model, values: &mut ObjectData, now: DateTime<Utc>, stamp: Stamp) {
    for property in &model.properties {
        if let PropertyKind::Date { auto_set_on_create, auto_set_on_update } = property.kind {
            let applies = match stamp {
                Stamp::Create => auto_set_on_create || auto_set_on_update,
                Stamp::Update => auto_set_on_update,
            };
            if applies {
                values.insert(property.id.clone(), FieldValue::Date(DateValue::Parsed(now)));
            }
        }
    }
}
