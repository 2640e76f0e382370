use crate::error::{ModelbaseError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Upper bound for `precision` on number properties.
pub const MAX_PRECISION: u8 = 10;

/// A user-authored entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Property names whose values make up the object's label, in order.
    #[serde(default)]
    pub display_properties: Vec<String>,
    #[serde(default)]
    pub properties: Vec<Property>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
}

impl Model {
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn property_by_id(&self, id: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.id == id)
    }

    /// Look up a property by name, failing with `PropertyNotFound`.
    pub fn require_property(&self, name: &str) -> Result<&Property> {
        self.property(name)
            .ok_or_else(|| ModelbaseError::PropertyNotFound {
                model: self.name.clone(),
                property: name.to_string(),
            })
    }

    /// Stable sort by `order_index`; ties keep authored order.
    pub fn sort_properties(&mut self) {
        self.properties.sort_by_key(|p| p.order_index);
    }

    pub fn relationship_properties(&self) -> impl Iterator<Item = &Property> {
        self.properties
            .iter()
            .filter(|p| matches!(p.kind, PropertyKind::Relationship { .. }))
    }

    /// Checks the invariants that only need this model: unique property ids
    /// and names, and display properties that exist.
    pub fn check_definition(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(ModelbaseError::Definition("Model id must not be empty".into()));
        }
        if self.name.trim().is_empty() {
            return Err(ModelbaseError::Definition(format!(
                "Model '{}' must have a name",
                self.id
            )));
        }

        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        for property in &self.properties {
            if !ids.insert(property.id.as_str()) {
                return Err(ModelbaseError::Definition(format!(
                    "Model '{}' has duplicate property id '{}'",
                    self.name, property.id
                )));
            }
            if !names.insert(property.name.as_str()) {
                return Err(ModelbaseError::Definition(format!(
                    "Model '{}' has duplicate property name '{}'",
                    self.name, property.name
                )));
            }
        }

        for display in &self.display_properties {
            if !names.contains(display.as_str()) {
                return Err(ModelbaseError::Definition(format!(
                    "Display property '{display}' is not a property of model '{}'",
                    self.name
                )));
            }
        }

        Ok(())
    }
}

/// One typed field of a model.
///
/// Authored as a flat [`PropertyDefinition`]; type-specific settings live in
/// [`PropertyKind`] so a field can only carry the settings of its own type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PropertyDefinition", into = "PropertyDefinition")]
pub struct Property {
    pub id: String,
    pub name: String,
    pub required: bool,
    pub order_index: i64,
    /// Default as authored; parsed per type when applied.
    pub default_value: Option<String>,
    pub kind: PropertyKind,
}

impl Property {
    pub fn property_type(&self) -> PropertyType {
        self.kind.property_type()
    }

    /// Date properties stamped by the store rather than the user.
    pub fn is_auto_date(&self) -> bool {
        matches!(
            self.kind,
            PropertyKind::Date { auto_set_on_create, auto_set_on_update }
                if auto_set_on_create || auto_set_on_update
        )
    }

    pub fn is_unique(&self) -> bool {
        matches!(self.kind, PropertyKind::String { is_unique: true, .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyKind {
    String {
        is_unique: bool,
        validation_ruleset_id: Option<String>,
    },
    Number {
        unit: Option<String>,
        precision: Option<u8>,
        min_value: Option<f64>,
        max_value: Option<f64>,
    },
    Boolean,
    Date {
        auto_set_on_create: bool,
        auto_set_on_update: bool,
    },
    Relationship {
        related_model_id: String,
        relationship_type: RelationshipType,
    },
    Rating,
    Markdown,
    Image,
    File,
}

impl PropertyKind {
    pub fn property_type(&self) -> PropertyType {
        match self {
            PropertyKind::String { .. } => PropertyType::String,
            PropertyKind::Number { .. } => PropertyType::Number,
            PropertyKind::Boolean => PropertyType::Boolean,
            PropertyKind::Date { .. } => PropertyType::Date,
            PropertyKind::Relationship { .. } => PropertyType::Relationship,
            PropertyKind::Rating => PropertyType::Rating,
            PropertyKind::Markdown => PropertyType::Markdown,
            PropertyKind::Image => PropertyType::Image,
            PropertyKind::File => PropertyType::File,
        }
    }
}

/// Property type tag, as sent by clients and stored in definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    String,
    Number,
    Boolean,
    Date,
    Relationship,
    Rating,
    Markdown,
    Image,
    #[serde(alias = "file_attachment", alias = "fileAttachment")]
    File,
}

impl PropertyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::String => "string",
            PropertyType::Number => "number",
            PropertyType::Boolean => "boolean",
            PropertyType::Date => "date",
            PropertyType::Relationship => "relationship",
            PropertyType::Rating => "rating",
            PropertyType::Markdown => "markdown",
            PropertyType::Image => "image",
            PropertyType::File => "file",
        }
    }

    /// Names of the type-specific definition fields this type accepts.
    fn allowed_fields(&self) -> &'static [&'static str] {
        match self {
            PropertyType::String => &["is_unique", "validation_ruleset_id"],
            PropertyType::Number => &["unit", "precision", "min_value", "max_value"],
            PropertyType::Date => &["auto_set_on_create", "auto_set_on_update"],
            PropertyType::Relationship => &["related_model_id", "relationship_type"],
            _ => &[],
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PropertyType {
    type Err = ModelbaseError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "string" => PropertyType::String,
            "number" => PropertyType::Number,
            "boolean" => PropertyType::Boolean,
            "date" => PropertyType::Date,
            "relationship" => PropertyType::Relationship,
            "rating" => PropertyType::Rating,
            "markdown" => PropertyType::Markdown,
            "image" => PropertyType::Image,
            "file" | "file_attachment" | "fileAttachment" => PropertyType::File,
            other => {
                return Err(ModelbaseError::Definition(format!(
                    "Unknown property type '{other}'"
                )))
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    One,
    Many,
}

/// Flat, authored form of a property. Every type-specific field is optional
/// here; [`Property::try_from`] rejects the ones that do not apply.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropertyDefinition {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub property_type: Option<PropertyType>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub order_index: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_unique: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_ruleset_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_set_on_create: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_set_on_update: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship_type: Option<RelationshipType>,
}

impl PropertyDefinition {
    fn present_type_fields(&self) -> Vec<&'static str> {
        let fields = [
            ("is_unique", self.is_unique.is_some()),
            ("validation_ruleset_id", self.validation_ruleset_id.is_some()),
            ("unit", self.unit.is_some()),
            ("precision", self.precision.is_some()),
            ("min_value", self.min_value.is_some()),
            ("max_value", self.max_value.is_some()),
            ("auto_set_on_create", self.auto_set_on_create.is_some()),
            ("auto_set_on_update", self.auto_set_on_update.is_some()),
            ("related_model_id", self.related_model_id.is_some()),
            ("relationship_type", self.relationship_type.is_some()),
        ];
        fields
            .into_iter()
            .filter(|(_, present)| *present)
            .map(|(name, _)| name)
            .collect()
    }
}

impl TryFrom<PropertyDefinition> for Property {
    type Error = ModelbaseError;

    fn try_from(def: PropertyDefinition) -> Result<Self> {
        if def.id.trim().is_empty() {
            return Err(ModelbaseError::Definition(format!(
                "Property '{}' must have an id",
                def.name
            )));
        }
        if def.name.trim().is_empty() {
            return Err(ModelbaseError::Definition(format!(
                "Property '{}' must have a name",
                def.id
            )));
        }
        let property_type = def.property_type.ok_or_else(|| {
            ModelbaseError::Definition(format!("Property '{}' is missing a type", def.name))
        })?;

        let allowed = property_type.allowed_fields();
        if let Some(stray) = def
            .present_type_fields()
            .into_iter()
            .find(|field| !allowed.contains(field))
        {
            return Err(ModelbaseError::Definition(format!(
                "Property '{}': '{stray}' is not valid for type {property_type}",
                def.name
            )));
        }

        let kind = match property_type {
            PropertyType::String => PropertyKind::String {
                is_unique: def.is_unique.unwrap_or(false),
                validation_ruleset_id: def.validation_ruleset_id.filter(|id| !id.is_empty()),
            },
            PropertyType::Number => {
                if let Some(precision) = def.precision {
                    if precision > MAX_PRECISION {
                        return Err(ModelbaseError::Definition(format!(
                            "Property '{}': precision {precision} exceeds {MAX_PRECISION}",
                            def.name
                        )));
                    }
                }
                if let (Some(min), Some(max)) = (def.min_value, def.max_value) {
                    if min > max {
                        return Err(ModelbaseError::Definition(format!(
                            "Property '{}': min_value {min} is greater than max_value {max}",
                            def.name
                        )));
                    }
                }
                PropertyKind::Number {
                    unit: def.unit,
                    precision: def.precision,
                    min_value: def.min_value,
                    max_value: def.max_value,
                }
            }
            PropertyType::Boolean => PropertyKind::Boolean,
            PropertyType::Date => PropertyKind::Date {
                auto_set_on_create: def.auto_set_on_create.unwrap_or(false),
                auto_set_on_update: def.auto_set_on_update.unwrap_or(false),
            },
            PropertyType::Relationship => {
                let related_model_id = def
                    .related_model_id
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| {
                        ModelbaseError::Definition(format!(
                            "Relationship property '{}' needs related_model_id",
                            def.name
                        ))
                    })?;
                PropertyKind::Relationship {
                    related_model_id,
                    relationship_type: def.relationship_type.unwrap_or(RelationshipType::One),
                }
            }
            PropertyType::Rating => PropertyKind::Rating,
            PropertyType::Markdown => PropertyKind::Markdown,
            PropertyType::Image => PropertyKind::Image,
            PropertyType::File => PropertyKind::File,
        };

        Ok(Property {
            id: def.id,
            name: def.name,
            required: def.required,
            order_index: def.order_index,
            default_value: def.default_value,
            kind,
        })
    }
}

impl From<Property> for PropertyDefinition {
    fn from(property: Property) -> Self {
        let mut def = PropertyDefinition {
            id: property.id,
            name: property.name,
            property_type: Some(property.kind.property_type()),
            required: property.required,
            order_index: property.order_index,
            default_value: property.default_value,
            ..Default::default()
        };

        match property.kind {
            PropertyKind::String { is_unique, validation_ruleset_id } => {
                def.is_unique = Some(is_unique);
                def.validation_ruleset_id = validation_ruleset_id;
            }
            PropertyKind::Number { unit, precision, min_value, max_value } => {
                def.unit = unit;
                def.precision = precision;
                def.min_value = min_value;
                def.max_value = max_value;
            }
            PropertyKind::Date { auto_set_on_create, auto_set_on_update } => {
                def.auto_set_on_create = Some(auto_set_on_create);
                def.auto_set_on_update = Some(auto_set_on_update);
            }
            PropertyKind::Relationship { related_model_id, relationship_type } => {
                def.related_model_id = Some(related_model_id);
                def.relationship_type = Some(relationship_type);
            }
            PropertyKind::Boolean
            | PropertyKind::Rating
            | PropertyKind::Markdown
            | PropertyKind::Image
            | PropertyKind::File => {}
        }

        def
    }
}

/// A named regular expression attachable to string properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRuleset {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub regex_pattern: String,
}

impl ValidationRuleset {
    pub fn compile(&self) -> Result<Regex> {
        Regex::new(&self.regex_pattern).map_err(|e| {
            ModelbaseError::Definition(format!(
                "Ruleset '{}' has an invalid pattern: {e}",
                self.name
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(name: &str, property_type: PropertyType) -> PropertyDefinition {
        PropertyDefinition {
            id: format!("p-{name}"),
            name: name.to_string(),
            property_type: Some(property_type),
            ..Default::default()
        }
    }

    #[test]
    fn test_unit_rejected_on_string() {
        let mut d = def("Title", PropertyType::String);
        d.unit = Some("kg".into());
        let err = Property::try_from(d).unwrap_err();
        assert!(err.to_string().contains("'unit' is not valid for type string"));
    }

    #[test]
    fn test_number_bounds_checked() {
        let mut d = def("Weight", PropertyType::Number);
        d.min_value = Some(10.0);
        d.max_value = Some(1.0);
        assert!(Property::try_from(d).is_err());

        let mut d = def("Weight", PropertyType::Number);
        d.precision = Some(11);
        assert!(Property::try_from(d).is_err());

        let mut d = def("Weight", PropertyType::Number);
        d.min_value = Some(1.0);
        d.max_value = Some(1.0);
        d.precision = Some(10);
        assert!(Property::try_from(d).is_ok());
    }

    #[test]
    fn test_relationship_needs_target() {
        let d = def("Owner", PropertyType::Relationship);
        assert!(Property::try_from(d).is_err());

        let mut d = def("Owner", PropertyType::Relationship);
        d.related_model_id = Some("m-people".into());
        let p = Property::try_from(d).unwrap();
        assert_eq!(
            p.kind,
            PropertyKind::Relationship {
                related_model_id: "m-people".into(),
                relationship_type: RelationshipType::One,
            }
        );
    }

    #[test]
    fn test_definition_round_trip_keeps_type_fields() {
        let yaml = r#"
id: p-due
name: Due
type: date
auto_set_on_update: true
"#;
        let p: Property = serde_yaml::from_str(yaml).unwrap();
        assert!(p.is_auto_date());

        let back = serde_yaml::to_string(&p).unwrap();
        assert!(back.contains("auto_set_on_update: true"));
        assert!(!back.contains("unit"));
    }

    #[test]
    fn test_stray_field_fails_deserialization() {
        let yaml = r#"
id: p-flag
name: Done
type: boolean
related_model_id: m-other
"#;
        let result: std::result::Result<Property, _> = serde_yaml::from_str(yaml);
        assert!(result.is_err());
    }

    #[test]
    fn test_model_duplicate_names() {
        let model = Model {
            id: "m1".into(),
            name: "Task".into(),
            namespace: None,
            description: None,
            display_properties: vec![],
            properties: vec![
                Property::try_from(def("Title", PropertyType::String)).unwrap(),
                Property {
                    id: "p-other".into(),
                    ..Property::try_from(def("Title", PropertyType::Markdown)).unwrap()
                },
            ],
            workflow_id: None,
        };
        let err = model.check_definition().unwrap_err();
        assert!(err.to_string().contains("duplicate property name"));
    }

    #[test]
    fn test_display_property_must_exist() {
        let model = Model {
            id: "m1".into(),
            name: "Task".into(),
            namespace: None,
            description: None,
            display_properties: vec!["Missing".into()],
            properties: vec![Property::try_from(def("Title", PropertyType::String)).unwrap()],
            workflow_id: None,
        };
        assert!(model.check_definition().is_err());
    }

    #[test]
    fn test_property_type_from_str() {
        assert_eq!("fileAttachment".parse::<PropertyType>().unwrap(), PropertyType::File);
        assert_eq!("rating".parse::<PropertyType>().unwrap(), PropertyType::Rating);
        assert!("currency".parse::<PropertyType>().is_err());
    }

    #[test]
    fn test_ruleset_compile() {
        let ok = ValidationRuleset {
            id: "r1".into(),
            name: "Email".into(),
            description: None,
            regex_pattern: r"^[^@\s]+@[^@\s]+$".into(),
        };
        assert!(ok.compile().is_ok());

        let bad = ValidationRuleset {
            regex_pattern: "([a-z".into(),
            ..ok
        };
        assert!(bad.compile().is_err());
    }
}
