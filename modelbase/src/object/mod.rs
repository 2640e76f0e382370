// DataObject - one record of a model

use crate::error::Result;
use crate::registry::Model;
use crate::value::FieldValue;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Property values of one object, keyed by property id.
pub type ObjectData = BTreeMap<String, FieldValue>;

/// A loaded record with its metadata columns and typed values.
#[derive(Debug, Clone, PartialEq)]
pub struct DataObject {
    pub id: String,
    pub model_id: String,
    pub owner_id: Option<String>,
    pub current_state_id: Option<String>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub values: ObjectData,
}

impl DataObject {
    /// A fresh, unsaved object with no values.
    pub fn new(model_id: &str, owner_id: Option<String>, now: DateTime<Utc>) -> Self {
        DataObject {
            id: uuid::Uuid::new_v4().to_string(),
            model_id: model_id.to_string(),
            owner_id,
            current_state_id: None,
            is_deleted: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
            values: ObjectData::new(),
        }
    }

    /// Value of a property, looked up by property name through the model.
    pub fn value(&self, model: &Model, property_name: &str) -> Option<&FieldValue> {
        model
            .property(property_name)
            .and_then(|p| self.values.get(&p.id))
    }

    /// JSON view with values keyed by property name, as the APIs return it.
    pub fn to_json(&self, model: &Model) -> Result<serde_json::Value> {
        let mut values = serde_json::Map::new();
        for property in &model.properties {
            if let Some(value) = self.values.get(&property.id) {
                values.insert(property.name.clone(), value.to_json()?);
            }
        }

        Ok(serde_json::json!({
            "id": self.id,
            "model_id": self.model_id,
            "owner_id": self.owner_id,
            "current_state_id": self.current_state_id,
            "is_deleted": self.is_deleted,
            "deleted_at": self.deleted_at.map(|d| d.to_rfc3339()),
            "created_at": self.created_at.to_rfc3339(),
            "updated_at": self.updated_at.to_rfc3339(),
            "values": values,
        }))
    }
}
