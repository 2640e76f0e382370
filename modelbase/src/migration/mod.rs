use crate::registry::{Model, PropertyType};
use std::collections::HashSet;

/// A single change detected between two versions of a model definition.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelChange {
    ModelAdded {
        model: String,
    },
    PropertyAdded {
        model: String,
        property_id: String,
        property: String,
        has_default: bool,
        /// Neither the id nor the name existed before, so existing objects
        /// receive the parsed default.
        backfill: bool,
    },
    PropertyRemoved {
        model: String,
        property_id: String,
        property: String,
    },
    PropertyRenamed {
        model: String,
        property_id: String,
        from: String,
        to: String,
    },
    PropertyTypeChanged {
        model: String,
        property_id: String,
        property: String,
        from: PropertyType,
        to: PropertyType,
    },
    PropertySettingsChanged {
        model: String,
        property: String,
    },
    RequiredChanged {
        model: String,
        property: String,
        required: bool,
    },
    DefaultChanged {
        model: String,
        property: String,
    },
    WorkflowChanged {
        model: String,
        from: Option<String>,
        to: Option<String>,
    },
    DisplayPropertiesChanged {
        model: String,
    },
}

impl ModelChange {
    /// Whether the change leaves every stored value readable.
    pub fn is_safe(&self) -> bool {
        match self {
            ModelChange::PropertyRemoved { .. } | ModelChange::PropertyTypeChanged { .. } => false,
            ModelChange::RequiredChanged { required, .. } => !*required,
            _ => true,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ModelChange::ModelAdded { model } => format!("Model '{model}' added"),
            ModelChange::PropertyAdded { model, property, has_default, backfill, .. } => {
                let qualifier = match (has_default, backfill) {
                    (true, true) => " (default backfilled)",
                    (true, false) => " (replaces a property of the same name)",
                    _ => "",
                };
                format!("Property '{model}.{property}' added{qualifier}")
            }
            ModelChange::PropertyRemoved { model, property, .. } => {
                format!("Property '{model}.{property}' removed (values purged)")
            }
            ModelChange::PropertyRenamed { model, from, to, .. } => {
                format!("Property '{model}.{from}' renamed to '{to}'")
            }
            ModelChange::PropertyTypeChanged { model, property, from, to, .. } => {
                format!("Property '{model}.{property}' type changed from {from} to {to}")
            }
            ModelChange::PropertySettingsChanged { model, property } => {
                format!("Settings of '{model}.{property}' changed")
            }
            ModelChange::RequiredChanged { model, property, required } => {
                let state = if *required { "required" } else { "optional" };
                format!("Property '{model}.{property}' is now {state}")
            }
            ModelChange::DefaultChanged { model, property } => {
                format!("Default value for '{model}.{property}' changed")
            }
            ModelChange::WorkflowChanged { model, from, to } => format!(
                "Workflow of '{model}' changed: {} -> {}",
                from.as_deref().unwrap_or("none"),
                to.as_deref().unwrap_or("none")
            ),
            ModelChange::DisplayPropertiesChanged { model } => {
                format!("Display properties of '{model}' changed")
            }
        }
    }
}

/// Compare a stored model with its replacement. Properties are matched by id.
pub fn diff_models(old: Option<&Model>, new: &Model) -> Vec<ModelChange> {
    let mut changes = Vec::new();
    let model = new.name.clone();

    let Some(old) = old else {
        changes.push(ModelChange::ModelAdded { model });
        return changes;
    };

    let old_names: HashSet<&str> = old.properties.iter().map(|p| p.name.as_str()).collect();

    for property in &new.properties {
        let Some(previous) = old.property_by_id(&property.id) else {
            let has_default = property
                .default_value
                .as_deref()
                .is_some_and(|d| !d.is_empty());
            changes.push(ModelChange::PropertyAdded {
                model: model.clone(),
                property_id: property.id.clone(),
                property: property.name.clone(),
                has_default,
                backfill: has_default && !old_names.contains(property.name.as_str()),
            });
            continue;
        };

        if previous.name != property.name {
            changes.push(ModelChange::PropertyRenamed {
                model: model.clone(),
                property_id: property.id.clone(),
                from: previous.name.clone(),
                to: property.name.clone(),
            });
        }

        if previous.property_type() != property.property_type() {
            changes.push(ModelChange::PropertyTypeChanged {
                model: model.clone(),
                property_id: property.id.clone(),
                property: property.name.clone(),
                from: previous.property_type(),
                to: property.property_type(),
            });
        } else if previous.kind != property.kind {
            changes.push(ModelChange::PropertySettingsChanged {
                model: model.clone(),
                property: property.name.clone(),
            });
        }

        if previous.required != property.required {
            changes.push(ModelChange::RequiredChanged {
                model: model.clone(),
                property: property.name.clone(),
                required: property.required,
            });
        }

        if previous.default_value != property.default_value {
            changes.push(ModelChange::DefaultChanged {
                model: model.clone(),
                property: property.name.clone(),
            });
        }
    }

    for property in &old.properties {
        if new.property_by_id(&property.id).is_none() {
            changes.push(ModelChange::PropertyRemoved {
                model: model.clone(),
                property_id: property.id.clone(),
                property: property.name.clone(),
            });
        }
    }

    if old.workflow_id != new.workflow_id {
        changes.push(ModelChange::WorkflowChanged {
            model: model.clone(),
            from: old.workflow_id.clone(),
            to: new.workflow_id.clone(),
        });
    }

    if old.display_properties != new.display_properties {
        changes.push(ModelChange::DisplayPropertiesChanged { model });
    }

    changes
}
