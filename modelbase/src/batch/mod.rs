//! Batch Mutation Engine: one property value or one workflow state applied
//! to many objects of a model, all-or-nothing.

use crate::error::{ModelbaseError, Result};
use crate::registry::{Model, ModelRegistry, PropertyType, RulesetRegistry};
use crate::system_db::SystemDb;
use crate::validation::{self, FieldError, FieldRule, Stamp};
use crate::value::{dedup_ids, FieldValue, RawValue};
use crate::workflow::{check_object_transition, Workflow, WorkflowSet};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// What a batch writes to each selected object.
#[derive(Debug, Clone)]
pub enum Mutation {
    Property {
        property_name: String,
        /// The type the caller believes the property has.
        property_type: PropertyType,
        new_value: RawValue,
    },
    WorkflowState {
        target_state_id: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NotFound,
    Validation,
    Transition,
    UniqueConflict,
}

/// Why one object of a batch could not be updated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchFailure {
    pub object_id: String,
    pub message: String,
    pub kind: FailureKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub model_id: String,
    pub requested: usize,
    pub succeeded: usize,
    pub failures: Vec<BatchFailure>,
    /// False when any object failed and the whole batch was rolled back.
    pub committed: bool,
}

impl BatchReport {
    pub fn message(&self) -> String {
        if self.committed {
            format!("Updated {} object(s)", self.succeeded)
        } else {
            format!(
                "{} of {} object(s) failed; no changes were saved",
                self.failures.len(),
                self.requested
            )
        }
    }
}

/// The validated, request-wide half of a mutation.
enum Plan<'a> {
    Property {
        rule: FieldRule,
        coerced: std::result::Result<Option<FieldValue>, FieldError>,
    },
    State {
        workflow: &'a Workflow,
        target_state_id: &'a str,
    },
}

/// Apply `mutation` to every object in `object_ids` inside one transaction.
///
/// Request-level problems (unknown model or property, type mismatch, missing
/// workflow, empty selection) fail the call before anything is touched.
/// Per-object problems are collected; if any object fails, nothing is kept.
#[allow(clippy::too_many_arguments)]
pub fn apply_batch(
    db: &SystemDb,
    registry: &ModelRegistry,
    rulesets: &RulesetRegistry,
    workflows: &WorkflowSet,
    model_id: &str,
    object_ids: &[String],
    mutation: &Mutation,
    now: DateTime<Utc>,
) -> Result<BatchReport> {
    let model = registry.lookup(model_id)?;
    let ids = dedup_ids(object_ids.iter().map(|id| id.trim().to_string()));
    if ids.is_empty() {
        return Err(ModelbaseError::Validation(vec![FieldError {
            property: "objectIds".into(),
            message: "No objects selected".into(),
        }]));
    }

    let plan = plan(model, rulesets, workflows, mutation)?;

    db.begin_transaction()?;
    let mut report = BatchReport {
        model_id: model.id.clone(),
        requested: ids.len(),
        succeeded: 0,
        failures: Vec::new(),
        committed: false,
    };

    for id in &ids {
        match apply_one(db, model, &plan, id, now) {
            Ok(()) => report.succeeded += 1,
            Err(e) => match failure_kind(&e) {
                Some(kind) => {
                    log::debug!("Batch on '{}': object {id} failed: {e}", model.name);
                    report.failures.push(BatchFailure {
                        object_id: id.clone(),
                        message: e.to_string(),
                        kind,
                    });
                }
                None => {
                    if let Err(rollback) = db.rollback_transaction() {
                        log::error!("Rollback failed: {rollback}");
                    }
                    return Err(e);
                }
            },
        }
    }

    if report.succeeded < report.requested {
        db.rollback_transaction()?;
        log::info!(
            "Batch on '{}' rolled back: {} of {} failed",
            model.name,
            report.failures.len(),
            report.requested
        );
    } else {
        db.commit_transaction()?;
        report.committed = true;
        log::info!("Batch on '{}' updated {} object(s)", model.name, report.succeeded);
    }

    Ok(report)
}

fn plan<'a>(
    model: &Model,
    rulesets: &RulesetRegistry,
    workflows: &'a WorkflowSet,
    mutation: &'a Mutation,
) -> Result<Plan<'a>> {
    match mutation {
        Mutation::Property { property_name, property_type, new_value } => {
            let property = model.require_property(property_name)?;
            if property.property_type() != *property_type {
                return Err(ModelbaseError::PropertyTypeMismatch {
                    property: property.name.clone(),
                    stored: property.property_type().to_string(),
                    requested: property_type.to_string(),
                });
            }
            if property.is_auto_date() {
                return Err(ModelbaseError::PropertyNotWritable(property.name.clone()));
            }
            if matches!(new_value, RawValue::Upload(_)) {
                return Err(ModelbaseError::Validation(vec![FieldError {
                    property: property.name.clone(),
                    message: "File uploads cannot be applied in a batch".into(),
                }]));
            }

            let rule = validation::compile(model, rulesets)?
                .rule(property_name)
                .cloned()
                .ok_or_else(|| ModelbaseError::PropertyNotFound {
                    model: model.name.clone(),
                    property: property_name.clone(),
                })?;
            let coerced = rule.apply(Some(new_value));
            Ok(Plan::Property { rule, coerced })
        }
        Mutation::WorkflowState { target_state_id } => {
            let workflow_id = model.workflow_id.as_deref().ok_or_else(|| {
                ModelbaseError::WorkflowNotFound(format!("model '{}' has no workflow", model.name))
            })?;
            Ok(Plan::State {
                workflow: workflows.require(workflow_id)?,
                target_state_id,
            })
        }
    }
}

fn apply_one(
    db: &SystemDb,
    model: &Model,
    plan: &Plan<'_>,
    id: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    let record = db
        .get_object(&model.id, id)?
        .filter(|r| !r.is_deleted)
        .ok_or_else(|| ModelbaseError::ObjectNotFound {
            model: model.name.clone(),
            id: id.to_string(),
        })?;
    let mut object = record.decode(model)?;

    match plan {
        Plan::Property { rule, coerced } => {
            let value = coerced
                .clone()
                .map_err(|e| ModelbaseError::Validation(vec![e]))?;
            let property = rule.property();

            if object.values.get(&property.id) == value.as_ref() {
                return Ok(());
            }

            if property.is_unique() {
                if let Some(text) = value.as_ref().and_then(FieldValue::as_str) {
                    if let Some(conflicting_id) =
                        db.find_unique_conflict(&model.id, &property.id, text, id)?
                    {
                        return Err(ModelbaseError::UniqueConstraintConflict {
                            property: property.name.clone(),
                            value: text.to_string(),
                            conflicting_id,
                        });
                    }
                }
            }

            match value {
                Some(value) => {
                    object.values.insert(property.id.clone(), value);
                }
                None => {
                    object.values.remove(&property.id);
                }
            }
        }
        Plan::State { workflow, target_state_id } => {
            check_object_transition(workflow, object.current_state_id.as_deref(), target_state_id)?;
            object.current_state_id = Some(target_state_id.to_string());
        }
    }

    validation::stamp_auto_dates(model, &mut object.values, now, Stamp::Update);
    object.updated_at = now;
    db.update_object(&object)
}

/// `None` for errors that abort the whole batch.
fn failure_kind(error: &ModelbaseError) -> Option<FailureKind> {
    if !error.is_recoverable() {
        return None;
    }
    match error {
        ModelbaseError::ObjectNotFound { .. } => Some(FailureKind::NotFound),
        ModelbaseError::Validation(_) => Some(FailureKind::Validation),
        ModelbaseError::Transition(_) => Some(FailureKind::Transition),
        ModelbaseError::UniqueConstraintConflict { .. } => Some(FailureKind::UniqueConflict),
        _ => None,
    }
}
