use crate::validation::FieldError;
use crate::workflow::TransitionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelbaseError {
    #[error("Definition error: {0}")]
    Definition(String),

    #[error("Validation failed: {}", join_field_errors(.0))]
    Validation(Vec<FieldError>),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("Unique constraint conflict: '{property}' value '{value}' is already used by {conflicting_id}")]
    UniqueConstraintConflict {
        property: String,
        value: String,
        conflicting_id: String,
    },

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Property not found: {model}.{property}")]
    PropertyNotFound { model: String, property: String },

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("Validation ruleset not found: {0}")]
    RulesetNotFound(String),

    #[error("Object not found: {model}/{id}")]
    ObjectNotFound { model: String, id: String },

    #[error("Property '{property}' is stored as {stored}, request says {requested}")]
    PropertyTypeMismatch {
        property: String,
        stored: String,
        requested: String,
    },

    #[error("Property '{0}' is set automatically and cannot be written")]
    PropertyNotWritable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("{0}")]
    Other(String),
}

impl ModelbaseError {
    /// Errors that describe a single record's problem rather than a broken
    /// request. A batch reports these per object instead of aborting.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ModelbaseError::ObjectNotFound { .. }
                | ModelbaseError::Validation(_)
                | ModelbaseError::Transition(_)
                | ModelbaseError::UniqueConstraintConflict { .. }
        )
    }
}

fn join_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, ModelbaseError>;
