//! Workflow Engine: per-workflow state machines and transition legality.
//!
//! The same [`check_object_transition`] is used by single-record moves and by
//! batch state updates.

use crate::error::{ModelbaseError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub states: Vec<WorkflowState>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub is_initial: bool,
    #[serde(default)]
    pub successor_state_ids: BTreeSet<String>,
}

/// Why a transition was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Unknown state '{state_id}' in workflow '{workflow}'")]
    UnknownState { workflow: String, state_id: String },

    #[error("Unknown target state '{state_id}' in workflow '{workflow}'")]
    UnknownTargetState { workflow: String, state_id: String },
}

impl Workflow {
    pub fn state(&self, id: &str) -> Option<&WorkflowState> {
        self.states.iter().find(|s| s.id == id)
    }

    pub fn initial_states(&self) -> impl Iterator<Item = &WorkflowState> {
        self.states.iter().filter(|s| s.is_initial)
    }

    /// States reachable from any initial state along successor edges.
    pub fn live_states(&self) -> BTreeSet<&str> {
        let mut live = BTreeSet::new();
        let mut queue: VecDeque<&WorkflowState> = self.initial_states().collect();

        while let Some(state) = queue.pop_front() {
            if !live.insert(state.id.as_str()) {
                continue;
            }
            for next in &state.successor_state_ids {
                if let Some(next_state) = self.state(next) {
                    queue.push_back(next_state);
                }
            }
        }

        live
    }

    /// Definition-time checks: unique state ids and successors that exist.
    pub fn check_definition(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(ModelbaseError::Definition("Workflow id must not be empty".into()));
        }

        let mut ids = HashSet::new();
        for state in &self.states {
            if !ids.insert(state.id.as_str()) {
                return Err(ModelbaseError::Definition(format!(
                    "Workflow '{}' has duplicate state id '{}'",
                    self.name, state.id
                )));
            }
        }

        for state in &self.states {
            if let Some(missing) = state
                .successor_state_ids
                .iter()
                .find(|s| !ids.contains(s.as_str()))
            {
                return Err(ModelbaseError::Definition(format!(
                    "State '{}' of workflow '{}' points at unknown state '{missing}'",
                    state.name, self.name
                )));
            }
        }

        if !self.states.is_empty() && self.initial_states().next().is_none() {
            log::warn!(
                "Workflow '{}' has no initial state; stateless objects cannot enter it",
                self.name
            );
        }

        Ok(())
    }

    fn state_label(&self, id: &str) -> String {
        self.state(id)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| id.to_string())
    }
}

/// Is moving from `from_state_id` (or from no state) to `to_state_id` legal?
pub fn can_transition(
    workflow: &Workflow,
    from_state_id: Option<&str>,
    to_state_id: &str,
) -> std::result::Result<(), TransitionError> {
    let target = workflow
        .state(to_state_id)
        .ok_or_else(|| TransitionError::UnknownTargetState {
            workflow: workflow.name.clone(),
            state_id: to_state_id.to_string(),
        })?;

    let Some(from_id) = from_state_id else {
        if target.is_initial {
            return Ok(());
        }
        return Err(TransitionError::InvalidTransition(
            "object has no current state; only initial states are reachable".into(),
        ));
    };

    let from = workflow
        .state(from_id)
        .ok_or_else(|| TransitionError::UnknownState {
            workflow: workflow.name.clone(),
            state_id: from_id.to_string(),
        })?;

    if from.successor_state_ids.contains(to_state_id) {
        Ok(())
    } else {
        Err(TransitionError::InvalidTransition(format!(
            "cannot move from '{}' to '{}'",
            from.name,
            workflow.state_label(to_state_id)
        )))
    }
}

/// Resolve an object's stored state id. Ids the workflow no longer knows
/// degrade to "no current state".
pub fn resolve_current<'a>(
    workflow: &'a Workflow,
    current_state_id: Option<&str>,
) -> Option<&'a WorkflowState> {
    let id = current_state_id?;
    let state = workflow.state(id);
    if state.is_none() {
        log::warn!(
            "Stale state reference '{id}' in workflow '{}'; treating as no current state",
            workflow.name
        );
    }
    state
}

/// Transition check for a stored object: stale state ids count as no state.
pub fn check_object_transition(
    workflow: &Workflow,
    current_state_id: Option<&str>,
    to_state_id: &str,
) -> std::result::Result<(), TransitionError> {
    let current = resolve_current(workflow, current_state_id).map(|s| s.id.as_str());
    can_transition(workflow, current, to_state_id)
}

/// States an object may move to next, in workflow order.
pub fn available_transitions<'a>(
    workflow: &'a Workflow,
    current_state_id: Option<&str>,
) -> Vec<&'a WorkflowState> {
    workflow
        .states
        .iter()
        .filter(|s| check_object_transition(workflow, current_state_id, &s.id).is_ok())
        .collect()
}

/// All known workflows, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct WorkflowSet {
    workflows: BTreeMap<String, Workflow>,
}

impl WorkflowSet {
    pub fn new(workflows: impl IntoIterator<Item = Workflow>) -> Self {
        WorkflowSet {
            workflows: workflows.into_iter().map(|w| (w.id.clone(), w)).collect(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Workflow> {
        self.workflows.get(id)
    }

    pub fn require(&self, id: &str) -> Result<&Workflow> {
        self.get(id)
            .ok_or_else(|| ModelbaseError::WorkflowNotFound(id.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Workflow> {
        self.workflows.values()
    }

    pub fn insert(&mut self, workflow: Workflow) {
        self.workflows.insert(workflow.id.clone(), workflow);
    }
}
