//! Canonical workflow state and its derived fields.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::step::{FieldMessages, StepData, StepRegistry};

/// Schema version written by this build.
pub const STATE_VERSION: u32 = 2;

/// The engine's canonical record of a workflow instance.
///
/// Only the engine mutates this; callers get clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowState {
    /// Workflow instance id, also the persistence key source.
    pub workflow_id: String,
    /// Active step id.
    pub current_step: String,
    /// Per-step payloads.
    pub step_data: BTreeMap<String, StepData>,
    /// Steps advanced past successfully.
    pub completed_steps: BTreeSet<String>,
    /// Steps explicitly skipped.
    #[serde(default)]
    pub skipped_steps: BTreeSet<String>,
    /// Derived completion percentage.
    #[serde(default)]
    pub progress: u8,
    /// Caller-set busy flag.
    #[serde(default)]
    pub is_processing: bool,
    /// Caller-set busy message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_message: Option<String>,
    /// Messages from the last validation or navigation attempt.
    #[serde(default)]
    pub errors: FieldMessages,
    #[serde(default)]
    pub warnings: FieldMessages,
    /// Derived navigation affordances.
    #[serde(default)]
    pub can_go_back: bool,
    #[serde(default)]
    pub can_go_forward: bool,
    /// Last successful persistence write.
    #[serde(default)]
    pub last_saved: Option<DateTime<Utc>>,
    /// Schema version.
    pub version: u32,
}

impl WorkflowState {
    /// Fresh state positioned on `first_step`.
    pub fn initial(workflow_id: impl Into<String>, first_step: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            current_step: first_step.into(),
            step_data: BTreeMap::new(),
            completed_steps: BTreeSet::new(),
            skipped_steps: BTreeSet::new(),
            progress: 0,
            is_processing: false,
            processing_message: None,
            errors: FieldMessages::new(),
            warnings: FieldMessages::new(),
            can_go_back: false,
            can_go_forward: false,
            last_saved: None,
            version: STATE_VERSION,
        }
    }

    /// Whether the step was completed or skipped.
    pub fn is_resolved(&self, step_id: &str) -> bool {
        self.completed_steps.contains(step_id) || self.skipped_steps.contains(step_id)
    }

    /// Record a step as completed, moving it out of the skipped set.
    pub fn mark_completed(&mut self, step_id: &str) {
        self.skipped_steps.remove(step_id);
        self.completed_steps.insert(step_id.to_string());
    }

    /// Record a step as skipped, moving it out of the completed set.
    pub fn mark_skipped(&mut self, step_id: &str) {
        self.completed_steps.remove(step_id);
        self.skipped_steps.insert(step_id.to_string());
    }

    /// Payload for a step, or an empty object.
    pub fn data_for(&self, step_id: &str) -> StepData {
        self.step_data.get(step_id).cloned().unwrap_or_default()
    }

    /// Re-derive `progress`, `can_go_back` and `can_go_forward`.
    pub fn recompute(&mut self, registry: &StepRegistry, allow_back_navigation: bool) {
        self.progress = progress_percent(
            self.completed_steps.len() + self.skipped_steps.len(),
            registry.len(),
        );

        let position = registry.position(&self.current_step).unwrap_or(0);
        self.can_go_back = allow_back_navigation && position > 0;
        // Advancing completes the current step, so it counts toward the next step's deps.
        self.can_go_forward = registry.next_after(&self.current_step).is_some_and(|next| {
            next.dependencies
                .iter()
                .all(|d| *d == self.current_step || self.completed_steps.contains(d))
        });
    }

    /// Check the state against a registry and expected workflow id.
    pub fn check_integrity(&self, workflow_id: &str, registry: &StepRegistry) -> Result<(), String> {
        if self.workflow_id != workflow_id {
            return Err(format!(
                "workflow id mismatch: expected '{}', found '{}'",
                workflow_id, self.workflow_id
            ));
        }
        if !registry.contains(&self.current_step) {
            return Err(format!("current step '{}' is not registered", self.current_step));
        }
        if let Some(id) = self.completed_steps.iter().find(|id| !registry.contains(id)) {
            return Err(format!("completed step '{}' is not registered", id));
        }
        if let Some(id) = self.skipped_steps.iter().find(|id| !registry.contains(id)) {
            return Err(format!("skipped step '{}' is not registered", id));
        }
        if let Some(id) = self.completed_steps.intersection(&self.skipped_steps).next() {
            return Err(format!("step '{}' is both completed and skipped", id));
        }
        Ok(())
    }
}

/// Partial state overlaid on a fresh state at construction.
///
/// Used by recovery flows and tests to start mid-workflow.
#[derive(Debug, Clone, Default)]
pub struct InitialState {
    pub current_step: Option<String>,
    pub step_data: Option<BTreeMap<String, StepData>>,
    pub completed_steps: Option<BTreeSet<String>>,
    pub skipped_steps: Option<BTreeSet<String>>,
    pub errors: Option<FieldMessages>,
    pub warnings: Option<FieldMessages>,
    pub is_processing: Option<bool>,
    pub processing_message: Option<String>,
}

impl InitialState {
    /// Start on a given step.
    pub fn at_step(step_id: impl Into<String>) -> Self {
        Self { current_step: Some(step_id.into()), ..Default::default() }
    }

    /// Pre-complete steps.
    pub fn with_completed<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.completed_steps = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    /// Pre-fill a step's payload.
    pub fn with_step_data(mut self, step_id: impl Into<String>, data: StepData) -> Self {
        self.step_data.get_or_insert_with(BTreeMap::new).insert(step_id.into(), data);
        self
    }

    /// Overlay onto `state`; set fields replace the fresh values.
    pub fn apply(self, state: &mut WorkflowState) {
        if let Some(current_step) = self.current_step {
            state.current_step = current_step;
        }
        if let Some(step_data) = self.step_data {
            state.step_data = step_data;
        }
        if let Some(completed) = self.completed_steps {
            state.completed_steps = completed;
        }
        if let Some(skipped) = self.skipped_steps {
            state.skipped_steps = skipped;
        }
        if let Some(errors) = self.errors {
            state.errors = errors;
        }
        if let Some(warnings) = self.warnings {
            state.warnings = warnings;
        }
        if let Some(is_processing) = self.is_processing {
            state.is_processing = is_processing;
        }
        if self.processing_message.is_some() {
            state.processing_message = self.processing_message;
        }
    }
}

/// Rounded percentage of resolved steps.
pub fn progress_percent(resolved: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let percent = (resolved.min(total) as f64 / total as f64 * 100.0).round();
    percent as u8
}
