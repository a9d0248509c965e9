//! The workflow state engine.
//!
//! All transitions are synchronous and take `&mut self`. The state itself
//! lives behind a mutex shared with the auto-save task; the lock is released
//! before listeners run.

use std::sync::Arc;

use parking_lot::Mutex;

use super::autosave::AutoSaveScheduler;
use super::config::WorkflowConfig;
use super::events::{
    Direction, EventBus, EventKind, EventMetadata, ListenerId, WorkflowEvent,
};
use super::state::{InitialState, WorkflowState};
use super::step::{FieldMessages, StepData, StepDefinition, StepRegistry};
use crate::error::{ConfigError, ConfigResult};
use crate::storage::{MemoryStore, PersistenceAdapter, StateSink};

/// Error key for unmet dependencies.
pub const DEPENDENCIES_FIELD: &str = "dependencies";
/// Error key for rejected navigation.
pub const NAVIGATION_FIELD: &str = "navigation";
/// Error key for rejected data updates.
pub const DATA_FIELD: &str = "data";

/// Builder for [`WorkflowEngine`].
pub struct EngineBuilder {
    config: WorkflowConfig,
    sink: Option<Arc<dyn StateSink>>,
    initial: Option<InitialState>,
    restore: bool,
}

impl EngineBuilder {
    /// Persist into `sink` instead of a private in-memory store.
    pub fn sink(mut self, sink: Arc<dyn StateSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Start from a partial state instead of restoring a snapshot.
    pub fn initial_state(mut self, initial: InitialState) -> Self {
        self.initial = Some(initial);
        self
    }

    /// Whether to restore a persisted snapshot when no initial state is set.
    pub fn restore(mut self, restore: bool) -> Self {
        self.restore = restore;
        self
    }

    /// Validate the configuration, set up state and start auto-save.
    ///
    /// Must run inside a tokio runtime when auto-save is enabled.
    pub async fn build(self) -> ConfigResult<WorkflowEngine> {
        let WorkflowConfig {
            id,
            name,
            steps,
            allow_back_navigation,
            auto_save,
            auto_save_interval,
            max_retries,
            retry_delay,
        } = self.config;

        let registry = StepRegistry::new(&id, steps)?;
        if auto_save && auto_save_interval.is_zero() {
            return Err(ConfigError::ZeroAutoSaveInterval(id));
        }
        let sink = self.sink.unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let persistence = PersistenceAdapter::new(sink).with_retry(max_retries, retry_delay);

        let mut state = match self.initial {
            Some(overlay) => {
                let mut state = WorkflowState::initial(&id, &registry.first().id);
                overlay.apply(&mut state);
                check_overlay(&state, &registry)?;
                state
            }
            None if self.restore => match persistence.load(&id, &registry).await {
                Some(restored) => restored,
                None => WorkflowState::initial(&id, &registry.first().id),
            },
            None => WorkflowState::initial(&id, &registry.first().id),
        };
        state.recompute(&registry, allow_back_navigation);

        tracing::debug!(workflow_id = %id, step = %state.current_step, steps = registry.len(), "Workflow engine ready");

        let state = Arc::new(Mutex::new(state));
        let autosave = auto_save.then(|| {
            AutoSaveScheduler::start(Arc::clone(&state), persistence.clone(), auto_save_interval)
        });

        Ok(WorkflowEngine {
            id,
            name,
            registry,
            allow_back_navigation,
            state,
            persistence,
            autosave,
            events: EventBus::new(),
        })
    }
}

fn check_overlay(state: &WorkflowState, registry: &StepRegistry) -> ConfigResult<()> {
    if !registry.contains(&state.current_step) {
        return Err(ConfigError::UnknownStep(state.current_step.clone()));
    }
    let mut resolved = state.completed_steps.iter().chain(state.skipped_steps.iter());
    if let Some(unknown) = resolved.find(|id| !registry.contains(id)) {
        return Err(ConfigError::UnknownStep(unknown.clone()));
    }
    if let Some(id) = state.completed_steps.intersection(&state.skipped_steps).next() {
        return Err(ConfigError::ConflictingStepStatus(id.clone()));
    }
    Ok(())
}

/// Drives one workflow instance through its registry.
#[derive(Debug)]
pub struct WorkflowEngine {
    id: String,
    name: String,
    registry: StepRegistry,
    allow_back_navigation: bool,
    state: Arc<Mutex<WorkflowState>>,
    persistence: PersistenceAdapter,
    autosave: Option<AutoSaveScheduler>,
    events: EventBus,
}

impl WorkflowEngine {
    /// Start building an engine for `config`.
    pub fn builder(config: WorkflowConfig) -> EngineBuilder {
        EngineBuilder { config, sink: None, initial: None, restore: true }
    }

    /// Workflow id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> WorkflowState {
        self.state.lock().clone()
    }

    /// Id of the active step.
    pub fn current_step(&self) -> String {
        self.state.lock().current_step.clone()
    }

    /// Definition of the active step.
    pub fn current_step_definition(&self) -> &StepDefinition {
        let current = self.current_step();
        self.registry.get(&current).unwrap_or_else(|| self.registry.first())
    }

    /// Zero-based position of the active step.
    pub fn current_step_index(&self) -> usize {
        self.registry.position(&self.state.lock().current_step).unwrap_or(0)
    }

    /// The step registry.
    pub fn steps(&self) -> &StepRegistry {
        &self.registry
    }

    /// Completion percentage.
    pub fn progress(&self) -> u8 {
        self.state.lock().progress
    }

    /// Current error messages.
    pub fn errors(&self) -> FieldMessages {
        self.state.lock().errors.clone()
    }

    /// Minutes estimated for the steps not yet completed or skipped.
    pub fn estimated_time_remaining(&self) -> u32 {
        let state = self.state.lock();
        self.registry
            .iter()
            .filter(|step| !state.is_resolved(&step.id))
            .filter_map(|step| step.estimated_time)
            .sum()
    }

    /// Whether the auto-save timer is running.
    pub fn is_auto_saving(&self) -> bool {
        self.autosave.is_some()
    }

    /// Whether every non-skippable step is completed or skipped.
    pub fn is_complete(&self) -> bool {
        let state = self.state.lock();
        self.registry.iter().filter(|step| !step.can_skip).all(|step| state.is_resolved(&step.id))
    }

    /// Register a listener for state changes.
    pub fn add_listener<F>(&mut self, listener: F) -> ListenerId
    where
        F: Fn(&WorkflowEvent) + Send + Sync + 'static,
    {
        self.events.add_listener(listener)
    }

    /// Unregister a listener.
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.events.remove_listener(id)
    }

    /// Validate the current step and advance to the next one.
    pub fn next_step(&mut self) -> bool {
        let current = self.current_step();
        if !self.passes_validation(&current) {
            return false;
        }
        self.advance(&current, false)
    }

    /// Validate and complete the last step.
    ///
    /// `next_step` has no successor to move to on the last step; this is how
    /// a workflow whose last step is mandatory gets completed.
    pub fn finish(&mut self) -> bool {
        let current = self.current_step();
        if self.registry.next_after(&current).is_some() {
            self.reject(NAVIGATION_FIELD, "Only the last step can be finished".to_string(), &current);
            return false;
        }
        if !self.passes_validation(&current) {
            return false;
        }

        let (previous, state) = self.mutate(|state| {
            state.mark_completed(&current);
            state.errors.clear();
            state.warnings.clear();
        });
        tracing::debug!(workflow_id = %self.id, step = %current, "Workflow finished");
        self.emit(EventKind::ProgressUpdated, previous, state, EventMetadata::for_step(&current));
        true
    }

    /// Move to the previous registry step.
    ///
    /// Leaving a step does not un-complete it.
    pub fn previous_step(&mut self) -> bool {
        let current = self.current_step();
        if !self.back_navigation_allowed(&current) {
            return false;
        }
        let Some(target) = self.registry.previous_before(&current).map(|s| s.id.clone()) else {
            return false;
        };

        let (previous, state) = self.mutate(|state| {
            state.current_step = target.clone();
            state.errors.clear();
            state.warnings.clear();
        });
        tracing::debug!(workflow_id = %self.id, from = %current, to = %target, "Moved back");
        self.emit(
            EventKind::StepChanged,
            previous,
            state,
            EventMetadata::moving(Direction::Backward, &current),
        );
        true
    }

    /// Jump directly to `target`.
    pub fn go_to_step(&mut self, target: &str) -> bool {
        let current = self.current_step();
        let Some(to) = self.registry.position(target) else {
            self.reject(NAVIGATION_FIELD, format!("Unknown step '{}'", target), &current);
            return false;
        };
        let from = self.current_step_index();
        if to == from {
            return true;
        }

        let direction = if to > from { Direction::Forward } else { Direction::Backward };
        if direction == Direction::Backward && !self.back_navigation_allowed(&current) {
            return false;
        }

        let (blocking, unmet) = {
            let state = self.state.lock();
            let blocking = self
                .registry
                .between(from, to)
                .iter()
                .find(|step| !step.can_skip && !state.is_resolved(&step.id))
                .map(|step| step.title.clone());
            let unmet: Vec<String> = self
                .registry
                .get(target)
                .map(|step| self.registry.unmet_dependencies(step, &state.completed_steps))
                .unwrap_or_default()
                .into_iter()
                .map(str::to_string)
                .collect();
            (blocking, unmet)
        };

        if let Some(title) = blocking {
            self.reject(NAVIGATION_FIELD, format!("Complete '{}' before jumping ahead", title), &current);
            return false;
        }
        if !unmet.is_empty() {
            self.reject(DEPENDENCIES_FIELD, self.dependency_message(target, &unmet), &current);
            return false;
        }

        let (previous, state) = self.mutate(|state| {
            state.current_step = target.to_string();
            state.errors.clear();
            state.warnings.clear();
        });
        tracing::debug!(workflow_id = %self.id, from = %current, to = target, "Jumped to step");
        self.emit(
            EventKind::StepChanged,
            previous,
            state,
            EventMetadata { is_direct_navigation: true, ..EventMetadata::moving(direction, &current) },
        );
        true
    }

    /// Skip the current step if it allows skipping.
    pub fn skip_step(&mut self) -> bool {
        let current = self.current_step_definition();
        if !current.can_skip {
            return false;
        }
        let current = current.id.clone();

        if self.registry.next_after(&current).is_some() {
            return self.advance(&current, true);
        }

        let (previous, state) = self.mutate(|state| {
            state.mark_skipped(&current);
            state.errors.clear();
            state.warnings.clear();
        });
        tracing::debug!(workflow_id = %self.id, step = %current, "Skipped last step");
        self.emit(
            EventKind::ProgressUpdated,
            previous,
            state,
            EventMetadata { skipped: true, ..EventMetadata::for_step(&current) },
        );
        true
    }

    /// Shallow-merge `partial` into a step's payload.
    ///
    /// Returns false for unknown step ids.
    pub fn update_step_data(&mut self, step_id: &str, partial: StepData) -> bool {
        if !self.registry.contains(step_id) {
            self.state
                .lock()
                .errors
                .insert(DATA_FIELD.to_string(), format!("Unknown step '{}'", step_id));
            return false;
        }

        let (previous, state) = self.mutate(|state| {
            let entry = state.step_data.entry(step_id.to_string()).or_default();
            for (key, value) in partial {
                entry.insert(key, value);
            }
        });
        self.emit(EventKind::DataUpdated, previous, state, EventMetadata::for_step(step_id));

        if let Some(autosave) = &self.autosave {
            autosave.request_save();
        }
        true
    }

    /// Set the busy flag and message.
    pub fn set_processing(&mut self, processing: bool, message: Option<String>) {
        let (previous, state) = self.mutate(|state| {
            state.is_processing = processing;
            state.processing_message = message;
        });
        let step = state.current_step.clone();
        self.emit(EventKind::ProgressUpdated, previous, state, EventMetadata::for_step(step));
    }

    /// Record an error message for `field`.
    pub fn add_error(&mut self, field: &str, message: &str) {
        let (previous, state) = self.mutate(|state| {
            state.errors.insert(field.to_string(), message.to_string());
        });
        let step = state.current_step.clone();
        self.emit(EventKind::ErrorOccurred, previous, state, EventMetadata::for_step(step));
    }

    /// Record a warning message for `field`.
    pub fn add_warning(&mut self, field: &str, message: &str) {
        let (previous, state) = self.mutate(|state| {
            state.warnings.insert(field.to_string(), message.to_string());
        });
        let step = state.current_step.clone();
        self.emit(EventKind::DataUpdated, previous, state, EventMetadata::for_step(step));
    }

    pub fn clear_errors(&mut self) {
        let (previous, state) = self.mutate(|state| state.errors.clear());
        let step = state.current_step.clone();
        self.emit(EventKind::DataUpdated, previous, state, EventMetadata::for_step(step));
    }

    pub fn clear_warnings(&mut self) {
        let (previous, state) = self.mutate(|state| state.warnings.clear());
        let step = state.current_step.clone();
        self.emit(EventKind::DataUpdated, previous, state, EventMetadata::for_step(step));
    }

    /// Drop persisted state and start over from the first step.
    pub async fn reset(&mut self) {
        self.persistence.clear(&self.id).await;

        let first = self.registry.first().id.clone();
        let id = self.id.clone();
        let (previous, state) = self.mutate(|state| {
            *state = WorkflowState::initial(id, first);
        });
        tracing::debug!(workflow_id = %self.id, "Workflow reset");
        self.emit(EventKind::ProgressUpdated, previous, state, EventMetadata::default());
    }

    /// Persist now. Returns whether the write succeeded.
    pub async fn save(&self) -> bool {
        let snapshot = self.state();
        match self.persistence.save(&snapshot).await {
            Some(stamp) => {
                self.state.lock().last_saved = Some(stamp);
                true
            }
            None => false,
        }
    }

    /// Stop auto-save and make one final save.
    pub async fn destroy(mut self) -> bool {
        if let Some(autosave) = self.autosave.take() {
            autosave.shutdown().await;
        }
        let saved = self.save().await;
        tracing::debug!(workflow_id = %self.id, saved, "Workflow engine destroyed");
        saved
    }

    fn passes_validation(&mut self, step_id: &str) -> bool {
        let data = self.state.lock().data_for(step_id);
        let Some(result) = self.registry.get(step_id).and_then(|step| step.validate(&data)) else {
            return true;
        };
        if result.is_valid {
            return true;
        }

        tracing::debug!(workflow_id = %self.id, step = step_id, errors = result.errors.len(), "Validation failed");
        let (previous, state) = self.mutate(|state| {
            state.errors = result.errors;
            state.warnings = result.warnings;
        });
        self.emit(EventKind::ValidationFailed, previous, state, EventMetadata::for_step(step_id));
        false
    }

    /// Forward transition from `from`, completing or skipping it.
    fn advance(&mut self, from: &str, skipped: bool) -> bool {
        let Some(next) = self.registry.next_after(from) else {
            return false;
        };
        let next_id = next.id.clone();

        let unmet: Vec<String> = {
            let state = self.state.lock();
            next.dependencies
                .iter()
                .filter(|d| !(state.completed_steps.contains(*d) || (!skipped && *d == from)))
                .cloned()
                .collect()
        };
        if !unmet.is_empty() {
            self.reject(DEPENDENCIES_FIELD, self.dependency_message(&next_id, &unmet), from);
            return false;
        }

        let (previous, state) = self.mutate(|state| {
            if skipped {
                state.mark_skipped(from);
            } else {
                state.mark_completed(from);
            }
            state.current_step = next_id.clone();
            state.errors.clear();
            state.warnings.clear();
        });
        tracing::debug!(workflow_id = %self.id, from, to = %next_id, skipped, "Advanced");
        self.emit(
            EventKind::StepChanged,
            previous,
            state,
            EventMetadata { skipped, ..EventMetadata::moving(Direction::Forward, from) },
        );
        true
    }

    fn dependency_message(&self, step_id: &str, unmet: &[String]) -> String {
        let title = self.registry.get(step_id).map_or(step_id, |s| s.title.as_str());
        let names: Vec<&str> = unmet
            .iter()
            .map(|id| self.registry.get(id).map_or(id.as_str(), |s| s.title.as_str()))
            .collect();
        format!("Complete {} before continuing to '{}'", names.join(", "), title)
    }

    /// Record a gating failure under `field` and notify listeners.
    /// Records a navigation error when backward moves are off.
    fn back_navigation_allowed(&mut self, current: &str) -> bool {
        if !self.allow_back_navigation {
            let message = "Back navigation is disabled for this workflow".to_string();
            self.reject(NAVIGATION_FIELD, message, current);
        }
        self.allow_back_navigation
    }

    fn reject(&mut self, field: &str, message: String, step_id: &str) {
        tracing::debug!(workflow_id = %self.id, step = step_id, field, message = %message, "Transition rejected");
        let (previous, state) = self.mutate(|state| {
            state.errors.insert(field.to_string(), message);
        });
        self.emit(EventKind::ErrorOccurred, previous, state, EventMetadata::for_step(step_id));
    }

    /// Apply `change` under the lock and re-derive progress and navigation.
    ///
    /// Returns the states before and after.
    fn mutate<F>(&self, change: F) -> (WorkflowState, WorkflowState)
    where
        F: FnOnce(&mut WorkflowState),
    {
        let mut state = self.state.lock();
        let previous = state.clone();
        change(&mut *state);
        state.recompute(&self.registry, self.allow_back_navigation);
        (previous, state.clone())
    }

    fn emit(
        &self,
        kind: EventKind,
        previous: WorkflowState,
        current: WorkflowState,
        metadata: EventMetadata,
    ) {
        if self.events.is_empty() {
            return;
        }
        self.events.emit(&WorkflowEvent {
            kind,
            previous_state: Some(previous),
            current_state: current,
            metadata: Some(metadata),
        });
    }
}

/// Payload built from `(key, value)` pairs.
pub fn step_data<I, K>(pairs: I) -> StepData
where
    I: IntoIterator<Item = (K, serde_json::Value)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::ValidationResult;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    fn name_required(data: &StepData) -> ValidationResult {
        match data.get("name").and_then(|v| v.as_str()) {
            Some(name) if !name.trim().is_empty() => ValidationResult::valid(),
            _ => ValidationResult::invalid("name", "Name is required"),
        }
    }

    fn config() -> WorkflowConfig {
        WorkflowConfig::new(
            "wf",
            "Test workflow",
            vec![
                StepDefinition::new("a", "A").with_estimated_time(5),
                StepDefinition::new("b", "B")
                    .depends_on(["a"])
                    .with_validator(name_required)
                    .with_estimated_time(10),
                StepDefinition::new("c", "C").skippable().depends_on(["b"]).with_estimated_time(3),
            ],
        )
        .with_auto_save(false)
    }

    async fn engine() -> WorkflowEngine {
        WorkflowEngine::builder(config()).build().await.unwrap()
    }

    #[tokio::test]
    async fn test_fresh_engine_starts_at_first_step() {
        let engine = engine().await;
        let state = engine.state();
        assert_eq!(state.current_step, "a");
        assert_eq!(state.progress, 0);
        assert!(!state.can_go_back);
        assert!(state.can_go_forward);
        assert_eq!(engine.current_step_index(), 0);
        assert_eq!(engine.estimated_time_remaining(), 18);
        assert!(!engine.is_auto_saving());
    }

    #[tokio::test]
    async fn test_validation_gates_next_step() {
        let mut engine = engine().await;
        assert!(engine.next_step());
        assert_eq!(engine.current_step(), "b");

        assert!(!engine.next_step());
        assert_eq!(engine.current_step(), "b");
        assert_eq!(engine.errors().get("name").map(String::as_str), Some("Name is required"));

        assert!(engine.update_step_data("b", step_data([("name", json!("Ada"))])));
        assert!(engine.next_step());
        let state = engine.state();
        assert_eq!(state.current_step, "c");
        assert!(state.errors.is_empty());
        assert_eq!(state.progress, 67);
    }

    #[tokio::test]
    async fn test_next_step_at_last_step_fails() {
        let mut engine = WorkflowEngine::builder(config())
            .initial_state(InitialState::at_step("c").with_completed(["a", "b"]))
            .build()
            .await
            .unwrap();
        assert!(!engine.next_step());
        assert_eq!(engine.current_step(), "c");
    }

    #[tokio::test]
    async fn test_skip_last_step_completes_workflow() {
        let mut engine = WorkflowEngine::builder(config())
            .initial_state(InitialState::at_step("c").with_completed(["a", "b"]))
            .build()
            .await
            .unwrap();
        assert!(engine.skip_step());
        let state = engine.state();
        assert!(state.skipped_steps.contains("c"));
        assert_eq!(state.progress, 100);
        assert!(engine.is_complete());
    }

    #[tokio::test]
    async fn test_skip_non_skippable_is_noop() {
        let mut engine = engine().await;
        let before = engine.state();
        assert!(!engine.skip_step());
        assert_eq!(engine.state(), before);
    }

    #[tokio::test]
    async fn test_skip_does_not_satisfy_dependencies() {
        let steps = vec![
            StepDefinition::new("a", "A").skippable(),
            StepDefinition::new("b", "B").depends_on(["a"]),
        ];
        let mut engine = WorkflowEngine::builder(
            WorkflowConfig::new("wf", "Workflow", steps).with_auto_save(false),
        )
        .build()
        .await
        .unwrap();

        assert!(!engine.skip_step());
        let state = engine.state();
        assert_eq!(state.current_step, "a");
        assert!(state.skipped_steps.is_empty());
        assert!(state.errors.contains_key(DEPENDENCIES_FIELD));
    }

    #[tokio::test]
    async fn test_previous_step_keeps_completion() {
        let mut engine = engine().await;
        assert!(engine.next_step());
        assert!(engine.previous_step());
        let state = engine.state();
        assert_eq!(state.current_step, "a");
        assert!(state.completed_steps.contains("a"));
        assert!(!engine.previous_step());
    }

    #[tokio::test]
    async fn test_back_navigation_disabled() {
        let mut engine = WorkflowEngine::builder(config().without_back_navigation())
            .build()
            .await
            .unwrap();
        assert!(engine.next_step());
        assert!(!engine.previous_step());
        assert!(!engine.go_to_step("a"));
        assert!(engine.errors().contains_key(NAVIGATION_FIELD));
        assert_eq!(engine.current_step(), "b");
    }

    #[tokio::test]
    async fn test_go_to_step_rules() {
        let mut engine = engine().await;

        assert!(!engine.go_to_step("missing"));
        assert!(engine.errors().contains_key(NAVIGATION_FIELD));

        // b is mandatory and unresolved
        assert!(!engine.go_to_step("c"));
        assert_eq!(engine.current_step(), "a");

        assert!(engine.go_to_step("a"));

        // b depends on a, which is not completed
        assert!(!engine.go_to_step("b"));
        assert!(engine.errors().contains_key(DEPENDENCIES_FIELD));

        assert!(engine.next_step());
        assert!(engine.go_to_step("a"));
        assert!(engine.go_to_step("b"));
        assert_eq!(engine.current_step(), "b");
    }

    #[tokio::test]
    async fn test_update_unknown_step_is_rejected() {
        let mut engine = engine().await;
        let events = Arc::new(StdMutex::new(0));
        let counter = Arc::clone(&events);
        engine.add_listener(move |_| *counter.lock().unwrap() += 1);

        assert!(!engine.update_step_data("ghost", step_data([("x", json!(1))])));
        assert!(engine.errors().contains_key(DATA_FIELD));
        assert_eq!(*events.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_step_data_merges_shallowly() {
        let mut engine = engine().await;
        engine.update_step_data("a", step_data([("x", json!(1)), ("y", json!(2))]));
        engine.update_step_data("a", step_data([("y", json!(3))]));
        let data = engine.state().data_for("a");
        assert_eq!(data.get("x"), Some(&json!(1)));
        assert_eq!(data.get("y"), Some(&json!(3)));
    }

    #[tokio::test]
    async fn test_listener_receives_step_change() {
        let mut engine = engine().await;
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = engine.add_listener(move |event| {
            sink.lock().unwrap().push((event.kind, event.metadata.clone()));
        });

        assert!(engine.next_step());
        assert!(engine.remove_listener(id));
        assert!(engine.previous_step());

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, EventKind::StepChanged);
        let metadata = seen[0].1.as_ref().unwrap();
        assert_eq!(metadata.direction, Some(Direction::Forward));
        assert_eq!(metadata.step_id.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_setters_update_state() {
        let mut engine = engine().await;
        engine.set_processing(true, Some("Generating".to_string()));
        engine.add_error("api", "down");
        engine.add_warning("name", "short");

        let state = engine.state();
        assert!(state.is_processing);
        assert_eq!(state.processing_message.as_deref(), Some("Generating"));
        assert_eq!(state.errors.len(), 1);
        assert_eq!(state.warnings.len(), 1);

        engine.clear_errors();
        engine.clear_warnings();
        let state = engine.state();
        assert!(state.errors.is_empty());
        assert!(state.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_finish_completes_last_step() {
        let steps = vec![StepDefinition::new("a", "A"), StepDefinition::new("b", "B")];
        let mut engine = WorkflowEngine::builder(
            WorkflowConfig::new("wf", "Workflow", steps).with_auto_save(false),
        )
        .build()
        .await
        .unwrap();

        assert!(!engine.finish());
        assert!(engine.next_step());
        assert!(!engine.is_complete());
        assert!(engine.finish());
        assert!(engine.is_complete());
        assert_eq!(engine.progress(), 100);
    }

    #[tokio::test]
    async fn test_invalid_overlay_rejected() {
        let err = WorkflowEngine::builder(config())
            .initial_state(InitialState::at_step("nope"))
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownStep(_)));
    }

    #[tokio::test]
    async fn test_zero_auto_save_interval_rejected() {
        let zero = || config().with_auto_save(true).with_auto_save_interval(Duration::ZERO);
        let err = WorkflowEngine::builder(zero()).build().await.unwrap_err();
        assert!(matches!(err, ConfigError::ZeroAutoSaveInterval(id) if id == "wf"));

        // Irrelevant when auto-save is off
        let engine = WorkflowEngine::builder(zero().with_auto_save(false)).build().await.unwrap();
        assert!(!engine.is_auto_saving());
    }

    #[tokio::test]
    async fn test_reset_returns_to_start() {
        let store = MemoryStore::new();
        let mut engine =
            WorkflowEngine::builder(config()).sink(Arc::new(store.clone())).build().await.unwrap();
        assert!(engine.next_step());
        assert!(engine.save().await);
        assert_eq!(store.len(), 1);

        engine.reset().await;
        assert!(store.is_empty());
        assert_eq!(engine.current_step(), "a");
        assert!(!engine.is_complete());
    }

    #[tokio::test]
    async fn test_restores_persisted_state() {
        let store = MemoryStore::new();
        let mut engine =
            WorkflowEngine::builder(config()).sink(Arc::new(store.clone())).build().await.unwrap();
        assert!(engine.next_step());
        assert!(engine.destroy().await);

        let engine =
            WorkflowEngine::builder(config()).sink(Arc::new(store.clone())).build().await.unwrap();
        assert_eq!(engine.current_step(), "b");
        assert!(engine.state().last_saved.is_some());

        let fresh = WorkflowEngine::builder(config())
            .sink(Arc::new(store))
            .restore(false)
            .build()
            .await
            .unwrap();
        assert_eq!(fresh.current_step(), "a");
    }
}
