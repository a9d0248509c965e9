//! Step definitions and the ordered step registry.
//!
//! A registry is the immutable, ordered list of steps a workflow walks
//! through. Steps carry an optional validator and a list of dependencies
//! that must be completed before the step can be entered going forward.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ConfigError, ConfigResult};

/// Opaque per-step payload. The engine only hands it to validators.
pub type StepData = Map<String, Value>;

/// Field name -> message.
pub type FieldMessages = BTreeMap<String, String>;

/// Pure validation function over a step's payload.
pub type Validator = Arc<dyn Fn(&StepData) -> ValidationResult + Send + Sync>;

/// Outcome of validating a step's payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    /// Whether the payload may be advanced past.
    pub is_valid: bool,
    /// Blocking messages keyed by field.
    pub errors: FieldMessages,
    /// Non-blocking messages keyed by field.
    #[serde(default)]
    pub warnings: FieldMessages,
}

impl ValidationResult {
    /// A passing result with no messages.
    pub fn valid() -> Self {
        Self { is_valid: true, errors: FieldMessages::new(), warnings: FieldMessages::new() }
    }

    /// A failing result with a single field error.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::valid().with_error(field, message)
    }

    /// Add a field error. Any error makes the result invalid.
    pub fn with_error(mut self, field: impl Into<String>, message: impl Into<String>) -> Self {
        self.errors.insert(field.into(), message.into());
        self.is_valid = false;
        self
    }

    /// Add a field warning. Warnings never block.
    pub fn with_warning(mut self, field: impl Into<String>, message: impl Into<String>) -> Self {
        self.warnings.insert(field.into(), message.into());
        self
    }
}

/// Immutable definition of one step.
#[derive(Clone)]
pub struct StepDefinition {
    /// Unique id within the registry.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Longer description.
    pub description: String,
    /// Whether the step may be skipped.
    pub can_skip: bool,
    /// Estimated time to complete, in minutes.
    pub estimated_time: Option<u32>,
    /// Steps that must be completed before this one is entered going forward.
    pub dependencies: Vec<String>,
    validator: Option<Validator>,
}

impl fmt::Debug for StepDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDefinition")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("can_skip", &self.can_skip)
            .field("estimated_time", &self.estimated_time)
            .field("dependencies", &self.dependencies)
            .field("has_validator", &self.validator.is_some())
            .finish()
    }
}

impl StepDefinition {
    /// Create a step with no validator, no dependencies, not skippable.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            can_skip: false,
            estimated_time: None,
            dependencies: Vec::new(),
            validator: None,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Mark the step as skippable.
    pub fn skippable(mut self) -> Self {
        self.can_skip = true;
        self
    }

    /// Set the estimated time in minutes.
    pub fn with_estimated_time(mut self, minutes: u32) -> Self {
        self.estimated_time = Some(minutes);
        self
    }

    /// Declare dependencies.
    pub fn depends_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Attach a validator.
    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&StepData) -> ValidationResult + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Whether a validator is attached.
    pub fn has_validator(&self) -> bool {
        self.validator.is_some()
    }

    /// Run the validator, if any.
    pub fn validate(&self, data: &StepData) -> Option<ValidationResult> {
        self.validator.as_ref().map(|validate| validate(data))
    }
}

/// Ordered, immutable list of steps.
#[derive(Debug, Clone)]
pub struct StepRegistry {
    steps: Vec<StepDefinition>,
    index: HashMap<String, usize>,
}

impl StepRegistry {
    /// Build a registry, rejecting empty lists, duplicate ids and unknown dependencies.
    pub fn new(workflow_id: &str, steps: Vec<StepDefinition>) -> ConfigResult<Self> {
        if steps.is_empty() {
            return Err(ConfigError::EmptyRegistry(workflow_id.to_string()));
        }

        let mut index = HashMap::with_capacity(steps.len());
        for (i, step) in steps.iter().enumerate() {
            if index.insert(step.id.clone(), i).is_some() {
                return Err(ConfigError::DuplicateStep(step.id.clone()));
            }
        }

        for step in &steps {
            if let Some(dependency) = step.dependencies.iter().find(|d| !index.contains_key(*d)) {
                return Err(ConfigError::UnknownDependency {
                    step: step.id.clone(),
                    dependency: dependency.clone(),
                });
            }
        }

        Ok(Self { steps, index })
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Always false for a constructed registry.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The first step.
    pub fn first(&self) -> &StepDefinition {
        &self.steps[0]
    }

    /// Look up a step by id.
    pub fn get(&self, id: &str) -> Option<&StepDefinition> {
        self.index.get(id).map(|&i| &self.steps[i])
    }

    /// Registry position of a step.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Whether the id belongs to the registry.
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Iterate steps in order.
    pub fn iter(&self) -> impl Iterator<Item = &StepDefinition> {
        self.steps.iter()
    }

    /// The step right after `id`, if any.
    pub fn next_after(&self, id: &str) -> Option<&StepDefinition> {
        self.position(id).and_then(|i| self.steps.get(i + 1))
    }

    /// The step right before `id`, if any.
    pub fn previous_before(&self, id: &str) -> Option<&StepDefinition> {
        self.position(id).and_then(|i| i.checked_sub(1)).and_then(|i| self.steps.get(i))
    }

    /// Steps strictly between two positions, in order.
    pub fn between(&self, from: usize, to: usize) -> &[StepDefinition] {
        if to <= from + 1 {
            return &[];
        }
        &self.steps[from + 1..to]
    }

    /// Dependencies of `step` that are not in `completed`.
    pub fn unmet_dependencies<'a>(
        &self,
        step: &'a StepDefinition,
        completed: &BTreeSet<String>,
    ) -> Vec<&'a str> {
        step.dependencies.iter().filter(|d| !completed.contains(*d)).map(String::as_str).collect()
    }
}
