//! Fallback workflows for steps that depend on external services.
//!
//! When a step backed by a generation or discovery service fails beyond
//! retrying, the caller can switch to a simpler, manual workflow that seeds
//! a fresh engine.

use std::collections::HashMap;

use super::classifier::ErrorType;
use crate::workflow::{StepData, StepDefinition, ValidationResult, WorkflowConfig};

/// Step ids with built-in fallbacks.
pub const CURRICULUM_GENERATION: &str = "curriculum-generation";
pub const REPOSITORY_DISCOVERY: &str = "repository-discovery";
pub const REPOSITORY_SELECTION: &str = "repository-selection";
pub const TECHNOLOGY_RECOMMENDATION: &str = "technology-recommendation";

/// An alternate step sequence.
#[derive(Debug, Clone)]
pub struct FallbackWorkflow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub steps: Vec<StepDefinition>,
}

impl FallbackWorkflow {
    pub fn new(id: impl Into<String>, name: impl Into<String>, steps: Vec<StepDefinition>) -> Self {
        Self { id: id.into(), name: name.into(), description: String::new(), steps }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Engine configuration for running this fallback.
    pub fn to_config(&self) -> WorkflowConfig {
        WorkflowConfig::new(&self.id, &self.name, self.steps.clone())
    }
}

/// (error type, step id) -> fallback workflow.
#[derive(Debug, Clone, Default)]
pub struct FallbackCatalog {
    entries: HashMap<(ErrorType, String), FallbackWorkflow>,
}

impl FallbackCatalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the built-in mappings for service-backed steps.
    pub fn with_defaults() -> Self {
        let mut catalog = Self::new();

        let curriculum = manual_curriculum();
        let repository = manual_repository_selection();
        let technology = preset_technology_stack();

        for error_type in [ErrorType::AiService, ErrorType::Network] {
            catalog.register(error_type, CURRICULUM_GENERATION, curriculum.clone());
            catalog.register(error_type, REPOSITORY_DISCOVERY, repository.clone());
            catalog.register(error_type, REPOSITORY_SELECTION, repository.clone());
            catalog.register(error_type, TECHNOLOGY_RECOMMENDATION, technology.clone());
        }
        catalog.register(ErrorType::RateLimit, REPOSITORY_DISCOVERY, repository.clone());
        catalog.register(ErrorType::RateLimit, REPOSITORY_SELECTION, repository);

        catalog
    }

    /// Add or replace a mapping.
    pub fn register(
        &mut self,
        error_type: ErrorType,
        step: impl Into<String>,
        workflow: FallbackWorkflow,
    ) {
        self.entries.insert((error_type, step.into()), workflow);
    }

    /// Fallback for a failure of `error_type` at `step`.
    pub fn lookup(&self, error_type: ErrorType, step: &str) -> Option<&FallbackWorkflow> {
        self.entries.get(&(error_type, step.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn require(field: &'static str, message: &'static str) -> impl Fn(&StepData) -> ValidationResult {
    move |data| {
        let present = data
            .get(field)
            .and_then(|v| v.as_str())
            .is_some_and(|s| !s.trim().is_empty());
        if present {
            ValidationResult::valid()
        } else {
            ValidationResult::invalid(field, message)
        }
    }
}

fn manual_curriculum() -> FallbackWorkflow {
    FallbackWorkflow::new(
        "manual-curriculum",
        "Build a curriculum manually",
        vec![
            StepDefinition::new("choose-template", "Choose a curriculum template")
                .with_validator(require("template", "Pick a template to start from"))
                .with_estimated_time(3),
            StepDefinition::new("customize-modules", "Adjust modules")
                .depends_on(["choose-template"])
                .skippable()
                .with_estimated_time(10),
            StepDefinition::new("confirm-curriculum", "Confirm curriculum")
                .depends_on(["choose-template"])
                .with_estimated_time(2),
        ],
    )
    .with_description("Start from a curated template instead of a generated curriculum.")
}

fn manual_repository_selection() -> FallbackWorkflow {
    FallbackWorkflow::new(
        "manual-repository-selection",
        "Pick a repository manually",
        vec![
            StepDefinition::new("enter-repository-url", "Enter a repository URL")
                .with_validator(require("url", "Enter the repository URL"))
                .with_estimated_time(2),
            StepDefinition::new("confirm-repository", "Confirm repository")
                .depends_on(["enter-repository-url"])
                .with_estimated_time(1),
        ],
    )
    .with_description("Enter a repository yourself instead of using discovery.")
}

fn preset_technology_stack() -> FallbackWorkflow {
    FallbackWorkflow::new(
        "preset-technology-stack",
        "Choose a preset stack",
        vec![
            StepDefinition::new("pick-preset-stack", "Pick a preset stack")
                .with_validator(require("stack", "Pick one of the preset stacks"))
                .with_estimated_time(3),
            StepDefinition::new("confirm-stack", "Confirm stack")
                .depends_on(["pick-preset-stack"])
                .with_estimated_time(1),
        ],
    )
    .with_description("Choose from common stacks instead of a tailored recommendation.")
}
