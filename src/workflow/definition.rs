//! Workflow definition files.
//!
//! Parses YAML workflow definitions into a [`WorkflowConfig`]. Field rules
//! declared per step (`required`, `warn_if_missing`) become the step's
//! validator.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::config::WorkflowConfig;
use super::step::{StepData, StepDefinition, ValidationResult};
use crate::error::{DefinitionError, DefinitionResult};

/// A workflow as written in a definition file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Workflow id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub allow_back_navigation: bool,
    /// Steps in order.
    pub steps: Vec<StepSpec>,
}

/// One step in a definition file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSpec {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub can_skip: bool,
    /// Minutes.
    #[serde(default)]
    pub estimated_time: Option<u32>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Fields that must be present and non-empty to advance.
    #[serde(default)]
    pub required: Vec<String>,
    /// Fields that only produce a warning when missing.
    #[serde(default)]
    pub warn_if_missing: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl StepSpec {
    /// Build the runtime step, attaching a validator when any rule is declared.
    pub fn to_step(&self) -> StepDefinition {
        let mut step = StepDefinition::new(&self.id, &self.title)
            .with_description(&self.description)
            .depends_on(self.dependencies.iter().cloned());
        if self.can_skip {
            step = step.skippable();
        }
        if let Some(minutes) = self.estimated_time {
            step = step.with_estimated_time(minutes);
        }

        if !self.required.is_empty() || !self.warn_if_missing.is_empty() {
            let required = self.required.clone();
            let recommended = self.warn_if_missing.clone();
            step = step.with_validator(move |data| check_fields(data, &required, &recommended));
        }
        step
    }
}

impl WorkflowDefinition {
    /// Engine configuration with default persistence settings.
    pub fn to_config(&self) -> WorkflowConfig {
        let steps = self.steps.iter().map(StepSpec::to_step).collect();
        let mut config = WorkflowConfig::new(&self.id, &self.name, steps);
        config.allow_back_navigation = self.allow_back_navigation;
        config
    }

    /// Look up a step spec by id.
    pub fn step(&self, id: &str) -> Option<&StepSpec> {
        self.steps.iter().find(|s| s.id == id)
    }
}

/// Parse a definition from a file.
pub fn parse_definition(path: &Path) -> DefinitionResult<WorkflowDefinition> {
    let content = std::fs::read_to_string(path)
        .map_err(|source| DefinitionError::Read { path: path.to_path_buf(), source })?;
    parse_definition_str(&content)
}

/// Parse a definition from a string.
pub fn parse_definition_str(content: &str) -> DefinitionResult<WorkflowDefinition> {
    let definition: WorkflowDefinition = serde_yaml::from_str(content)?;
    validate_definition(&definition)?;
    Ok(definition)
}

fn validate_definition(definition: &WorkflowDefinition) -> DefinitionResult<()> {
    if definition.id.trim().is_empty() {
        return Err(DefinitionError::Invalid("workflow id cannot be empty".to_string()));
    }
    if definition.name.trim().is_empty() {
        return Err(DefinitionError::Invalid("workflow name cannot be empty".to_string()));
    }
    if definition.steps.is_empty() {
        return Err(DefinitionError::Invalid("workflow must have at least one step".to_string()));
    }

    let mut seen = HashSet::new();
    for (i, step) in definition.steps.iter().enumerate() {
        if step.id.trim().is_empty() {
            return Err(DefinitionError::Invalid(format!("step {} has no id", i + 1)));
        }
        if step.title.trim().is_empty() {
            return Err(DefinitionError::Invalid(format!("step '{}' has no title", step.id)));
        }

        // Dependencies must name a step declared earlier
        for dependency in &step.dependencies {
            if !seen.contains(dependency.as_str()) {
                let reason = if definition.steps.iter().any(|s| &s.id == dependency) {
                    "a later step"
                } else {
                    "an unknown step"
                };
                return Err(DefinitionError::Invalid(format!(
                    "step '{}' depends on {} '{}'",
                    step.id, reason, dependency
                )));
            }
        }

        if !seen.insert(step.id.as_str()) {
            return Err(DefinitionError::Invalid(format!("duplicate step id '{}'", step.id)));
        }
    }

    Ok(())
}

fn check_fields(data: &StepData, required: &[String], recommended: &[String]) -> ValidationResult {
    let mut result = ValidationResult::valid();
    for field in required {
        if is_blank(data.get(field)) {
            result = result.with_error(field, format!("{} is required", field));
        }
    }
    for field in recommended {
        if is_blank(data.get(field)) {
            result = result.with_warning(field, format!("{} is recommended", field));
        }
    }
    result
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Object(fields)) => fields.is_empty(),
        Some(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SAMPLE: &str = r"
id: project-setup
name: Project setup
steps:
  - id: skill-assessment
    title: Skill assessment
    required: [level]
    warn_if_missing: [goals]
    estimated_time: 5
  - id: technology-selection
    title: Technology selection
    dependencies: [skill-assessment]
    can_skip: true
";

    #[test]
    fn test_parse_valid_definition() {
        let definition = parse_definition_str(SAMPLE).unwrap();
        assert_eq!(definition.id, "project-setup");
        assert!(definition.allow_back_navigation);
        assert_eq!(definition.steps.len(), 2);
        assert!(definition.step("technology-selection").unwrap().can_skip);
    }

    #[test]
    fn test_rules_become_validator() {
        let definition = parse_definition_str(SAMPLE).unwrap();
        let config = definition.to_config();
        let step = &config.steps[0];
        assert!(step.has_validator());
        assert!(!config.steps[1].has_validator());

        let mut data = StepData::new();
        let result = step.validate(&data).unwrap();
        assert!(!result.is_valid);
        assert!(result.errors.contains_key("level"));
        assert!(result.warnings.contains_key("goals"));

        data.insert("level".to_string(), json!("beginner"));
        let result = step.validate(&data).unwrap();
        assert!(result.is_valid);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_blank_values() {
        assert!(is_blank(None));
        assert!(is_blank(Some(&json!(null))));
        assert!(is_blank(Some(&json!("  "))));
        assert!(is_blank(Some(&json!([]))));
        assert!(!is_blank(Some(&json!(0))));
        assert!(!is_blank(Some(&json!(false))));
    }

    #[test]
    fn test_parse_empty_name_fails() {
        let yaml = r"
id: wf
name: ''
steps:
  - id: a
    title: A
";
        assert!(matches!(parse_definition_str(yaml), Err(DefinitionError::Invalid(_))));
    }

    #[test]
    fn test_parse_no_steps_fails() {
        let yaml = r"
id: wf
name: Workflow
steps: []
";
        assert!(parse_definition_str(yaml).is_err());
    }

    #[test]
    fn test_forward_dependency_fails() {
        let yaml = r"
id: wf
name: Workflow
steps:
  - id: a
    title: A
    dependencies: [b]
  - id: b
    title: B
";
        let err = parse_definition_str(yaml).unwrap_err();
        assert!(err.to_string().contains("a later step"));
    }

    #[test]
    fn test_duplicate_step_fails() {
        let yaml = r"
id: wf
name: Workflow
steps:
  - id: a
    title: A
  - id: a
    title: Again
";
        assert!(parse_definition_str(yaml).unwrap_err().to_string().contains("duplicate"));
    }

    #[test]
    fn test_malformed_yaml_fails() {
        assert!(matches!(parse_definition_str("id: [unclosed"), Err(DefinitionError::Parse(_))));
    }

    #[test]
    fn test_parse_missing_file() {
        let err = parse_definition(Path::new("/nonexistent/workflow.yaml")).unwrap_err();
        assert!(matches!(err, DefinitionError::Read { .. }));
    }
}
