//! Error types for the workflow engine and its storage layer.
//!
//! Gating failures (validation, dependencies, illegal navigation) are not
//! errors in this sense: they are reported through `WorkflowState::errors`
//! and a `false` return. The types here cover misconfiguration and I/O.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for engine construction.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for sink operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type for workflow definition parsing.
pub type DefinitionResult<T> = Result<T, DefinitionError>;

/// Errors raised while building an engine from a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The step registry is empty.
    #[error("Workflow '{0}' has no steps")]
    EmptyRegistry(String),

    /// Two steps share the same id.
    #[error("Duplicate step id '{0}'")]
    DuplicateStep(String),

    /// A step depends on an id that is not in the registry.
    #[error("Step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency { step: String, dependency: String },

    /// An initial state overlay references a step outside the registry.
    #[error("Initial state references unknown step '{0}'")]
    UnknownStep(String),

    /// An initial state overlay marks a step both completed and skipped.
    #[error("Step '{0}' cannot be both completed and skipped")]
    ConflictingStepStatus(String),

    /// Auto-save is enabled with a zero interval.
    #[error("Auto-save interval for workflow '{0}' must be greater than zero")]
    ZeroAutoSaveInterval(String),
}

/// Errors raised by a state sink.
#[derive(Debug, Error)]
pub enum StorageError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored record could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored record carries a schema version this build cannot read.
    #[error("Unsupported state version {0}")]
    UnsupportedVersion(u64),

    /// A stored record is structurally invalid.
    #[error("Invalid stored state: {0}")]
    Invalid(String),

    /// The sink refused the operation.
    #[error("Sink unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised while parsing a workflow definition file.
#[derive(Debug, Error)]
pub enum DefinitionError {
    /// Definition file could not be read.
    #[error("Failed to read definition {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Definition is not valid YAML for the expected schema.
    #[error("Invalid definition: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Definition parsed but violates a structural rule.
    #[error("Invalid definition: {0}")]
    Invalid(String),
}
