//! # Stepwise
//!
//! A multi-step workflow engine with validation gating, dependency checks,
//! listener notifications and crash-safe persistence.
//!
//! ## Features
//!
//! - **Gated navigation**: steps advance only when their validator passes
//!   and their dependencies are completed
//! - **Persistence**: versioned JSON snapshots with periodic auto-save
//! - **Listeners**: synchronous change notifications, isolated from panics
//! - **Recovery**: failure classification, recovery strategies and
//!   fallback workflows for service-backed steps
//! - **Definitions**: workflows described in YAML
//!
//! ## Quick Start
//!
//! ```bash
//! stepwise validate onboarding.yaml
//! stepwise status onboarding.yaml
//! stepwise set onboarding.yaml profile name=Ada
//! stepwise next onboarding.yaml
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Allow common patterns that are intentional in this codebase
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::redundant_clone)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_truncation)]

pub mod core;
pub mod error;
pub mod recovery;
pub mod storage;
pub mod workflow;

pub use crate::core::Settings;
pub use error::{ConfigError, DefinitionError, StorageError};
pub use recovery::{ErrorClassifier, ErrorContext, ErrorType, FailureReport, WorkflowError};
pub use storage::{FileStore, MemoryStore, PersistenceAdapter, StateSink};
pub use workflow::{
    InitialState, StepDefinition, StepRegistry, ValidationResult, WorkflowConfig, WorkflowEngine,
    WorkflowEvent, WorkflowState,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "stepwise";
