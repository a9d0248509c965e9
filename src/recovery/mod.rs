//! Failure classification and recovery.
//!
//! Callers report failures from the services their steps depend on. The
//! [`ErrorClassifier`] turns each report into a typed [`WorkflowError`],
//! records it, and offers [`RecoveryStrategy`]s plus, for service-backed
//! steps, a [`FallbackWorkflow`] to continue without the service.

mod classifier;
mod fallback;
mod log;
mod strategies;

pub use classifier::{
    classify_report, Classification, ErrorClassifier, ErrorContext, ErrorType, FailureReport,
    Severity, WorkflowError,
};
pub use fallback::{
    FallbackCatalog, FallbackWorkflow, CURRICULUM_GENERATION, REPOSITORY_DISCOVERY,
    REPOSITORY_SELECTION, TECHNOLOGY_RECOMMENDATION,
};
pub use log::{ErrorLog, ErrorStats, DEFAULT_ERROR_LOG_CAPACITY};
pub use strategies::{
    strategies_for, RecoveryAction, RecoveryHandler, RecoveryOutcome, RecoveryStrategy,
};
