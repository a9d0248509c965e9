//! Failure classification.
//!
//! Turns a raw [`FailureReport`] into a [`WorkflowError`] with a type,
//! severity and recovery flags. Rules are checked in a fixed priority order;
//! the first match wins.

use std::fmt;
use std::future::Future;
use std::io;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::fallback::{FallbackCatalog, FallbackWorkflow};
use super::log::{ErrorLog, ErrorStats, DEFAULT_ERROR_LOG_CAPACITY};
use super::strategies::{strategies_for, RecoveryStrategy};
use crate::core::{retry_with_backoff, RetryConfig};

/// Error codes that mean the remote end never answered.
const CONNECTIVITY_CODES: &[&str] = &[
    "ECONNREFUSED",
    "ECONNRESET",
    "ECONNABORTED",
    "ETIMEDOUT",
    "ENOTFOUND",
    "ENETUNREACH",
    "EHOSTUNREACH",
    "EAI_AGAIN",
    "NETWORK_ERROR",
];

const VALIDATION_CODES: &[&str] = &["VALIDATION_ERROR", "INVALID_INPUT", "SCHEMA_VALIDATION"];

/// Tokens marking a failure from a text-generation service.
const AI_MARKERS: &[&str] =
    &["ai", "openai", "anthropic", "llm", "model", "generation", "completion"];

/// Broad failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    Network,
    Authentication,
    RateLimit,
    Validation,
    AiService,
    Unknown,
}

impl ErrorType {
    /// All categories, in display order.
    pub const ALL: [ErrorType; 6] = [
        ErrorType::Network,
        ErrorType::Authentication,
        ErrorType::RateLimit,
        ErrorType::Validation,
        ErrorType::AiService,
        ErrorType::Unknown,
    ];

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorType::Network => "network",
            ErrorType::Authentication => "authentication",
            ErrorType::RateLimit => "rate_limit",
            ErrorType::Validation => "validation",
            ErrorType::AiService => "ai_service",
            ErrorType::Unknown => "unknown",
        }
    }

    /// Short explanation for end users.
    pub fn user_message(self) -> &'static str {
        match self {
            ErrorType::Network => "We couldn't reach the server. Check your connection.",
            ErrorType::Authentication => "Your session has expired. Please sign in again.",
            ErrorType::RateLimit => "Too many requests. Please wait a moment.",
            ErrorType::Validation => "Some of the information entered needs attention.",
            ErrorType::AiService => "The generation service is having trouble right now.",
            ErrorType::Unknown => "Something went wrong.",
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ErrorType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown error type '{}'", s))
    }
}

/// How disruptive a failure is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// A raw failure as seen by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailureReport {
    pub message: String,
    /// HTTP status, when the failure came from a response.
    pub status: Option<u16>,
    /// Transport or application error code.
    pub code: Option<String>,
    /// Tag naming the service that failed.
    pub service: Option<String>,
    /// The request never got a response.
    pub no_response: bool,
    /// The caller already knows this is an input problem.
    pub validation: bool,
    /// Free-form detail carried into the classified error.
    pub details: Option<Value>,
}

impl FailureReport {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), ..Default::default() }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn without_response(mut self) -> Self {
        self.no_response = true;
        self
    }

    pub fn as_validation(mut self) -> Self {
        self.validation = true;
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl From<&io::Error> for FailureReport {
    fn from(err: &io::Error) -> Self {
        let code = match err.kind() {
            io::ErrorKind::ConnectionRefused => Some("ECONNREFUSED"),
            io::ErrorKind::ConnectionReset => Some("ECONNRESET"),
            io::ErrorKind::ConnectionAborted => Some("ECONNABORTED"),
            io::ErrorKind::TimedOut => Some("ETIMEDOUT"),
            io::ErrorKind::NotConnected => Some("ENETUNREACH"),
            io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => Some("INVALID_INPUT"),
            _ => None,
        };
        let mut report = FailureReport::new(err.to_string());
        report.code = code.map(str::to_string);
        report
    }
}

/// Where a failure happened.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    pub workflow_id: Option<String>,
    pub step: Option<String>,
    /// What the caller was doing, e.g. "generate curriculum".
    pub action: Option<String>,
}

impl ErrorContext {
    pub fn at_step(step: impl Into<String>) -> Self {
        Self { step: Some(step.into()), ..Default::default() }
    }

    pub fn in_workflow(mut self, workflow_id: impl Into<String>) -> Self {
        self.workflow_id = Some(workflow_id.into());
        self
    }

    pub fn during(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }
}

/// A classified failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowError {
    pub id: String,
    #[serde(rename = "type")]
    pub error_type: ErrorType,
    pub severity: Severity,
    pub message: String,
    /// User-facing explanation of the category.
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    pub recoverable: bool,
    pub retryable: bool,
    pub fallback_available: bool,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of the classification rules, before an error is minted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub error_type: ErrorType,
    pub severity: Severity,
    pub recoverable: bool,
    pub retryable: bool,
    pub fallback_available: bool,
}

impl Classification {
    const fn of(error_type: ErrorType) -> Self {
        let (severity, recoverable, retryable, fallback_available) = match error_type {
            ErrorType::Network => (Severity::Medium, true, true, true),
            ErrorType::Authentication => (Severity::High, true, false, false),
            ErrorType::RateLimit => (Severity::Medium, true, true, true),
            ErrorType::Validation => (Severity::Low, true, false, false),
            ErrorType::AiService => (Severity::High, true, true, true),
            ErrorType::Unknown => (Severity::Medium, true, true, true),
        };
        Self { error_type, severity, recoverable, retryable, fallback_available }
    }
}

/// Apply the classification rules to a report.
pub fn classify_report(report: &FailureReport) -> Classification {
    let error_type = if is_connectivity_failure(report) {
        ErrorType::Network
    } else if matches!(report.status, Some(401 | 403)) {
        ErrorType::Authentication
    } else if report.status == Some(429) {
        ErrorType::RateLimit
    } else if report.status.is_some_and(|s| (500..600).contains(&s)) {
        // A failing AI provider surfaces as a 5xx too
        if has_ai_marker(report) {
            ErrorType::AiService
        } else {
            ErrorType::Network
        }
    } else if is_validation_failure(report) {
        ErrorType::Validation
    } else if has_ai_marker(report) {
        ErrorType::AiService
    } else {
        ErrorType::Unknown
    };
    Classification::of(error_type)
}

fn is_connectivity_failure(report: &FailureReport) -> bool {
    report.no_response
        || report
            .code
            .as_deref()
            .is_some_and(|code| CONNECTIVITY_CODES.iter().any(|c| c.eq_ignore_ascii_case(code)))
}

fn is_validation_failure(report: &FailureReport) -> bool {
    report.validation
        || report.status == Some(422)
        || report
            .code
            .as_deref()
            .is_some_and(|code| VALIDATION_CODES.iter().any(|c| c.eq_ignore_ascii_case(code)))
}

fn has_ai_marker(report: &FailureReport) -> bool {
    let tagged = report.service.as_deref().is_some_and(|service| contains_marker(service));
    tagged || contains_marker(&report.message)
}

fn contains_marker(text: &str) -> bool {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .any(|token| AI_MARKERS.iter().any(|marker| marker.eq_ignore_ascii_case(token)))
}

/// Classifies failures, keeps a bounded log of them and knows how to recover.
///
/// Shareable behind an `Arc`; the log has its own lock.
#[derive(Debug)]
pub struct ErrorClassifier {
    log: Mutex<ErrorLog>,
    fallbacks: FallbackCatalog,
    retry: RetryConfig,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorClassifier {
    /// Classifier with the built-in fallbacks and a 100-entry log.
    pub fn new() -> Self {
        Self {
            log: Mutex::new(ErrorLog::new(DEFAULT_ERROR_LOG_CAPACITY)),
            fallbacks: FallbackCatalog::with_defaults(),
            retry: RetryConfig::api(),
        }
    }

    /// Change the error log capacity, dropping recorded entries.
    pub fn with_log_capacity(self, capacity: usize) -> Self {
        Self { log: Mutex::new(ErrorLog::new(capacity)), ..self }
    }

    /// Replace the fallback catalog.
    pub fn with_fallbacks(mut self, fallbacks: FallbackCatalog) -> Self {
        self.fallbacks = fallbacks;
        self
    }

    /// Retry policy used by [`ErrorClassifier::retry_with_backoff`].
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Classify and record a failure.
    pub fn classify(&self, report: &FailureReport, context: &ErrorContext) -> WorkflowError {
        let classification = classify_report(report);
        let error = WorkflowError {
            id: uuid::Uuid::new_v4().to_string(),
            error_type: classification.error_type,
            severity: classification.severity,
            message: report.message.clone(),
            summary: classification.error_type.user_message().to_string(),
            details: report.details.clone(),
            step: context.step.clone(),
            recoverable: classification.recoverable,
            retryable: classification.retryable,
            fallback_available: classification.fallback_available,
            timestamp: Utc::now(),
        };

        tracing::warn!(
            error_id = %error.id,
            error_type = %error.error_type,
            severity = %error.severity,
            step = error.step.as_deref().unwrap_or("-"),
            workflow_id = context.workflow_id.as_deref().unwrap_or("-"),
            "Workflow error: {}",
            error.message
        );

        self.log.lock().record(error.clone());
        error
    }

    /// Ordered recovery strategies for a category. Never empty.
    pub fn recovery_strategies(&self, error_type: ErrorType) -> &'static [RecoveryStrategy] {
        strategies_for(error_type)
    }

    /// Alternate workflow for an error at a step, if one is mapped.
    ///
    /// The step comes from the error, or from `context` when the error has none.
    pub fn fallback_workflow(
        &self,
        error: &WorkflowError,
        context: &ErrorContext,
    ) -> Option<&FallbackWorkflow> {
        let step = error.step.as_deref().or(context.step.as_deref())?;
        self.fallbacks.lookup(error.error_type, step)
    }

    /// Map an additional (type, step) pair to a fallback workflow.
    pub fn register_fallback(
        &mut self,
        error_type: ErrorType,
        step: impl Into<String>,
        workflow: FallbackWorkflow,
    ) {
        self.fallbacks.register(error_type, step, workflow);
    }

    /// Retry `operation` with the configured schedule, returning the last failure.
    pub async fn retry_with_backoff<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        retry_with_backoff(&self.retry, operation).await
    }

    /// Most recent errors, newest first.
    pub fn recent_errors(&self, limit: usize) -> Vec<WorkflowError> {
        self.log.lock().recent(limit).into_iter().cloned().collect()
    }

    /// Aggregate counts over everything classified so far.
    pub fn stats(&self) -> ErrorStats {
        self.log.lock().stats()
    }

    /// Forget recorded errors.
    pub fn clear_log(&self) {
        self.log.lock().clear();
    }
}
