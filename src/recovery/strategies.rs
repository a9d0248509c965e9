//! Recovery strategies offered for each error category.

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use super::classifier::{ErrorType, WorkflowError};

/// Something the caller can do about a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecoveryAction {
    RetryWithBackoff,
    CheckConnectivity,
    UseCachedData,
    RefreshCredentials,
    ForceRelogin,
    WaitAndRetry,
    ReviewInput,
    GoBack,
    UseFallbackWorkflow,
}

impl RecoveryAction {
    pub fn id(self) -> &'static str {
        match self {
            RecoveryAction::RetryWithBackoff => "retry-with-backoff",
            RecoveryAction::CheckConnectivity => "check-connectivity",
            RecoveryAction::UseCachedData => "use-cached-data",
            RecoveryAction::RefreshCredentials => "refresh-credentials",
            RecoveryAction::ForceRelogin => "force-relogin",
            RecoveryAction::WaitAndRetry => "wait-and-retry",
            RecoveryAction::ReviewInput => "review-input",
            RecoveryAction::GoBack => "go-back",
            RecoveryAction::UseFallbackWorkflow => "use-fallback-workflow",
        }
    }
}

impl fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// What happened when a strategy ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// The failure is resolved; the caller can resume.
    Recovered,
    /// The strategy ran but did not help.
    Failed(String),
    /// The handler does not implement this action.
    Unsupported,
}

impl RecoveryOutcome {
    pub fn is_recovered(&self) -> bool {
        matches!(self, RecoveryOutcome::Recovered)
    }
}

/// Caller-provided executor for recovery actions.
///
/// Only the actions a caller can perform need handling; the rest may return
/// [`RecoveryOutcome::Unsupported`].
#[async_trait]
pub trait RecoveryHandler: Send + Sync {
    async fn handle(&self, action: RecoveryAction, error: &WorkflowError) -> RecoveryOutcome;
}

/// A named, user-facing remedy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecoveryStrategy {
    pub action: RecoveryAction,
    pub label: &'static str,
    /// Prompt shown to the user when offering this strategy.
    pub prompt: &'static str,
}

impl RecoveryStrategy {
    const fn new(action: RecoveryAction, label: &'static str, prompt: &'static str) -> Self {
        Self { action, label, prompt }
    }

    pub fn id(&self) -> &'static str {
        self.action.id()
    }

    /// Run this strategy through `handler`.
    pub async fn invoke<H>(&self, handler: &H, error: &WorkflowError) -> RecoveryOutcome
    where
        H: RecoveryHandler + ?Sized,
    {
        tracing::debug!(error_id = %error.id, strategy = self.id(), "Invoking recovery strategy");
        let outcome = handler.handle(self.action, error).await;
        if let RecoveryOutcome::Failed(reason) = &outcome {
            tracing::warn!(error_id = %error.id, strategy = self.id(), reason = %reason, "Recovery strategy failed");
        }
        outcome
    }
}

const RETRY: RecoveryStrategy = RecoveryStrategy::new(
    RecoveryAction::RetryWithBackoff,
    "Try again",
    "Retry the request, waiting a little longer between attempts.",
);
const CHECK_CONNECTIVITY: RecoveryStrategy = RecoveryStrategy::new(
    RecoveryAction::CheckConnectivity,
    "Check connection",
    "Check your internet connection, then try again.",
);
const USE_CACHED_DATA: RecoveryStrategy = RecoveryStrategy::new(
    RecoveryAction::UseCachedData,
    "Use saved data",
    "Continue with the most recently saved results.",
);
const REFRESH_CREDENTIALS: RecoveryStrategy = RecoveryStrategy::new(
    RecoveryAction::RefreshCredentials,
    "Refresh session",
    "Refresh your session and retry automatically.",
);
const FORCE_RELOGIN: RecoveryStrategy = RecoveryStrategy::new(
    RecoveryAction::ForceRelogin,
    "Sign in again",
    "Sign in again to continue. Your progress is saved.",
);
const WAIT_AND_RETRY: RecoveryStrategy = RecoveryStrategy::new(
    RecoveryAction::WaitAndRetry,
    "Wait and retry",
    "Wait a moment for the limit to reset, then retry.",
);
const REVIEW_INPUT: RecoveryStrategy = RecoveryStrategy::new(
    RecoveryAction::ReviewInput,
    "Review input",
    "Review the highlighted fields and correct them.",
);
const GO_BACK: RecoveryStrategy = RecoveryStrategy::new(
    RecoveryAction::GoBack,
    "Go back",
    "Return to the previous step and adjust your choices.",
);
const USE_FALLBACK_WORKFLOW: RecoveryStrategy = RecoveryStrategy::new(
    RecoveryAction::UseFallbackWorkflow,
    "Continue manually",
    "Switch to a simpler path that does not need the generation service.",
);

const NETWORK: &[RecoveryStrategy] = &[RETRY, CHECK_CONNECTIVITY, USE_CACHED_DATA];
const AUTHENTICATION: &[RecoveryStrategy] = &[REFRESH_CREDENTIALS, FORCE_RELOGIN];
const RATE_LIMIT: &[RecoveryStrategy] = &[WAIT_AND_RETRY, USE_CACHED_DATA];
const VALIDATION: &[RecoveryStrategy] = &[REVIEW_INPUT, GO_BACK];
const AI_SERVICE: &[RecoveryStrategy] = &[RETRY, USE_FALLBACK_WORKFLOW];
const UNKNOWN: &[RecoveryStrategy] = &[RETRY, GO_BACK];

/// Strategies for a category, most preferred first.
pub fn strategies_for(error_type: ErrorType) -> &'static [RecoveryStrategy] {
    match error_type {
        ErrorType::Network => NETWORK,
        ErrorType::Authentication => AUTHENTICATION,
        ErrorType::RateLimit => RATE_LIMIT,
        ErrorType::Validation => VALIDATION,
        ErrorType::AiService => AI_SERVICE,
        ErrorType::Unknown => UNKNOWN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::{ErrorClassifier, ErrorContext, FailureReport};
    use parking_lot::Mutex;

    #[test]
    fn test_every_type_has_strategies() {
        for error_type in ErrorType::ALL {
            assert!(!strategies_for(error_type).is_empty(), "{}", error_type);
        }
    }

    #[test]
    fn test_strategy_order() {
        let ids: Vec<_> = strategies_for(ErrorType::Network).iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec!["retry-with-backoff", "check-connectivity", "use-cached-data"]);

        let ids: Vec<_> = strategies_for(ErrorType::AiService).iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec!["retry-with-backoff", "use-fallback-workflow"]);
    }

    struct RecordingHandler {
        calls: Mutex<Vec<RecoveryAction>>,
    }

    #[async_trait]
    impl RecoveryHandler for RecordingHandler {
        async fn handle(&self, action: RecoveryAction, _error: &WorkflowError) -> RecoveryOutcome {
            self.calls.lock().push(action);
            match action {
                RecoveryAction::GoBack => RecoveryOutcome::Recovered,
                RecoveryAction::ReviewInput => RecoveryOutcome::Failed("still invalid".into()),
                _ => RecoveryOutcome::Unsupported,
            }
        }
    }

    #[tokio::test]
    async fn test_invoke_dispatches_action() {
        let classifier = ErrorClassifier::new();
        let error =
            classifier.classify(&FailureReport::new("bad").as_validation(), &ErrorContext::default());
        let handler = RecordingHandler { calls: Mutex::new(Vec::new()) };

        let strategies = classifier.recovery_strategies(error.error_type);
        assert!(!strategies[0].invoke(&handler, &error).await.is_recovered());
        assert!(strategies[1].invoke(&handler, &error).await.is_recovered());
        assert_eq!(
            *handler.calls.lock(),
            vec![RecoveryAction::ReviewInput, RecoveryAction::GoBack]
        );
    }
}
