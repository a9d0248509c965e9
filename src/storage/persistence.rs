//! Workflow persistence adapter.
//!
//! Saves are fire-and-forget: write failures are retried with a linearly
//! growing delay and then only logged. Loads never fail outright; anything
//! unusable is discarded and the stored entry cleared.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{migrate, StateSink};
use crate::core::{retry_async, RetryConfig};
use crate::workflow::{StepRegistry, WorkflowState};

/// Prefix of every persisted state key.
pub const STATE_KEY_PREFIX: &str = "workflow-state-";

/// Sink key for a workflow id.
pub fn state_key(workflow_id: &str) -> String {
    format!("{}{}", STATE_KEY_PREFIX, workflow_id)
}

/// Serializes workflow state into a [`StateSink`].
#[derive(Clone)]
pub struct PersistenceAdapter {
    sink: Arc<dyn StateSink>,
    retry: RetryConfig,
}

impl fmt::Debug for PersistenceAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistenceAdapter").field("retry", &self.retry).finish()
    }
}

impl PersistenceAdapter {
    /// Adapter with 3 retries, 1s linear step.
    pub fn new(sink: Arc<dyn StateSink>) -> Self {
        Self { sink, retry: RetryConfig::linear(3, Duration::from_millis(1000)) }
    }

    /// Override the write retry policy.
    pub fn with_retry(mut self, max_retries: u32, delay: Duration) -> Self {
        self.retry = RetryConfig::linear(max_retries, delay);
        self
    }

    /// Persist `state` with a fresh `last_saved` stamp.
    ///
    /// Returns the stamp on success, `None` once retries are exhausted.
    pub async fn save(&self, state: &WorkflowState) -> Option<DateTime<Utc>> {
        let mut stamp = Utc::now();
        if let Some(previous) = state.last_saved {
            if stamp <= previous {
                stamp = previous + chrono::Duration::microseconds(1);
            }
        }

        let mut snapshot = state.clone();
        snapshot.last_saved = Some(stamp);

        let payload = match serde_json::to_string(&snapshot) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(workflow_id = %state.workflow_id, error = %e, "Failed to serialize workflow state");
                return None;
            }
        };

        let key = state_key(&state.workflow_id);
        let outcome =
            retry_async(&self.retry, || self.sink.write(&key, payload.clone())).await;

        match outcome.result {
            Ok(()) => {
                tracing::debug!(workflow_id = %state.workflow_id, attempts = outcome.attempts, "Workflow state saved");
                Some(stamp)
            }
            Err(e) => {
                tracing::error!(
                    workflow_id = %state.workflow_id,
                    attempts = outcome.attempts,
                    error = %e,
                    "Giving up on saving workflow state"
                );
                None
            }
        }
    }

    /// Load and validate the stored state for `workflow_id`.
    ///
    /// Corrupt, stale or foreign records are cleared and `None` is returned.
    pub async fn load(&self, workflow_id: &str, registry: &StepRegistry) -> Option<WorkflowState> {
        let key = state_key(workflow_id);
        let raw = match self.sink.read(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(workflow_id, error = %e, "Failed to read workflow state");
                return None;
            }
        };

        let parsed = serde_json::from_str(&raw)
            .map_err(|e| e.to_string())
            .and_then(|record| migrate(record).map_err(|e| e.to_string()))
            .and_then(|state| state.check_integrity(workflow_id, registry).map(|()| state));

        match parsed {
            Ok(state) => {
                tracing::debug!(workflow_id, step = %state.current_step, "Restored workflow state");
                Some(state)
            }
            Err(reason) => {
                tracing::warn!(workflow_id, reason = %reason, "Discarding invalid workflow state");
                self.clear(workflow_id).await;
                None
            }
        }
    }

    /// Remove the stored state. Failures are logged, never raised.
    pub async fn clear(&self, workflow_id: &str) {
        if let Err(e) = self.sink.remove(&state_key(workflow_id)).await {
            tracing::warn!(workflow_id, error = %e, "Failed to clear workflow state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::workflow::StepDefinition;

    fn registry() -> StepRegistry {
        StepRegistry::new(
            "wf",
            vec![StepDefinition::new("a", "A"), StepDefinition::new("b", "B").depends_on(["a"])],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let store = MemoryStore::new();
        let adapter = PersistenceAdapter::new(Arc::new(store.clone()));

        let mut state = WorkflowState::initial("wf", "b");
        state.mark_completed("a");

        let stamp = adapter.save(&state).await.unwrap();
        assert!(store.get("workflow-state-wf").is_some());

        let loaded = adapter.load("wf", &registry()).await.unwrap();
        assert_eq!(loaded.last_saved, Some(stamp));
        assert_eq!(WorkflowState { last_saved: None, ..loaded }, state);
    }

    #[tokio::test]
    async fn test_last_saved_advances() {
        let adapter = PersistenceAdapter::new(Arc::new(MemoryStore::new()));
        let mut state = WorkflowState::initial("wf", "a");

        let first = adapter.save(&state).await.unwrap();
        state.last_saved = Some(first);
        let second = adapter.save(&state).await.unwrap();
        assert!(second > first);
    }

    #[tokio::test]
    async fn test_load_missing_returns_none() {
        let adapter = PersistenceAdapter::new(Arc::new(MemoryStore::new()));
        assert!(adapter.load("wf", &registry()).await.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_record_is_cleared() {
        let store = MemoryStore::new();
        store.insert("workflow-state-wf", "{not json");
        let adapter = PersistenceAdapter::new(Arc::new(store.clone()));

        assert!(adapter.load("wf", &registry()).await.is_none());
        assert!(store.get("workflow-state-wf").is_none());
    }

    #[tokio::test]
    async fn test_unregistered_step_is_cleared() {
        let store = MemoryStore::new();
        let adapter = PersistenceAdapter::new(Arc::new(store.clone()));
        adapter.save(&WorkflowState::initial("wf", "removed-step")).await.unwrap();

        assert!(adapter.load("wf", &registry()).await.is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_mismatched_workflow_id_is_cleared() {
        let store = MemoryStore::new();
        let foreign = serde_json::to_string(&WorkflowState::initial("other", "a")).unwrap();
        store.insert("workflow-state-wf", foreign);
        let adapter = PersistenceAdapter::new(Arc::new(store.clone()));

        assert!(adapter.load("wf", &registry()).await.is_none());
        assert!(store.is_empty());
    }
}
