//! Versioned persisted records.
//!
//! Every stored record carries a numeric `version`. Records older than
//! [`STATE_VERSION`] are upgraded one version at a time by explicit
//! functions; unknown versions are refused.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::{StorageError, StorageResult};
use crate::workflow::{WorkflowState, STATE_VERSION};

/// First persisted layout: no skipped steps or warnings, `lastSaved` in epoch milliseconds.
pub const LEGACY_STATE_VERSION: u32 = 1;

/// Parse a stored record of any supported version into the current state.
pub fn migrate(mut record: Value) -> StorageResult<WorkflowState> {
    let version = record
        .get("version")
        .and_then(Value::as_u64)
        .ok_or_else(|| StorageError::Invalid("missing numeric version".to_string()))?;

    if version == u64::from(LEGACY_STATE_VERSION) {
        let fields = record
            .as_object_mut()
            .ok_or_else(|| StorageError::Invalid("record is not an object".to_string()))?;
        upgrade_v1(fields)?;
    } else if version != u64::from(STATE_VERSION) {
        return Err(StorageError::UnsupportedVersion(version));
    }

    Ok(serde_json::from_value(record)?)
}

fn upgrade_v1(fields: &mut Map<String, Value>) -> StorageResult<()> {
    if let Some(saved) = fields.get("lastSaved").and_then(Value::as_i64) {
        let timestamp = DateTime::<Utc>::from_timestamp_millis(saved)
            .ok_or_else(|| StorageError::Invalid(format!("lastSaved out of range: {}", saved)))?;
        fields.insert("lastSaved".to_string(), Value::String(timestamp.to_rfc3339()));
    }

    fields.entry("skippedSteps").or_insert_with(|| Value::Array(Vec::new()));
    fields.entry("warnings").or_insert_with(|| Value::Object(Map::new()));
    fields.insert("version".to_string(), Value::from(STATE_VERSION));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_current_version_passes_through() {
        let state = WorkflowState::initial("wf", "a");
        let migrated = migrate(serde_json::to_value(&state).unwrap()).unwrap();
        assert_eq!(migrated, state);
    }

    #[test]
    fn test_upgrade_from_legacy() {
        let record = json!({
            "version": 1,
            "workflowId": "wf",
            "currentStep": "b",
            "stepData": { "a": { "level": "beginner" } },
            "completedSteps": ["a"],
            "progress": 50,
            "errors": {},
            "lastSaved": 1_700_000_000_000_i64
        });

        let state = migrate(record).unwrap();
        assert_eq!(state.version, STATE_VERSION);
        assert_eq!(state.current_step, "b");
        assert!(state.skipped_steps.is_empty());
        assert_eq!(state.last_saved.unwrap().timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_unknown_version_rejected() {
        let err = migrate(json!({ "version": 99, "workflowId": "wf" })).unwrap_err();
        assert!(matches!(err, StorageError::UnsupportedVersion(99)));
    }

    #[test]
    fn test_missing_version_rejected() {
        let err = migrate(json!({ "workflowId": "wf" })).unwrap_err();
        assert!(matches!(err, StorageError::Invalid(_)));
    }

    #[test]
    fn test_missing_required_field_rejected() {
        let err = migrate(json!({ "version": 2, "workflowId": "wf" })).unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));
    }
}
