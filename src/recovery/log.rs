//! Bounded in-memory log of classified errors.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::classifier::{ErrorType, Severity, WorkflowError};

/// Default number of retained errors.
pub const DEFAULT_ERROR_LOG_CAPACITY: usize = 100;

/// Ring buffer of the most recent errors plus running totals.
#[derive(Debug, Clone)]
pub struct ErrorLog {
    entries: VecDeque<WorkflowError>,
    capacity: usize,
    total: u64,
    by_type: BTreeMap<ErrorType, u64>,
    by_severity: BTreeMap<Severity, u64>,
}

/// Aggregate view of an [`ErrorLog`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorStats {
    /// Errors recorded since creation or the last clear.
    pub total: u64,
    /// Errors still held in the buffer.
    pub retained: usize,
    pub by_type: BTreeMap<ErrorType, u64>,
    pub by_severity: BTreeMap<Severity, u64>,
    pub last_error_at: Option<DateTime<Utc>>,
}

impl Default for ErrorLog {
    fn default() -> Self {
        Self::new(DEFAULT_ERROR_LOG_CAPACITY)
    }
}

impl ErrorLog {
    /// Log holding at most `capacity` entries (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            total: 0,
            by_type: BTreeMap::new(),
            by_severity: BTreeMap::new(),
        }
    }

    /// Append an error, evicting the oldest when full.
    pub fn record(&mut self, error: WorkflowError) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.total += 1;
        *self.by_type.entry(error.error_type).or_default() += 1;
        *self.by_severity.entry(error.severity).or_default() += 1;
        self.entries.push_back(error);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Up to `limit` entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<&WorkflowError> {
        self.entries.iter().rev().take(limit).collect()
    }

    pub fn stats(&self) -> ErrorStats {
        ErrorStats {
            total: self.total,
            retained: self.entries.len(),
            by_type: self.by_type.clone(),
            by_severity: self.by_severity.clone(),
            last_error_at: self.entries.back().map(|e| e.timestamp),
        }
    }

    /// Drop all entries and reset the totals.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.total = 0;
        self.by_type.clear();
        self.by_severity.clear();
    }
}
