//! Synchronous listener bus for workflow state changes.
//!
//! Listeners are called in registration order on the caller's thread. A
//! panicking listener is caught and logged so the remaining listeners still
//! receive the event.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use serde::Serialize;

use super::state::WorkflowState;

/// Kinds of state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    StepChanged,
    DataUpdated,
    ValidationFailed,
    ErrorOccurred,
    ProgressUpdated,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::StepChanged => write!(f, "step_changed"),
            EventKind::DataUpdated => write!(f, "data_updated"),
            EventKind::ValidationFailed => write!(f, "validation_failed"),
            EventKind::ErrorOccurred => write!(f, "error_occurred"),
            EventKind::ProgressUpdated => write!(f, "progress_updated"),
        }
    }
}

/// Direction of a step change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Forward,
    Backward,
}

/// Extra detail attached to an event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventMetadata {
    /// Set for step changes.
    pub direction: Option<Direction>,
    /// True when the change came from `go_to_step`.
    pub is_direct_navigation: bool,
    /// True when the change came from `skip_step`.
    pub skipped: bool,
    /// Step the event concerns (the left step for step changes).
    pub step_id: Option<String>,
}

impl EventMetadata {
    pub fn for_step(step_id: impl Into<String>) -> Self {
        Self { step_id: Some(step_id.into()), ..Default::default() }
    }

    pub fn moving(direction: Direction, from_step: impl Into<String>) -> Self {
        Self { direction: Some(direction), ..Self::for_step(from_step) }
    }
}

/// A single notification delivered to listeners.
#[derive(Debug, Clone)]
pub struct WorkflowEvent {
    pub kind: EventKind,
    pub previous_state: Option<WorkflowState>,
    pub current_state: WorkflowState,
    pub metadata: Option<EventMetadata>,
}

/// Handle returned by [`EventBus::add_listener`].
pub type ListenerId = u64;

type Listener = Box<dyn Fn(&WorkflowEvent) + Send + Sync>;

/// Ordered multicast list of listeners.
#[derive(Default)]
pub struct EventBus {
    listeners: Vec<(ListenerId, Listener)>,
    next_id: ListenerId,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus").field("listeners", &self.listeners.len()).finish()
    }
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener; it receives every event emitted after this call.
    pub fn add_listener<F>(&mut self, listener: F) -> ListenerId
    where
        F: Fn(&WorkflowEvent) + Send + Sync + 'static,
    {
        self.next_id += 1;
        let id = self.next_id;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Unregister a listener. Returns false for unknown ids.
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Deliver an event to every listener in registration order.
    pub fn emit(&self, event: &WorkflowEvent) {
        for (id, listener) in &self.listeners {
            if panic::catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                tracing::warn!(listener = id, event = %event.kind, "Listener panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn event(kind: EventKind) -> WorkflowEvent {
        WorkflowEvent {
            kind,
            previous_state: None,
            current_state: WorkflowState::initial("wf", "a"),
            metadata: None,
        }
    }

    #[test]
    fn test_delivery_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();

        for n in 0..3 {
            let seen = Arc::clone(&seen);
            bus.add_listener(move |_| seen.lock().unwrap().push(n));
        }

        bus.emit(&event(EventKind::DataUpdated));
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_remove_listener() {
        let count = Arc::new(Mutex::new(0));
        let mut bus = EventBus::new();

        let counter = Arc::clone(&count);
        let id = bus.add_listener(move |_| *counter.lock().unwrap() += 1);
        assert_eq!(bus.len(), 1);

        assert!(bus.remove_listener(id));
        assert!(!bus.remove_listener(id));
        assert!(bus.is_empty());

        bus.emit(&event(EventKind::ProgressUpdated));
        assert_eq!(*count.lock().unwrap(), 0);
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();

        bus.add_listener(|_| panic!("listener failure"));
        let sink = Arc::clone(&seen);
        bus.add_listener(move |e| sink.lock().unwrap().push(e.kind));

        bus.emit(&event(EventKind::StepChanged));
        assert_eq!(*seen.lock().unwrap(), vec![EventKind::StepChanged]);
    }

    #[test]
    fn test_event_kind_display() {
        assert_eq!(EventKind::StepChanged.to_string(), "step_changed");
        assert_eq!(EventKind::ValidationFailed.to_string(), "validation_failed");
    }
}
