//! Event recorder for state transitions.
//!
//! Events are the operator-facing audit trail; reconcilers emit one on
//! every observable transition. The recorder keeps a bounded in-memory
//! ring; production deployments drain it into the orchestrator's event API.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::info;

const EVENT_CAPACITY: usize = 1024;

/// Severity of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Normal,
    Warning,
}

/// One recorded event.
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    /// Kind of the involved object
    pub kind: &'static str,
    /// "namespace/name" of the involved object
    pub key: String,
    pub reason: String,
    pub message: String,
}

/// Bounded event sink shared by all reconcilers.
#[derive(Default)]
pub struct EventRecorder {
    events: Mutex<VecDeque<EventRecord>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a normal event.
    pub fn normal(
        &self,
        kind: &'static str,
        key: impl Into<String>,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.emit(EventType::Normal, kind, key.into(), reason.into(), message.into());
    }

    /// Record a warning event.
    pub fn warning(
        &self,
        kind: &'static str,
        key: impl Into<String>,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.emit(EventType::Warning, kind, key.into(), reason.into(), message.into());
    }

    fn emit(
        &self,
        event_type: EventType,
        kind: &'static str,
        key: String,
        reason: String,
        message: String,
    ) {
        info!(kind, key = %key, reason = %reason, event = ?event_type, "{message}");
        let mut events = self.events.lock().expect("event lock poisoned");
        if events.len() >= EVENT_CAPACITY {
            events.pop_front();
        }
        events.push_back(EventRecord {
            timestamp: Utc::now(),
            event_type,
            kind,
            key,
            reason,
            message,
        });
    }

    /// Snapshot of recorded events, oldest first.
    pub fn list(&self) -> Vec<EventRecord> {
        self.events
            .lock()
            .expect("event lock poisoned")
            .iter()
            .cloned()
            .collect()
    }

    /// Events for one object, oldest first.
    pub fn for_object(&self, kind: &str, key: &str) -> Vec<EventRecord> {
        self.list()
            .into_iter()
            .filter(|e| e.kind == kind && e.key == key)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_are_recorded_in_order() {
        let recorder = EventRecorder::new();
        recorder.normal("VirtualMachine", "default/web-01", "Provisioned", "VM created");
        recorder.warning("VirtualMachine", "default/web-01", "ProviderError", "boom");

        let events = recorder.for_object("VirtualMachine", "default/web-01");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].reason, "Provisioned");
        assert_eq!(events[1].event_type, EventType::Warning);
    }
}
