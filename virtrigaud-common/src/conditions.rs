//! Status condition bookkeeping shared by every kind.
//!
//! Conditions follow the orchestrator convention: a typed entry with a
//! True/False/Unknown status, a machine reason and a human message. The
//! transition timestamp only moves when the status actually changes, so
//! repeated reconciles of an unchanged object leave status byte-identical.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Well-known condition types used across kinds.
pub mod types {
    pub const READY: &str = "Ready";
    pub const HEALTHY: &str = "Healthy";
    pub const PROVISIONING: &str = "Provisioning";
    pub const RECONFIGURING: &str = "Reconfiguring";
    pub const DELETING: &str = "Deleting";
    pub const SOURCE_RETAINED: &str = "SourceRetained";
}

/// Condition status values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl Default for ConditionStatus {
    fn default() -> Self {
        Self::Unknown
    }
}

/// A single observed condition of an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Condition type (e.g. "Ready")
    #[serde(rename = "type")]
    pub type_: String,
    /// Current status
    pub status: ConditionStatus,
    /// Machine-readable reason for the last transition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Human-readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Generation of the spec this condition was computed against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    /// When the status last changed
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Build a condition with the given type, status and reason.
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: Some(reason.into()),
            message: Some(message.into()),
            observed_generation: None,
            last_transition_time: Utc::now(),
        }
    }

    /// Shorthand for a True condition.
    pub fn ready_true(type_: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(type_, ConditionStatus::True, reason, "")
    }
}

/// Set `condition` in `conditions`, replacing any entry of the same type.
///
/// The transition time of an existing entry is preserved when the status is
/// unchanged; reason and message are always refreshed.
pub fn set_condition(conditions: &mut Vec<Condition>, mut condition: Condition) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        if existing.status == condition.status {
            condition.last_transition_time = existing.last_transition_time;
        }
        *existing = condition;
    } else {
        conditions.push(condition);
    }
}

/// Find a condition by type.
pub fn get_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// True when the condition exists and its status is True.
pub fn is_condition_true(conditions: &[Condition], type_: &str) -> bool {
    get_condition(conditions, type_)
        .map(|c| c.status == ConditionStatus::True)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_condition_preserves_transition_time() {
        let mut conditions = Vec::new();
        set_condition(
            &mut conditions,
            Condition::new("Ready", ConditionStatus::True, "Provisioned", "vm is up"),
        );
        let first_transition = conditions[0].last_transition_time;

        // Same status, new message: transition time must not move.
        set_condition(
            &mut conditions,
            Condition::new("Ready", ConditionStatus::True, "Provisioned", "still up"),
        );
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].last_transition_time, first_transition);
        assert_eq!(conditions[0].message.as_deref(), Some("still up"));
    }

    #[test]
    fn test_set_condition_moves_transition_time_on_flip() {
        let mut conditions = Vec::new();
        let mut stale = Condition::new("Ready", ConditionStatus::True, "Provisioned", "");
        stale.last_transition_time = Utc::now() - chrono::Duration::hours(1);
        set_condition(&mut conditions, stale);
        let first_transition = conditions[0].last_transition_time;

        set_condition(
            &mut conditions,
            Condition::new("Ready", ConditionStatus::False, "ProviderError", "boom"),
        );
        assert!(conditions[0].last_transition_time > first_transition);
        assert!(!is_condition_true(&conditions, "Ready"));
    }

    #[test]
    fn test_get_condition() {
        let mut conditions = Vec::new();
        set_condition(
            &mut conditions,
            Condition::new("Healthy", ConditionStatus::True, "Validated", ""),
        );
        assert!(get_condition(&conditions, "Healthy").is_some());
        assert!(get_condition(&conditions, "Ready").is_none());
    }
}
