//! The VMSnapshot kind: point-in-time state with retention and schedules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use virtrigaud_common::conditions::Condition;

use crate::impl_object;
use crate::meta::{LocalObjectReference, ObjectMeta};

/// Finalizer owned by the snapshot reconciler.
pub const SNAPSHOT_FINALIZER: &str = "vmsnapshot.infra.virtrigaud.io/finalizer";

/// A snapshot of a VM, one-shot or scheduled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VMSnapshot {
    pub metadata: ObjectMeta,
    pub spec: VMSnapshotSpec,
    #[serde(default)]
    pub status: VMSnapshotStatus,
}

impl_object!(VMSnapshot, "VMSnapshot");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VMSnapshotSpec {
    pub vm_ref: LocalObjectReference,
    #[serde(default)]
    pub config: SnapshotConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention: Option<RetentionPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<SnapshotScheduleSpec>,
    /// Pinned snapshots are exempt from retention
    #[serde(default)]
    pub pinned: bool,
}

/// How the snapshot is taken.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub include_memory: bool,
    /// Quiesce the guest filesystem before snapshotting
    pub quiesce: bool,
    #[serde(rename = "type")]
    pub snapshot_type: SnapshotType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consistency: Option<ConsistencyLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption: Option<SnapshotEncryption>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotType {
    Standard,
    Crash,
    Application,
}

impl Default for SnapshotType {
    fn default() -> Self {
        Self::Standard
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsistencyLevel {
    CrashConsistent,
    FilesystemConsistent,
    ApplicationConsistent,
}

/// Snapshot-at-rest encryption.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotEncryption {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_secret_ref: Option<LocalObjectReference>,
}

/// Age and count limits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionPolicy {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_age_hours: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_count: Option<u32>,
    pub preserve_pinned: bool,
}

/// Recurring snapshot schedule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotScheduleSpec {
    /// Cron expression, `@every <duration>` or a macro
    pub cron: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
    #[serde(default)]
    pub concurrency_policy: ConcurrencyPolicy,
}

/// What to do when a firing overlaps an in-flight snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConcurrencyPolicy {
    Allow,
    Forbid,
    Replace,
}

impl Default for ConcurrencyPolicy {
    fn default() -> Self {
        Self::Forbid
    }
}

/// Snapshot lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotPhase {
    Pending,
    Creating,
    Ready,
    Deleting,
    Failed,
    Expired,
}

impl Default for SnapshotPhase {
    fn default() -> Self {
        Self::Pending
    }
}

/// One provider snapshot created by this object (schedules create many).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotHistoryEntry {
    pub snapshot_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VMSnapshotStatus {
    /// Provider-side snapshot identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,
    pub phase: SnapshotPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    /// Parent snapshot in the provider's tree
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Direct children; non-empty blocks deletion
    pub children: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Last time the schedule fired
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_scheduled_at: Option<DateTime<Utc>>,
    /// Provider snapshots created by this object, oldest first; retention
    /// prunes from the front
    pub history: Vec<SnapshotHistoryEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_ref: Option<String>,
    pub observed_generation: i64,
    pub conditions: Vec<Condition>,
}
