//! The VMMigration kind: cross-provider cold migration via staged disks.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use virtrigaud_common::conditions::Condition;

use crate::impl_object;
use crate::meta::{LocalObjectReference, ObjectMeta, ObjectRef};

use super::core::DiskFormat;
use super::vm::VmNetworkRef;

/// Finalizer owned by the migration engine; held while staging storage exists.
pub const MIGRATION_FINALIZER: &str = "vmmigration.infra.virtrigaud.io/finalizer";

/// Default overall migration timeout: 4 hours.
pub const DEFAULT_MIGRATION_TIMEOUT_SECS: u64 = 4 * 3600;

/// Default mount path for intermediate storage.
pub const DEFAULT_STORAGE_MOUNT_PATH: &str = "/mnt/migration-storage";

/// A cold migration of one VM between providers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VMMigration {
    pub metadata: ObjectMeta,
    pub spec: VMMigrationSpec,
    #[serde(default)]
    pub status: VMMigrationStatus,
}

impl_object!(VMMigration, "VMMigration");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VMMigrationSpec {
    pub source: MigrationSource,
    pub target: MigrationTarget,
    #[serde(default)]
    pub options: MigrationOptions,
    #[serde(default)]
    pub storage: MigrationStorageSpec,
}

/// The VM being migrated and pre-flight behavior.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationSource {
    pub vm_ref: ObjectRef,
    /// Use an existing snapshot instead of creating one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_name: Option<String>,
    /// Snapshot the source before export
    pub create_snapshot: bool,
    pub power_off_before: bool,
    /// Delete the source once the target validates
    pub delete_after: bool,
}

/// The VM being created at the destination.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationTarget {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub provider_ref: ObjectRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_ref: Option<LocalObjectReference>,
    /// Network overrides; empty inherits the source's attachments
    pub networks: Vec<VmNetworkRef>,
    pub power_on: bool,
}

/// Post-migration checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationCheck {
    CheckDiskSize,
    CheckChecksum,
    CheckBoot,
    CheckConnectivity,
}

/// What to do with intermediate storage at terminal phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CleanupPolicy {
    Always,
    OnSuccess,
    Never,
}

impl Default for CleanupPolicy {
    fn default() -> Self {
        Self::OnSuccess
    }
}

/// Per-phase retry bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationRetryPolicy {
    pub max_retries: u32,
    pub backoff_multiplier: f64,
    pub initial_backoff_seconds: u64,
}

impl Default for MigrationRetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_multiplier: 2.0,
            initial_backoff_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationOptions {
    /// Target disk format; source format is kept when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_format: Option<DiskFormat>,
    pub compress: bool,
    pub verify_checksums: bool,
    /// Overall budget measured from start_time
    pub timeout_seconds: u64,
    pub retry: MigrationRetryPolicy,
    pub cleanup_policy: CleanupPolicy,
    pub validation_checks: Vec<ValidationCheck>,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            disk_format: None,
            compress: false,
            verify_checksums: true,
            timeout_seconds: DEFAULT_MIGRATION_TIMEOUT_SECS,
            retry: MigrationRetryPolicy::default(),
            cleanup_policy: CleanupPolicy::OnSuccess,
            validation_checks: vec![ValidationCheck::CheckDiskSize, ValidationCheck::CheckChecksum],
        }
    }
}

/// Intermediate storage backend. Only claim-backed volumes are supported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationStorageSpec {
    /// Existing claim; auto-created when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim_name: Option<String>,
    /// Size for auto-created claims, quantity string
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
    pub access_mode: String,
    pub mount_path: String,
}

impl Default for MigrationStorageSpec {
    fn default() -> Self {
        Self {
            claim_name: None,
            size: None,
            storage_class: None,
            access_mode: "ReadWriteMany".to_string(),
            mount_path: DEFAULT_STORAGE_MOUNT_PATH.to_string(),
        }
    }
}

/// The migration state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MigrationPhase {
    Pending,
    Validating,
    Snapshotting,
    Exporting,
    Transferring,
    Converting,
    Importing,
    Creating,
    ValidatingTarget,
    Ready,
    Failed,
}

impl Default for MigrationPhase {
    fn default() -> Self {
        Self::Pending
    }
}

impl MigrationPhase {
    /// Terminal phases accept no further work.
    pub fn is_terminal(&self) -> bool {
        matches!(self, MigrationPhase::Ready | MigrationPhase::Failed)
    }

    /// Phases at or beyond Creating are never auto-rewound.
    pub fn is_rewindable(&self) -> bool {
        !matches!(
            self,
            MigrationPhase::Creating
                | MigrationPhase::ValidatingTarget
                | MigrationPhase::Ready
                | MigrationPhase::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationPhase::Pending => "Pending",
            MigrationPhase::Validating => "Validating",
            MigrationPhase::Snapshotting => "Snapshotting",
            MigrationPhase::Exporting => "Exporting",
            MigrationPhase::Transferring => "Transferring",
            MigrationPhase::Converting => "Converting",
            MigrationPhase::Importing => "Importing",
            MigrationPhase::Creating => "Creating",
            MigrationPhase::ValidatingTarget => "ValidatingTarget",
            MigrationPhase::Ready => "Ready",
            MigrationPhase::Failed => "Failed",
        }
    }
}

/// Transfer progress counters. `transferred_bytes` is non-decreasing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationProgress {
    pub transferred_bytes: u64,
    pub total_bytes: u64,
    pub percent: u8,
    pub rate_bytes_per_second: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase_started_at: Option<DateTime<Utc>>,
}

/// Identifiers and checksums of the migrated disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationDiskInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_disk_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_disk_id: Option<String>,
    pub format: DiskFormat,
    pub size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_checksum: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_checksum: Option<String>,
}

/// The realized intermediate storage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationStorageInfo {
    pub claim_name: String,
    /// Staging URL of the exported artifact
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub size_bytes: u64,
    /// The engine created the claim and owns its cleanup
    pub auto_created: bool,
    pub cleaned_up: bool,
}

/// Results of the enabled target validation checks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationValidationResults {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_size_ok: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum_match: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boot_ok: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connectivity_ok: Option<bool>,
}

impl MigrationValidationResults {
    /// True when every recorded check passed.
    pub fn all_passed(&self) -> bool {
        [
            self.disk_size_ok,
            self.checksum_match,
            self.boot_ok,
            self.connectivity_ok,
        ]
        .iter()
        .all(|r| r.unwrap_or(true))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VMMigrationStatus {
    pub phase: MigrationPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<MigrationProgress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk: Option<MigrationDiskInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<MigrationStorageInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_vm_ref: Option<ObjectRef>,
    /// Snapshot created during Snapshotting
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,
    /// Outstanding snapshot task, persisted for crash-safe resume
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_task_ref: Option<String>,
    /// Outstanding export task, persisted for crash-safe resume
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_task_ref: Option<String>,
    /// Outstanding import task, persisted for crash-safe resume
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import_task_ref: Option<String>,
    pub retry_count: u32,
    /// Attempt counter per phase name
    pub phase_attempts: BTreeMap<String, u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_results: Option<MigrationValidationResults>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub observed_generation: i64,
    pub conditions: Vec<Condition>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_rewind_boundary() {
        assert!(MigrationPhase::Exporting.is_rewindable());
        assert!(MigrationPhase::Transferring.is_rewindable());
        assert!(!MigrationPhase::Creating.is_rewindable());
        assert!(!MigrationPhase::ValidatingTarget.is_rewindable());
        assert!(!MigrationPhase::Failed.is_rewindable());
    }

    #[test]
    fn test_validation_results_all_passed() {
        let mut results = MigrationValidationResults::default();
        assert!(results.all_passed());
        results.checksum_match = Some(true);
        results.disk_size_ok = Some(true);
        assert!(results.all_passed());
        results.boot_ok = Some(false);
        assert!(!results.all_passed());
    }
}
