//! The VirtualMachine kind: the unit of desired state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use virtrigaud_common::conditions::Condition;

use crate::impl_object;
use crate::meta::{LocalObjectReference, ObjectMeta, ObjectRef};
use crate::validation::{self, ValidationError};

use super::core::{DiskFormat, DiskType, ObservedPowerState, PowerState};

/// Finalizer owned by the VM reconciler; held while provider-side state exists.
pub const VM_FINALIZER: &str = "virtualmachine.infra.virtrigaud.io/finalizer";

/// A declared virtual machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualMachine {
    pub metadata: ObjectMeta,
    pub spec: VirtualMachineSpec,
    #[serde(default)]
    pub status: VirtualMachineStatus,
}

impl_object!(VirtualMachine, "VirtualMachine");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualMachineSpec {
    pub provider_ref: ObjectRef,
    pub class_ref: LocalObjectReference,
    /// Exactly one of image_ref / imported_disk must be set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<LocalObjectReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imported_disk: Option<ImportedDiskRef>,
    /// At most 10 attachments
    pub networks: Vec<VmNetworkRef>,
    /// At most 20 extra disks
    pub disks: Vec<ExtraDisk>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data: Option<UserData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placement_ref: Option<LocalObjectReference>,
    pub power_state: PowerState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceOverride>,
    /// Requested snapshot operation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<SnapshotOperation>,
    /// At most 50 tags
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lifecycle: Option<LifecycleHooks>,
}

/// A provider-resident disk created by import rather than template instantiation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportedDiskRef {
    /// Provider-side disk identifier
    pub disk_id: String,
    pub format: DiskFormat,
    /// Origin of the disk, e.g. "migration"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Audit link back to the migration that produced the disk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migration_ref: Option<ObjectRef>,
}

/// Attachment of a VM to a VMNetworkAttachment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VmNetworkRef {
    /// Name of the VMNetworkAttachment
    pub name: String,
    /// Static address override in CIDR form
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
}

/// An additional data disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtraDisk {
    pub name: String,
    /// Quantity string, e.g. "50Gi"
    pub size: String,
    #[serde(default, rename = "type")]
    pub disk_type: DiskType,
}

/// Guest provisioning payload. Tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum UserData {
    CloudInit {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        inline: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        secret_ref: Option<LocalObjectReference>,
    },
    Ignition {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        inline: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        secret_ref: Option<LocalObjectReference>,
    },
}

/// Per-VM overrides of the class resources.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<u32>,
    /// Quantity string
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

/// A requested snapshot operation on the VM.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotOperation {
    /// Name of the snapshot to revert to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revert_to: Option<String>,
}

/// Commands run around lifecycle transitions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleHooks {
    pub pre_stop: Vec<String>,
    pub post_start: Vec<String>,
}

/// Single-word lifecycle summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VmPhase {
    Pending,
    Provisioning,
    Running,
    Stopped,
    Reconfiguring,
    Deleting,
    Failed,
}

impl Default for VmPhase {
    fn default() -> Self {
        Self::Pending
    }
}

/// Operation a tracked task belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskKind {
    Create,
    Delete,
    Power,
    Reconfigure,
    SnapshotRevert,
}

/// A provider task recorded in status for crash-safe resumption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedTask {
    pub task_id: String,
    pub operation: TaskKind,
    pub started_at: DateTime<Utc>,
}

/// Currently allocated resources as reported by Describe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurrentResources {
    pub cpu: u32,
    pub memory_bytes: u64,
}

/// A snapshot known to exist on the provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VmSnapshotEntry {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualMachineStatus {
    /// Provider-assigned identifier; empty until Create returns
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub phase: VmPhase,
    pub power_state: ObservedPowerState,
    pub ips: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub console_url: Option<String>,
    /// Outstanding async operation, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_task: Option<TrackedTask>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_resources: Option<CurrentResources>,
    pub snapshots: Vec<VmSnapshotEntry>,
    pub observed_generation: i64,
    pub conditions: Vec<Condition>,
}

impl VirtualMachine {
    /// Schema-level spec validation.
    ///
    /// The exactly-one-of image/imported-disk invariant is checked here so
    /// every caller surfaces the same `InvalidSpec`.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate_name(&self.metadata.name)?;
        validation::validate_count("networks", self.spec.networks.len(), validation::MAX_NETWORKS)?;
        validation::validate_count("disks", self.spec.disks.len(), validation::MAX_DISKS)?;
        validation::validate_count("tags", self.spec.tags.len(), validation::MAX_TAGS)?;

        match (&self.spec.image_ref, &self.spec.imported_disk) {
            (Some(_), Some(_)) => Err(ValidationError::Other(
                "exactly one of imageRef and importedDisk must be set, got both".to_string(),
            )),
            (None, None) => Err(ValidationError::Other(
                "exactly one of imageRef and importedDisk must be set, got neither".to_string(),
            )),
            _ => Ok(()),
        }?;

        if let Some(resources) = &self.spec.resources {
            if let Some(cpu) = resources.cpu {
                validation::validate_cpu(cpu)?;
            }
            if let Some(memory) = &resources.memory {
                validation::validate_memory(memory)?;
            }
        }
        for disk in &self.spec.disks {
            validation::validate_name(&disk.name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_vm() -> VirtualMachine {
        VirtualMachine {
            metadata: ObjectMeta::named("default", "web-01"),
            spec: VirtualMachineSpec {
                provider_ref: ObjectRef::new("vsphere-prod"),
                class_ref: LocalObjectReference::new("medium"),
                image_ref: Some(LocalObjectReference::new("ubuntu-22")),
                ..Default::default()
            },
            status: VirtualMachineStatus::default(),
        }
    }

    #[test]
    fn test_valid_spec_passes() {
        assert!(valid_vm().validate().is_ok());
    }

    #[test]
    fn test_both_image_and_imported_disk_rejected() {
        let mut vm = valid_vm();
        vm.spec.imported_disk = Some(ImportedDiskRef {
            disk_id: "disk-1".to_string(),
            format: DiskFormat::Qcow2,
            source: None,
            migration_ref: None,
        });
        assert!(vm.validate().is_err());
    }

    #[test]
    fn test_neither_image_nor_imported_disk_rejected() {
        let mut vm = valid_vm();
        vm.spec.image_ref = None;
        assert!(vm.validate().is_err());
    }

    #[test]
    fn test_network_limit_enforced() {
        let mut vm = valid_vm();
        vm.spec.networks = (0..11)
            .map(|i| VmNetworkRef {
                name: format!("net-{i}"),
                ..Default::default()
            })
            .collect();
        assert!(vm.validate().is_err());
    }
}
