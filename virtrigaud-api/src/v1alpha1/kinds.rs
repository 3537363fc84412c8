//! Legacy schemas for the remaining kinds.
//!
//! These predate beta's richer sub-objects: retention is a bare pair of
//! numbers, clone customization is hostname-only, migrations have no
//! validation checks or cleanup policy.

use serde::{Deserialize, Serialize};

use crate::impl_object;
use crate::meta::{LabelSelector, ObjectMeta};
use crate::v1beta1::{CloneType, DiskFormat, Firmware, NetworkType, SnapshotType};

// =============================================================================
// VMCLASS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VMClass {
    pub metadata: ObjectMeta,
    pub spec: VMClassSpec,
}

impl_object!(VMClass, "VMClass");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VMClassSpec {
    pub cpu: u32,
    /// Memory in MiB; beta switched to quantity strings
    pub memory_mib: u64,
    #[serde(default)]
    pub firmware: Firmware,
}

// =============================================================================
// VMIMAGE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VMImage {
    pub metadata: ObjectMeta,
    pub spec: VMImageSpec,
    #[serde(default)]
    pub status: VMImageStatus,
}

impl_object!(VMImage, "VMImage");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VMImageSpec {
    /// HTTP URL; the only alpha source kind
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// vSphere template name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VMImageStatus {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// =============================================================================
// VMNETWORKATTACHMENT
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VMNetworkAttachment {
    pub metadata: ObjectMeta,
    pub spec: VMNetworkAttachmentSpec,
}

impl_object!(VMNetworkAttachment, "VMNetworkAttachment");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VMNetworkAttachmentSpec {
    #[serde(rename = "type")]
    pub network_type: NetworkType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlan: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u16>,
}

// =============================================================================
// VMPLACEMENTPOLICY
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VMPlacementPolicy {
    pub metadata: ObjectMeta,
    pub spec: VMPlacementPolicySpec,
}

impl_object!(VMPlacementPolicy, "VMPlacementPolicy");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VMPlacementPolicySpec {
    pub allowed_hosts: Vec<String>,
    pub denied_hosts: Vec<String>,
    pub allowed_datastores: Vec<String>,
    pub denied_datastores: Vec<String>,
}

// =============================================================================
// VMSET
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VMSet {
    pub metadata: ObjectMeta,
    pub spec: VMSetSpec,
    #[serde(default)]
    pub status: VMSetStatus,
}

impl_object!(VMSet, "VMSet");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VMSetSpec {
    pub replicas: i32,
    pub selector: LabelSelector,
    /// Alpha templates are the alpha VM spec
    pub template: super::vm::VirtualMachineSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VMSetStatus {
    pub replicas: i32,
    pub ready_replicas: i32,
}

// =============================================================================
// VMSNAPSHOT
// =============================================================================

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
    /// VM name
    pub vm: String,
    #[serde(default)]
    pub include_memory: bool,
    #[serde(default, rename = "type")]
    pub snapshot_type: SnapshotType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_count: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VMSnapshotStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,
    pub phase: String,
}

// =============================================================================
// VMCLONE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VMClone {
    pub metadata: ObjectMeta,
    pub spec: VMCloneSpec,
    #[serde(default)]
    pub status: VMCloneStatus,
}

impl_object!(VMClone, "VMClone");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VMCloneSpec {
    /// Source VM name; the only alpha source kind
    pub source_vm: String,
    pub target_name: String,
    #[serde(default, rename = "type")]
    pub clone_type: CloneType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VMCloneStatus {
    pub phase: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// =============================================================================
// VMMIGRATION
// =============================================================================

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
    /// Source VM name
    pub vm: String,
    /// Destination provider name
    pub target_provider: String,
    pub target_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_format: Option<DiskFormat>,
    #[serde(default)]
    pub delete_source: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VMMigrationStatus {
    pub phase: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
