//! The VMClone kind: clone negotiation and guest customization.

use serde::{Deserialize, Serialize};

use virtrigaud_common::conditions::Condition;

use crate::impl_object;
use crate::meta::{LocalObjectReference, ObjectMeta, ObjectRef};

use super::core::{CloneType, DiskType};
use super::vm::VmNetworkRef;

/// A request to clone a VM, snapshot, template or image into a new VM.
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
    pub source: CloneSource,
    pub target: CloneTarget,
    #[serde(default)]
    pub options: CloneOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customization: Option<Customization>,
}

/// What is being cloned. Tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CloneSource {
    Vm { vm_ref: LocalObjectReference },
    Snapshot { snapshot_ref: LocalObjectReference },
    Template { name: String },
    Image { image_ref: LocalObjectReference },
}

/// The clone's identity and overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloneTarget {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_ref: Option<ObjectRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_ref: Option<LocalObjectReference>,
    /// Network overrides; empty inherits the source's attachments
    pub networks: Vec<VmNetworkRef>,
    pub disk_overrides: Vec<DiskOverride>,
    pub labels: std::collections::BTreeMap<String, String>,
    pub annotations: std::collections::BTreeMap<String, String>,
    pub power_on: bool,
}

/// Per-disk override on the clone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskOverride {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "type")]
    pub disk_type: Option<DiskType>,
}

/// Clone behavior knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloneOptions {
    /// Preferred type; the provider may force a downgrade
    #[serde(rename = "type")]
    pub clone_type: CloneType,
    pub timeout_seconds: u64,
    pub retries: u32,
}

impl Default for CloneOptions {
    fn default() -> Self {
        Self {
            clone_type: CloneType::Full,
            timeout_seconds: 3600,
            retries: 3,
        }
    }
}

/// Guest customization applied after cloning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Customization {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    /// Per-NIC IPv4 configuration, positional against the clone's NICs
    pub networks: Vec<NicCustomization>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sysprep: Option<String>,
    /// Commands run in the guest after first boot
    pub commands: Vec<String>,
    /// PEM certificates installed into the guest trust store
    pub certificates: Vec<String>,
}

/// Static IPv4 configuration for one NIC.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NicCustomization {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv4_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    pub dns_servers: Vec<String>,
}

/// Clone lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClonePhase {
    Pending,
    Validating,
    Cloning,
    Customizing,
    Ready,
    Failed,
}

impl Default for ClonePhase {
    fn default() -> Self {
        Self::Pending
    }
}

/// Progress of one disk copy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskCloneProgress {
    pub disk_id: String,
    pub percent: u8,
}

/// Trace of applied customization steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomizationStatus {
    pub completed_steps: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VMCloneStatus {
    pub phase: ClonePhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Type actually used after negotiation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_clone_type: Option<CloneType>,
    pub disk_progress: Vec<DiskCloneProgress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customization: Option<CustomizationStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_ref: Option<ObjectRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_ref: Option<String>,
    pub retry_count: u32,
    pub observed_generation: i64,
    pub conditions: Vec<Condition>,
}
