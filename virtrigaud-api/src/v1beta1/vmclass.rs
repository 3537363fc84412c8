//! The VMClass kind: an immutable-by-convention resource template.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::impl_object;
use crate::meta::ObjectMeta;

use super::core::{DiskType, Firmware};

/// A named CPU/memory/firmware template referenced by VM specs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VMClass {
    pub metadata: ObjectMeta,
    pub spec: VMClassSpec,
}

impl_object!(VMClass, "VMClass");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VMClassSpec {
    /// vCPU count, 1..=128
    pub cpu: u32,
    /// Memory quantity string, at least 128Mi
    pub memory: String,
    #[serde(default)]
    pub firmware: Firmware,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_defaults: Option<DiskDefaults>,
    #[serde(default)]
    pub guest_tools: GuestToolsPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance_profile: Option<PerformanceProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_profile: Option<SecurityProfile>,
    /// Provider-specific extra configuration keys
    #[serde(default)]
    pub extra_config: BTreeMap<String, String>,
}

/// Defaults applied to disks created for VMs of this class.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskDefaults {
    #[serde(rename = "type")]
    pub disk_type: DiskType,
    /// Boot disk size quantity string
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

/// Whether guest tools should be installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuestToolsPolicy {
    Install,
    Skip,
}

impl Default for GuestToolsPolicy {
    fn default() -> Self {
        Self::Install
    }
}

/// Performance tuning knobs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceProfile {
    pub cpu_pinning: bool,
    pub hugepages: bool,
    pub numa_aware: bool,
}

/// Security posture of VMs in this class.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityProfile {
    pub secure_boot: bool,
    pub vtpm: bool,
}
