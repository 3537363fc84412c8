//! Legacy VirtualMachine schema.

use serde::{Deserialize, Serialize};

use crate::impl_object;
use crate::meta::ObjectMeta;

/// The alpha VirtualMachine: bare-name references, no imported disks,
/// no lifecycle hooks, binary power states.
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
    /// Provider name in the same namespace
    pub provider: String,
    /// VMClass name
    pub class: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Attachment names
    pub networks: Vec<String>,
    pub power_state: AlphaPowerState,
    /// Inline cloud-init only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placement_policy: Option<String>,
    pub tags: Vec<String>,
}

/// Alpha power states predate graceful shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlphaPowerState {
    On,
    Off,
}

impl Default for AlphaPowerState {
    fn default() -> Self {
        Self::On
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualMachineStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Free-form phase string in alpha
    pub phase: String,
    pub power_state: String,
    pub ips: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
