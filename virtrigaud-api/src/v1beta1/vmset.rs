//! The VMSet kind: a replicated-VM controller with ordinal identity.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use virtrigaud_common::conditions::Condition;

use crate::impl_object;
use crate::meta::{LabelSelector, ObjectMeta};

use super::core::IntOrPercent;
use super::vm::{VirtualMachineSpec, VmPhase};

/// Label carrying the revision hash on VMSet-owned VMs.
pub const REVISION_LABEL: &str = "vmset.infra.virtrigaud.io/revision";

/// Label carrying the ordinal on VMSet-owned VMs.
pub const ORDINAL_LABEL: &str = "vmset.infra.virtrigaud.io/ordinal";

/// A set of identically-specified VMs with stable ordinal names.
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
    pub template: VmTemplate,
    #[serde(default)]
    pub update_strategy: UpdateStrategy,
    #[serde(default)]
    pub management_policy: ManagementPolicy,
    #[serde(default)]
    pub pvc_retention: PvcRetentionPolicy,
    #[serde(default)]
    pub ordinals: Ordinals,
    #[serde(default)]
    pub volume_claim_templates: Vec<VolumeClaimTemplate>,
}

/// Template stamped out per replica.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmTemplate {
    pub metadata: TemplateMeta,
    pub spec: VirtualMachineSpec,
}

/// Labels and annotations applied to stamped VMs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateMeta {
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

/// How template changes roll out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateStrategy {
    #[serde(rename = "type")]
    pub strategy_type: UpdateStrategyType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rolling_update: Option<RollingUpdateSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateStrategyType {
    RollingUpdate,
    OnDelete,
    Recreate,
}

impl Default for UpdateStrategyType {
    fn default() -> Self {
        Self::RollingUpdate
    }
}

/// Rolling-update bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollingUpdateSpec {
    pub max_unavailable: IntOrPercent,
    pub max_surge: IntOrPercent,
    /// Ordinals >= partition are frozen at the current revision
    pub partition: i32,
}

impl Default for RollingUpdateSpec {
    fn default() -> Self {
        Self {
            max_unavailable: IntOrPercent::Int(1),
            max_surge: IntOrPercent::Int(0),
            partition: 0,
        }
    }
}

/// Replica creation discipline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManagementPolicy {
    /// One at a time, each Ready before the next
    OrderedReady,
    /// Drive all replicas concurrently
    Parallel,
}

impl Default for ManagementPolicy {
    fn default() -> Self {
        Self::OrderedReady
    }
}

/// What happens to volume claims when VMs go away.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PvcRetentionPolicy {
    pub when_deleted: PvcRetention,
    pub when_scaled: PvcRetention,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PvcRetention {
    Retain,
    Delete,
}

impl Default for PvcRetention {
    fn default() -> Self {
        Self::Retain
    }
}

/// Ordinal numbering configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ordinals {
    pub start: i32,
}

/// Volume claim stamped out per replica.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeClaimTemplate {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
    /// Quantity string
    pub size: String,
}

/// Status of a single owned VM.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VMSetVmStatus {
    pub name: String,
    pub ordinal: i32,
    pub revision: String,
    #[serde(default)]
    pub phase: VmPhase,
    pub ready: bool,
}

/// Single-word summary of the set's update state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VMSetPhase {
    Pending,
    Scaling,
    Updating,
    Ready,
}

impl Default for VMSetPhase {
    fn default() -> Self {
        Self::Pending
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VMSetStatus {
    pub replicas: i32,
    pub ready_replicas: i32,
    pub available_replicas: i32,
    pub updated_replicas: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_revision: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_revision: Option<String>,
    /// Disambiguates revision-hash collisions
    pub collision_count: u32,
    pub vms: Vec<VMSetVmStatus>,
    pub phase: VMSetPhase,
    pub observed_generation: i64,
    pub conditions: Vec<Condition>,
}

impl VMSet {
    /// Name of the replica at `ordinal`.
    pub fn vm_name(&self, ordinal: i32) -> String {
        format!("{}-{}", self.metadata.name, ordinal)
    }

    /// The ordinal range `[start, start + replicas)`.
    pub fn ordinal_range(&self) -> std::ops::Range<i32> {
        let start = self.spec.ordinals.start;
        start..start + self.spec.replicas.max(0)
    }
}
