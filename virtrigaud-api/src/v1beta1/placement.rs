//! The VMPlacementPolicy kind: hard/soft constraints and affinity rules.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use virtrigaud_common::conditions::Condition;

use crate::impl_object;
use crate::meta::{LabelSelector, ObjectMeta};

/// Placement constraints evaluated per provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VMPlacementPolicy {
    pub metadata: ObjectMeta,
    pub spec: VMPlacementPolicySpec,
    #[serde(default)]
    pub status: VMPlacementPolicyStatus,
}

impl_object!(VMPlacementPolicy, "VMPlacementPolicy");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VMPlacementPolicySpec {
    /// Violations fail placement
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hard: Option<PlacementConstraints>,
    /// Violations are scored, not fatal
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soft: Option<PlacementConstraints>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affinity: Option<AffinityRules>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_constraints: Option<ResourceConstraints>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_constraints: Option<SecurityConstraints>,
}

/// Allow/deny lists over placement domains.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementConstraints {
    pub allowed_clusters: Vec<String>,
    pub denied_clusters: Vec<String>,
    pub allowed_hosts: Vec<String>,
    pub denied_hosts: Vec<String>,
    pub allowed_datastores: Vec<String>,
    pub denied_datastores: Vec<String>,
    pub allowed_zones: Vec<String>,
    pub denied_zones: Vec<String>,
}

impl PlacementConstraints {
    pub fn is_empty(&self) -> bool {
        self.allowed_clusters.is_empty()
            && self.denied_clusters.is_empty()
            && self.allowed_hosts.is_empty()
            && self.denied_hosts.is_empty()
            && self.allowed_datastores.is_empty()
            && self.denied_datastores.is_empty()
            && self.allowed_zones.is_empty()
            && self.denied_zones.is_empty()
    }
}

/// Affinity and anti-affinity rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AffinityRules {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_affinity: Option<DomainAffinity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_affinity: Option<DomainAffinity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datastore_affinity: Option<DomainAffinity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone_affinity: Option<DomainAffinity>,
    /// Spread or co-locate relative to other VMs selected by labels
    pub vm_affinity: Vec<VmAffinityTerm>,
}

/// Affinity toward named members of a placement domain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainAffinity {
    pub required: Vec<String>,
    pub preferred: Vec<String>,
    pub anti_required: Vec<String>,
    pub anti_preferred: Vec<String>,
}

/// Inter-VM affinity over a topology domain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmAffinityTerm {
    pub label_selector: LabelSelector,
    /// Topology key, e.g. "host", "zone"
    pub topology_key: String,
    /// Repel instead of attract
    pub anti_affinity: bool,
    /// Violations fail placement when true
    pub required: bool,
}

/// Host resource guards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConstraints {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_available_cpu_percent: Option<u32>,
    /// Quantity string, e.g. "8Gi"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_available_memory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_host_utilization_percent: Option<u32>,
}

/// Security requirements on the placement target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConstraints {
    pub require_secure_boot: bool,
    pub require_tpm: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isolation_level: Option<IsolationLevel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IsolationLevel {
    Shared,
    Dedicated,
    AirGapped,
}

/// Validation outcome for one provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub supported_features: Vec<String>,
    pub unsupported_features: Vec<String>,
}

/// A detected conflict with another policy or within this one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyConflict {
    /// Name of the conflicting policy, or this policy for self-conflicts
    pub policy: String,
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VMPlacementPolicyStatus {
    /// Per-provider validation results, keyed by provider name
    pub results: BTreeMap<String, PolicyValidationResult>,
    pub conflicts: Vec<PolicyConflict>,
    pub observed_generation: i64,
    pub conditions: Vec<Condition>,
}
