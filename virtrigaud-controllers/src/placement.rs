//! VMPlacementPolicy validator.
//!
//! Compiles a policy's constraints, evaluates them against every provider's
//! feature matrix, and surfaces per-provider results plus conflicts, both
//! within the policy and against sibling policies.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use virtrigaud_api::v1beta1::{
    PlacementConstraints, PolicyConflict, PolicyValidationResult, ProviderType,
    VMPlacementPolicy,
};
use virtrigaud_common::conditions::{self, Condition, ConditionStatus};
use virtrigaud_store::ObjectKey;

use crate::context::Context;
use crate::runtime::{Action, ReconcileError, Reconciler};

/// Placement feature identifiers used in support matrices.
mod features {
    pub const CLUSTERS: &str = "clusters";
    pub const HOSTS: &str = "hosts";
    pub const DATASTORES: &str = "datastores";
    pub const ZONES: &str = "zones";
    pub const VM_AFFINITY: &str = "vm-affinity";
    pub const RESOURCE_CONSTRAINTS: &str = "resource-constraints";
    pub const SECURE_BOOT: &str = "secure-boot";
    pub const TPM: &str = "tpm";
}

pub struct PlacementReconciler {
    ctx: Arc<Context>,
}

impl PlacementReconciler {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    /// Features a provider family can express.
    fn supported_features(provider_type: ProviderType) -> Vec<&'static str> {
        match provider_type {
            ProviderType::VSphere => vec![
                features::CLUSTERS,
                features::HOSTS,
                features::DATASTORES,
                features::ZONES,
                features::VM_AFFINITY,
                features::RESOURCE_CONSTRAINTS,
                features::SECURE_BOOT,
                features::TPM,
            ],
            ProviderType::Proxmox => vec![
                features::CLUSTERS,
                features::HOSTS,
                features::DATASTORES,
                features::VM_AFFINITY,
                features::RESOURCE_CONSTRAINTS,
            ],
            ProviderType::Libvirt => vec![features::HOSTS, features::RESOURCE_CONSTRAINTS],
            ProviderType::Qemu => vec![features::HOSTS],
            ProviderType::Firecracker => vec![features::HOSTS],
        }
    }

    /// Features this policy actually uses.
    fn used_features(policy: &VMPlacementPolicy) -> Vec<&'static str> {
        let mut used = Vec::new();
        let mut constraint_features = |constraints: &PlacementConstraints| {
            if !constraints.allowed_clusters.is_empty() || !constraints.denied_clusters.is_empty() {
                used.push(features::CLUSTERS);
            }
            if !constraints.allowed_hosts.is_empty() || !constraints.denied_hosts.is_empty() {
                used.push(features::HOSTS);
            }
            if !constraints.allowed_datastores.is_empty()
                || !constraints.denied_datastores.is_empty()
            {
                used.push(features::DATASTORES);
            }
            if !constraints.allowed_zones.is_empty() || !constraints.denied_zones.is_empty() {
                used.push(features::ZONES);
            }
        };
        if let Some(hard) = &policy.spec.hard {
            constraint_features(hard);
        }
        if let Some(soft) = &policy.spec.soft {
            constraint_features(soft);
        }
        if let Some(affinity) = &policy.spec.affinity {
            if affinity.host_affinity.is_some() {
                used.push(features::HOSTS);
            }
            if affinity.cluster_affinity.is_some() {
                used.push(features::CLUSTERS);
            }
            if affinity.datastore_affinity.is_some() {
                used.push(features::DATASTORES);
            }
            if affinity.zone_affinity.is_some() {
                used.push(features::ZONES);
            }
            if !affinity.vm_affinity.is_empty() {
                used.push(features::VM_AFFINITY);
            }
        }
        if policy.spec.resource_constraints.is_some() {
            used.push(features::RESOURCE_CONSTRAINTS);
        }
        if let Some(security) = &policy.spec.security_constraints {
            if security.require_secure_boot {
                used.push(features::SECURE_BOOT);
            }
            if security.require_tpm {
                used.push(features::TPM);
            }
        }
        used.sort_unstable();
        used.dedup();
        used
    }

    /// Internal contradictions: allow/deny overlaps and affinity vs. denials.
    fn self_conflicts(policy: &VMPlacementPolicy) -> Vec<PolicyConflict> {
        let mut conflicts = Vec::new();
        let name = policy.metadata.name.clone();

        if let Some(hard) = &policy.spec.hard {
            for host in &hard.allowed_hosts {
                if hard.denied_hosts.contains(host) {
                    conflicts.push(PolicyConflict {
                        policy: name.clone(),
                        detail: format!("host {host} is both allowed and denied"),
                    });
                }
            }
            for datastore in &hard.allowed_datastores {
                if hard.denied_datastores.contains(datastore) {
                    conflicts.push(PolicyConflict {
                        policy: name.clone(),
                        detail: format!("datastore {datastore} is both allowed and denied"),
                    });
                }
            }
            if let Some(affinity) = &policy.spec.affinity {
                if let Some(host_affinity) = &affinity.host_affinity {
                    for host in &host_affinity.required {
                        if hard.denied_hosts.contains(host) {
                            conflicts.push(PolicyConflict {
                                policy: name.clone(),
                                detail: format!(
                                    "required host affinity to {host} conflicts with denied hosts"
                                ),
                            });
                        }
                    }
                }
            }
        }
        conflicts
    }

    /// Conflicts against sibling policies in the namespace.
    fn cross_conflicts(
        policy: &VMPlacementPolicy,
        siblings: &[VMPlacementPolicy],
    ) -> Vec<PolicyConflict> {
        let mut conflicts = Vec::new();
        let required_hosts: Vec<&String> = policy
            .spec
            .affinity
            .as_ref()
            .and_then(|a| a.host_affinity.as_ref())
            .map(|h| h.required.iter().collect())
            .unwrap_or_default();

        for sibling in siblings {
            if sibling.metadata.name == policy.metadata.name {
                continue;
            }
            if let Some(hard) = &sibling.spec.hard {
                for host in &required_hosts {
                    if hard.denied_hosts.contains(host) {
                        conflicts.push(PolicyConflict {
                            policy: sibling.metadata.name.clone(),
                            detail: format!(
                                "required host {host} is denied by policy {}",
                                sibling.metadata.name
                            ),
                        });
                    }
                }
            }
        }
        conflicts
    }
}

#[async_trait]
impl Reconciler for PlacementReconciler {
    fn name(&self) -> &'static str {
        "vmplacementpolicy"
    }

    #[instrument(skip(self), fields(policy = %key))]
    async fn reconcile(&self, key: &ObjectKey) -> Result<Action, ReconcileError> {
        let Some(policy) = self.ctx.placements.try_get(&key.namespace, &key.name).await
        else {
            return Ok(Action::AwaitChange);
        };
        if policy.metadata.is_deleting() {
            return Ok(Action::AwaitChange);
        }

        let used = Self::used_features(&policy);
        let providers = self.ctx.providers.list(Some(&key.namespace)).await;
        let siblings = self.ctx.placements.list(Some(&key.namespace)).await;

        let mut conflicts = Self::self_conflicts(&policy);
        conflicts.extend(Self::cross_conflicts(&policy, &siblings));

        let mut results = std::collections::BTreeMap::new();
        for provider in &providers {
            let supported = Self::supported_features(provider.spec.provider_type);
            let supported_used: Vec<String> = used
                .iter()
                .filter(|f| supported.contains(f))
                .map(|f| f.to_string())
                .collect();
            let unsupported_used: Vec<String> = used
                .iter()
                .filter(|f| !supported.contains(f))
                .map(|f| f.to_string())
                .collect();

            // Unsupported hard constraints are errors; soft ones warn.
            let hard_features = policy
                .spec
                .hard
                .as_ref()
                .map(|hard| {
                    let probe = VMPlacementPolicy {
                        metadata: policy.metadata.clone(),
                        spec: virtrigaud_api::v1beta1::VMPlacementPolicySpec {
                            hard: Some(hard.clone()),
                            ..Default::default()
                        },
                        status: Default::default(),
                    };
                    Self::used_features(&probe)
                })
                .unwrap_or_default();

            let mut errors: Vec<String> = hard_features
                .iter()
                .filter(|f| !supported.contains(f))
                .map(|f| format!("hard constraint on {f} is not supported"))
                .collect();
            errors.extend(
                conflicts
                    .iter()
                    .filter(|c| c.policy == policy.metadata.name)
                    .map(|c| c.detail.clone()),
            );
            let warnings: Vec<String> = unsupported_used
                .iter()
                .filter(|f| !hard_features.iter().any(|&h| h == f.as_str()))
                .map(|f| format!("{f} constraints are ignored on this provider"))
                .collect();

            debug!(
                policy = %key,
                provider = %provider.metadata.name,
                errors = errors.len(),
                warnings = warnings.len(),
                "Evaluated policy against provider"
            );
            results.insert(
                provider.metadata.name.clone(),
                PolicyValidationResult {
                    valid: errors.is_empty(),
                    errors,
                    warnings,
                    supported_features: supported_used,
                    unsupported_features: unsupported_used,
                },
            );
        }

        let all_valid = results.values().all(|r| r.valid) && conflicts.is_empty();
        let generation = policy.metadata.generation;
        self.ctx
            .placements
            .modify_status(&key.namespace, &key.name, |policy| {
                policy.status.results = results.clone();
                policy.status.conflicts = conflicts.clone();
                policy.status.observed_generation = generation;
                conditions::set_condition(
                    &mut policy.status.conditions,
                    if all_valid {
                        Condition::new(
                            conditions::types::READY,
                            ConditionStatus::True,
                            "Validated",
                            "",
                        )
                    } else {
                        Condition::new(
                            conditions::types::READY,
                            ConditionStatus::False,
                            "ValidationIssues",
                            "policy has conflicts or unsupported hard constraints",
                        )
                    },
                );
            })
            .await?;

        Ok(Action::AwaitChange)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use virtrigaud_api::meta::ObjectMeta;
    use virtrigaud_api::v1beta1::{AffinityRules, DomainAffinity, VMPlacementPolicySpec};

    fn policy_with(spec: VMPlacementPolicySpec) -> VMPlacementPolicy {
        VMPlacementPolicy {
            metadata: ObjectMeta::named("default", "placement"),
            spec,
            status: Default::default(),
        }
    }

    #[test]
    fn test_self_conflict_affinity_vs_denied_hosts() {
        let policy = policy_with(VMPlacementPolicySpec {
            hard: Some(PlacementConstraints {
                denied_hosts: vec!["esx-03".to_string()],
                ..Default::default()
            }),
            affinity: Some(AffinityRules {
                host_affinity: Some(DomainAffinity {
                    required: vec!["esx-03".to_string()],
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        });
        let conflicts = PlacementReconciler::self_conflicts(&policy);
        assert_eq!(conflicts.len(), 1);
        assert!(conflicts[0].detail.contains("esx-03"));
    }

    #[test]
    fn test_used_features_detection() {
        let policy = policy_with(VMPlacementPolicySpec {
            hard: Some(PlacementConstraints {
                allowed_datastores: vec!["ds-ssd".to_string()],
                ..Default::default()
            }),
            ..Default::default()
        });
        let used = PlacementReconciler::used_features(&policy);
        assert_eq!(used, vec![features::DATASTORES]);
    }

    #[test]
    fn test_feature_matrix_varies_by_provider() {
        let vsphere = PlacementReconciler::supported_features(ProviderType::VSphere);
        let firecracker = PlacementReconciler::supported_features(ProviderType::Firecracker);
        assert!(vsphere.contains(&features::DATASTORES));
        assert!(!firecracker.contains(&features::DATASTORES));
    }
}
