//! VMSet reconciler: replica management with ordinal identity.
//!
//! Child VMs are named `<set>-<ordinal>`. The revision hash is FNV-1a over
//! the canonicalized template, salted with the collision count. Updates
//! replace VMs by deleting stale ones; the creation pass recreates them at
//! the update revision, which keeps every path level-triggered.

use std::collections::BTreeMap;
use std::hash::Hasher;
use std::sync::Arc;

use async_trait::async_trait;
use fnv::FnvHasher;
use tracing::{debug, info, instrument};

use virtrigaud_api::meta::{Object, ObjectMeta, OwnerReference};
use virtrigaud_api::v1beta1::{
    ManagementPolicy, PvcRetention, UpdateStrategyType, VMSet, VMSetPhase, VMSetVmStatus,
    VirtualMachine, VmTemplate, ORDINAL_LABEL, REVISION_LABEL,
};
use virtrigaud_api::workload::{PersistentVolumeClaim, PvcSpec};
use virtrigaud_common::conditions::{self, Condition, ConditionStatus};
use virtrigaud_store::{ObjectKey, StoreError};

use crate::context::Context;
use crate::runtime::{Action, ReconcileError, Reconciler};

pub struct VmSetReconciler {
    ctx: Arc<Context>,
}

/// One owned replica and its place in the set.
struct Replica {
    vm: VirtualMachine,
    ordinal: i32,
    revision: String,
    ready: bool,
}

impl VmSetReconciler {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    async fn owned_replicas(&self, set: &VMSet) -> Vec<Replica> {
        let ns = &set.metadata.namespace;
        let mut replicas = Vec::new();
        for vm in self.ctx.vms.list(Some(ns)).await {
            if !vm.metadata.is_owned_by(VMSet::KIND, &set.metadata.name) {
                continue;
            }
            if !set.spec.selector.is_empty() && !set.spec.selector.matches(&vm.metadata.labels) {
                continue;
            }
            let ordinal = vm
                .metadata
                .labels
                .get(ORDINAL_LABEL)
                .and_then(|v| v.parse().ok())
                .or_else(|| ordinal_from_name(&set.metadata.name, &vm.metadata.name));
            let Some(ordinal) = ordinal else { continue };
            let revision = vm
                .metadata
                .labels
                .get(REVISION_LABEL)
                .cloned()
                .unwrap_or_default();
            let ready = conditions::is_condition_true(
                &vm.status.conditions,
                conditions::types::READY,
            ) && !vm.metadata.is_deleting();
            replicas.push(Replica {
                vm,
                ordinal,
                revision,
                ready,
            });
        }
        replicas.sort_by_key(|r| r.ordinal);
        replicas
    }

    async fn create_replica(
        &self,
        set: &VMSet,
        ordinal: i32,
        revision: &str,
    ) -> Result<(), ReconcileError> {
        let name = set.vm_name(ordinal);
        let ns = set.metadata.namespace.clone();

        let mut metadata = ObjectMeta::named(ns.clone(), name.clone());
        metadata.labels = set.spec.template.metadata.labels.clone();
        metadata
            .labels
            .extend(set.spec.selector.match_labels.clone());
        metadata
            .labels
            .insert(REVISION_LABEL.to_string(), revision.to_string());
        metadata
            .labels
            .insert(ORDINAL_LABEL.to_string(), ordinal.to_string());
        metadata.annotations = set.spec.template.metadata.annotations.clone();
        metadata.owner_references = vec![OwnerReference::controller_of(set)];

        let vm = VirtualMachine {
            metadata,
            spec: set.spec.template.spec.clone(),
            status: Default::default(),
        };

        match self.ctx.vms.create(vm).await {
            Ok(_) => {
                info!(set = %set.metadata.key(), vm = %name, ordinal, "Created replica");
                self.ctx.recorder.normal(
                    VMSet::KIND,
                    set.metadata.key(),
                    "ReplicaCreated",
                    format!("created {name}"),
                );
            }
            Err(StoreError::AlreadyExists { .. }) => {
                debug!(vm = %name, "Replica already exists");
            }
            Err(e) => return Err(e.into()),
        }

        self.ensure_claims(set, &name).await?;
        Ok(())
    }

    /// Create the per-replica volume claims from the templates.
    async fn ensure_claims(&self, set: &VMSet, vm_name: &str) -> Result<(), ReconcileError> {
        let ns = &set.metadata.namespace;
        for template in &set.spec.volume_claim_templates {
            let claim_name = format!("{}-{}", template.name, vm_name);
            if self.ctx.pvcs.try_get(ns, &claim_name).await.is_some() {
                continue;
            }
            let mut metadata = ObjectMeta::named(ns.clone(), claim_name);
            // Owner-ref only when deletion should cascade to the claims.
            if set.spec.pvc_retention.when_deleted == PvcRetention::Delete {
                metadata.owner_references = vec![OwnerReference::controller_of(set)];
            }
            let pvc = PersistentVolumeClaim {
                metadata,
                spec: PvcSpec {
                    storage_class: template.storage_class.clone(),
                    access_modes: vec!["ReadWriteOnce".to_string()],
                    size: template.size.clone(),
                },
                status: Default::default(),
            };
            match self.ctx.pvcs.create(pvc).await {
                Ok(_) | Err(StoreError::AlreadyExists { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn delete_replica(&self, set: &VMSet, replica: &Replica, scale_down: bool) {
        let ns = &set.metadata.namespace;
        let name = &replica.vm.metadata.name;
        info!(set = %set.metadata.key(), vm = %name, "Deleting replica");
        let _ = self.ctx.vms.delete(ns, name).await;
        self.ctx.recorder.normal(
            VMSet::KIND,
            set.metadata.key(),
            "ReplicaDeleted",
            format!("deleted {name}"),
        );

        if scale_down && set.spec.pvc_retention.when_scaled == PvcRetention::Delete {
            for template in &set.spec.volume_claim_templates {
                let claim_name = format!("{}-{}", template.name, name);
                let _ = self.ctx.pvcs.delete(ns, &claim_name).await;
            }
        }
    }
}

#[async_trait]
impl Reconciler for VmSetReconciler {
    fn name(&self) -> &'static str {
        "vmset"
    }

    #[instrument(skip(self), fields(vmset = %key))]
    async fn reconcile(&self, key: &ObjectKey) -> Result<Action, ReconcileError> {
        let Some(set) = self.ctx.vmsets.try_get(&key.namespace, &key.name).await else {
            return Ok(Action::AwaitChange);
        };
        if set.metadata.is_deleting() {
            // Owner-ref GC cascades to the VMs.
            return Ok(Action::AwaitChange);
        }

        let update_revision = revision_hash(&set.spec.template, set.status.collision_count);
        let replicas = self.owned_replicas(&set).await;
        let by_ordinal: BTreeMap<i32, &Replica> =
            replicas.iter().map(|r| (r.ordinal, r)).collect();
        let desired: Vec<i32> = set.ordinal_range().collect();

        // ---------------------------------------------------------------------
        // Scale up: create missing ordinals.
        // ---------------------------------------------------------------------
        let missing: Vec<i32> = desired
            .iter()
            .copied()
            .filter(|o| !by_ordinal.contains_key(o))
            .collect();
        match set.spec.management_policy {
            ManagementPolicy::Parallel => {
                for ordinal in &missing {
                    self.create_replica(&set, *ordinal, &update_revision).await?;
                }
            }
            ManagementPolicy::OrderedReady => {
                if let Some(&lowest) = missing.first() {
                    let predecessors_ready = desired
                        .iter()
                        .take_while(|&&o| o < lowest)
                        .all(|o| by_ordinal.get(o).map(|r| r.ready).unwrap_or(false));
                    if predecessors_ready {
                        self.create_replica(&set, lowest, &update_revision).await?;
                    }
                }
            }
        }

        // ---------------------------------------------------------------------
        // Scale down: remove ordinals beyond the desired range, highest first.
        // ---------------------------------------------------------------------
        let mut excess: Vec<&Replica> = replicas
            .iter()
            .filter(|r| !desired.contains(&r.ordinal))
            .collect();
        excess.sort_by_key(|r| std::cmp::Reverse(r.ordinal));
        match set.spec.management_policy {
            ManagementPolicy::Parallel => {
                for replica in &excess {
                    self.delete_replica(&set, replica, true).await;
                }
            }
            ManagementPolicy::OrderedReady => {
                if let Some(replica) = excess.first() {
                    self.delete_replica(&set, replica, true).await;
                }
            }
        }

        // ---------------------------------------------------------------------
        // Update strategy.
        // ---------------------------------------------------------------------
        let in_range: Vec<&Replica> = replicas
            .iter()
            .filter(|r| desired.contains(&r.ordinal))
            .collect();
        let stale: Vec<&Replica> = in_range
            .iter()
            .copied()
            .filter(|r| r.revision != update_revision && !r.vm.metadata.is_deleting())
            .collect();

        match set.spec.update_strategy.strategy_type {
            UpdateStrategyType::OnDelete => {}
            UpdateStrategyType::Recreate => {
                if !stale.is_empty() {
                    info!(
                        set = %set.metadata.key(),
                        stale = stale.len(),
                        "Recreate update: deleting all replicas"
                    );
                    for replica in &in_range {
                        self.delete_replica(&set, replica, false).await;
                    }
                }
            }
            UpdateStrategyType::RollingUpdate => {
                let rolling = set
                    .spec
                    .update_strategy
                    .rolling_update
                    .clone()
                    .unwrap_or_default();
                let max_unavailable = rolling
                    .max_unavailable
                    .resolve(set.spec.replicas, false)
                    .max(1);
                let unavailable = desired
                    .iter()
                    .filter(|&o| by_ordinal.get(o).map(|r| !r.ready).unwrap_or(true))
                    .count() as i32;

                let budget = (max_unavailable - unavailable).max(0) as usize;
                // Replace from the highest ordinal down; ordinals below the
                // partition stay at the current revision.
                let mut candidates: Vec<&Replica> = stale
                    .iter()
                    .copied()
                    .filter(|r| r.ordinal >= rolling.partition && r.ready)
                    .collect();
                candidates.sort_by_key(|r| std::cmp::Reverse(r.ordinal));
                for replica in candidates.into_iter().take(budget) {
                    self.delete_replica(&set, replica, false).await;
                }
            }
        }

        // ---------------------------------------------------------------------
        // Status.
        // ---------------------------------------------------------------------
        let replicas = self.owned_replicas(&set).await;
        let in_range: Vec<&Replica> = replicas
            .iter()
            .filter(|r| desired.contains(&r.ordinal))
            .collect();
        let total = in_range.len() as i32;
        let ready = in_range.iter().filter(|r| r.ready).count() as i32;
        let updated = in_range
            .iter()
            .filter(|r| r.revision == update_revision)
            .count() as i32;

        let converged = total == set.spec.replicas && ready == total && updated == total;
        let phase = if converged {
            VMSetPhase::Ready
        } else if updated < total {
            VMSetPhase::Updating
        } else {
            VMSetPhase::Scaling
        };

        let vm_statuses: Vec<VMSetVmStatus> = in_range
            .iter()
            .map(|r| VMSetVmStatus {
                name: r.vm.metadata.name.clone(),
                ordinal: r.ordinal,
                revision: r.revision.clone(),
                phase: r.vm.status.phase,
                ready: r.ready,
            })
            .collect();

        let generation = set.metadata.generation;
        let update_revision_for_status = update_revision.clone();
        self.ctx
            .vmsets
            .modify_status(&key.namespace, &key.name, |set| {
                set.status.replicas = total;
                set.status.ready_replicas = ready;
                set.status.available_replicas = ready;
                set.status.updated_replicas = updated;
                set.status.update_revision = Some(update_revision_for_status.clone());
                if converged || set.status.current_revision.is_none() {
                    set.status.current_revision = Some(update_revision_for_status.clone());
                }
                set.status.vms = vm_statuses.clone();
                set.status.phase = phase;
                set.status.observed_generation = generation;
                conditions::set_condition(
                    &mut set.status.conditions,
                    if converged {
                        Condition::new(
                            conditions::types::READY,
                            ConditionStatus::True,
                            "Converged",
                            "",
                        )
                    } else {
                        Condition::new(
                            conditions::types::READY,
                            ConditionStatus::False,
                            "Progressing",
                            format!("{ready}/{} ready, {updated} updated", set.spec.replicas),
                        )
                    },
                );
            })
            .await?;

        if converged {
            Ok(Action::AwaitChange)
        } else {
            Ok(Action::Requeue(self.ctx.intervals.dependency()))
        }
    }
}

/// FNV-1a over the canonical template JSON, salted with the collision count.
fn revision_hash(template: &VmTemplate, collision_count: u32) -> String {
    let canonical = serde_json::to_string(template).unwrap_or_default();
    let mut hasher = FnvHasher::default();
    hasher.write(canonical.as_bytes());
    hasher.write(&collision_count.to_be_bytes());
    format!("{:x}", hasher.finish())
}

fn ordinal_from_name(set_name: &str, vm_name: &str) -> Option<i32> {
    vm_name
        .strip_prefix(set_name)?
        .strip_prefix('-')?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revision_hash_is_stable_and_sensitive() {
        let template = VmTemplate::default();
        let a = revision_hash(&template, 0);
        let b = revision_hash(&template, 0);
        assert_eq!(a, b);

        // Collision count disambiguates.
        let c = revision_hash(&template, 1);
        assert_ne!(a, c);

        // Template changes move the hash.
        let mut changed = VmTemplate::default();
        changed
            .metadata
            .labels
            .insert("app".to_string(), "db".to_string());
        assert_ne!(a, revision_hash(&changed, 0));
    }

    #[test]
    fn test_ordinal_from_name() {
        assert_eq!(ordinal_from_name("db", "db-0"), Some(0));
        assert_eq!(ordinal_from_name("db", "db-12"), Some(12));
        assert_eq!(ordinal_from_name("db", "web-0"), None);
        assert_eq!(ordinal_from_name("db", "db"), None);
    }
}
