//! VMSnapshot reconciler.
//!
//! Creates snapshots (one-shot or on a cron schedule), refreshes their
//! state, enforces retention, and maintains the snapshot tree: a snapshot
//! with children cannot be deleted until the children are gone, and
//! children of a deleted snapshot are spliced onto its parent.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use virtrigaud_api::meta::Object;
use virtrigaud_api::v1beta1::{
    ConcurrencyPolicy, SnapshotHistoryEntry, SnapshotPhase, VMSnapshot, VirtualMachine,
    SNAPSHOT_FINALIZER,
};
use virtrigaud_common::conditions::{self, Condition, ConditionStatus};
use virtrigaud_common::schedule::Schedule;
use virtrigaud_provider::ProviderClient;
use virtrigaud_proto::provider as pb;
use virtrigaud_store::ObjectKey;

use crate::context::Context;
use crate::runtime::{Action, ReconcileError, Reconciler};

pub struct SnapshotReconciler {
    ctx: Arc<Context>,
}

impl SnapshotReconciler {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    async fn resolve(
        &self,
        snapshot: &VMSnapshot,
    ) -> Result<(VirtualMachine, Arc<ProviderClient>), ReconcileError> {
        let ns = &snapshot.metadata.namespace;
        let vm = self
            .ctx
            .vms
            .try_get(ns, &snapshot.spec.vm_ref.name)
            .await
            .ok_or_else(|| {
                ReconcileError::DependencyNotReady(format!(
                    "vm {} not found",
                    snapshot.spec.vm_ref.name
                ))
            })?;
        if vm.status.id.is_none() {
            return Err(ReconcileError::DependencyNotReady(format!(
                "vm {} has no provider-side instance yet",
                vm.metadata.name
            )));
        }
        let client = self.ctx.provider_client(ns, &vm.spec.provider_ref).await?;
        Ok((vm, client))
    }

    /// Issue a provider snapshot and record the handles.
    async fn create_snapshot(
        &self,
        key: &ObjectKey,
        snapshot: &VMSnapshot,
        vm: &VirtualMachine,
        client: &ProviderClient,
        name: String,
        scheduled: bool,
    ) -> Result<Action, ReconcileError> {
        let response = client
            .snapshot_create(pb::SnapshotCreateRequest {
                vm_id: vm.status.id.clone().unwrap_or_default(),
                name: name.clone(),
                include_memory: snapshot.spec.config.include_memory,
                quiesce: snapshot.spec.config.quiesce,
            })
            .await?;

        info!(
            snapshot = %key,
            provider_snapshot = %response.snapshot_id,
            scheduled,
            "Snapshot creation issued"
        );
        self.ctx.recorder.normal(
            VMSnapshot::KIND,
            key.to_string(),
            "SnapshotCreating",
            format!("creating provider snapshot {name}"),
        );

        let snapshot_id = response.snapshot_id.clone();
        let task_id = response.task_id.clone();
        self.ctx
            .snapshots
            .modify_status(&key.namespace, &key.name, |snapshot| {
                snapshot.status.snapshot_id = Some(snapshot_id.clone());
                snapshot.status.phase = SnapshotPhase::Creating;
                snapshot.status.task_ref = if task_id.is_empty() {
                    None
                } else {
                    Some(task_id.clone())
                };
                if scheduled {
                    snapshot.status.last_scheduled_at = Some(Utc::now());
                }
            })
            .await?;
        Ok(Action::Requeue(self.ctx.intervals.task_poll()))
    }

    /// Drop the oldest history entries beyond the retention limits.
    async fn enforce_retention(
        &self,
        key: &ObjectKey,
        snapshot: &VMSnapshot,
        vm: &VirtualMachine,
        client: &ProviderClient,
    ) -> Result<(), ReconcileError> {
        let Some(retention) = &snapshot.spec.retention else {
            return Ok(());
        };
        if snapshot.spec.pinned && retention.preserve_pinned {
            return Ok(());
        }
        let vm_id = vm.status.id.clone().unwrap_or_default();
        let now = Utc::now();

        let mut to_delete: Vec<String> = Vec::new();
        let mut history = snapshot.status.history.clone();

        if let Some(max_age_hours) = retention.max_age_hours {
            let cutoff = now - chrono::Duration::hours(max_age_hours as i64);
            history.retain(|entry| {
                let expired = entry
                    .created_at
                    .map(|created| created < cutoff)
                    .unwrap_or(false);
                if expired {
                    to_delete.push(entry.snapshot_id.clone());
                }
                !expired
            });
        }

        if let Some(max_count) = retention.max_count {
            while history.len() > max_count as usize {
                let entry = history.remove(0);
                to_delete.push(entry.snapshot_id);
            }
        }

        if to_delete.is_empty() {
            return Ok(());
        }

        for snapshot_id in &to_delete {
            debug!(snapshot = %key, provider_snapshot = %snapshot_id, "Retention pruning");
            if let Err(e) = client.snapshot_delete(&vm_id, snapshot_id).await {
                warn!(snapshot = %key, error = %e, "Retention delete failed");
            }
        }
        self.ctx.recorder.normal(
            VMSnapshot::KIND,
            key.to_string(),
            "RetentionPruned",
            format!("pruned {} snapshot(s)", to_delete.len()),
        );

        let latest_gone = snapshot
            .status
            .snapshot_id
            .as_ref()
            .map(|id| to_delete.contains(id))
            .unwrap_or(false);
        self.ctx
            .snapshots
            .modify_status(&key.namespace, &key.name, |snapshot| {
                snapshot.status.history = history.clone();
                if latest_gone {
                    snapshot.status.snapshot_id = None;
                    snapshot.status.phase = SnapshotPhase::Expired;
                }
            })
            .await?;
        Ok(())
    }

    async fn finalize(
        &self,
        key: &ObjectKey,
        snapshot: &VMSnapshot,
    ) -> Result<Action, ReconcileError> {
        if !snapshot.metadata.has_finalizer(SNAPSHOT_FINALIZER) {
            return Ok(Action::AwaitChange);
        }

        // Children block deletion until they are deleted or reparented.
        if !snapshot.status.children.is_empty() {
            self.ctx.recorder.warning(
                VMSnapshot::KIND,
                key.to_string(),
                "ChildrenExist",
                format!(
                    "{} child snapshot(s) must be deleted first",
                    snapshot.status.children.len()
                ),
            );
            self.ctx
                .snapshots
                .modify_status(&key.namespace, &key.name, |snapshot| {
                    conditions::set_condition(
                        &mut snapshot.status.conditions,
                        Condition::new(
                            conditions::types::DELETING,
                            ConditionStatus::False,
                            "ChildrenExist",
                            "",
                        ),
                    );
                })
                .await?;
            return Ok(Action::Requeue(self.ctx.intervals.drift()));
        }

        if let Some(snapshot_id) = &snapshot.status.snapshot_id {
            if let Ok((vm, client)) = self.resolve(snapshot).await {
                let vm_id = vm.status.id.clone().unwrap_or_default();
                // Delete is idempotent provider-side.
                if let Err(e) = client.snapshot_delete(&vm_id, snapshot_id).await {
                    if e.is_retryable() {
                        return Err(ReconcileError::Provider(e));
                    }
                    warn!(snapshot = %key, error = %e, "Provider snapshot delete failed");
                }
                for entry in &snapshot.status.history {
                    let _ = client.snapshot_delete(&vm_id, &entry.snapshot_id).await;
                }
            }

            // Splice our children (if any appeared late) onto our parent.
            let parent = snapshot.status.parent.clone();
            let ns = key.namespace.clone();
            for sibling in self.ctx.snapshots.list(Some(&ns)).await {
                if sibling.status.parent.as_deref() == Some(snapshot_id.as_str()) {
                    let name = sibling.metadata.name.clone();
                    let parent = parent.clone();
                    let _ = self
                        .ctx
                        .snapshots
                        .modify_status(&ns, &name, |sibling| {
                            sibling.status.parent = parent.clone();
                        })
                        .await;
                }
            }
        }

        self.ctx
            .snapshots
            .modify(&key.namespace, &key.name, |snapshot| {
                snapshot.metadata.remove_finalizer(SNAPSHOT_FINALIZER);
            })
            .await?;
        Ok(Action::AwaitChange)
    }
}

#[async_trait]
impl Reconciler for SnapshotReconciler {
    fn name(&self) -> &'static str {
        "vmsnapshot"
    }

    #[instrument(skip(self), fields(snapshot = %key))]
    async fn reconcile(&self, key: &ObjectKey) -> Result<Action, ReconcileError> {
        let Some(snapshot) = self.ctx.snapshots.try_get(&key.namespace, &key.name).await
        else {
            return Ok(Action::AwaitChange);
        };

        if snapshot.metadata.is_deleting() {
            return self.finalize(key, &snapshot).await;
        }

        if !snapshot.metadata.has_finalizer(SNAPSHOT_FINALIZER) {
            self.ctx
                .snapshots
                .modify(&key.namespace, &key.name, |snapshot| {
                    snapshot.metadata.add_finalizer(SNAPSHOT_FINALIZER);
                })
                .await?;
            return Ok(Action::Requeue(Duration::ZERO));
        }

        let (vm, client) = self.resolve(&snapshot).await?;

        // Drain an outstanding creation task.
        if let Some(task_ref) = snapshot.status.task_ref.clone() {
            let status = client.task_status(&task_ref).await?;
            if !status.done {
                return Ok(Action::Requeue(self.ctx.intervals.task_poll()));
            }
            if !status.error.is_empty() {
                warn!(snapshot = %key, error = %status.error, "Snapshot creation failed");
                let message = status.error.clone();
                self.ctx
                    .snapshots
                    .modify_status(&key.namespace, &key.name, |snapshot| {
                        snapshot.status.task_ref = None;
                        snapshot.status.phase = SnapshotPhase::Failed;
                        snapshot.status.message = Some(message.clone());
                        conditions::set_condition(
                            &mut snapshot.status.conditions,
                            Condition::new(
                                conditions::types::READY,
                                ConditionStatus::False,
                                "SnapshotFailed",
                                message.clone(),
                            ),
                        );
                    })
                    .await?;
                return Ok(Action::AwaitChange);
            }

            let snapshot_id = snapshot.status.snapshot_id.clone().unwrap_or_default();
            let expires_at = snapshot
                .spec
                .retention
                .as_ref()
                .and_then(|r| r.max_age_hours)
                .map(|hours| Utc::now() + chrono::Duration::hours(hours as i64));
            self.ctx
                .snapshots
                .modify_status(&key.namespace, &key.name, |snapshot| {
                    snapshot.status.task_ref = None;
                    snapshot.status.phase = SnapshotPhase::Ready;
                    snapshot.status.created_at = Some(Utc::now());
                    snapshot.status.expires_at = expires_at;
                    snapshot.status.history.push(SnapshotHistoryEntry {
                        snapshot_id: snapshot_id.clone(),
                        created_at: Some(Utc::now()),
                    });
                    conditions::set_condition(
                        &mut snapshot.status.conditions,
                        Condition::new(
                            conditions::types::READY,
                            ConditionStatus::True,
                            "SnapshotReady",
                            "",
                        ),
                    );
                })
                .await?;
            self.ctx.recorder.normal(
                VMSnapshot::KIND,
                key.to_string(),
                "SnapshotReady",
                "provider snapshot is ready",
            );

            // Surface the snapshot in the VM's status list so revert
            // operations can resolve it by name.
            let vm_name = vm.metadata.name.clone();
            let entry_name = key.name.clone();
            self.ctx
                .vms
                .modify_status(&key.namespace, &vm_name, |vm| {
                    if !vm.status.snapshots.iter().any(|s| s.id == snapshot_id) {
                        vm.status.snapshots.push(
                            virtrigaud_api::v1beta1::VmSnapshotEntry {
                                id: snapshot_id.clone(),
                                name: entry_name.clone(),
                                created_at: Some(Utc::now()),
                            },
                        );
                    }
                })
                .await?;
            return Ok(Action::Requeue(self.ctx.intervals.drift()));
        }

        // Scheduled snapshots fire repeatedly under the same object.
        if let Some(schedule_spec) = &snapshot.spec.schedule {
            let schedule =
                match Schedule::parse(&schedule_spec.cron, schedule_spec.time_zone.as_deref()) {
                    Ok(schedule) => schedule,
                    Err(e) => {
                        self.ctx
                            .snapshots
                            .modify_status(&key.namespace, &key.name, |snapshot| {
                                snapshot.status.phase = SnapshotPhase::Failed;
                                snapshot.status.message = Some(e.to_string());
                                conditions::set_condition(
                                    &mut snapshot.status.conditions,
                                    Condition::new(
                                        conditions::types::READY,
                                        ConditionStatus::False,
                                        "InvalidSchedule",
                                        e.to_string(),
                                    ),
                                );
                            })
                            .await?;
                        return Ok(Action::AwaitChange);
                    }
                };

            let anchor = snapshot
                .status
                .last_scheduled_at
                .or(snapshot.metadata.creation_timestamp)
                .unwrap_or_else(Utc::now);
            let now = Utc::now();

            if let Some(next) = schedule.next_after(anchor) {
                if next <= now {
                    let in_flight = snapshot.status.phase == SnapshotPhase::Creating;
                    let proceed = match (in_flight, schedule_spec.concurrency_policy) {
                        (false, _) => true,
                        (true, ConcurrencyPolicy::Allow) => true,
                        (true, ConcurrencyPolicy::Replace) => true,
                        (true, ConcurrencyPolicy::Forbid) => {
                            debug!(snapshot = %key, "Firing skipped: previous still in flight");
                            self.ctx
                                .snapshots
                                .modify_status(&key.namespace, &key.name, |snapshot| {
                                    snapshot.status.last_scheduled_at = Some(now);
                                })
                                .await?;
                            false
                        }
                    };
                    if proceed {
                        let name = format!("{}-{}", key.name, now.timestamp());
                        return self
                            .create_snapshot(key, &snapshot, &vm, &client, name, true)
                            .await;
                    }
                }
                self.enforce_retention(key, &snapshot, &vm, &client).await?;
                let wait = (next - now)
                    .to_std()
                    .unwrap_or(Duration::ZERO)
                    .min(self.ctx.intervals.drift());
                return Ok(Action::Requeue(wait.max(self.ctx.intervals.task_poll())));
            }
            return Ok(Action::AwaitChange);
        }

        // One-shot snapshot.
        if snapshot.status.snapshot_id.is_none() {
            let name = key.name.clone();
            return self
                .create_snapshot(key, &snapshot, &vm, &client, name, false)
                .await;
        }

        // Expiry of the one-shot snapshot.
        if let Some(expires_at) = snapshot.status.expires_at {
            let preserve = snapshot.spec.pinned
                && snapshot
                    .spec
                    .retention
                    .as_ref()
                    .map(|r| r.preserve_pinned)
                    .unwrap_or(false);
            if Utc::now() > expires_at && !preserve {
                info!(snapshot = %key, "Snapshot expired");
                let vm_id = vm.status.id.clone().unwrap_or_default();
                if let Some(snapshot_id) = &snapshot.status.snapshot_id {
                    let _ = client.snapshot_delete(&vm_id, snapshot_id).await;
                }
                self.ctx
                    .snapshots
                    .modify_status(&key.namespace, &key.name, |snapshot| {
                        snapshot.status.phase = SnapshotPhase::Expired;
                    })
                    .await?;
                return Ok(Action::AwaitChange);
            }
        }

        self.enforce_retention(key, &snapshot, &vm, &client).await?;
        Ok(Action::Requeue(self.ctx.intervals.drift()))
    }
}
