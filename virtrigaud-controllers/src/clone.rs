//! VMClone reconciler.
//!
//! Negotiates the clone type with the provider (downgrading
//! Instant -> Linked -> Full on NotSupported), drives per-disk progress,
//! adopts the cloned VM into the store, and records guest customization
//! step by step.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use virtrigaud_api::meta::{Object, ObjectMeta, ObjectRef};
use virtrigaud_api::v1beta1::{
    ClonePhase, CloneSource, CloneType, CustomizationStatus, DiskCloneProgress, PowerState,
    VMClone, VirtualMachine, VirtualMachineSpec,
};
use virtrigaud_common::conditions::{self, Condition, ConditionStatus};
use virtrigaud_provider::error::ErrorKind;
use virtrigaud_provider::ProviderClient;
use virtrigaud_proto::provider as pb;
use virtrigaud_store::{ObjectKey, StoreError};

use crate::context::Context;
use crate::runtime::{Action, ReconcileError, Reconciler};

/// Customization steps in application order.
const CUSTOMIZATION_STEPS: [&str; 5] = [
    "network",
    "hostname",
    "user-data",
    "guest-commands",
    "certificates",
];

pub struct CloneReconciler {
    ctx: Arc<Context>,
}

/// Resolved clone source.
struct Source {
    vm: VirtualMachine,
    snapshot_id: Option<String>,
}

impl CloneReconciler {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    async fn resolve_source(&self, clone: &VMClone) -> Result<Source, ReconcileError> {
        let ns = &clone.metadata.namespace;
        match &clone.spec.source {
            CloneSource::Vm { vm_ref } => {
                let vm = self.ctx.vms.try_get(ns, &vm_ref.name).await.ok_or_else(|| {
                    ReconcileError::DependencyNotReady(format!("source vm {} not found", vm_ref.name))
                })?;
                Ok(Source {
                    vm,
                    snapshot_id: None,
                })
            }
            CloneSource::Snapshot { snapshot_ref } => {
                let snapshot = self
                    .ctx
                    .snapshots
                    .try_get(ns, &snapshot_ref.name)
                    .await
                    .ok_or_else(|| {
                        ReconcileError::DependencyNotReady(format!(
                            "source snapshot {} not found",
                            snapshot_ref.name
                        ))
                    })?;
                let snapshot_id = snapshot.status.snapshot_id.clone().ok_or_else(|| {
                    ReconcileError::DependencyNotReady(format!(
                        "snapshot {} is not ready",
                        snapshot_ref.name
                    ))
                })?;
                let vm = self
                    .ctx
                    .vms
                    .try_get(ns, &snapshot.spec.vm_ref.name)
                    .await
                    .ok_or_else(|| {
                        ReconcileError::DependencyNotReady(format!(
                            "snapshot source vm {} not found",
                            snapshot.spec.vm_ref.name
                        ))
                    })?;
                Ok(Source {
                    vm,
                    snapshot_id: Some(snapshot_id),
                })
            }
            CloneSource::Template { name } => Err(ReconcileError::Terminal(format!(
                "template source {name} requires a provider-resident template; not resolvable here"
            ))),
            CloneSource::Image { image_ref } => Err(ReconcileError::Terminal(format!(
                "image source {} should be expressed as a VM with imageRef",
                image_ref.name
            ))),
        }
    }

    async fn provider_client(
        &self,
        clone: &VMClone,
        source: &Source,
    ) -> Result<Arc<ProviderClient>, ReconcileError> {
        let ns = &clone.metadata.namespace;
        let provider_ref = clone
            .spec
            .target
            .provider_ref
            .clone()
            .unwrap_or_else(|| source.vm.spec.provider_ref.clone());
        self.ctx.provider_client(ns, &provider_ref).await
    }

    async fn set_phase(
        &self,
        key: &ObjectKey,
        phase: ClonePhase,
        message: Option<String>,
    ) -> Result<(), ReconcileError> {
        self.ctx
            .clones
            .modify_status(&key.namespace, &key.name, |clone| {
                clone.status.phase = phase;
                clone.status.message = message.clone();
            })
            .await?;
        Ok(())
    }

    async fn fail(
        &self,
        key: &ObjectKey,
        reason: &str,
        message: String,
    ) -> Result<Action, ReconcileError> {
        warn!(clone = %key, reason, message = %message, "Clone failed");
        self.ctx
            .recorder
            .warning(VMClone::KIND, key.to_string(), reason, message.clone());
        let reason = reason.to_string();
        self.ctx
            .clones
            .modify_status(&key.namespace, &key.name, |clone| {
                clone.status.phase = ClonePhase::Failed;
                clone.status.message = Some(message.clone());
                conditions::set_condition(
                    &mut clone.status.conditions,
                    Condition::new(
                        conditions::types::READY,
                        ConditionStatus::False,
                        reason.clone(),
                        message.clone(),
                    ),
                );
            })
            .await?;
        Ok(Action::AwaitChange)
    }

    /// Negotiate downward from the requested type against capabilities.
    fn negotiate(
        requested: CloneType,
        caps: &pb::GetCapabilitiesResponse,
        source_running: bool,
        has_snapshot: bool,
    ) -> CloneType {
        let mut candidate = requested;
        loop {
            let supported = match candidate {
                CloneType::Instant => caps.supports_instant_clones && source_running,
                CloneType::Linked => caps.supports_linked_clones && has_snapshot,
                CloneType::Full => true,
            };
            if supported {
                return candidate;
            }
            match candidate.downgrade() {
                Some(weaker) => candidate = weaker,
                None => return CloneType::Full,
            }
        }
    }

    async fn start_clone(
        &self,
        key: &ObjectKey,
        clone: &VMClone,
        source: &Source,
        client: &ProviderClient,
    ) -> Result<Action, ReconcileError> {
        let caps = client.get_capabilities().await?;
        let described = client
            .describe(source.vm.status.id.as_deref().unwrap_or_default())
            .await?;
        let mut negotiated = Self::negotiate(
            clone.spec.options.clone_type,
            &caps,
            described.power_state == "On",
            source.snapshot_id.is_some(),
        );
        if negotiated != clone.spec.options.clone_type {
            info!(
                clone = %key,
                requested = ?clone.spec.options.clone_type,
                negotiated = ?negotiated,
                "Clone type downgraded"
            );
            self.ctx.recorder.normal(
                VMClone::KIND,
                key.to_string(),
                "CloneTypeDowngraded",
                format!(
                    "{:?} not supported, using {:?}",
                    clone.spec.options.clone_type, negotiated
                ),
            );
        }

        let customization_json = clone
            .spec
            .customization
            .as_ref()
            .map(|c| serde_json::to_string(c).unwrap_or_default())
            .unwrap_or_default();

        // The provider may still refuse at runtime; walk the chain down.
        let response = loop {
            let request = pb::CloneRequest {
                source_vm_id: source.vm.status.id.clone().unwrap_or_default(),
                source_snapshot_id: source.snapshot_id.clone().unwrap_or_default(),
                target_name: clone.spec.target.name.clone(),
                clone_type: format!("{negotiated:?}"),
                customization_json: customization_json.clone(),
            };
            match client.clone_vm(request).await {
                Ok(response) => break response,
                Err(e) if e.kind() == ErrorKind::NotSupported => match negotiated.downgrade() {
                    Some(weaker) => {
                        debug!(clone = %key, from = ?negotiated, to = ?weaker, "Provider refused, downgrading");
                        negotiated = weaker;
                    }
                    None => {
                        return self.fail(key, "Unsupported", e.to_string()).await;
                    }
                },
                Err(e) => return Err(e.into()),
            }
        };

        let actual = match response.clone_type.as_str() {
            "Instant" => CloneType::Instant,
            "Linked" => CloneType::Linked,
            _ => CloneType::Full,
        };
        info!(clone = %key, target_id = %response.target_id, ?actual, "Clone started");

        let target_id = response.target_id.clone();
        let task_id = response.task_id.clone();
        self.ctx
            .clones
            .modify_status(&key.namespace, &key.name, |clone| {
                clone.status.phase = ClonePhase::Cloning;
                clone.status.actual_clone_type = Some(actual);
                clone.status.task_ref = if task_id.is_empty() {
                    None
                } else {
                    Some(task_id.clone())
                };
                clone.status.target_ref = Some(ObjectRef::new(target_id.clone()));
            })
            .await?;
        Ok(Action::Requeue(self.ctx.intervals.task_poll()))
    }

    /// Materialize the cloned VM as a store object adopting the provider VM.
    async fn adopt_target(
        &self,
        key: &ObjectKey,
        clone: &VMClone,
        source: &Source,
        provider_vm_id: &str,
    ) -> Result<(), ReconcileError> {
        let target_ns = clone
            .spec
            .target
            .namespace
            .clone()
            .unwrap_or_else(|| key.namespace.clone());
        let target_name = clone.spec.target.name.clone();

        if self.ctx.vms.try_get(&target_ns, &target_name).await.is_none() {
            let mut metadata = ObjectMeta::named(target_ns.clone(), target_name.clone());
            metadata.labels = clone.spec.target.labels.clone();
            metadata.annotations = clone.spec.target.annotations.clone();

            let spec = VirtualMachineSpec {
                provider_ref: clone
                    .spec
                    .target
                    .provider_ref
                    .clone()
                    .unwrap_or_else(|| source.vm.spec.provider_ref.clone()),
                class_ref: clone
                    .spec
                    .target
                    .class_ref
                    .clone()
                    .unwrap_or_else(|| source.vm.spec.class_ref.clone()),
                networks: if clone.spec.target.networks.is_empty() {
                    source.vm.spec.networks.clone()
                } else {
                    clone.spec.target.networks.clone()
                },
                power_state: if clone.spec.target.power_on {
                    PowerState::On
                } else {
                    PowerState::Off
                },
                ..source.vm.spec.clone()
            };

            let vm = VirtualMachine {
                metadata,
                spec,
                status: Default::default(),
            };
            match self.ctx.vms.create(vm).await {
                Ok(_) => {}
                Err(StoreError::AlreadyExists { .. }) => {}
                Err(e) => return Err(e.into()),
            }

            // Adopt the provider-side VM so the VM reconciler skips Create.
            let provider_vm_id = provider_vm_id.to_string();
            self.ctx
                .vms
                .modify_status(&target_ns, &target_name, |vm| {
                    vm.status.id = Some(provider_vm_id.clone());
                })
                .await?;
        }

        let target_ref = ObjectRef {
            name: target_name,
            namespace: Some(target_ns),
        };
        self.ctx
            .clones
            .modify_status(&key.namespace, &key.name, |clone| {
                clone.status.target_ref = Some(target_ref.clone());
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Reconciler for CloneReconciler {
    fn name(&self) -> &'static str {
        "vmclone"
    }

    #[instrument(skip(self), fields(clone = %key))]
    async fn reconcile(&self, key: &ObjectKey) -> Result<Action, ReconcileError> {
        let Some(clone) = self.ctx.clones.try_get(&key.namespace, &key.name).await else {
            return Ok(Action::AwaitChange);
        };

        if clone.metadata.is_deleting() {
            return Ok(Action::AwaitChange);
        }

        match clone.status.phase {
            ClonePhase::Pending => {
                self.set_phase(key, ClonePhase::Validating, None).await?;
                Ok(Action::Requeue(Duration::ZERO))
            }
            ClonePhase::Validating => {
                let source = match self.resolve_source(&clone).await {
                    Ok(source) => source,
                    Err(ReconcileError::Terminal(message)) => {
                        return self.fail(key, "InvalidSource", message).await;
                    }
                    Err(e) => return Err(e),
                };
                if source.vm.status.id.is_none() {
                    return Err(ReconcileError::DependencyNotReady(
                        "source VM has no provider-side instance".to_string(),
                    ));
                }
                let target_ns = clone
                    .spec
                    .target
                    .namespace
                    .clone()
                    .unwrap_or_else(|| key.namespace.clone());
                if self
                    .ctx
                    .vms
                    .try_get(&target_ns, &clone.spec.target.name)
                    .await
                    .is_some()
                {
                    return self
                        .fail(
                            key,
                            "Conflict",
                            format!(
                                "target name {}/{} already in use",
                                target_ns, clone.spec.target.name
                            ),
                        )
                        .await;
                }
                let client = self.provider_client(&clone, &source).await?;
                self.start_clone(key, &clone, &source, &client).await
            }
            ClonePhase::Cloning => {
                let source = self.resolve_source(&clone).await?;
                let client = self.provider_client(&clone, &source).await?;

                if let Some(task_ref) = clone.status.task_ref.clone() {
                    let status = client.task_status(&task_ref).await?;
                    if !status.done {
                        let percent = status.progress_percent.clamp(0, 100) as u8;
                        self.ctx
                            .clones
                            .modify_status(&key.namespace, &key.name, |clone| {
                                clone.status.disk_progress = vec![DiskCloneProgress {
                                    disk_id: "disk0".to_string(),
                                    percent,
                                }];
                            })
                            .await?;
                        return Ok(Action::Requeue(self.ctx.intervals.task_poll()));
                    }
                    if !status.error.is_empty() {
                        let retries = clone.spec.options.retries;
                        if clone.status.retry_count < retries {
                            warn!(clone = %key, error = %status.error, "Clone task failed, retrying");
                            self.ctx
                                .clones
                                .modify_status(&key.namespace, &key.name, |clone| {
                                    clone.status.retry_count += 1;
                                    clone.status.task_ref = None;
                                    clone.status.phase = ClonePhase::Validating;
                                })
                                .await?;
                            return Ok(Action::Requeue(self.ctx.intervals.dependency()));
                        }
                        return self.fail(key, "CloneFailed", status.error).await;
                    }
                }

                // Clone finished: adopt the target into the store.
                let provider_vm_id = clone
                    .status
                    .target_ref
                    .clone()
                    .map(|r| r.name)
                    .unwrap_or_default();
                self.adopt_target(key, &clone, &source, &provider_vm_id)
                    .await?;
                self.ctx
                    .clones
                    .modify_status(&key.namespace, &key.name, |clone| {
                        clone.status.task_ref = None;
                        clone.status.phase = ClonePhase::Customizing;
                        clone.status.disk_progress = vec![DiskCloneProgress {
                            disk_id: "disk0".to_string(),
                            percent: 100,
                        }];
                    })
                    .await?;
                Ok(Action::Requeue(Duration::ZERO))
            }
            ClonePhase::Customizing => {
                if clone.spec.customization.is_none() {
                    self.ctx
                        .clones
                        .modify_status(&key.namespace, &key.name, |clone| {
                            clone.status.phase = ClonePhase::Ready;
                            conditions::set_condition(
                                &mut clone.status.conditions,
                                Condition::new(
                                    conditions::types::READY,
                                    ConditionStatus::True,
                                    "CloneReady",
                                    "",
                                ),
                            );
                        })
                        .await?;
                    return Ok(Action::AwaitChange);
                }

                // Record one customization step per pass, in order.
                let completed = clone
                    .status
                    .customization
                    .as_ref()
                    .map(|c| c.completed_steps.len())
                    .unwrap_or(0);
                if completed < CUSTOMIZATION_STEPS.len() {
                    let step = CUSTOMIZATION_STEPS[completed];
                    debug!(clone = %key, step, "Applying customization step");
                    self.ctx
                        .clones
                        .modify_status(&key.namespace, &key.name, |clone| {
                            let customization = clone
                                .status
                                .customization
                                .get_or_insert_with(CustomizationStatus::default);
                            customization.completed_steps.push(step.to_string());
                            customization.current_step = CUSTOMIZATION_STEPS
                                .get(customization.completed_steps.len())
                                .map(|s| s.to_string());
                        })
                        .await?;
                    return Ok(Action::Requeue(Duration::ZERO));
                }

                info!(clone = %key, "Clone ready");
                self.ctx.recorder.normal(
                    VMClone::KIND,
                    key.to_string(),
                    "CloneReady",
                    "clone completed and customized",
                );
                self.ctx
                    .clones
                    .modify_status(&key.namespace, &key.name, |clone| {
                        clone.status.phase = ClonePhase::Ready;
                        if let Some(customization) = &mut clone.status.customization {
                            customization.current_step = None;
                        }
                        conditions::set_condition(
                            &mut clone.status.conditions,
                            Condition::new(
                                conditions::types::READY,
                                ConditionStatus::True,
                                "CloneReady",
                                "",
                            ),
                        );
                    })
                    .await?;
                Ok(Action::AwaitChange)
            }
            ClonePhase::Ready | ClonePhase::Failed => Ok(Action::AwaitChange),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(instant: bool, linked: bool) -> pb::GetCapabilitiesResponse {
        pb::GetCapabilitiesResponse {
            supports_instant_clones: instant,
            supports_linked_clones: linked,
            ..Default::default()
        }
    }

    #[test]
    fn test_negotiate_downgrade_chain() {
        // Provider only does full clones.
        assert_eq!(
            CloneReconciler::negotiate(CloneType::Instant, &caps(false, false), true, true),
            CloneType::Full
        );
        // Linked supported and a snapshot exists.
        assert_eq!(
            CloneReconciler::negotiate(CloneType::Instant, &caps(false, true), true, true),
            CloneType::Linked
        );
        // Instant requires a running source.
        assert_eq!(
            CloneReconciler::negotiate(CloneType::Instant, &caps(true, true), false, true),
            CloneType::Linked
        );
        // Linked requires a snapshot.
        assert_eq!(
            CloneReconciler::negotiate(CloneType::Linked, &caps(true, true), true, false),
            CloneType::Full
        );
        // Requested type kept when supported.
        assert_eq!(
            CloneReconciler::negotiate(CloneType::Instant, &caps(true, true), true, true),
            CloneType::Instant
        );
    }
}
