//! VirtualMachine reconciler.
//!
//! Drives per-VM create/reconfigure/power/delete against the provider and
//! owns task correlation: at most one tracked task per VM, persisted in
//! status before any further action so a controller restart resumes by
//! polling instead of re-issuing.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use virtrigaud_api::meta::Object;
use virtrigaud_api::v1beta1::{
    ImageSource, ObservedPowerState, PowerState, Provider, ProviderCapabilities, TaskKind,
    TrackedTask, UserData, VMClass, VMImage, VMNetworkAttachment, VMPlacementPolicy,
    VirtualMachine, VmNetworkRef, VmPhase, CurrentResources, REQUESTED_PROVIDERS_ANNOTATION,
    VM_FINALIZER,
};
use virtrigaud_common::conditions::{self, Condition, ConditionStatus};
use virtrigaud_common::quantity::parse_quantity;
use virtrigaud_provider::api::{ClassDocument, DiskDocument, ImageDocument, NetworkDocument, PlacementDocument};
use virtrigaud_provider::error::ErrorKind;
use virtrigaud_provider::ProviderClient;
use virtrigaud_proto::provider as pb;
use virtrigaud_store::ObjectKey;

use crate::context::Context;
use crate::runtime::{Action, ReconcileError, Reconciler};

/// Resolved references of one VM.
struct Dependencies {
    provider: Provider,
    client: Arc<ProviderClient>,
    class: VMClass,
    image: Option<VMImage>,
    networks: Vec<VMNetworkAttachment>,
    placement_doc: PlacementDocument,
    user_data: String,
}

pub struct VmReconciler {
    ctx: Arc<Context>,
}

impl VmReconciler {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    // =========================================================================
    // Reference resolution
    // =========================================================================

    async fn resolve(&self, vm: &VirtualMachine) -> Result<Dependencies, ReconcileError> {
        let ns = &vm.metadata.namespace;

        let provider = self.ctx.provider(ns, &vm.spec.provider_ref).await?;
        let client = self.ctx.provider_client(ns, &vm.spec.provider_ref).await?;

        let class = self
            .ctx
            .classes
            .try_get(ns, &vm.spec.class_ref.name)
            .await
            .ok_or_else(|| {
                ReconcileError::DependencyNotReady(format!(
                    "vmclass {} not found",
                    vm.spec.class_ref.name
                ))
            })?;

        let image = match &vm.spec.image_ref {
            Some(image_ref) => Some(self.ctx.images.try_get(ns, &image_ref.name).await.ok_or_else(
                || {
                    ReconcileError::DependencyNotReady(format!(
                        "vmimage {} not found",
                        image_ref.name
                    ))
                },
            )?),
            None => None,
        };

        let mut networks = Vec::with_capacity(vm.spec.networks.len());
        for attachment in &vm.spec.networks {
            let network = self
                .ctx
                .networks
                .try_get(ns, &attachment.name)
                .await
                .ok_or_else(|| {
                    ReconcileError::DependencyNotReady(format!(
                        "network attachment {} not found",
                        attachment.name
                    ))
                })?;
            networks.push(network);
        }

        let placement = match &vm.spec.placement_ref {
            Some(placement_ref) => Some(
                self.ctx
                    .placements
                    .try_get(ns, &placement_ref.name)
                    .await
                    .ok_or_else(|| {
                        ReconcileError::DependencyNotReady(format!(
                            "placement policy {} not found",
                            placement_ref.name
                        ))
                    })?,
            ),
            None => None,
        };
        let placement_doc = placement
            .as_ref()
            .map(placement_document)
            .unwrap_or_default();

        let user_data = match &vm.spec.user_data {
            None => String::new(),
            Some(UserData::CloudInit { inline, secret_ref })
            | Some(UserData::Ignition { inline, secret_ref }) => {
                if let Some(inline) = inline {
                    inline.clone()
                } else if let Some(secret_ref) = secret_ref {
                    let secret =
                        self.ctx.secrets.try_get(ns, &secret_ref.name).await.ok_or_else(|| {
                            ReconcileError::DependencyNotReady(format!(
                                "user-data secret {} not found",
                                secret_ref.name
                            ))
                        })?;
                    secret.decoded_string("user-data").map_err(|e| {
                        ReconcileError::Terminal(format!("user-data secret unreadable: {e}"))
                    })?
                } else {
                    String::new()
                }
            }
        };

        Ok(Dependencies {
            provider,
            client,
            class,
            image,
            networks,
            placement_doc,
            user_data,
        })
    }

    /// Kick the image reconciler toward this VM's provider and wait.
    async fn request_image_preparation(
        &self,
        vm: &VirtualMachine,
        image: &VMImage,
        provider_name: &str,
    ) -> Result<(), ReconcileError> {
        let ns = &vm.metadata.namespace;
        let name = image.metadata.name.clone();
        let provider = provider_name.to_string();
        self.ctx
            .images
            .modify(ns, &name, |image| {
                let entry = image
                    .metadata
                    .annotations
                    .entry(REQUESTED_PROVIDERS_ANNOTATION.to_string())
                    .or_default();
                if !entry.split(',').any(|p| p == provider) {
                    if entry.is_empty() {
                        *entry = provider.clone();
                    } else {
                        entry.push(',');
                        entry.push_str(&provider);
                    }
                }
            })
            .await?;
        Err(ReconcileError::DependencyNotReady(format!(
            "image {} not ready on provider {}",
            name, provider
        )))
    }

    // =========================================================================
    // Status helpers
    // =========================================================================

    async fn set_waiting(&self, vm: &VirtualMachine, message: &str) {
        let ns = vm.metadata.namespace.clone();
        let name = vm.metadata.name.clone();
        let message = message.to_string();
        let _ = self
            .ctx
            .vms
            .modify_status(&ns, &name, |vm| {
                conditions::set_condition(
                    &mut vm.status.conditions,
                    Condition::new(
                        conditions::types::READY,
                        ConditionStatus::Unknown,
                        "WaitingForDependencies",
                        message.clone(),
                    ),
                );
            })
            .await;
    }

    async fn mark_invalid(&self, vm: &VirtualMachine, message: String) {
        let ns = vm.metadata.namespace.clone();
        let name = vm.metadata.name.clone();
        self.ctx
            .recorder
            .warning(VirtualMachine::KIND, vm.metadata.key(), "InvalidSpec", &message);
        let _ = self
            .ctx
            .vms
            .modify_status(&ns, &name, |vm| {
                conditions::set_condition(
                    &mut vm.status.conditions,
                    Condition::new(
                        conditions::types::READY,
                        ConditionStatus::False,
                        "InvalidSpec",
                        message.clone(),
                    ),
                );
            })
            .await;
    }

    async fn record_task(
        &self,
        vm: &VirtualMachine,
        task_id: &str,
        operation: TaskKind,
        phase: Option<VmPhase>,
    ) -> Result<(), ReconcileError> {
        let ns = vm.metadata.namespace.clone();
        let name = vm.metadata.name.clone();
        let task_id = task_id.to_string();
        self.ctx
            .vms
            .modify_status(&ns, &name, |vm| {
                if !task_id.is_empty() {
                    vm.status.last_task = Some(TrackedTask {
                        task_id: task_id.clone(),
                        operation,
                        started_at: Utc::now(),
                    });
                }
                if let Some(phase) = phase {
                    vm.status.phase = phase;
                }
            })
            .await?;
        Ok(())
    }

    // =========================================================================
    // Create
    // =========================================================================

    async fn create(
        &self,
        vm: &VirtualMachine,
        deps: &Dependencies,
    ) -> Result<Action, ReconcileError> {
        let request = build_create_request(vm, deps)?;
        let response = deps.client.create(request).await?;

        info!(
            vm = %vm.metadata.key(),
            provider_id = %response.id,
            "VM created on provider"
        );
        self.ctx.recorder.normal(
            VirtualMachine::KIND,
            vm.metadata.key(),
            "Provisioning",
            format!("created on provider as {}", response.id),
        );

        // Persist ID and task atomically before anything else happens to
        // this VM; the CAS write guarantees exactly-once persistence.
        let ns = vm.metadata.namespace.clone();
        let name = vm.metadata.name.clone();
        let id = response.id.clone();
        let task_id = response.task_id.clone();
        self.ctx
            .vms
            .modify_status(&ns, &name, |vm| {
                vm.status.id = Some(id.clone());
                vm.status.phase = VmPhase::Provisioning;
                if !task_id.is_empty() {
                    vm.status.last_task = Some(TrackedTask {
                        task_id: task_id.clone(),
                        operation: TaskKind::Create,
                        started_at: Utc::now(),
                    });
                }
                conditions::set_condition(
                    &mut vm.status.conditions,
                    Condition::new(
                        conditions::types::PROVISIONING,
                        ConditionStatus::True,
                        "CreateIssued",
                        "",
                    ),
                );
            })
            .await?;

        Ok(Action::Requeue(self.ctx.intervals.task_poll()))
    }

    // =========================================================================
    // Task draining
    // =========================================================================

    /// Poll the tracked task. Returns Some(action) when the reconcile must
    /// stop here, None when convergence may continue.
    async fn drain_task(
        &self,
        vm: &VirtualMachine,
        deps: &Dependencies,
        task: &TrackedTask,
    ) -> Result<Option<Action>, ReconcileError> {
        let status = deps.client.task_status(&task.task_id).await?;

        if !status.done {
            // Tie-break: power may overtake an online-safe reconfigure.
            let caps = capabilities(&deps.provider);
            if task.operation == TaskKind::Reconfigure && caps.reconfigure_online {
                debug!(vm = %vm.metadata.key(), "Reconfigure online-safe, allowing power ops");
                return Ok(None);
            }
            return Ok(Some(Action::Requeue(self.ctx.intervals.task_poll())));
        }

        let ns = vm.metadata.namespace.clone();
        let name = vm.metadata.name.clone();

        if status.error.is_empty() {
            debug!(vm = %vm.metadata.key(), task = %task.task_id, "Task completed");
            self.ctx
                .vms
                .modify_status(&ns, &name, |vm| {
                    vm.status.last_task = None;
                })
                .await?;
            return Ok(None);
        }

        let error = virtrigaud_provider::ProviderError::from_task_error(&status.error);
        if error.is_retryable() {
            // Clear the task and let the backoff retry the operation.
            self.ctx
                .vms
                .modify_status(&ns, &name, |vm| {
                    vm.status.last_task = None;
                    conditions::set_condition(
                        &mut vm.status.conditions,
                        Condition::new(
                            conditions::types::READY,
                            ConditionStatus::Unknown,
                            "TaskInProgress",
                            format!("task failed transiently: {error}"),
                        ),
                    );
                })
                .await?;
            return Err(ReconcileError::Provider(error));
        }

        warn!(vm = %vm.metadata.key(), error = %error, "Task failed terminally");
        self.ctx.recorder.warning(
            VirtualMachine::KIND,
            vm.metadata.key(),
            error.kind().as_str(),
            error.to_string(),
        );
        self.ctx
            .vms
            .modify_status(&ns, &name, |vm| {
                vm.status.last_task = None;
                vm.status.phase = VmPhase::Failed;
                conditions::set_condition(
                    &mut vm.status.conditions,
                    Condition::new(
                        conditions::types::READY,
                        ConditionStatus::False,
                        map_reason(error.kind()),
                        error.to_string(),
                    ),
                );
            })
            .await?;
        Ok(Some(Action::AwaitChange))
    }

    // =========================================================================
    // Convergence
    // =========================================================================

    async fn converge(
        &self,
        vm: &VirtualMachine,
        deps: &Dependencies,
        id: &str,
    ) -> Result<Action, ReconcileError> {
        let described = deps.client.describe(id).await?;

        if !described.exists {
            // The provider-side VM vanished out-of-band; recreate next pass.
            warn!(vm = %vm.metadata.key(), "Provider VM missing, clearing ID for recreate");
            let ns = vm.metadata.namespace.clone();
            let name = vm.metadata.name.clone();
            self.ctx
                .vms
                .modify_status(&ns, &name, |vm| {
                    vm.status.id = None;
                    vm.status.phase = VmPhase::Pending;
                    vm.status.power_state = ObservedPowerState::Unknown;
                    vm.status.ips.clear();
                })
                .await?;
            return Ok(Action::Requeue(std::time::Duration::ZERO));
        }

        let observed_power = parse_power(&described.power_state);
        let ns = vm.metadata.namespace.clone();
        let name = vm.metadata.name.clone();

        // Snapshot revert operation requested through the spec.
        if let Some(revert_to) = vm.spec.snapshot.as_ref().and_then(|s| s.revert_to.clone()) {
            let already = conditions::get_condition(&vm.status.conditions, "SnapshotReverted")
                .map(|c| c.message.as_deref() == Some(revert_to.as_str()))
                .unwrap_or(false);
            if !already {
                if let Some(entry) = vm.status.snapshots.iter().find(|s| s.name == revert_to) {
                    let task = deps.client.snapshot_revert(id, &entry.id).await?;
                    let snapshot_name = revert_to.clone();
                    self.ctx
                        .vms
                        .modify_status(&ns, &name, |vm| {
                            conditions::set_condition(
                                &mut vm.status.conditions,
                                Condition::new(
                                    "SnapshotReverted",
                                    ConditionStatus::True,
                                    "RevertIssued",
                                    snapshot_name.clone(),
                                ),
                            );
                        })
                        .await?;
                    self.record_task(vm, &task.task_id, TaskKind::SnapshotRevert, None)
                        .await?;
                    return Ok(Action::Requeue(self.ctx.intervals.task_poll()));
                }
                self.mark_invalid(vm, format!("snapshot {revert_to} not found for revert"))
                    .await;
                return Ok(Action::AwaitChange);
            }
        }

        // Power convergence.
        let desired_on = vm.spec.power_state == PowerState::On;
        let observed_on = observed_power == ObservedPowerState::On;
        if desired_on != observed_on {
            let op = match vm.spec.power_state {
                PowerState::On => pb::PowerOp::On,
                PowerState::Off => pb::PowerOp::Off,
                PowerState::OffGraceful => pb::PowerOp::OffGraceful,
            };
            info!(vm = %vm.metadata.key(), desired = ?vm.spec.power_state, "Converging power state");
            let task = deps.client.power(id, op).await?;
            self.ctx.recorder.normal(
                VirtualMachine::KIND,
                vm.metadata.key(),
                "PowerStateChanging",
                format!("driving power toward {:?}", vm.spec.power_state),
            );
            self.record_task(vm, &task.task_id, TaskKind::Power, None).await?;
            return Ok(Action::Requeue(self.ctx.intervals.task_poll()));
        }

        // Resource convergence.
        let desired = desired_class(&deps.class, vm)?;
        let current = CurrentResources {
            cpu: described.cpu,
            memory_bytes: described.memory_bytes,
        };
        if vm.status.last_task.is_none()
            && described.cpu != 0
            && (current.cpu != desired.cpu || current.memory_bytes != desired.memory_bytes)
        {
            info!(
                vm = %vm.metadata.key(),
                cpu = desired.cpu,
                memory_bytes = desired.memory_bytes,
                "Converging resources"
            );
            let request = pb::ReconfigureRequest {
                id: id.to_string(),
                class_json: encode_json(&desired)?,
                disk_json: disk_documents(vm)?,
            };
            let task = deps.client.reconfigure(request).await?;
            self.record_task(vm, &task.task_id, TaskKind::Reconfigure, Some(VmPhase::Reconfiguring))
                .await?;
            return Ok(Action::Requeue(self.ctx.intervals.task_poll()));
        }

        // An online-safe task is still pending; hold the converged write
        // until it drains.
        if vm.status.last_task.is_some() {
            return Ok(Action::Requeue(self.ctx.intervals.task_poll()));
        }

        // Converged: publish observed state.
        let generation = vm.metadata.generation;
        self.ctx
            .vms
            .modify_status(&ns, &name, |vm| {
                vm.status.power_state = observed_power;
                vm.status.ips = described.ips.clone();
                vm.status.console_url = if described.console_url.is_empty() {
                    None
                } else {
                    Some(described.console_url.clone())
                };
                vm.status.current_resources = Some(current.clone());
                vm.status.phase = if observed_on {
                    VmPhase::Running
                } else {
                    VmPhase::Stopped
                };
                vm.status.observed_generation = generation;
                conditions::set_condition(
                    &mut vm.status.conditions,
                    Condition::new(
                        conditions::types::READY,
                        ConditionStatus::True,
                        "Reconciled",
                        "",
                    ),
                );
                conditions::set_condition(
                    &mut vm.status.conditions,
                    Condition::new(
                        conditions::types::PROVISIONING,
                        ConditionStatus::False,
                        "Done",
                        "",
                    ),
                );
            })
            .await?;

        Ok(Action::Requeue(self.ctx.intervals.drift()))
    }

    // =========================================================================
    // Delete
    // =========================================================================

    async fn finalize(&self, vm: &VirtualMachine) -> Result<Action, ReconcileError> {
        let ns = vm.metadata.namespace.clone();
        let name = vm.metadata.name.clone();

        if !vm.metadata.has_finalizer(VM_FINALIZER) {
            return Ok(Action::AwaitChange);
        }

        let Some(id) = vm.status.id.clone() else {
            // Never materialized provider-side.
            self.remove_finalizer(&ns, &name).await?;
            return Ok(Action::AwaitChange);
        };

        if vm.status.phase != VmPhase::Deleting {
            self.ctx
                .vms
                .modify_status(&ns, &name, |vm| {
                    vm.status.phase = VmPhase::Deleting;
                    conditions::set_condition(
                        &mut vm.status.conditions,
                        Condition::new(
                            conditions::types::DELETING,
                            ConditionStatus::True,
                            "DeleteRequested",
                            "",
                        ),
                    );
                })
                .await?;
        }

        let client = match self.ctx.provider_client(&ns, &vm.spec.provider_ref).await {
            Ok(client) => client,
            Err(e) => {
                self.set_waiting(vm, "provider unavailable during delete").await;
                return Err(e);
            }
        };

        if let Some(task) = &vm.status.last_task {
            if task.operation == TaskKind::Delete {
                let status = client.task_status(&task.task_id).await?;
                if !status.done {
                    return Ok(Action::Requeue(self.ctx.intervals.task_poll()));
                }
                if status.error.is_empty() {
                    info!(vm = %vm.metadata.key(), "Provider delete confirmed");
                    self.ctx.recorder.normal(
                        VirtualMachine::KIND,
                        vm.metadata.key(),
                        "Deleted",
                        "provider VM deleted",
                    );
                    self.remove_finalizer(&ns, &name).await?;
                    return Ok(Action::AwaitChange);
                }
                let error = virtrigaud_provider::ProviderError::from_task_error(&status.error);
                if error.is_retryable() {
                    self.ctx
                        .vms
                        .modify_status(&ns, &name, |vm| {
                            vm.status.last_task = None;
                        })
                        .await?;
                    return Err(ReconcileError::Provider(error));
                }
                // Unrecoverable terminal error: release the object rather
                // than wedging deletion forever.
                warn!(vm = %vm.metadata.key(), error = %error, "Delete failed terminally, releasing");
                self.ctx.recorder.warning(
                    VirtualMachine::KIND,
                    vm.metadata.key(),
                    "DeleteFailed",
                    error.to_string(),
                );
                self.remove_finalizer(&ns, &name).await?;
                return Ok(Action::AwaitChange);
            }
        }

        match client.delete(&id).await {
            Ok(task) => {
                if task.task_id.is_empty() {
                    self.remove_finalizer(&ns, &name).await?;
                    return Ok(Action::AwaitChange);
                }
                self.record_task(vm, &task.task_id, TaskKind::Delete, Some(VmPhase::Deleting))
                    .await?;
                Ok(Action::Requeue(self.ctx.intervals.task_poll()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                // Delete is idempotent: absent means done.
                self.remove_finalizer(&ns, &name).await?;
                Ok(Action::AwaitChange)
            }
            Err(e) => Err(ReconcileError::Provider(e)),
        }
    }

    async fn remove_finalizer(&self, ns: &str, name: &str) -> Result<(), ReconcileError> {
        self.ctx
            .vms
            .modify(ns, name, |vm| {
                vm.metadata.remove_finalizer(VM_FINALIZER);
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Reconciler for VmReconciler {
    fn name(&self) -> &'static str {
        "virtualmachine"
    }

    #[instrument(skip(self), fields(vm = %key))]
    async fn reconcile(&self, key: &ObjectKey) -> Result<Action, ReconcileError> {
        let Some(vm) = self.ctx.vms.try_get(&key.namespace, &key.name).await else {
            return Ok(Action::AwaitChange);
        };

        if let Err(e) = vm.validate() {
            self.mark_invalid(&vm, e.to_string()).await;
            return Ok(Action::AwaitChange);
        }

        if vm.metadata.is_deleting() {
            return self.finalize(&vm).await;
        }

        if !vm.metadata.has_finalizer(VM_FINALIZER) {
            self.ctx
                .vms
                .modify(&key.namespace, &key.name, |vm| {
                    vm.metadata.add_finalizer(VM_FINALIZER);
                })
                .await?;
            // Re-enter with the fresh resource version.
            return Ok(Action::Requeue(std::time::Duration::ZERO));
        }

        let deps = match self.resolve(&vm).await {
            Ok(deps) => deps,
            Err(e) => {
                self.set_waiting(&vm, &e.to_string()).await;
                return Err(e);
            }
        };

        // Image must be ready on this provider before dispatch.
        if let Some(image) = &deps.image {
            let provider_name = deps.provider.metadata.name.clone();
            if !image.available_on(&provider_name) {
                self.set_waiting(&vm, "image not ready on target provider").await;
                return self
                    .request_image_preparation(&vm, image, &provider_name)
                    .await
                    .map(|_| Action::AwaitChange);
            }
        }

        if vm.status.id.is_none() {
            return self.create(&vm, &deps).await;
        }
        let id = vm.status.id.clone().expect("checked above");

        if let Some(task) = vm.status.last_task.clone() {
            if let Some(action) = self.drain_task(&vm, &deps, &task).await? {
                return Ok(action);
            }
            // Task finished; re-read to converge against fresh status.
            let Some(vm) = self.ctx.vms.try_get(&key.namespace, &key.name).await else {
                return Ok(Action::AwaitChange);
            };
            return self.converge(&vm, &deps, &id).await;
        }

        self.converge(&vm, &deps, &id).await
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn capabilities(provider: &Provider) -> ProviderCapabilities {
    provider.status.capabilities.clone().unwrap_or_default()
}

fn parse_power(state: &str) -> ObservedPowerState {
    match state {
        "On" => ObservedPowerState::On,
        "Off" => ObservedPowerState::Off,
        _ => ObservedPowerState::Unknown,
    }
}

fn map_reason(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::NotFound => "SourceNotFound",
        ErrorKind::InvalidSpec => "InvalidSpec",
        ErrorKind::NotSupported => "Unsupported",
        ErrorKind::Unauthorized => "Unauthorized",
        ErrorKind::RateLimit => "RateLimit",
        ErrorKind::QuotaExceeded => "InsufficientResources",
        ErrorKind::Conflict => "Conflict",
        _ => "ProviderError",
    }
}

fn encode_json<T: serde::Serialize>(value: &T) -> Result<String, ReconcileError> {
    serde_json::to_string(value)
        .map_err(|e| ReconcileError::Terminal(format!("failed to encode document: {e}")))
}

/// Resource shape from the class plus per-VM overrides.
fn desired_class(class: &VMClass, vm: &VirtualMachine) -> Result<ClassDocument, ReconcileError> {
    let mut cpu = class.spec.cpu;
    let mut memory = class.spec.memory.clone();
    if let Some(overrides) = &vm.spec.resources {
        if let Some(cpu_override) = overrides.cpu {
            cpu = cpu_override;
        }
        if let Some(memory_override) = &overrides.memory {
            memory = memory_override.clone();
        }
    }
    let memory_bytes = parse_quantity(&memory)
        .map_err(|e| ReconcileError::Terminal(format!("class memory unparsable: {e}")))?;
    Ok(ClassDocument {
        cpu,
        memory_bytes,
        firmware: format!("{:?}", class.spec.firmware).to_uppercase(),
    })
}

fn image_document(vm: &VirtualMachine, image: Option<&VMImage>) -> ImageDocument {
    if let Some(imported) = &vm.spec.imported_disk {
        return ImageDocument {
            kind: "importedDisk".to_string(),
            reference: imported.disk_id.clone(),
            format: imported.format.as_str().to_string(),
        };
    }
    let Some(image) = image else {
        return ImageDocument::default();
    };
    match &image.spec.source {
        ImageSource::Http { url, .. } => ImageDocument {
            kind: "http".to_string(),
            reference: url.clone(),
            format: String::new(),
        },
        ImageSource::Registry { image, .. } => ImageDocument {
            kind: "registry".to_string(),
            reference: image.clone(),
            format: String::new(),
        },
        ImageSource::VSphere {
            template,
            content_library,
        } => ImageDocument {
            kind: "vsphere".to_string(),
            reference: template.clone().unwrap_or_else(|| {
                content_library
                    .as_ref()
                    .map(|c| format!("{}/{}", c.library, c.item))
                    .unwrap_or_default()
            }),
            format: String::new(),
        },
        ImageSource::Libvirt { path, pool, volume } => ImageDocument {
            kind: "libvirt".to_string(),
            reference: path.clone().unwrap_or_else(|| {
                format!(
                    "{}/{}",
                    pool.clone().unwrap_or_default(),
                    volume.clone().unwrap_or_default()
                )
            }),
            format: String::new(),
        },
        ImageSource::Proxmox {
            template_id,
            template_name,
            ..
        } => ImageDocument {
            kind: "proxmox".to_string(),
            reference: template_id
                .map(|id| id.to_string())
                .or_else(|| template_name.clone())
                .unwrap_or_default(),
            format: String::new(),
        },
        ImageSource::DataVolume { name } => ImageDocument {
            kind: "dataVolume".to_string(),
            reference: name.clone(),
            format: String::new(),
        },
    }
}

fn network_documents(
    refs: &[VmNetworkRef],
    attachments: &[VMNetworkAttachment],
) -> Result<Vec<String>, ReconcileError> {
    refs.iter()
        .zip(attachments.iter())
        .map(|(net_ref, attachment)| {
            let doc = NetworkDocument {
                name: net_ref.name.clone(),
                network_type: format!("{:?}", attachment.spec.network_type).to_lowercase(),
                bridge: attachment
                    .spec
                    .libvirt
                    .as_ref()
                    .and_then(|l| l.bridge.clone())
                    .or_else(|| attachment.spec.proxmox.as_ref().map(|p| p.bridge.clone())),
                portgroup: attachment.spec.vsphere.as_ref().map(|v| v.portgroup.clone()),
                vlan: attachment
                    .spec
                    .vsphere
                    .as_ref()
                    .and_then(|v| v.vlan)
                    .or_else(|| attachment.spec.proxmox.as_ref().and_then(|p| p.vlan)),
                ip_address: net_ref.ip_address.clone(),
                mac_address: net_ref.mac_address.clone(),
            };
            encode_json(&doc)
        })
        .collect()
}

fn placement_document(policy: &VMPlacementPolicy) -> PlacementDocument {
    let hard = policy.spec.hard.clone().unwrap_or_default();
    PlacementDocument {
        allowed_hosts: hard.allowed_hosts,
        denied_hosts: hard.denied_hosts,
        allowed_datastores: hard.allowed_datastores,
        denied_datastores: hard.denied_datastores,
        allowed_zones: hard.allowed_zones,
        denied_zones: hard.denied_zones,
    }
}

fn disk_documents(vm: &VirtualMachine) -> Result<Vec<String>, ReconcileError> {
    vm.spec
        .disks
        .iter()
        .map(|disk| {
            let size_bytes = parse_quantity(&disk.size)
                .map_err(|e| ReconcileError::Terminal(format!("disk {} size: {e}", disk.name)))?;
            encode_json(&DiskDocument {
                name: disk.name.clone(),
                size_bytes,
                disk_type: format!("{:?}", disk.disk_type).to_lowercase(),
            })
        })
        .collect()
}

fn build_create_request(
    vm: &VirtualMachine,
    deps: &Dependencies,
) -> Result<pb::CreateRequest, ReconcileError> {
    Ok(pb::CreateRequest {
        name: vm.metadata.name.clone(),
        class_json: encode_json(&desired_class(&deps.class, vm)?)?,
        image_json: encode_json(&image_document(vm, deps.image.as_ref()))?,
        network_json: network_documents(&vm.spec.networks, &deps.networks)?,
        placement_json: encode_json(&deps.placement_doc)?,
        disk_json: disk_documents(vm)?,
        user_data: deps.user_data.clone(),
        tags: vm.spec.tags.clone(),
    })
}
