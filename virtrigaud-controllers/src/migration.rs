//! VMMigration engine.
//!
//! Cold-migrates a VM across providers by staging its disk on an
//! intermediate volume. Every phase persists its task refs and resource
//! ids in status before acting, so a controller restart resumes from the
//! recorded phase without re-issuing work. Recoverable failures rewind to
//! the failing phase's start under a per-phase attempt budget; anything at
//! or past Creating is left for operator inspection.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use virtrigaud_api::meta::{Object, ObjectMeta, ObjectRef};
use virtrigaud_api::v1beta1::{
    CleanupPolicy, ImportedDiskRef, MigrationDiskInfo, MigrationPhase, MigrationProgress,
    MigrationStorageInfo, MigrationValidationResults, PowerState, VMMigration, ValidationCheck,
    VirtualMachine, MIGRATION_FINALIZER,
};
use virtrigaud_api::workload::{PersistentVolumeClaim, PvcSpec, PvcStatus};
use virtrigaud_common::conditions::{self, Condition, ConditionStatus};
use virtrigaud_common::quantity::parse_quantity;
use virtrigaud_provider::{ProviderClient, ProviderError};
use virtrigaud_proto::provider as pb;
use virtrigaud_store::{ObjectKey, StoreError};

use crate::context::Context;
use crate::runtime::{Action, ReconcileError, Reconciler};

/// Fallback size for auto-created staging claims.
const DEFAULT_STAGING_SIZE: &str = "20Gi";

pub struct MigrationReconciler {
    ctx: Arc<Context>,
}

impl MigrationReconciler {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    // =========================================================================
    // Client resolution
    // =========================================================================

    async fn source_vm(&self, migration: &VMMigration) -> Option<VirtualMachine> {
        let source_ref = &migration.spec.source.vm_ref;
        let ns = source_ref.namespace_or(&migration.metadata.namespace);
        self.ctx.vms.try_get(ns, &source_ref.name).await
    }

    async fn source_client(
        &self,
        source: &VirtualMachine,
    ) -> Result<Arc<ProviderClient>, ReconcileError> {
        self.ctx
            .provider_client(&source.metadata.namespace, &source.spec.provider_ref)
            .await
    }

    async fn target_client(
        &self,
        migration: &VMMigration,
    ) -> Result<Arc<ProviderClient>, ReconcileError> {
        self.ctx
            .provider_client(
                &migration.metadata.namespace,
                &migration.spec.target.provider_ref,
            )
            .await
    }

    // =========================================================================
    // Phase bookkeeping
    // =========================================================================

    async fn advance(
        &self,
        key: &ObjectKey,
        next: MigrationPhase,
    ) -> Result<Action, ReconcileError> {
        debug!(migration = %key, phase = next.as_str(), "Advancing phase");
        self.ctx
            .migrations
            .modify_status(&key.namespace, &key.name, |migration| {
                migration.status.phase = next;
                migration.status.message = None;
                let progress = migration.status.progress.get_or_insert_with(Default::default);
                progress.phase_started_at = Some(Utc::now());
            })
            .await?;
        Ok(Action::Requeue(Duration::ZERO))
    }

    /// Recoverable phase failure: rewind under the attempt budget, or fail
    /// the migration once it is exhausted.
    async fn fail_phase(
        &self,
        key: &ObjectKey,
        migration: &VMMigration,
        failed: MigrationPhase,
        rewind_to: MigrationPhase,
        error: &ProviderError,
    ) -> Result<Action, ReconcileError> {
        let attempts = migration
            .status
            .phase_attempts
            .get(failed.as_str())
            .copied()
            .unwrap_or(0)
            + 1;
        let retry = &migration.spec.options.retry;

        if !error.is_retryable() || attempts > retry.max_retries {
            return self
                .fail_terminal(
                    key,
                    migration,
                    "ProviderError",
                    format!("{} failed: {error}", failed.as_str()),
                )
                .await;
        }

        let delay = Duration::from_secs_f64(
            (retry.initial_backoff_seconds as f64)
                * retry.backoff_multiplier.powi(attempts.saturating_sub(1) as i32),
        );
        warn!(
            migration = %key,
            phase = failed.as_str(),
            rewind = rewind_to.as_str(),
            attempt = attempts,
            delay_secs = delay.as_secs(),
            error = %error,
            "Phase failed, rewinding"
        );
        self.ctx.recorder.warning(
            VMMigration::KIND,
            key.to_string(),
            "PhaseRetry",
            format!("{} failed ({error}); retry {attempts}", failed.as_str()),
        );

        let message = error.to_string();
        self.ctx
            .migrations
            .modify_status(&key.namespace, &key.name, |migration| {
                migration
                    .status
                    .phase_attempts
                    .insert(failed.as_str().to_string(), attempts);
                migration.status.retry_count += 1;
                migration.status.phase = rewind_to;
                migration.status.message = Some(message.clone());
                // Clear the failed phase's handles so it restarts cleanly.
                match failed {
                    MigrationPhase::Snapshotting => {
                        migration.status.snapshot_task_ref = None;
                        migration.status.snapshot_id = None;
                    }
                    MigrationPhase::Exporting | MigrationPhase::Transferring => {
                        migration.status.export_task_ref = None;
                    }
                    MigrationPhase::Importing => {
                        migration.status.import_task_ref = None;
                        if let Some(disk) = &mut migration.status.disk {
                            disk.target_disk_id = None;
                        }
                    }
                    _ => {}
                }
            })
            .await?;
        Ok(Action::Requeue(delay))
    }

    /// Unrecoverable failure: terminal phase plus cleanup per policy.
    async fn fail_terminal(
        &self,
        key: &ObjectKey,
        migration: &VMMigration,
        reason: &str,
        message: String,
    ) -> Result<Action, ReconcileError> {
        warn!(migration = %key, reason, message = %message, "Migration failed");
        self.ctx.recorder.warning(
            VMMigration::KIND,
            key.to_string(),
            reason,
            message.clone(),
        );

        if migration.spec.options.cleanup_policy == CleanupPolicy::Always {
            self.cleanup_storage(key, migration).await;
        }

        let reason = reason.to_string();
        self.ctx
            .migrations
            .modify_status(&key.namespace, &key.name, |migration| {
                migration.status.phase = MigrationPhase::Failed;
                migration.status.message = Some(message.clone());
                migration.status.completed_at = Some(Utc::now());
                conditions::set_condition(
                    &mut migration.status.conditions,
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

    /// Delete the staging claim if this migration created it.
    async fn cleanup_storage(&self, key: &ObjectKey, migration: &VMMigration) {
        let Some(storage) = &migration.status.storage else {
            return;
        };
        if storage.cleaned_up || !storage.auto_created {
            return;
        }
        info!(migration = %key, claim = %storage.claim_name, "Deleting staging claim");
        let _ = self.ctx.pvcs.delete(&key.namespace, &storage.claim_name).await;
        let _ = self
            .ctx
            .migrations
            .modify_status(&key.namespace, &key.name, |migration| {
                if let Some(storage) = &mut migration.status.storage {
                    storage.cleaned_up = true;
                }
            })
            .await;
    }

    // =========================================================================
    // Phases
    // =========================================================================

    async fn validate(
        &self,
        key: &ObjectKey,
        migration: &VMMigration,
    ) -> Result<Action, ReconcileError> {
        // Source VM must exist and be materialized provider-side.
        let Some(source) = self.source_vm(migration).await else {
            return self
                .fail_terminal(
                    key,
                    migration,
                    "ValidationFailed",
                    format!("source VM {} not found", migration.spec.source.vm_ref.name),
                )
                .await;
        };
        if source.status.id.is_none() {
            return self
                .fail_terminal(
                    key,
                    migration,
                    "ValidationFailed",
                    "source VM has no provider-side instance".to_string(),
                )
                .await;
        }

        // Target provider must be reachable and able to import.
        let target = match self
            .ctx
            .provider(
                &migration.metadata.namespace,
                &migration.spec.target.provider_ref,
            )
            .await
        {
            Ok(target) => target,
            Err(_) => {
                return self
                    .fail_terminal(
                        key,
                        migration,
                        "ValidationFailed",
                        format!(
                            "target provider {} not found",
                            migration.spec.target.provider_ref.name
                        ),
                    )
                    .await;
            }
        };
        if self.target_client(migration).await.is_err() {
            return self
                .fail_terminal(
                    key,
                    migration,
                    "ValidationFailed",
                    "target provider has no registered runtime".to_string(),
                )
                .await;
        }
        if let Some(caps) = &target.status.capabilities {
            if !caps.supports_disk_import {
                return self
                    .fail_terminal(
                        key,
                        migration,
                        "ValidationFailed",
                        "target provider does not support disk import".to_string(),
                    )
                    .await;
            }
            if let Some(format) = migration.spec.options.disk_format {
                if !caps.supported_disk_formats.is_empty() && !caps.supports_format(format) {
                    return self
                        .fail_terminal(
                            key,
                            migration,
                            "ValidationFailed",
                            format!(
                                "target provider does not support disk format {}",
                                format.as_str()
                            ),
                        )
                        .await;
                }
            }
        }

        // Storage must be provisionable.
        if let Some(claim) = &migration.spec.storage.claim_name {
            if self
                .ctx
                .pvcs
                .try_get(&key.namespace, claim)
                .await
                .is_none()
            {
                return self
                    .fail_terminal(
                        key,
                        migration,
                        "ValidationFailed",
                        format!("staging claim {claim} not found"),
                    )
                    .await;
            }
        } else if let Some(size) = &migration.spec.storage.size {
            if parse_quantity(size).is_err() {
                return self
                    .fail_terminal(
                        key,
                        migration,
                        "ValidationFailed",
                        format!("staging size {size} is not a valid quantity"),
                    )
                    .await;
            }
        }

        // No name collision at the target.
        let target_ns = migration
            .spec
            .target
            .namespace
            .clone()
            .unwrap_or_else(|| key.namespace.clone());
        if let Some(existing) = self
            .ctx
            .vms
            .try_get(&target_ns, &migration.spec.target.name)
            .await
        {
            let ours = existing
                .spec
                .imported_disk
                .as_ref()
                .and_then(|d| d.migration_ref.as_ref())
                .map(|r| r.name == key.name)
                .unwrap_or(false);
            if !ours {
                return self
                    .fail_terminal(
                        key,
                        migration,
                        "ValidationFailed",
                        format!(
                            "target name {}/{} already in use",
                            target_ns, migration.spec.target.name
                        ),
                    )
                    .await;
            }
        }

        self.advance(key, MigrationPhase::Snapshotting).await
    }

    async fn snapshotting(
        &self,
        key: &ObjectKey,
        migration: &VMMigration,
    ) -> Result<Action, ReconcileError> {
        let Some(source) = self.source_vm(migration).await else {
            return self
                .fail_terminal(key, migration, "SourceNotFound", "source VM vanished".to_string())
                .await;
        };
        let source_id = source.status.id.clone().unwrap_or_default();
        let client = self.source_client(&source).await?;

        // Quiesce the source first when requested.
        if migration.spec.source.power_off_before {
            let described = client.describe(&source_id).await?;
            if described.power_state == "On" {
                info!(migration = %key, "Powering source off before export");
                client.power(&source_id, pb::PowerOp::OffGraceful).await?;
                return Ok(Action::Requeue(self.ctx.intervals.task_poll()));
            }
        }

        if !migration.spec.source.create_snapshot {
            // An operator-supplied snapshot may still be referenced.
            if let Some(existing) = &migration.spec.source.snapshot_name {
                let name = existing.clone();
                self.ctx
                    .migrations
                    .modify_status(&key.namespace, &key.name, |migration| {
                        migration.status.snapshot_id = Some(name.clone());
                    })
                    .await?;
            }
            return self.advance(key, MigrationPhase::Exporting).await;
        }

        // Poll an outstanding snapshot task.
        if let Some(task_ref) = &migration.status.snapshot_task_ref {
            let status = client.task_status(task_ref).await?;
            if !status.done {
                return Ok(Action::Requeue(self.ctx.intervals.task_poll()));
            }
            if !status.error.is_empty() {
                let error = ProviderError::from_task_error(&status.error);
                return self
                    .fail_phase(
                        key,
                        migration,
                        MigrationPhase::Snapshotting,
                        MigrationPhase::Snapshotting,
                        &error,
                    )
                    .await;
            }
            self.ctx
                .migrations
                .modify_status(&key.namespace, &key.name, |migration| {
                    migration.status.snapshot_task_ref = None;
                })
                .await?;
            return self.advance(key, MigrationPhase::Exporting).await;
        }

        if migration.status.snapshot_id.is_some() {
            return self.advance(key, MigrationPhase::Exporting).await;
        }

        let response = match client
            .snapshot_create(pb::SnapshotCreateRequest {
                vm_id: source_id,
                name: format!("{}-premigration", key.name),
                include_memory: false,
                quiesce: true,
            })
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return self
                    .fail_phase(
                        key,
                        migration,
                        MigrationPhase::Snapshotting,
                        MigrationPhase::Snapshotting,
                        &e,
                    )
                    .await;
            }
        };

        info!(migration = %key, snapshot = %response.snapshot_id, "Pre-migration snapshot created");
        let snapshot_id = response.snapshot_id.clone();
        let task_id = response.task_id.clone();
        self.ctx
            .migrations
            .modify_status(&key.namespace, &key.name, |migration| {
                migration.status.snapshot_id = Some(snapshot_id.clone());
                migration.status.snapshot_task_ref = if task_id.is_empty() {
                    None
                } else {
                    Some(task_id.clone())
                };
            })
            .await?;
        Ok(Action::Requeue(self.ctx.intervals.task_poll()))
    }

    async fn exporting(
        &self,
        key: &ObjectKey,
        migration: &VMMigration,
    ) -> Result<Action, ReconcileError> {
        let Some(source) = self.source_vm(migration).await else {
            return self
                .fail_terminal(key, migration, "SourceNotFound", "source VM vanished".to_string())
                .await;
        };
        let source_id = source.status.id.clone().unwrap_or_default();
        let client = self.source_client(&source).await?;

        // Ensure staging storage exists and is recorded.
        if migration.status.storage.is_none() {
            let storage = self.ensure_storage(key, migration, &source).await?;
            self.ctx
                .migrations
                .modify_status(&key.namespace, &key.name, |migration| {
                    migration.status.storage = Some(storage.clone());
                })
                .await?;
            return Ok(Action::Requeue(Duration::ZERO));
        }
        let storage = migration.status.storage.clone().expect("checked above");
        let destination = storage.url.clone().unwrap_or_default();

        if migration.status.export_task_ref.is_some() {
            return self.advance(key, MigrationPhase::Transferring).await;
        }

        let format = migration
            .spec
            .options
            .disk_format
            .unwrap_or_default()
            .as_str()
            .to_string();
        let response = match client
            .export_disk(pb::ExportDiskRequest {
                vm_id: source_id,
                snapshot_id: migration.status.snapshot_id.clone().unwrap_or_default(),
                destination_url: destination,
                format: format.clone(),
                compress: migration.spec.options.compress,
            })
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return self
                    .fail_phase(
                        key,
                        migration,
                        MigrationPhase::Exporting,
                        MigrationPhase::Exporting,
                        &e,
                    )
                    .await;
            }
        };

        info!(
            migration = %key,
            task = %response.task_id,
            estimated_bytes = response.estimated_size_bytes,
            "Disk export started"
        );
        let task_id = response.task_id.clone();
        let disk_id = response.disk_id.clone();
        let estimated = response.estimated_size_bytes;
        self.ctx
            .migrations
            .modify_status(&key.namespace, &key.name, |migration| {
                migration.status.export_task_ref = Some(task_id.clone());
                let disk = migration.status.disk.get_or_insert_with(MigrationDiskInfo::default);
                disk.source_disk_id = Some(disk_id.clone());
                let progress = migration
                    .status
                    .progress
                    .get_or_insert_with(MigrationProgress::default);
                progress.total_bytes = estimated;
            })
            .await?;
        self.advance(key, MigrationPhase::Transferring).await
    }

    async fn transferring(
        &self,
        key: &ObjectKey,
        migration: &VMMigration,
    ) -> Result<Action, ReconcileError> {
        let Some(task_ref) = migration.status.export_task_ref.clone() else {
            // Rewound without a task; go back to Exporting.
            return self.advance(key, MigrationPhase::Exporting).await;
        };
        let Some(source) = self.source_vm(migration).await else {
            return self
                .fail_terminal(key, migration, "SourceNotFound", "source VM vanished".to_string())
                .await;
        };
        let client = self.source_client(&source).await?;

        let status = client.task_status(&task_ref).await?;
        if !status.done {
            self.ctx
                .migrations
                .modify_status(&key.namespace, &key.name, |migration| {
                    update_progress(migration, status.transferred_bytes, status.progress_percent);
                })
                .await?;
            return Ok(Action::Requeue(self.ctx.intervals.task_poll()));
        }

        if !status.error.is_empty() {
            let error = ProviderError::from_task_error(&status.error);
            return self
                .fail_phase(
                    key,
                    migration,
                    MigrationPhase::Transferring,
                    MigrationPhase::Exporting,
                    &error,
                )
                .await;
        }

        // Transfer complete: record the source disk's identity and checksum.
        let source_disk_id = migration
            .status
            .disk
            .as_ref()
            .and_then(|d| d.source_disk_id.clone())
            .unwrap_or_default();
        let info = client.get_disk_info(&source_disk_id).await?;
        info!(
            migration = %key,
            bytes = info.size_bytes,
            checksum = %info.checksum,
            "Disk export complete"
        );

        let transferred = status.transferred_bytes;
        let source_format = parse_format(&info.format);
        self.ctx
            .migrations
            .modify_status(&key.namespace, &key.name, |migration| {
                update_progress(migration, transferred, 100);
                let disk = migration.status.disk.get_or_insert_with(MigrationDiskInfo::default);
                disk.size_bytes = info.size_bytes;
                disk.source_checksum = Some(info.checksum.clone());
                disk.format = source_format;
                if let Some(storage) = &mut migration.status.storage {
                    storage.size_bytes = info.size_bytes;
                }
            })
            .await?;

        // Converting only enters the trace when a format change is needed.
        let conversion_needed = migration
            .spec
            .options
            .disk_format
            .map(|f| f != source_format)
            .unwrap_or(false);
        if conversion_needed {
            self.advance(key, MigrationPhase::Converting).await
        } else {
            self.advance(key, MigrationPhase::Importing).await
        }
    }

    async fn converting(
        &self,
        key: &ObjectKey,
        migration: &VMMigration,
    ) -> Result<Action, ReconcileError> {
        if let Some(target_format) = migration.spec.options.disk_format {
            let current = migration
                .status
                .disk
                .as_ref()
                .map(|d| d.format)
                .unwrap_or_default();
            if current != target_format {
                // Conversion happens on the target during import; record the
                // format the imported disk will carry.
                debug!(
                    migration = %key,
                    from = current.as_str(),
                    to = target_format.as_str(),
                    "Format conversion delegated to import"
                );
                self.ctx
                    .migrations
                    .modify_status(&key.namespace, &key.name, |migration| {
                        let disk =
                            migration.status.disk.get_or_insert_with(MigrationDiskInfo::default);
                        disk.format = target_format;
                    })
                    .await?;
            }
        }
        self.advance(key, MigrationPhase::Importing).await
    }

    async fn importing(
        &self,
        key: &ObjectKey,
        migration: &VMMigration,
    ) -> Result<Action, ReconcileError> {
        let client = self.target_client(migration).await?;
        let disk = migration.status.disk.clone().unwrap_or_default();
        let storage = migration.status.storage.clone().unwrap_or_default();

        if let Some(task_ref) = migration.status.import_task_ref.clone() {
            let status = client.task_status(&task_ref).await?;
            if !status.done {
                return Ok(Action::Requeue(self.ctx.intervals.task_poll()));
            }
            if !status.error.is_empty() {
                let error = ProviderError::from_task_error(&status.error);
                return self
                    .fail_phase(
                        key,
                        migration,
                        MigrationPhase::Importing,
                        MigrationPhase::Importing,
                        &error,
                    )
                    .await;
            }
            // Imported: capture the target disk's checksum.
            let target_disk_id = disk.target_disk_id.clone().unwrap_or_default();
            let info = client.get_disk_info(&target_disk_id).await?;
            self.ctx
                .migrations
                .modify_status(&key.namespace, &key.name, |migration| {
                    migration.status.import_task_ref = None;
                    if let Some(disk) = &mut migration.status.disk {
                        disk.target_checksum = Some(info.checksum.clone());
                    }
                })
                .await?;
            return self.advance(key, MigrationPhase::Creating).await;
        }

        let response = match client
            .import_disk(pb::ImportDiskRequest {
                name: migration.spec.target.name.clone(),
                source_url: storage.url.clone().unwrap_or_default(),
                format: disk.format.as_str().to_string(),
                storage_hint: String::new(),
                verify_checksum: migration.spec.options.verify_checksums,
                expected_checksum: disk.source_checksum.clone().unwrap_or_default(),
            })
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return self
                    .fail_phase(
                        key,
                        migration,
                        MigrationPhase::Importing,
                        MigrationPhase::Importing,
                        &e,
                    )
                    .await;
            }
        };

        info!(migration = %key, disk = %response.disk_id, "Disk import started");
        let disk_id = response.disk_id.clone();
        let task_id = response.task_id.clone();
        self.ctx
            .migrations
            .modify_status(&key.namespace, &key.name, |migration| {
                let disk = migration.status.disk.get_or_insert_with(MigrationDiskInfo::default);
                disk.target_disk_id = Some(disk_id.clone());
                migration.status.import_task_ref = if task_id.is_empty() {
                    None
                } else {
                    Some(task_id.clone())
                };
            })
            .await?;
        Ok(Action::Requeue(self.ctx.intervals.task_poll()))
    }

    async fn creating(
        &self,
        key: &ObjectKey,
        migration: &VMMigration,
    ) -> Result<Action, ReconcileError> {
        let target_ns = migration
            .spec
            .target
            .namespace
            .clone()
            .unwrap_or_else(|| key.namespace.clone());
        let target_name = migration.spec.target.name.clone();

        if let Some(existing) = self.ctx.vms.try_get(&target_ns, &target_name).await {
            let ours = existing
                .spec
                .imported_disk
                .as_ref()
                .and_then(|d| d.migration_ref.as_ref())
                .map(|r| r.name == key.name)
                .unwrap_or(false);
            if !ours {
                return self
                    .fail_terminal(
                        key,
                        migration,
                        "Conflict",
                        format!("target VM {target_ns}/{target_name} exists and is not ours"),
                    )
                    .await;
            }
        } else {
            let Some(source) = self.source_vm(migration).await else {
                return self
                    .fail_terminal(key, migration, "SourceNotFound", "source VM vanished".to_string())
                    .await;
            };
            let disk = migration.status.disk.clone().unwrap_or_default();

            let vm = VirtualMachine {
                metadata: ObjectMeta::named(target_ns.clone(), target_name.clone()),
                spec: virtrigaud_api::v1beta1::VirtualMachineSpec {
                    provider_ref: migration.spec.target.provider_ref.clone(),
                    class_ref: migration
                        .spec
                        .target
                        .class_ref
                        .clone()
                        .unwrap_or_else(|| source.spec.class_ref.clone()),
                    image_ref: None,
                    imported_disk: Some(ImportedDiskRef {
                        disk_id: disk.target_disk_id.clone().unwrap_or_default(),
                        format: disk.format,
                        source: Some("migration".to_string()),
                        migration_ref: Some(ObjectRef {
                            name: key.name.clone(),
                            namespace: Some(key.namespace.clone()),
                        }),
                    }),
                    networks: if migration.spec.target.networks.is_empty() {
                        source.spec.networks.clone()
                    } else {
                        migration.spec.target.networks.clone()
                    },
                    power_state: if migration.spec.target.power_on {
                        PowerState::On
                    } else {
                        PowerState::Off
                    },
                    ..source.spec.clone()
                },
                status: Default::default(),
            };

            match self.ctx.vms.create(vm).await {
                Ok(_) => {
                    info!(migration = %key, vm = %target_name, "Target VM created");
                    self.ctx.recorder.normal(
                        VMMigration::KIND,
                        key.to_string(),
                        "TargetCreated",
                        format!("created target VM {target_ns}/{target_name}"),
                    );
                }
                Err(StoreError::AlreadyExists { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }

        self.ctx
            .migrations
            .modify_status(&key.namespace, &key.name, |migration| {
                migration.status.target_vm_ref = Some(ObjectRef {
                    name: target_name.clone(),
                    namespace: Some(target_ns.clone()),
                });
            })
            .await?;
        self.advance(key, MigrationPhase::ValidatingTarget).await
    }

    async fn validating_target(
        &self,
        key: &ObjectKey,
        migration: &VMMigration,
    ) -> Result<Action, ReconcileError> {
        let target_ref = migration.status.target_vm_ref.clone().unwrap_or_default();
        let target_ns = target_ref.namespace_or(&key.namespace).to_string();
        let Some(target) = self.ctx.vms.try_get(&target_ns, &target_ref.name).await else {
            return Err(ReconcileError::DependencyNotReady(
                "target VM disappeared from the store".to_string(),
            ));
        };

        // The VM reconciler must have materialized it first.
        if target.status.id.is_none() {
            return Ok(Action::Requeue(self.ctx.intervals.dependency()));
        }

        let checks = &migration.spec.options.validation_checks;
        let disk = migration.status.disk.clone().unwrap_or_default();
        let mut results = migration
            .status
            .validation_results
            .clone()
            .unwrap_or_default();

        if checks.contains(&ValidationCheck::CheckDiskSize) && results.disk_size_ok.is_none() {
            let client = self.target_client(migration).await?;
            let target_disk_id = disk.target_disk_id.clone().unwrap_or_default();
            let info = client.get_disk_info(&target_disk_id).await?;
            results.disk_size_ok = Some(disk.size_bytes > 0 && info.size_bytes == disk.size_bytes);
        }

        if checks.contains(&ValidationCheck::CheckChecksum) && results.checksum_match.is_none() {
            results.checksum_match = Some(
                disk.source_checksum.is_some() && disk.source_checksum == disk.target_checksum,
            );
        }

        if checks.contains(&ValidationCheck::CheckBoot) && results.boot_ok.is_none() {
            if migration.spec.target.power_on {
                if target.status.phase == virtrigaud_api::v1beta1::VmPhase::Running {
                    results.boot_ok = Some(true);
                } else if target.status.phase == virtrigaud_api::v1beta1::VmPhase::Failed {
                    results.boot_ok = Some(false);
                } else {
                    // Still booting; persist partial results and wait.
                    self.persist_results(key, &results).await?;
                    return Ok(Action::Requeue(self.ctx.intervals.dependency()));
                }
            } else {
                results.boot_ok = Some(true);
            }
        }

        if checks.contains(&ValidationCheck::CheckConnectivity) && results.connectivity_ok.is_none()
        {
            if migration.spec.target.power_on {
                if !target.status.ips.is_empty() {
                    results.connectivity_ok = Some(true);
                } else if target.status.phase == virtrigaud_api::v1beta1::VmPhase::Running {
                    results.connectivity_ok = Some(false);
                } else {
                    self.persist_results(key, &results).await?;
                    return Ok(Action::Requeue(self.ctx.intervals.dependency()));
                }
            } else {
                results.connectivity_ok = Some(true);
            }
        }

        self.persist_results(key, &results).await?;
        self.finish(key, migration, &results).await
    }

    async fn persist_results(
        &self,
        key: &ObjectKey,
        results: &MigrationValidationResults,
    ) -> Result<(), ReconcileError> {
        let results = results.clone();
        self.ctx
            .migrations
            .modify_status(&key.namespace, &key.name, |migration| {
                migration.status.validation_results = Some(results.clone());
            })
            .await?;
        Ok(())
    }

    /// Terminal success: cleanup, optional source deletion, phase Ready.
    async fn finish(
        &self,
        key: &ObjectKey,
        migration: &VMMigration,
        results: &MigrationValidationResults,
    ) -> Result<Action, ReconcileError> {
        let all_passed = results.all_passed();

        let cleanup = match migration.spec.options.cleanup_policy {
            CleanupPolicy::Always => true,
            CleanupPolicy::OnSuccess => all_passed,
            CleanupPolicy::Never => false,
        };
        if cleanup {
            self.cleanup_storage(key, migration).await;
        }

        let mut source_retained_message = None;
        if migration.spec.source.delete_after {
            if all_passed {
                let source_ref = &migration.spec.source.vm_ref;
                let source_ns = source_ref.namespace_or(&key.namespace).to_string();
                info!(migration = %key, source = %source_ref.name, "Deleting source VM");
                let _ = self.ctx.vms.delete(&source_ns, &source_ref.name).await;
                self.ctx.recorder.normal(
                    VMMigration::KIND,
                    key.to_string(),
                    "SourceDeleted",
                    format!("deleted source VM {}/{}", source_ns, source_ref.name),
                );
            } else {
                source_retained_message = Some(
                    "source retained: one or more validation checks failed".to_string(),
                );
                self.ctx.recorder.warning(
                    VMMigration::KIND,
                    key.to_string(),
                    "SourceRetained",
                    source_retained_message.clone().unwrap_or_default(),
                );
            }
        }

        info!(migration = %key, all_passed, "Migration complete");
        self.ctx.recorder.normal(
            VMMigration::KIND,
            key.to_string(),
            "MigrationSucceeded",
            "migration reached Ready",
        );

        self.ctx
            .migrations
            .modify_status(&key.namespace, &key.name, |migration| {
                migration.status.phase = MigrationPhase::Ready;
                migration.status.completed_at = Some(Utc::now());
                if let Some(progress) = &mut migration.status.progress {
                    progress.percent = 100;
                }
                conditions::set_condition(
                    &mut migration.status.conditions,
                    Condition::new(
                        conditions::types::READY,
                        ConditionStatus::True,
                        "MigrationSucceeded",
                        "",
                    ),
                );
                if let Some(message) = &source_retained_message {
                    conditions::set_condition(
                        &mut migration.status.conditions,
                        Condition::new(
                            conditions::types::SOURCE_RETAINED,
                            ConditionStatus::True,
                            "ValidationIncomplete",
                            message.clone(),
                        ),
                    );
                }
            })
            .await?;
        Ok(Action::AwaitChange)
    }

    /// Ensure the staging claim and compute the artifact URL.
    async fn ensure_storage(
        &self,
        key: &ObjectKey,
        migration: &VMMigration,
        source: &VirtualMachine,
    ) -> Result<MigrationStorageInfo, ReconcileError> {
        let (claim_name, auto_created) = match &migration.spec.storage.claim_name {
            Some(existing) => (existing.clone(), false),
            None => {
                let claim_name = format!("{}-staging", key.name);
                if self.ctx.pvcs.try_get(&key.namespace, &claim_name).await.is_none() {
                    let size = migration
                        .spec
                        .storage
                        .size
                        .clone()
                        .unwrap_or_else(|| DEFAULT_STAGING_SIZE.to_string());
                    let pvc = PersistentVolumeClaim {
                        metadata: ObjectMeta::named(key.namespace.clone(), claim_name.clone()),
                        spec: PvcSpec {
                            storage_class: migration.spec.storage.storage_class.clone(),
                            access_modes: vec![migration.spec.storage.access_mode.clone()],
                            size,
                        },
                        status: PvcStatus {
                            phase: "Bound".to_string(),
                        },
                    };
                    match self.ctx.pvcs.create(pvc).await {
                        Ok(_) | Err(StoreError::AlreadyExists { .. }) => {}
                        Err(e) => return Err(e.into()),
                    }
                    info!(migration = %key, claim = %claim_name, "Created staging claim");
                }
                (claim_name, true)
            }
        };

        let format = migration.spec.options.disk_format.unwrap_or_default();
        let artifact = staging_artifact_name(
            &source.metadata.name,
            migration.metadata.uid.as_deref().unwrap_or(&key.name),
            format.as_str(),
        );
        let url = format!(
            "file://{}/{}",
            migration.spec.storage.mount_path.trim_end_matches('/'),
            artifact
        );

        Ok(MigrationStorageInfo {
            claim_name,
            url: Some(url),
            size_bytes: 0,
            auto_created,
            cleaned_up: false,
        })
    }
}

fn parse_format(format: &str) -> virtrigaud_api::v1beta1::DiskFormat {
    use virtrigaud_api::v1beta1::DiskFormat;
    match format {
        "raw" => DiskFormat::Raw,
        "vmdk" => DiskFormat::Vmdk,
        "vhd" => DiskFormat::Vhd,
        _ => DiskFormat::Qcow2,
    }
}

/// Content-addressed artifact name: the sha256 identity of this transfer.
fn staging_artifact_name(vm_name: &str, migration_uid: &str, format: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(vm_name.as_bytes());
    hasher.update(b"/");
    hasher.update(migration_uid.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("{vm_name}-{digest}.{format}")
}

/// Monotonic progress update: transferred bytes never move backwards.
fn update_progress(migration: &mut VMMigration, transferred: u64, percent: i32) {
    let progress = migration
        .status
        .progress
        .get_or_insert_with(MigrationProgress::default);
    if transferred > progress.transferred_bytes {
        if let Some(started) = progress.phase_started_at {
            let elapsed = (Utc::now() - started).num_seconds().max(1) as u64;
            progress.rate_bytes_per_second = transferred / elapsed;
            if progress.rate_bytes_per_second > 0 && progress.total_bytes >= transferred {
                progress.eta_seconds =
                    Some((progress.total_bytes - transferred) / progress.rate_bytes_per_second);
            }
        }
        progress.transferred_bytes = transferred;
    }
    progress.percent = percent.clamp(0, 100) as u8;
}

#[async_trait]
impl Reconciler for MigrationReconciler {
    fn name(&self) -> &'static str {
        "vmmigration"
    }

    #[instrument(skip(self), fields(migration = %key))]
    async fn reconcile(&self, key: &ObjectKey) -> Result<Action, ReconcileError> {
        let Some(migration) = self.ctx.migrations.try_get(&key.namespace, &key.name).await
        else {
            return Ok(Action::AwaitChange);
        };

        // Deletion: release auto-created staging, then the finalizer.
        if migration.metadata.is_deleting() {
            self.cleanup_storage(key, &migration).await;
            self.ctx
                .migrations
                .modify(&key.namespace, &key.name, |migration| {
                    migration.metadata.remove_finalizer(MIGRATION_FINALIZER);
                })
                .await?;
            return Ok(Action::AwaitChange);
        }

        if migration.status.phase.is_terminal() {
            return Ok(Action::AwaitChange);
        }

        if !migration.metadata.has_finalizer(MIGRATION_FINALIZER) {
            self.ctx
                .migrations
                .modify(&key.namespace, &key.name, |migration| {
                    migration.metadata.add_finalizer(MIGRATION_FINALIZER);
                })
                .await?;
            return Ok(Action::Requeue(Duration::ZERO));
        }

        // Stamp the start time once; the overall timeout measures from it.
        let Some(started_at) = migration.status.started_at else {
            self.ctx
                .migrations
                .modify_status(&key.namespace, &key.name, |migration| {
                    migration.status.started_at = Some(Utc::now());
                })
                .await?;
            return Ok(Action::Requeue(Duration::ZERO));
        };

        let timeout = chrono::Duration::seconds(migration.spec.options.timeout_seconds as i64);
        if Utc::now() - started_at > timeout {
            return self
                .fail_terminal(
                    key,
                    &migration,
                    "Timeout",
                    format!(
                        "migration exceeded its {}s budget",
                        migration.spec.options.timeout_seconds
                    ),
                )
                .await;
        }

        match migration.status.phase {
            MigrationPhase::Pending => self.advance(key, MigrationPhase::Validating).await,
            MigrationPhase::Validating => self.validate(key, &migration).await,
            MigrationPhase::Snapshotting => self.snapshotting(key, &migration).await,
            MigrationPhase::Exporting => self.exporting(key, &migration).await,
            MigrationPhase::Transferring => self.transferring(key, &migration).await,
            MigrationPhase::Converting => self.converting(key, &migration).await,
            MigrationPhase::Importing => self.importing(key, &migration).await,
            MigrationPhase::Creating => self.creating(key, &migration).await,
            MigrationPhase::ValidatingTarget => self.validating_target(key, &migration).await,
            MigrationPhase::Ready | MigrationPhase::Failed => Ok(Action::AwaitChange),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staging_artifact_name_is_content_addressed() {
        let a = staging_artifact_name("web-01", "uid-1", "qcow2");
        let b = staging_artifact_name("web-01", "uid-1", "qcow2");
        let c = staging_artifact_name("web-01", "uid-2", "qcow2");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("web-01-"));
        assert!(a.ends_with(".qcow2"));
        // 64 hex chars of sha256 inside the name.
        let digest = a
            .strip_prefix("web-01-")
            .and_then(|s| s.strip_suffix(".qcow2"))
            .unwrap();
        assert_eq!(digest.len(), 64);
    }

    #[test]
    fn test_update_progress_is_monotonic() {
        let mut migration = VMMigration {
            metadata: ObjectMeta::named("default", "move-web"),
            spec: virtrigaud_api::v1beta1::VMMigrationSpec {
                source: Default::default(),
                target: Default::default(),
                options: Default::default(),
                storage: Default::default(),
            },
            status: Default::default(),
        };
        update_progress(&mut migration, 100, 10);
        update_progress(&mut migration, 50, 20);
        let progress = migration.status.progress.as_ref().unwrap();
        assert_eq!(progress.transferred_bytes, 100);
        assert_eq!(progress.percent, 20);
    }
}
