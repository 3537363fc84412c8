//! End-to-end scenarios over the in-memory store and mock providers.
//!
//! Each test starts the full manager, seeds objects the way a user would,
//! and waits for the reconcilers to converge.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::sleep;

use virtrigaud_api::meta::{LabelSelector, LocalObjectReference, ObjectMeta, ObjectRef};
use virtrigaud_api::v1beta1::{
    CleanupPolicy, CloneOptions, ClonePhase, CloneSource, CloneTarget, CloneType, IntOrPercent,
    ManagementPolicy, MigrationOptions, MigrationPhase, MigrationSource, MigrationStorageSpec,
    MigrationTarget, ObservedPowerState, PowerState, RollingUpdateSpec, UpdateStrategy,
    UpdateStrategyType, VMClone, VMCloneSpec, VMMigration, VMMigrationSpec, VMSet, VMSetSpec,
    VirtualMachineSpec, VmPhase, VmTemplate,
};
use virtrigaud_common::conditions;
use virtrigaud_store::Event;

use common::{eventually, start_harness};

// =============================================================================
// Scenario 1: Create -> Running
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn vm_create_reaches_running() {
    let harness = start_harness();
    harness.seed_provider("prov-run").await;
    harness.seed_class("medium").await;
    harness.seed_image("ubuntu-22", &["prov-run"]).await;
    harness.seed_vm("web-01", "prov-run", PowerState::On).await;

    eventually("web-01 is Running and Ready", 30_000, || async {
        match harness.ctx.vms.try_get("default", "web-01").await {
            Some(vm) => {
                vm.status.phase == VmPhase::Running
                    && vm.status.id.is_some()
                    && vm.status.power_state == ObservedPowerState::On
                    && !vm.status.ips.is_empty()
                    && conditions::is_condition_true(
                        &vm.status.conditions,
                        conditions::types::READY,
                    )
            }
            None => false,
        }
    })
    .await;
}

// =============================================================================
// Scenario 2: Graceful delete
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn vm_graceful_delete_removes_object_after_provider_delete() {
    let harness = start_harness();
    harness.seed_provider("prov-del").await;
    harness.seed_class("medium").await;
    harness.seed_image("ubuntu-22", &["prov-del"]).await;
    harness.seed_vm("web-01", "prov-del", PowerState::On).await;

    eventually("web-01 is Running", 30_000, || async {
        harness
            .ctx
            .vms
            .try_get("default", "web-01")
            .await
            .map(|vm| vm.status.phase == VmPhase::Running)
            .unwrap_or(false)
    })
    .await;

    harness.ctx.vms.delete("default", "web-01").await.unwrap();

    eventually("web-01 removed from the store", 30_000, || async {
        harness.ctx.vms.try_get("default", "web-01").await.is_none()
    })
    .await;

    let mock = harness.mock("prov-del");
    assert_eq!(mock.call_count("delete"), 1, "provider Delete must be invoked exactly once");
}

// =============================================================================
// Scenario 3: Clone downgrade
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn clone_downgrades_to_supported_type() {
    let harness = start_harness();
    harness.seed_provider("prov-clone").await;
    harness.seed_class("medium").await;
    harness.seed_image("ubuntu-22", &["prov-clone"]).await;
    harness.seed_vm("web-01", "prov-clone", PowerState::On).await;

    // Provider only advertises full cloning.
    let mock = harness.mock("prov-clone");
    let mut caps = virtrigaud_proto::provider::GetCapabilitiesResponse {
        supports_snapshots: true,
        supports_disk_export: true,
        supports_disk_import: true,
        reconfigure_online: true,
        supported_disk_formats: vec!["qcow2".to_string()],
        ..Default::default()
    };
    caps.supports_instant_clones = false;
    caps.supports_linked_clones = false;
    mock.set_capabilities(caps);

    eventually("source VM is Running", 30_000, || async {
        harness
            .ctx
            .vms
            .try_get("default", "web-01")
            .await
            .map(|vm| vm.status.phase == VmPhase::Running)
            .unwrap_or(false)
    })
    .await;

    let clone = VMClone {
        metadata: ObjectMeta::named("default", "web-01-clone"),
        spec: VMCloneSpec {
            source: CloneSource::Vm {
                vm_ref: LocalObjectReference::new("web-01"),
            },
            target: CloneTarget {
                name: "web-02".to_string(),
                power_on: false,
                ..Default::default()
            },
            options: CloneOptions {
                clone_type: CloneType::Instant,
                ..Default::default()
            },
            customization: None,
        },
        status: Default::default(),
    };
    harness.ctx.clones.create(clone).await.unwrap();

    eventually("clone reaches Ready with Full type", 30_000, || async {
        match harness.ctx.clones.try_get("default", "web-01-clone").await {
            Some(clone) => {
                clone.status.phase == ClonePhase::Ready
                    && clone.status.actual_clone_type == Some(CloneType::Full)
            }
            None => false,
        }
    })
    .await;

    // The cloned VM was adopted into the store.
    assert!(harness.ctx.vms.try_get("default", "web-02").await.is_some());
}

// =============================================================================
// Scenario 4: Migration happy path
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn migration_happy_path_follows_phase_sequence() {
    let harness = start_harness();
    harness.seed_provider("prov-a").await;
    harness.share_backend("prov-a", "prov-b");
    harness.seed_provider("prov-b").await;
    harness.seed_class("medium").await;
    harness.seed_image("ubuntu-22", &["prov-a", "prov-b"]).await;
    harness.seed_vm("db-01", "prov-a", PowerState::On).await;

    eventually("source VM is Running", 30_000, || async {
        harness
            .ctx
            .vms
            .try_get("default", "db-01")
            .await
            .map(|vm| vm.status.phase == VmPhase::Running)
            .unwrap_or(false)
    })
    .await;

    // Collect the phase trace from watch events.
    let phases: Arc<Mutex<Vec<MigrationPhase>>> = Arc::new(Mutex::new(Vec::new()));
    {
        let phases = phases.clone();
        let mut watcher = harness.ctx.migrations.watch();
        tokio::spawn(async move {
            while let Ok(event) = watcher.recv().await {
                if let Event::Applied(migration) = event {
                    let mut trace = phases.lock().unwrap();
                    if trace.last() != Some(&migration.status.phase) {
                        trace.push(migration.status.phase);
                    }
                }
            }
        });
    }

    let migration = VMMigration {
        metadata: ObjectMeta::named("default", "move-db-01"),
        spec: VMMigrationSpec {
            source: MigrationSource {
                vm_ref: ObjectRef::new("db-01"),
                create_snapshot: true,
                ..Default::default()
            },
            target: MigrationTarget {
                name: "db-01-new".to_string(),
                provider_ref: ObjectRef::new("prov-b"),
                power_on: true,
                ..Default::default()
            },
            options: MigrationOptions {
                verify_checksums: true,
                cleanup_policy: CleanupPolicy::OnSuccess,
                ..Default::default()
            },
            storage: MigrationStorageSpec::default(),
        },
        status: Default::default(),
    };
    harness.ctx.migrations.create(migration).await.unwrap();

    eventually("migration reaches Ready", 60_000, || async {
        harness
            .ctx
            .migrations
            .try_get("default", "move-db-01")
            .await
            .map(|m| m.status.phase == MigrationPhase::Ready)
            .unwrap_or(false)
    })
    .await;

    let migration = harness
        .ctx
        .migrations
        .try_get("default", "move-db-01")
        .await
        .unwrap();

    // Checksums verified end to end.
    let results = migration.status.validation_results.clone().unwrap();
    assert_eq!(results.checksum_match, Some(true));
    assert_eq!(results.disk_size_ok, Some(true));

    // Staging claim cleaned up under OnSuccess.
    let storage = migration.status.storage.clone().unwrap();
    assert!(storage.auto_created);
    assert!(storage.cleaned_up);
    assert!(harness
        .ctx
        .pvcs
        .try_get("default", &storage.claim_name)
        .await
        .is_none());

    // Audit trail on the target VM.
    let target = harness.ctx.vms.try_get("default", "db-01-new").await.unwrap();
    let imported = target.spec.imported_disk.unwrap();
    assert_eq!(
        imported.migration_ref.map(|r| r.name),
        Some("move-db-01".to_string())
    );

    let trace = phases.lock().unwrap().clone();
    assert_eq!(
        trace,
        vec![
            MigrationPhase::Pending,
            MigrationPhase::Validating,
            MigrationPhase::Snapshotting,
            MigrationPhase::Exporting,
            MigrationPhase::Transferring,
            MigrationPhase::Importing,
            MigrationPhase::Creating,
            MigrationPhase::ValidatingTarget,
            MigrationPhase::Ready,
        ],
        "phase sequence must match exactly"
    );
}

// =============================================================================
// Scenario 5: Migration mid-transfer failure with retry
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn migration_retries_failed_transfer() {
    let harness = start_harness();
    harness.seed_provider("prov-ra").await;
    harness.share_backend("prov-ra", "prov-rb");
    harness.seed_provider("prov-rb").await;
    harness.seed_class("medium").await;
    harness.seed_image("ubuntu-22", &["prov-ra", "prov-rb"]).await;
    harness.seed_vm("db-01", "prov-ra", PowerState::On).await;

    eventually("source VM is Running", 30_000, || async {
        harness
            .ctx
            .vms
            .try_get("default", "db-01")
            .await
            .map(|vm| vm.status.phase == VmPhase::Running)
            .unwrap_or(false)
    })
    .await;

    // The first export task dies mid-flight with a retryable error.
    harness
        .mock("prov-ra")
        .fail_next_task("Retryable: transfer interrupted at 40%");

    let migration = VMMigration {
        metadata: ObjectMeta::named("default", "move-db-01"),
        spec: VMMigrationSpec {
            source: MigrationSource {
                vm_ref: ObjectRef::new("db-01"),
                create_snapshot: false,
                ..Default::default()
            },
            target: MigrationTarget {
                name: "db-01-new".to_string(),
                provider_ref: ObjectRef::new("prov-rb"),
                power_on: false,
                ..Default::default()
            },
            options: MigrationOptions {
                retry: virtrigaud_api::v1beta1::MigrationRetryPolicy {
                    max_retries: 3,
                    backoff_multiplier: 1.0,
                    initial_backoff_seconds: 0,
                },
                ..Default::default()
            },
            storage: MigrationStorageSpec::default(),
        },
        status: Default::default(),
    };
    harness.ctx.migrations.create(migration).await.unwrap();

    eventually("migration retries and reaches Ready", 60_000, || async {
        harness
            .ctx
            .migrations
            .try_get("default", "move-db-01")
            .await
            .map(|m| m.status.phase == MigrationPhase::Ready)
            .unwrap_or(false)
    })
    .await;

    let migration = harness
        .ctx
        .migrations
        .try_get("default", "move-db-01")
        .await
        .unwrap();
    assert!(migration.status.retry_count >= 1, "rewind must be counted");
    assert_eq!(
        migration
            .status
            .phase_attempts
            .get(MigrationPhase::Transferring.as_str()),
        Some(&1),
        "the transfer phase carried the failed attempt"
    );
}

// =============================================================================
// Scenario 6: VMSet rolling update
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn vmset_rolling_update_honors_unavailability_budget() {
    let harness = start_harness();
    harness.seed_provider("prov-set").await;
    harness.seed_class("medium").await;
    harness.seed_image("ubuntu-22", &["prov-set"]).await;

    let mut selector = LabelSelector::default();
    selector
        .match_labels
        .insert("app".to_string(), "db".to_string());

    let set = VMSet {
        metadata: ObjectMeta::named("default", "db"),
        spec: VMSetSpec {
            replicas: 5,
            selector: selector.clone(),
            template: VmTemplate {
                metadata: virtrigaud_api::v1beta1::TemplateMeta {
                    labels: selector.match_labels.clone(),
                    annotations: Default::default(),
                },
                spec: VirtualMachineSpec {
                    provider_ref: ObjectRef::new("prov-set"),
                    class_ref: LocalObjectReference::new("medium"),
                    image_ref: Some(LocalObjectReference::new("ubuntu-22")),
                    power_state: PowerState::On,
                    ..Default::default()
                },
            },
            update_strategy: UpdateStrategy {
                strategy_type: UpdateStrategyType::RollingUpdate,
                rolling_update: Some(RollingUpdateSpec {
                    max_unavailable: IntOrPercent::Int(1),
                    max_surge: IntOrPercent::Int(1),
                    partition: 0,
                }),
            },
            management_policy: ManagementPolicy::Parallel,
            pvc_retention: Default::default(),
            ordinals: Default::default(),
            volume_claim_templates: Vec::new(),
        },
        status: Default::default(),
    };
    harness.ctx.vmsets.create(set).await.unwrap();

    eventually("all five replicas ready", 60_000, || async {
        harness
            .ctx
            .vmsets
            .try_get("default", "db")
            .await
            .map(|set| set.status.replicas == 5 && set.status.ready_replicas == 5)
            .unwrap_or(false)
    })
    .await;

    // Watch status updates during the rolling update and check the
    // unavailability budget at every observation.
    let violations: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    {
        let violations = violations.clone();
        let mut watcher = harness.ctx.vmsets.watch();
        tokio::spawn(async move {
            while let Ok(event) = watcher.recv().await {
                if let Event::Applied(set) = event {
                    let unavailable = set.status.replicas - set.status.ready_replicas;
                    if unavailable > 1 {
                        violations
                            .lock()
                            .unwrap()
                            .push(format!("unavailable={unavailable}"));
                    }
                    if set.status.replicas > 6 {
                        violations
                            .lock()
                            .unwrap()
                            .push(format!("total={}", set.status.replicas));
                    }
                }
            }
        });
    }

    // Bump the template: every replica must be replaced.
    harness
        .ctx
        .vmsets
        .modify("default", "db", |set| {
            set.spec.template.spec.tags = vec!["image-v2".to_string()];
        })
        .await
        .unwrap();

    eventually("rolling update completes", 120_000, || async {
        harness
            .ctx
            .vmsets
            .try_get("default", "db")
            .await
            .map(|set| {
                set.status.updated_replicas == 5
                    && set.status.ready_replicas == 5
                    && set.status.current_revision == set.status.update_revision
            })
            .unwrap_or(false)
    })
    .await;

    let violations = violations.lock().unwrap().clone();
    assert!(
        violations.is_empty(),
        "rolling update violated its budget: {violations:?}"
    );

    // Exactly five VMs carry the owner reference.
    let owned: Vec<_> = harness
        .ctx
        .vms
        .list(Some("default"))
        .await
        .into_iter()
        .filter(|vm| vm.metadata.is_owned_by("VMSet", "db"))
        .collect();
    assert_eq!(owned.len(), 5);
}

// =============================================================================
// Idempotence: repeating a reconcile leaves status unchanged
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn converged_vm_status_is_stable_across_reconciles() {
    let harness = start_harness();
    harness.seed_provider("prov-idem").await;
    harness.seed_class("medium").await;
    harness.seed_image("ubuntu-22", &["prov-idem"]).await;
    harness.seed_vm("web-01", "prov-idem", PowerState::On).await;

    eventually("web-01 is Running", 30_000, || async {
        harness
            .ctx
            .vms
            .try_get("default", "web-01")
            .await
            .map(|vm| vm.status.phase == VmPhase::Running)
            .unwrap_or(false)
    })
    .await;

    let before = harness.ctx.vms.try_get("default", "web-01").await.unwrap();
    // Let several drift reconciles pass.
    sleep(Duration::from_millis(300)).await;
    let after = harness.ctx.vms.try_get("default", "web-01").await.unwrap();

    assert_eq!(before.status.phase, after.status.phase);
    assert_eq!(before.status.id, after.status.id);
    assert_eq!(before.status.ips, after.status.ips);
    assert_eq!(before.status.power_state, after.status.power_state);
    // Condition transition times must not churn while converged.
    let ready_before =
        conditions::get_condition(&before.status.conditions, conditions::types::READY).unwrap();
    let ready_after =
        conditions::get_condition(&after.status.conditions, conditions::types::READY).unwrap();
    assert_eq!(
        ready_before.last_transition_time,
        ready_after.last_transition_time
    );
}
