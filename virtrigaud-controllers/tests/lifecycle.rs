//! Lifecycle coverage beyond the core scenarios: on-demand image
//! preparation, snapshots with schedules and retention, placement
//! validation, provider runtime materialization and health thresholds,
//! migration timeouts and PVC retention.

mod common;

use virtrigaud_api::meta::{LocalObjectReference, ObjectMeta, ObjectRef, Object};
use virtrigaud_api::v1beta1::{
    AffinityRules, DomainAffinity, MigrationOptions, MigrationPhase, MigrationSource,
    MigrationStorageSpec, MigrationTarget, PlacementConstraints, PowerState, Provider,
    ProviderRuntimeSpec, ProviderSpec, ProviderType, RetentionPolicy, SnapshotPhase,
    SnapshotScheduleSpec, VMMigration, VMMigrationSpec, VMPlacementPolicy, VMPlacementPolicySpec,
    VMSet, VMSetSpec, VMSnapshot, VMSnapshotSpec, VirtualMachineSpec, VmPhase, VmTemplate,
    VolumeClaimTemplate, ManagementPolicy, PvcRetention, PvcRetentionPolicy,
};
use virtrigaud_common::conditions;
use virtrigaud_provider::ProviderError;

use common::{eventually, start_harness};

// =============================================================================
// Image preparation on demand
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn image_is_prepared_when_a_vm_requests_it() {
    let harness = start_harness();
    harness.seed_provider("prov-img").await;
    harness.seed_class("medium").await;
    // No pre-seeded availability: the VM must kick the image reconciler.
    harness.seed_raw_image("ubuntu-22").await;
    harness.seed_vm("web-01", "prov-img", PowerState::On).await;

    eventually("image becomes available on prov-img", 30_000, || async {
        harness
            .ctx
            .images
            .try_get("default", "ubuntu-22")
            .await
            .map(|image| image.available_on("prov-img"))
            .unwrap_or(false)
    })
    .await;

    eventually("web-01 reaches Running", 30_000, || async {
        harness
            .ctx
            .vms
            .try_get("default", "web-01")
            .await
            .map(|vm| vm.status.phase == VmPhase::Running)
            .unwrap_or(false)
    })
    .await;

    // The provider actually imported the image bits.
    assert!(harness.mock("prov-img").call_count("import_disk") >= 1);
}

// =============================================================================
// Snapshots: one-shot, revert, schedule, retention
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn one_shot_snapshot_becomes_ready_and_supports_revert() {
    let harness = start_harness();
    harness.seed_provider("prov-snap").await;
    harness.seed_class("medium").await;
    harness.seed_image("ubuntu-22", &["prov-snap"]).await;
    harness.seed_vm("web-01", "prov-snap", PowerState::On).await;

    eventually("web-01 reaches Running", 30_000, || async {
        harness
            .ctx
            .vms
            .try_get("default", "web-01")
            .await
            .map(|vm| vm.status.phase == VmPhase::Running)
            .unwrap_or(false)
    })
    .await;

    let snapshot = VMSnapshot {
        metadata: ObjectMeta::named("default", "web-01-backup"),
        spec: VMSnapshotSpec {
            vm_ref: LocalObjectReference::new("web-01"),
            config: Default::default(),
            retention: None,
            schedule: None,
            pinned: false,
        },
        status: Default::default(),
    };
    harness.ctx.snapshots.create(snapshot).await.unwrap();

    eventually("snapshot reaches Ready", 30_000, || async {
        harness
            .ctx
            .snapshots
            .try_get("default", "web-01-backup")
            .await
            .map(|s| s.status.phase == SnapshotPhase::Ready && s.status.snapshot_id.is_some())
            .unwrap_or(false)
    })
    .await;

    // The snapshot shows up in the VM's status list.
    eventually("vm status lists the snapshot", 30_000, || async {
        harness
            .ctx
            .vms
            .try_get("default", "web-01")
            .await
            .map(|vm| vm.status.snapshots.iter().any(|s| s.name == "web-01-backup"))
            .unwrap_or(false)
    })
    .await;

    // Request a revert through the VM spec.
    harness
        .ctx
        .vms
        .modify("default", "web-01", |vm| {
            vm.spec.snapshot = Some(virtrigaud_api::v1beta1::SnapshotOperation {
                revert_to: Some("web-01-backup".to_string()),
            });
        })
        .await
        .unwrap();

    eventually("revert is recorded", 30_000, || async {
        harness
            .ctx
            .vms
            .try_get("default", "web-01")
            .await
            .map(|vm| conditions::is_condition_true(&vm.status.conditions, "SnapshotReverted"))
            .unwrap_or(false)
    })
    .await;
    assert!(harness.mock("prov-snap").call_count("snapshot_revert") >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scheduled_snapshots_fire_and_retention_prunes() {
    let harness = start_harness();
    harness.seed_provider("prov-sched").await;
    harness.seed_class("medium").await;
    harness.seed_image("ubuntu-22", &["prov-sched"]).await;
    harness.seed_vm("db-01", "prov-sched", PowerState::On).await;

    eventually("db-01 reaches Running", 30_000, || async {
        harness
            .ctx
            .vms
            .try_get("default", "db-01")
            .await
            .map(|vm| vm.status.phase == VmPhase::Running)
            .unwrap_or(false)
    })
    .await;

    let snapshot = VMSnapshot {
        metadata: ObjectMeta::named("default", "db-01-hourly"),
        spec: VMSnapshotSpec {
            vm_ref: LocalObjectReference::new("db-01"),
            config: Default::default(),
            retention: Some(RetentionPolicy {
                max_age_hours: None,
                max_count: Some(1),
                preserve_pinned: false,
            }),
            schedule: Some(SnapshotScheduleSpec {
                cron: "@every 1s".to_string(),
                time_zone: None,
                concurrency_policy: Default::default(),
            }),
            pinned: false,
        },
        status: Default::default(),
    };
    harness.ctx.snapshots.create(snapshot).await.unwrap();

    // At least two firings recorded, with retention holding the line.
    eventually("schedule fires twice and retention prunes", 30_000, || async {
        let pruned = harness.mock("prov-sched").call_count("snapshot_delete") >= 1;
        let fired_twice = harness.mock("prov-sched").call_count("snapshot_create") >= 2;
        let bounded = harness
            .ctx
            .snapshots
            .try_get("default", "db-01-hourly")
            .await
            .map(|s| s.status.history.len() <= 1)
            .unwrap_or(false);
        pruned && fired_twice && bounded
    })
    .await;
}

// =============================================================================
// Placement validation
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn placement_policy_surfaces_conflicts_and_feature_matrix() {
    let harness = start_harness();
    harness
        .seed_typed_provider("vc-prod", ProviderType::VSphere)
        .await;
    harness
        .seed_typed_provider("fc-edge", ProviderType::Firecracker)
        .await;

    let policy = VMPlacementPolicy {
        metadata: ObjectMeta::named("default", "pinned-db"),
        spec: VMPlacementPolicySpec {
            hard: Some(PlacementConstraints {
                denied_hosts: vec!["esx-03".to_string()],
                allowed_datastores: vec!["ds-ssd".to_string()],
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
        },
        status: Default::default(),
    };
    harness.ctx.placements.create(policy).await.unwrap();

    eventually("policy validated against both providers", 30_000, || async {
        match harness.ctx.placements.try_get("default", "pinned-db").await {
            Some(policy) => {
                let vsphere = policy.status.results.get("vc-prod");
                let firecracker = policy.status.results.get("fc-edge");
                match (vsphere, firecracker) {
                    (Some(vsphere), Some(firecracker)) => {
                        // The affinity-vs-denied-hosts conflict fails both.
                        !policy.status.conflicts.is_empty()
                            && !vsphere.valid
                            // Firecracker cannot express datastore constraints.
                            && firecracker
                                .unsupported_features
                                .iter()
                                .any(|f| f == "datastores")
                    }
                    _ => false,
                }
            }
            None => false,
        }
    })
    .await;
}

// =============================================================================
// Provider runtime
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn remote_runtime_materializes_deployment_and_service() {
    let harness = start_harness();
    harness.mock("pve-1");
    let provider = Provider {
        metadata: ObjectMeta::named("default", "pve-1"),
        spec: ProviderSpec {
            provider_type: ProviderType::Proxmox,
            endpoint: "https://pve.example.com:8006".to_string(),
            credential_secret_ref: Some(LocalObjectReference::new("pve-creds")),
            runtime: Some(ProviderRuntimeSpec {
                image: "ghcr.io/virtrigaud/provider-proxmox:0.3.2".to_string(),
                replicas: 2,
                ..Default::default()
            }),
            health_check: Default::default(),
            connection_pool: Default::default(),
        },
        status: Default::default(),
    };
    harness.ctx.providers.create(provider).await.unwrap();

    eventually("deployment and service exist, provider healthy", 30_000, || async {
        let deployment = harness
            .ctx
            .deployments
            .try_get("default", "provider-pve-1")
            .await;
        let service = harness.ctx.services.try_get("default", "provider-pve-1").await;
        let provider = harness.ctx.providers.try_get("default", "pve-1").await;
        match (deployment, service, provider) {
            (Some(deployment), Some(service), Some(provider)) => {
                deployment.spec.replicas == 2
                    && deployment.metadata.is_owned_by(Provider::KIND, "pve-1")
                    && service.spec.ports.first().map(|p| p.port) == Some(9443)
                    && provider.status.healthy
                    && provider.status.capabilities.is_some()
                    && provider.status.runtime_endpoint.is_some()
            }
            _ => false,
        }
    })
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn provider_health_flips_after_threshold_failures() {
    let harness = start_harness();
    let mock = harness.mock("flaky");
    // Zero interval keeps the health loop hot enough for the test.
    let provider = Provider {
        metadata: ObjectMeta::named("default", "flaky"),
        spec: ProviderSpec {
            provider_type: ProviderType::Libvirt,
            endpoint: "mock://flaky".to_string(),
            credential_secret_ref: None,
            runtime: None,
            health_check: virtrigaud_api::v1beta1::HealthCheckSpec {
                interval_seconds: 0,
                timeout_seconds: 10,
                failure_threshold: 3,
                success_threshold: 1,
            },
            connection_pool: Default::default(),
        },
        status: Default::default(),
    };
    harness.ctx.providers.create(provider).await.unwrap();

    eventually("provider starts healthy", 30_000, || async {
        harness
            .ctx
            .providers
            .try_get("default", "flaky")
            .await
            .map(|p| p.status.healthy)
            .unwrap_or(false)
    })
    .await;

    // Three consecutive failed checks cross the default failure threshold.
    // Unauthorized is not retried by the client, so one fault is one check.
    for _ in 0..3 {
        mock.inject_fault(
            "validate",
            ProviderError::Unauthorized("token expired".to_string()),
        );
    }

    eventually("provider flips unhealthy", 30_000, || async {
        harness
            .ctx
            .providers
            .try_get("default", "flaky")
            .await
            .map(|p| !p.status.healthy)
            .unwrap_or(false)
    })
    .await;

    // Faults drained: the next successful check restores health.
    eventually("provider recovers", 30_000, || async {
        harness
            .ctx
            .providers
            .try_get("default", "flaky")
            .await
            .map(|p| p.status.healthy)
            .unwrap_or(false)
    })
    .await;
}

// =============================================================================
// Migration timeout
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn migration_fails_when_overall_timeout_elapses() {
    let harness = start_harness();
    harness.seed_provider("prov-slow").await;
    harness.share_backend("prov-slow", "prov-slow-b");
    harness.seed_provider("prov-slow-b").await;
    harness.seed_class("medium").await;
    harness.seed_image("ubuntu-22", &["prov-slow", "prov-slow-b"]).await;
    harness.seed_vm("db-01", "prov-slow", PowerState::On).await;

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

    let migration = VMMigration {
        metadata: ObjectMeta::named("default", "move-db-01"),
        spec: VMMigrationSpec {
            source: MigrationSource {
                vm_ref: ObjectRef::new("db-01"),
                ..Default::default()
            },
            target: MigrationTarget {
                name: "db-01-new".to_string(),
                provider_ref: ObjectRef::new("prov-slow-b"),
                ..Default::default()
            },
            options: MigrationOptions {
                // Exhausted immediately: every phase tick trips the budget.
                timeout_seconds: 0,
                ..Default::default()
            },
            storage: MigrationStorageSpec::default(),
        },
        status: Default::default(),
    };
    harness.ctx.migrations.create(migration).await.unwrap();

    eventually("migration fails with Timeout", 30_000, || async {
        harness
            .ctx
            .migrations
            .try_get("default", "move-db-01")
            .await
            .map(|m| {
                m.status.phase == MigrationPhase::Failed
                    && conditions::get_condition(
                        &m.status.conditions,
                        conditions::types::READY,
                    )
                    .and_then(|c| c.reason.clone())
                    .as_deref()
                        == Some("Timeout")
            })
            .unwrap_or(false)
    })
    .await;
}

// =============================================================================
// VMSet claim retention
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn vmset_scale_down_deletes_claims_per_retention_policy() {
    let harness = start_harness();
    harness.seed_provider("prov-pvc").await;
    harness.seed_class("medium").await;
    harness.seed_image("ubuntu-22", &["prov-pvc"]).await;

    let mut selector = virtrigaud_api::meta::LabelSelector::default();
    selector
        .match_labels
        .insert("app".to_string(), "cache".to_string());

    let set = VMSet {
        metadata: ObjectMeta::named("default", "cache"),
        spec: VMSetSpec {
            replicas: 2,
            selector: selector.clone(),
            template: VmTemplate {
                metadata: virtrigaud_api::v1beta1::TemplateMeta {
                    labels: selector.match_labels.clone(),
                    annotations: Default::default(),
                },
                spec: VirtualMachineSpec {
                    provider_ref: ObjectRef::new("prov-pvc"),
                    class_ref: LocalObjectReference::new("medium"),
                    image_ref: Some(LocalObjectReference::new("ubuntu-22")),
                    power_state: PowerState::On,
                    ..Default::default()
                },
            },
            update_strategy: Default::default(),
            management_policy: ManagementPolicy::Parallel,
            pvc_retention: PvcRetentionPolicy {
                when_deleted: PvcRetention::Delete,
                when_scaled: PvcRetention::Delete,
            },
            ordinals: Default::default(),
            volume_claim_templates: vec![VolumeClaimTemplate {
                name: "data".to_string(),
                storage_class: None,
                size: "10Gi".to_string(),
            }],
        },
        status: Default::default(),
    };
    harness.ctx.vmsets.create(set).await.unwrap();

    eventually("both replicas ready with claims", 60_000, || async {
        let ready = harness
            .ctx
            .vmsets
            .try_get("default", "cache")
            .await
            .map(|set| set.status.ready_replicas == 2)
            .unwrap_or(false);
        let claims = harness.ctx.pvcs.try_get("default", "data-cache-1").await.is_some();
        ready && claims
    })
    .await;

    // Scale down: the highest ordinal and its claim go away.
    harness
        .ctx
        .vmsets
        .modify("default", "cache", |set| {
            set.spec.replicas = 1;
        })
        .await
        .unwrap();

    eventually("replica 1 and its claim removed", 60_000, || async {
        let vm_gone = harness.ctx.vms.try_get("default", "cache-1").await.is_none();
        let claim_gone = harness
            .ctx
            .pvcs
            .try_get("default", "data-cache-1")
            .await
            .is_none();
        let status_ok = harness
            .ctx
            .vmsets
            .try_get("default", "cache")
            .await
            .map(|set| set.status.replicas == 1)
            .unwrap_or(false);
        vm_gone && claim_gone && status_ok
    })
    .await;

    // Deleting the set cascades to the remaining VM and claim.
    harness.ctx.vmsets.delete("default", "cache").await.unwrap();
    eventually("cascade removes the remaining replica", 60_000, || async {
        harness.ctx.vms.try_get("default", "cache-0").await.is_none()
            && harness
                .ctx
                .pvcs
                .try_get("default", "data-cache-0")
                .await
                .is_none()
    })
    .await;
}
