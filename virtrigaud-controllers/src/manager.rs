//! Manager: wires stores, queues, watch pumps and worker pools together.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use virtrigaud_api::meta::Object;
use virtrigaud_api::v1beta1::{Provider, VMSet, VirtualMachine};
use virtrigaud_api::workload::PersistentVolumeClaim;
use virtrigaud_store::WorkQueue;

use crate::clone::CloneReconciler;
use crate::config::Config;
use crate::context::Context;
use crate::image::ImageReconciler;
use crate::migration::MigrationReconciler;
use crate::placement::PlacementReconciler;
use crate::provider_runtime::ProviderRuntimeReconciler;
use crate::runtime::{pump_owner_watch, pump_watch, spawn_owner_gc, spawn_workers, Reconciler};
use crate::snapshot::SnapshotReconciler;
use crate::vm::VmReconciler;
use crate::vmset::VmSetReconciler;

fn start_controller(
    handles: &mut Vec<JoinHandle<()>>,
    queues: &mut Vec<Arc<WorkQueue>>,
    reconciler: Arc<dyn Reconciler>,
    queue: Arc<WorkQueue>,
    parallelism: usize,
    budget: std::time::Duration,
) {
    info!(controller = reconciler.name(), parallelism, "Starting controller");
    handles.extend(spawn_workers(reconciler, queue.clone(), parallelism, budget));
    queues.push(queue);
}

/// The running control plane: queues, pumps and worker pools.
pub struct Manager {
    queues: Vec<Arc<WorkQueue>>,
    handles: Vec<JoinHandle<()>>,
}

impl Manager {
    /// Start every reconciler against `ctx`.
    pub fn start(ctx: Arc<Context>, config: &Config) -> Self {
        let mut queues = Vec::new();
        let mut handles = Vec::new();
        let parallelism = config.parallelism;
        let budget = config.reconcile_timeout();

        // VirtualMachine.
        let vm_queue = Arc::new(WorkQueue::new());
        handles.push(pump_watch(&ctx.vms, vm_queue.clone()));
        start_controller(
            &mut handles,
            &mut queues,
            Arc::new(VmReconciler::new(ctx.clone())),
            vm_queue,
            parallelism,
            budget,
        );

        // VMSet: own objects plus owned-VM changes.
        let vmset_queue = Arc::new(WorkQueue::new());
        handles.push(pump_watch(&ctx.vmsets, vmset_queue.clone()));
        handles.push(pump_owner_watch(&ctx.vms, vmset_queue.clone(), VMSet::KIND));
        start_controller(
            &mut handles,
            &mut queues,
            Arc::new(VmSetReconciler::new(ctx.clone())),
            vmset_queue,
            parallelism,
            budget,
        );

        // VMImage.
        let image_queue = Arc::new(WorkQueue::new());
        handles.push(pump_watch(&ctx.images, image_queue.clone()));
        start_controller(
            &mut handles,
            &mut queues,
            Arc::new(ImageReconciler::new(ctx.clone())),
            image_queue,
            parallelism,
            budget,
        );

        // VMMigration.
        let migration_queue = Arc::new(WorkQueue::new());
        handles.push(pump_watch(&ctx.migrations, migration_queue.clone()));
        start_controller(
            &mut handles,
            &mut queues,
            Arc::new(MigrationReconciler::new(ctx.clone())),
            migration_queue,
            parallelism,
            budget,
        );

        // VMSnapshot.
        let snapshot_queue = Arc::new(WorkQueue::new());
        handles.push(pump_watch(&ctx.snapshots, snapshot_queue.clone()));
        start_controller(
            &mut handles,
            &mut queues,
            Arc::new(SnapshotReconciler::new(ctx.clone())),
            snapshot_queue,
            parallelism,
            budget,
        );

        // VMClone.
        let clone_queue = Arc::new(WorkQueue::new());
        handles.push(pump_watch(&ctx.clones, clone_queue.clone()));
        start_controller(
            &mut handles,
            &mut queues,
            Arc::new(CloneReconciler::new(ctx.clone())),
            clone_queue,
            parallelism,
            budget,
        );

        // Provider runtime: own objects plus owned Deployment/Service drift.
        let provider_queue = Arc::new(WorkQueue::new());
        handles.push(pump_watch(&ctx.providers, provider_queue.clone()));
        handles.push(pump_owner_watch(
            &ctx.deployments,
            provider_queue.clone(),
            Provider::KIND,
        ));
        handles.push(pump_owner_watch(
            &ctx.services,
            provider_queue.clone(),
            Provider::KIND,
        ));
        start_controller(
            &mut handles,
            &mut queues,
            Arc::new(ProviderRuntimeReconciler::new(ctx.clone())),
            provider_queue,
            parallelism,
            budget,
        );

        // Placement: re-validate policies when providers change too.
        let placement_queue = Arc::new(WorkQueue::new());
        handles.push(pump_watch(&ctx.placements, placement_queue.clone()));
        {
            let placements = ctx.placements.clone();
            let queue = placement_queue.clone();
            let mut watcher = ctx.providers.watch();
            handles.push(tokio::spawn(async move {
                loop {
                    match watcher.recv().await {
                        Ok(event) => {
                            let ns = event.object().metadata.namespace.clone();
                            for policy in placements.list(Some(&ns)).await {
                                queue.add(virtrigaud_store::ObjectKey::new(
                                    ns.clone(),
                                    policy.metadata.name.clone(),
                                ));
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
            }));
        }
        start_controller(
            &mut handles,
            &mut queues,
            Arc::new(PlacementReconciler::new(ctx.clone())),
            placement_queue,
            parallelism,
            budget,
        );

        // Orchestrator-style owner-reference GC.
        handles.push(spawn_owner_gc::<VMSet, VirtualMachine>(
            &ctx.vmsets,
            ctx.vms.clone(),
        ));
        handles.push(spawn_owner_gc::<VMSet, PersistentVolumeClaim>(
            &ctx.vmsets,
            ctx.pvcs.clone(),
        ));

        info!("All controllers started");
        Self { queues, handles }
    }

    /// Close every queue and wait for workers to drain.
    pub async fn shutdown(self) {
        info!("Shutting down controllers");
        for queue in &self.queues {
            queue.close();
        }
        for handle in self.handles {
            handle.abort();
        }
    }

    /// Run until ctrl-c.
    pub async fn run_until_signal(self) -> anyhow::Result<()> {
        tokio::signal::ctrl_c().await?;
        self.shutdown().await;
        Ok(())
    }
}
