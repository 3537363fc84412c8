//! Provider-runtime reconciler.
//!
//! Materializes the Deployment and Service backing a remote provider
//! runtime, registers a client for it, health-checks it on the configured
//! interval with failure/success thresholds, and refreshes advertised
//! capabilities into Provider status.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use virtrigaud_api::meta::{Object, ObjectMeta, OwnerReference};
use virtrigaud_api::v1beta1::{
    DiskFormat, Provider, ProviderCapabilities, RuntimeMode, PROVIDER_FINALIZER,
};
use virtrigaud_api::workload::{
    Container, ContainerEnv, Deployment, DeploymentSpec, PodTemplate, Service, ServicePort,
    ServiceSpec, Volume, VolumeMount,
};
use virtrigaud_common::conditions::{self, Condition, ConditionStatus};
use virtrigaud_provider::ProviderClient;
use virtrigaud_proto::provider as pb;
use virtrigaud_store::{ObjectKey, StoreError};

use crate::context::Context;
use crate::runtime::{Action, ReconcileError, Reconciler};

/// Consecutive health-check outcomes per provider.
#[derive(Default, Clone, Copy)]
struct HealthCounters {
    successes: u32,
    failures: u32,
}

pub struct ProviderRuntimeReconciler {
    ctx: Arc<Context>,
    health: Mutex<HashMap<String, HealthCounters>>,
}

impl ProviderRuntimeReconciler {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self {
            ctx,
            health: Mutex::new(HashMap::new()),
        }
    }

    fn runtime_name(provider: &Provider) -> String {
        format!("provider-{}", provider.metadata.name)
    }

    /// Ensure the Deployment and Service exist and match the spec.
    async fn ensure_runtime(
        &self,
        key: &ObjectKey,
        provider: &Provider,
    ) -> Result<String, ReconcileError> {
        let runtime = provider.spec.runtime.clone().unwrap_or_default();
        let name = Self::runtime_name(provider);
        let ns = &key.namespace;

        let mut labels = std::collections::BTreeMap::new();
        labels.insert("app".to_string(), "virtrigaud-provider".to_string());
        labels.insert("provider".to_string(), provider.metadata.name.clone());

        let mut env = vec![ContainerEnv {
            name: "PROVIDER_ENDPOINT".to_string(),
            value: provider.spec.endpoint.clone(),
        }];
        env.extend(runtime.env.iter().map(|e| ContainerEnv {
            name: e.name.clone(),
            value: e.value.clone(),
        }));

        let mut volumes = Vec::new();
        let mut volume_mounts = Vec::new();
        if let Some(secret_ref) = &provider.spec.credential_secret_ref {
            volumes.push(Volume {
                name: "credentials".to_string(),
                secret_name: Some(secret_ref.name.clone()),
                claim_name: None,
            });
            volume_mounts.push(VolumeMount {
                name: "credentials".to_string(),
                mount_path: "/etc/virtrigaud/credentials".to_string(),
                read_only: true,
            });
        }
        if let Some(tls) = &runtime.tls {
            if let Some(secret_ref) = &tls.secret_ref {
                volumes.push(Volume {
                    name: "tls".to_string(),
                    secret_name: Some(secret_ref.name.clone()),
                    claim_name: None,
                });
                volume_mounts.push(VolumeMount {
                    name: "tls".to_string(),
                    mount_path: "/etc/virtrigaud/tls".to_string(),
                    read_only: true,
                });
            }
        }

        let desired_spec = DeploymentSpec {
            replicas: runtime.replicas.max(1),
            selector: labels.clone(),
            template: PodTemplate {
                labels: labels.clone(),
                containers: vec![Container {
                    name: "provider".to_string(),
                    image: runtime.image.clone(),
                    image_pull_policy: runtime.image_pull_policy.clone(),
                    env,
                    ports: vec![runtime.port],
                    volume_mounts,
                    resources: runtime
                        .resources
                        .as_ref()
                        .map(|r| r.requests.clone())
                        .unwrap_or_default(),
                }],
                volumes,
                node_selector: runtime.node_selector.clone(),
                image_pull_secrets: runtime
                    .image_pull_secrets
                    .iter()
                    .map(|s| s.name.clone())
                    .collect(),
            },
        };

        match self.ctx.deployments.try_get(ns, &name).await {
            None => {
                let mut metadata = ObjectMeta::named(ns.clone(), name.clone());
                metadata.labels = labels.clone();
                metadata.owner_references = vec![OwnerReference::controller_of(provider)];
                let deployment = Deployment {
                    metadata,
                    spec: desired_spec.clone(),
                    status: Default::default(),
                };
                match self.ctx.deployments.create(deployment).await {
                    Ok(_) => info!(provider = %key, deployment = %name, "Runtime deployment created"),
                    Err(StoreError::AlreadyExists { .. }) => {}
                    Err(e) => return Err(e.into()),
                }
            }
            Some(existing) if existing.spec != desired_spec => {
                debug!(provider = %key, deployment = %name, "Runtime deployment drifted, updating");
                let desired_spec = desired_spec.clone();
                self.ctx
                    .deployments
                    .modify(ns, &name, move |deployment| {
                        deployment.spec = desired_spec.clone();
                    })
                    .await?;
            }
            Some(_) => {}
        }

        let service = match self.ctx.services.try_get(ns, &name).await {
            Some(service) => service,
            None => {
                let mut metadata = ObjectMeta::named(ns.clone(), name.clone());
                metadata.labels = labels.clone();
                metadata.owner_references = vec![OwnerReference::controller_of(provider)];
                let service = Service {
                    metadata,
                    spec: ServiceSpec {
                        selector: labels,
                        ports: vec![ServicePort {
                            port: runtime.port,
                            target_port: runtime.port,
                        }],
                    },
                };
                match self.ctx.services.create(service.clone()).await {
                    Ok(created) => {
                        info!(provider = %key, service = %name, "Runtime service created");
                        created
                    }
                    Err(StoreError::AlreadyExists { .. }) => {
                        self.ctx.services.get(ns, &name).await?
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        };

        let endpoint = service
            .endpoint()
            .map(|e| format!("https://{e}"))
            .unwrap_or_else(|| provider.spec.endpoint.clone());
        Ok(endpoint)
    }

    async fn finalize(
        &self,
        key: &ObjectKey,
        provider: &Provider,
    ) -> Result<Action, ReconcileError> {
        if !provider.metadata.has_finalizer(PROVIDER_FINALIZER) {
            return Ok(Action::AwaitChange);
        }
        self.ctx
            .provider_clients
            .deregister(&key.namespace, &key.name)
            .await;
        let name = Self::runtime_name(provider);
        let _ = self.ctx.deployments.delete(&key.namespace, &name).await;
        let _ = self.ctx.services.delete(&key.namespace, &name).await;
        self.health
            .lock()
            .expect("health lock poisoned")
            .remove(&key.to_string());
        self.ctx
            .providers
            .modify(&key.namespace, &key.name, |provider| {
                provider.metadata.remove_finalizer(PROVIDER_FINALIZER);
            })
            .await?;
        Ok(Action::AwaitChange)
    }
}

#[async_trait]
impl Reconciler for ProviderRuntimeReconciler {
    fn name(&self) -> &'static str {
        "provider-runtime"
    }

    #[instrument(skip(self), fields(provider = %key))]
    async fn reconcile(&self, key: &ObjectKey) -> Result<Action, ReconcileError> {
        let Some(provider) = self.ctx.providers.try_get(&key.namespace, &key.name).await
        else {
            return Ok(Action::AwaitChange);
        };

        if provider.metadata.is_deleting() {
            return self.finalize(key, &provider).await;
        }

        if !provider.metadata.has_finalizer(PROVIDER_FINALIZER) {
            self.ctx
                .providers
                .modify(&key.namespace, &key.name, |provider| {
                    provider.metadata.add_finalizer(PROVIDER_FINALIZER);
                })
                .await?;
            return Ok(Action::Requeue(Duration::ZERO));
        }

        // Materialize or adopt the runtime endpoint.
        let remote = provider
            .spec
            .runtime
            .as_ref()
            .map(|r| r.mode == RuntimeMode::Remote && !r.image.is_empty())
            .unwrap_or(false);
        let endpoint = if remote {
            self.ensure_runtime(key, &provider).await?
        } else {
            provider.spec.endpoint.clone()
        };

        // Register a client once per provider.
        if !self
            .ctx
            .provider_clients
            .contains(&key.namespace, &key.name)
            .await
        {
            let backend = self.ctx.build_backend(&provider, &endpoint);
            let client = ProviderClient::new(
                key.to_string(),
                provider.spec.provider_type.as_str(),
                backend,
            )
            .with_call_timeout(Duration::from_secs(
                provider.spec.health_check.timeout_seconds.max(1) as u64,
            ));
            self.ctx
                .provider_clients
                .register(&key.namespace, &key.name, Arc::new(client))
                .await;
        }
        let client = self
            .ctx
            .provider_clients
            .lookup(&key.namespace, &key.name)
            .await
            .map_err(ReconcileError::Provider)?;

        // Health check with thresholds, rate-limited by the configured
        // interval; other watch events must not turn into extra probes.
        let health_spec = provider.spec.health_check.clone();
        let interval = Duration::from_secs(health_spec.interval_seconds as u64)
            .max(self.ctx.intervals.task_poll());
        if let Some(last) = provider.status.last_health_check {
            let elapsed = (Utc::now() - last).to_std().unwrap_or_default();
            if elapsed < interval {
                return Ok(Action::Requeue(interval - elapsed));
            }
        }
        let check = client.validate().await;
        let (healthy_now, message) = match &check {
            Ok(response) if response.ok => (true, response.message.clone()),
            Ok(response) => (false, response.message.clone()),
            Err(e) => (false, e.to_string()),
        };

        let counters = {
            let mut map = self.health.lock().expect("health lock poisoned");
            let entry = map.entry(key.to_string()).or_default();
            if healthy_now {
                entry.successes += 1;
                entry.failures = 0;
            } else {
                entry.failures += 1;
                entry.successes = 0;
            }
            *entry
        };

        let previous = provider.status.healthy;
        let healthy = if counters.failures >= health_spec.failure_threshold.max(1) {
            false
        } else if counters.successes >= health_spec.success_threshold.max(1) {
            true
        } else {
            previous
        };
        if healthy != previous {
            if healthy {
                info!(provider = %key, "Provider became healthy");
                self.ctx.recorder.normal(
                    Provider::KIND,
                    key.to_string(),
                    "Healthy",
                    "provider runtime is healthy",
                );
            } else {
                warn!(provider = %key, message = %message, "Provider became unhealthy");
                self.ctx.recorder.warning(
                    Provider::KIND,
                    key.to_string(),
                    "Unhealthy",
                    message.clone(),
                );
            }
        }

        // Refresh capabilities while the runtime answers.
        let capabilities = if healthy_now {
            client.get_capabilities().await.ok().map(map_capabilities)
        } else {
            None
        };

        let generation = provider.metadata.generation;
        let endpoint_for_status = endpoint.clone();
        self.ctx
            .providers
            .modify_status(&key.namespace, &key.name, |provider| {
                provider.status.healthy = healthy;
                provider.status.last_health_check = Some(Utc::now());
                provider.status.message = if message.is_empty() {
                    None
                } else {
                    Some(message.clone())
                };
                provider.status.runtime_endpoint = Some(endpoint_for_status.clone());
                if let Some(capabilities) = &capabilities {
                    provider.status.capabilities = Some(capabilities.clone());
                }
                provider.status.observed_generation = generation;
                conditions::set_condition(
                    &mut provider.status.conditions,
                    Condition::new(
                        conditions::types::HEALTHY,
                        if healthy {
                            ConditionStatus::True
                        } else {
                            ConditionStatus::False
                        },
                        if healthy { "Validated" } else { "ValidateFailed" },
                        message.clone(),
                    ),
                );
            })
            .await?;

        Ok(Action::Requeue(interval))
    }
}

/// Map the wire capability advertisement to API capabilities.
fn map_capabilities(caps: pb::GetCapabilitiesResponse) -> ProviderCapabilities {
    ProviderCapabilities {
        supports_snapshots: caps.supports_snapshots,
        supports_memory_snapshots: caps.supports_memory_snapshots,
        supports_linked_clones: caps.supports_linked_clones,
        supports_instant_clones: caps.supports_instant_clones,
        supports_disk_export: caps.supports_disk_export,
        supports_disk_import: caps.supports_disk_import,
        reconfigure_online: caps.reconfigure_online,
        supported_disk_formats: caps
            .supported_disk_formats
            .iter()
            .filter_map(|f| match f.as_str() {
                "qcow2" => Some(DiskFormat::Qcow2),
                "raw" => Some(DiskFormat::Raw),
                "vmdk" => Some(DiskFormat::Vmdk),
                "vhd" => Some(DiskFormat::Vhd),
                _ => None,
            })
            .collect(),
    }
}
