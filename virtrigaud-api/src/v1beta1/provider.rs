//! The Provider kind: a managed hypervisor endpoint and its runtime.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use virtrigaud_common::conditions::Condition;

use crate::impl_object;
use crate::meta::{LocalObjectReference, ObjectMeta};

use super::core::{DiskFormat, ProviderType};

/// Finalizer owned by the provider-runtime reconciler.
pub const PROVIDER_FINALIZER: &str = "provider.infra.virtrigaud.io/finalizer";

/// Default gRPC port for remote provider runtimes.
pub const DEFAULT_PROVIDER_PORT: u16 = 9443;

/// A hypervisor endpoint managed by the control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub metadata: ObjectMeta,
    pub spec: ProviderSpec,
    #[serde(default)]
    pub status: ProviderStatus,
}

impl_object!(Provider, "Provider");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSpec {
    /// Hypervisor family
    #[serde(rename = "type")]
    pub provider_type: ProviderType,
    /// Endpoint URI; libvirt URIs such as `qemu+ssh://...` are permitted
    pub endpoint: String,
    /// Secret holding credentials for the hypervisor endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_secret_ref: Option<LocalObjectReference>,
    /// How the provider runtime is realized
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<ProviderRuntimeSpec>,
    #[serde(default)]
    pub health_check: HealthCheckSpec,
    #[serde(default)]
    pub connection_pool: ConnectionPoolSpec,
}

/// Runtime realization mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuntimeMode {
    /// The reconciler owns a Deployment + Service for the runtime
    Remote,
    /// The runtime is managed out-of-band; only the endpoint is used
    External,
}

impl Default for RuntimeMode {
    fn default() -> Self {
        Self::Remote
    }
}

/// Specification of a remote provider runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderRuntimeSpec {
    pub mode: RuntimeMode,
    /// Container image for the runtime
    pub image: String,
    pub replicas: i32,
    /// gRPC service port
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,
    pub image_pull_secrets: Vec<LocalObjectReference>,
    pub node_selector: BTreeMap<String, String>,
    pub env: Vec<EnvVar>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<ProviderTlsSpec>,
}

impl Default for ProviderRuntimeSpec {
    fn default() -> Self {
        Self {
            mode: RuntimeMode::Remote,
            image: String::new(),
            replicas: 1,
            port: DEFAULT_PROVIDER_PORT,
            image_pull_policy: None,
            image_pull_secrets: Vec::new(),
            node_selector: BTreeMap::new(),
            env: Vec::new(),
            resources: None,
            tls: None,
        }
    }
}

/// An environment variable on the runtime container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

/// Container resource requests and limits, quantity strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceRequirements {
    pub requests: BTreeMap<String, String>,
    pub limits: BTreeMap<String, String>,
}

/// TLS material for the provider gRPC channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderTlsSpec {
    /// Secret with `tls.crt`, `tls.key`, `ca.crt`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<LocalObjectReference>,
    /// Disable certificate verification; must be explicit
    pub insecure_skip_verify: bool,
}

/// Periodic health-check knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheckSpec {
    pub interval_seconds: u32,
    pub timeout_seconds: u32,
    /// Consecutive failures before Healthy flips false
    pub failure_threshold: u32,
    /// Consecutive successes before Healthy flips back
    pub success_threshold: u32,
}

impl Default for HealthCheckSpec {
    fn default() -> Self {
        Self {
            interval_seconds: 30,
            timeout_seconds: 10,
            failure_threshold: 3,
            success_threshold: 1,
        }
    }
}

/// Connection-pool knobs for the provider channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionPoolSpec {
    pub max_connections: u32,
    pub max_idle_connections: u32,
    pub connection_timeout_seconds: u32,
    pub idle_timeout_seconds: u32,
}

impl Default for ConnectionPoolSpec {
    fn default() -> Self {
        Self {
            max_connections: 8,
            max_idle_connections: 2,
            connection_timeout_seconds: 10,
            idle_timeout_seconds: 300,
        }
    }
}

/// Capabilities advertised by a provider runtime.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderCapabilities {
    pub supports_snapshots: bool,
    pub supports_memory_snapshots: bool,
    pub supports_linked_clones: bool,
    pub supports_instant_clones: bool,
    pub supports_disk_export: bool,
    pub supports_disk_import: bool,
    /// Reconfigure may run while the VM is powered on
    pub reconfigure_online: bool,
    pub supported_disk_formats: Vec<DiskFormat>,
}

impl ProviderCapabilities {
    pub fn supports_format(&self, format: DiskFormat) -> bool {
        self.supported_disk_formats.contains(&format)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderStatus {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_health_check: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<ProviderCapabilities>,
    /// Address of the realized runtime Service
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_endpoint: Option<String>,
    pub observed_generation: i64,
    pub conditions: Vec<Condition>,
}
