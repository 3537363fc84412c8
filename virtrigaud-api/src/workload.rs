//! Minimal collaborator kinds owned through the store.
//!
//! These are contract-level shapes of the orchestrator-native workload
//! objects the reconcilers create: the provider-runtime Deployment and
//! Service, migration staging claims, and credential Secrets. Only the
//! fields the control plane reads or writes are modeled.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::impl_object;
use crate::meta::ObjectMeta;

// =============================================================================
// DEPLOYMENT
// =============================================================================

/// A replicated workload running a provider runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub metadata: ObjectMeta,
    pub spec: DeploymentSpec,
    #[serde(default)]
    pub status: DeploymentStatus,
}

impl_object!(Deployment, "Deployment");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentSpec {
    pub replicas: i32,
    pub selector: BTreeMap<String, String>,
    pub template: PodTemplate,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PodTemplate {
    pub labels: BTreeMap<String, String>,
    pub containers: Vec<Container>,
    pub volumes: Vec<Volume>,
    pub node_selector: BTreeMap<String, String>,
    pub image_pull_secrets: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Container {
    pub name: String,
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,
    pub env: Vec<ContainerEnv>,
    pub ports: Vec<u16>,
    pub volume_mounts: Vec<VolumeMount>,
    pub resources: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerEnv {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeMount {
    pub name: String,
    pub mount_path: String,
    #[serde(default)]
    pub read_only: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    pub name: String,
    /// Secret-backed volume source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,
    /// Claim-backed volume source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentStatus {
    pub ready_replicas: i32,
    pub available_replicas: i32,
}

// =============================================================================
// SERVICE
// =============================================================================

/// A stable network endpoint in front of a Deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub metadata: ObjectMeta,
    pub spec: ServiceSpec,
}

impl_object!(Service, "Service");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSpec {
    pub selector: BTreeMap<String, String>,
    pub ports: Vec<ServicePort>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServicePort {
    pub port: u16,
    #[serde(default)]
    pub target_port: u16,
}

impl Service {
    /// Cluster-internal DNS address of the first port.
    pub fn endpoint(&self) -> Option<String> {
        self.spec.ports.first().map(|p| {
            format!(
                "{}.{}.svc:{}",
                self.metadata.name, self.metadata.namespace, p.port
            )
        })
    }
}

// =============================================================================
// PERSISTENT VOLUME CLAIM
// =============================================================================

/// A storage claim; the migration engine stages disks on these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistentVolumeClaim {
    pub metadata: ObjectMeta,
    pub spec: PvcSpec,
    #[serde(default)]
    pub status: PvcStatus,
}

impl_object!(PersistentVolumeClaim, "PersistentVolumeClaim");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PvcSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
    pub access_modes: Vec<String>,
    /// Quantity string
    pub size: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PvcStatus {
    /// "Pending" or "Bound"
    pub phase: String,
}

// =============================================================================
// SECRET
// =============================================================================

/// Opaque key/value secret material, values base64-encoded at rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Secret {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl_object!(Secret, "Secret");

/// Errors reading secret material.
#[derive(Error, Debug)]
pub enum SecretError {
    #[error("secret key {0:?} not found")]
    MissingKey(String),

    #[error("secret key {0:?} is not valid base64: {1}")]
    BadEncoding(String, String),
}

impl Secret {
    /// Decode the value under `key`.
    pub fn decoded(&self, key: &str) -> Result<Vec<u8>, SecretError> {
        use base64::Engine as _;
        let raw = self
            .data
            .get(key)
            .ok_or_else(|| SecretError::MissingKey(key.to_string()))?;
        base64::engine::general_purpose::STANDARD
            .decode(raw)
            .map_err(|e| SecretError::BadEncoding(key.to_string(), e.to_string()))
    }

    /// Decode the value under `key` as UTF-8 text.
    pub fn decoded_string(&self, key: &str) -> Result<String, SecretError> {
        let bytes = self.decoded(key)?;
        String::from_utf8(bytes)
            .map_err(|e| SecretError::BadEncoding(key.to_string(), e.to_string()))
    }

    /// Store `value` under `key`, encoding it.
    pub fn insert(&mut self, key: impl Into<String>, value: &[u8]) {
        use base64::Engine as _;
        self.data.insert(
            key.into(),
            base64::engine::general_purpose::STANDARD.encode(value),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_roundtrip() {
        let mut secret = Secret {
            metadata: ObjectMeta::named("default", "pve-creds"),
            data: BTreeMap::new(),
        };
        secret.insert("PVE_TOKEN_SECRET", b"hunter2");
        assert_eq!(secret.decoded_string("PVE_TOKEN_SECRET").unwrap(), "hunter2");
        assert!(secret.decoded("missing").is_err());
    }

    #[test]
    fn test_service_endpoint() {
        let service = Service {
            metadata: ObjectMeta::named("virtrigaud-system", "provider-vsphere"),
            spec: ServiceSpec {
                selector: BTreeMap::new(),
                ports: vec![ServicePort {
                    port: 9443,
                    target_port: 9443,
                }],
            },
        };
        assert_eq!(
            service.endpoint().unwrap(),
            "provider-vsphere.virtrigaud-system.svc:9443"
        );
    }
}
