//! Legacy Provider schema.

use serde::{Deserialize, Serialize};

use crate::impl_object;
use crate::meta::ObjectMeta;
use crate::v1beta1::ProviderType;

/// The alpha Provider: no runtime spec, no pooling or health-check knobs.
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
    #[serde(rename = "type")]
    pub provider_type: ProviderType,
    pub endpoint: String,
    /// Credential secret name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_secret: Option<String>,
    /// Runtime container image; a default runtime is materialized when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderStatus {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
