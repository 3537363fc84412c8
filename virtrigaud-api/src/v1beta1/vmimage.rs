//! The VMImage kind: an image source and its per-provider preparation state.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use virtrigaud_common::conditions::Condition;

use crate::impl_object;
use crate::meta::{LocalObjectReference, ObjectMeta};

use super::core::{ChecksumType, DiskFormat};

/// Finalizer owned by the image reconciler; held while VMs reference the image.
pub const IMAGE_FINALIZER: &str = "vmimage.infra.virtrigaud.io/finalizer";

/// A shared image description prepared on demand per provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VMImage {
    pub metadata: ObjectMeta,
    pub spec: VMImageSpec,
    #[serde(default)]
    pub status: VMImageStatus,
}

impl_object!(VMImage, "VMImage");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VMImageSpec {
    /// Exactly one source variant
    pub source: ImageSource,
    #[serde(default)]
    pub prepare: PreparePolicy,
}

/// Where the image bits come from. Tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ImageSource {
    /// Stream over HTTP(S) into staging
    Http {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        auth_secret_ref: Option<LocalObjectReference>,
    },
    /// Pull an artifact from a container registry
    Registry {
        image: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pull_secret_ref: Option<LocalObjectReference>,
    },
    /// vSphere template or content-library item; already provider-resident
    #[serde(rename = "vsphere")]
    VSphere {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        template: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content_library: Option<ContentLibraryItem>,
    },
    /// libvirt storage path or pool volume
    Libvirt {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pool: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        volume: Option<String>,
    },
    /// Proxmox template by numeric ID or name
    Proxmox {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        template_id: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        template_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        node: Option<String>,
    },
    /// Bind to an existing orchestrator-native disk claim
    DataVolume { name: String },
}

/// vSphere content-library coordinates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentLibraryItem {
    pub library: String,
    pub item: String,
}

/// What to do when the image is missing on a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OnMissing {
    /// Acquire and import the image
    Import,
    /// Fail the referencing VM
    Fail,
    /// Wait for out-of-band preparation
    Wait,
}

impl Default for OnMissing {
    fn default() -> Self {
        Self::Import
    }
}

/// Preparation behavior and verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreparePolicy {
    pub on_missing: OnMissing,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum_type: Option<ChecksumType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_format: Option<DiskFormat>,
    /// Run the provider's image optimization pass after import
    pub optimize: bool,
    /// Preparation attempts before the image goes Failed
    pub retry_limit: u32,
    pub timeout_seconds: u64,
}

impl Default for PreparePolicy {
    fn default() -> Self {
        Self {
            on_missing: OnMissing::Import,
            checksum: None,
            checksum_type: None,
            preferred_format: None,
            optimize: false,
            retry_limit: 3,
            timeout_seconds: 1800,
        }
    }
}

/// Image preparation phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImagePhase {
    Pending,
    Downloading,
    Importing,
    Converting,
    Optimizing,
    Ready,
    Failed,
}

impl Default for ImagePhase {
    fn default() -> Self {
        Self::Pending
    }
}

/// Availability of the image on a single provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageAvailability {
    pub available: bool,
    /// Provider-side identifier of the prepared image
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_image_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prepared_at: Option<DateTime<Utc>>,
    /// Outstanding preparation task on this provider
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_ref: Option<String>,
}

/// Annotation listing providers that requested this image, comma-separated.
/// VM reconcilers append to it; the image reconciler consumes it.
pub const REQUESTED_PROVIDERS_ANNOTATION: &str =
    "vmimage.infra.virtrigaud.io/requested-providers";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VMImageStatus {
    pub phase: ImagePhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    /// Verified checksum of the acquired bits
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    /// Per-provider availability, keyed by provider name
    pub providers: BTreeMap<String, ImageAvailability>,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_prepare_time: Option<DateTime<Utc>>,
    pub observed_generation: i64,
    pub conditions: Vec<Condition>,
}

impl VMImage {
    /// Whether the image is ready for use on the named provider.
    pub fn available_on(&self, provider: &str) -> bool {
        self.status
            .providers
            .get(provider)
            .map(|a| a.available)
            .unwrap_or(false)
    }
}
