//! Core provider abstraction trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use virtrigaud_proto::provider as pb;

use crate::error::Result;

// =============================================================================
// JSON Documents
// =============================================================================
//
// Polymorphic spec fields travel as JSON-encoded strings on the wire. These
// are the documents both sides agree on; providers ignore fields they do not
// understand.

/// Resource shape derived from the VMClass and per-VM overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassDocument {
    pub cpu: u32,
    pub memory_bytes: u64,
    pub firmware: String,
}

/// Image reference resolved for the target provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageDocument {
    /// Source family: "http", "registry", "vsphere", "libvirt", "proxmox",
    /// "dataVolume" or "importedDisk"
    pub kind: String,
    /// Provider-resolvable reference: URL, template name, disk id
    pub reference: String,
    pub format: String,
}

/// One network attachment resolved for the target provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkDocument {
    pub name: String,
    pub network_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bridge: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub portgroup: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vlan: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
}

/// Placement constraints resolved from the VM's policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementDocument {
    pub allowed_hosts: Vec<String>,
    pub denied_hosts: Vec<String>,
    pub allowed_datastores: Vec<String>,
    pub denied_datastores: Vec<String>,
    pub allowed_zones: Vec<String>,
    pub denied_zones: Vec<String>,
}

/// One extra disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskDocument {
    pub name: String,
    pub size_bytes: u64,
    pub disk_type: String,
}

/// The uniform contract every provider backend implements.
///
/// This mirrors the `ProviderService` gRPC surface one-to-one; the request
/// and response types are the wire types. Reconcilers never talk to a
/// backend directly, they go through [`crate::ProviderClient`] which adds
/// the circuit breaker and retry policy.
#[async_trait]
pub trait ProviderApi: Send + Sync {
    // =========================================================================
    // Health & Capabilities
    // =========================================================================

    /// Check that credentials and the endpoint are usable.
    async fn validate(&self) -> Result<pb::ValidateResponse>;

    /// Fetch the provider's feature advertisement.
    async fn get_capabilities(&self) -> Result<pb::GetCapabilitiesResponse>;

    // =========================================================================
    // VM Lifecycle
    // =========================================================================

    /// Create a VM. Idempotent by name: repeated calls with the same name
    /// return the same provider ID.
    async fn create(&self, request: pb::CreateRequest) -> Result<pb::CreateResponse>;

    /// Delete a VM. Idempotent: succeeds when the VM is already absent.
    async fn delete(&self, request: pb::DeleteRequest) -> Result<pb::TaskResponse>;

    /// Drive toward the requested power state.
    async fn power(&self, request: pb::PowerRequest) -> Result<pb::TaskResponse>;

    /// Apply a new class/disk shape. May be a partial no-op.
    async fn reconfigure(&self, request: pb::ReconfigureRequest) -> Result<pb::TaskResponse>;

    /// Observe current state. Cheap and safe under concurrent mutations.
    async fn describe(&self, request: pb::DescribeRequest) -> Result<pb::DescribeResponse>;

    // =========================================================================
    // Tasks
    // =========================================================================

    /// Poll an async operation. The only way to observe completion.
    async fn task_status(&self, request: pb::TaskStatusRequest)
        -> Result<pb::TaskStatusResponse>;

    // =========================================================================
    // Snapshots
    // =========================================================================

    async fn snapshot_create(
        &self,
        request: pb::SnapshotCreateRequest,
    ) -> Result<pb::SnapshotCreateResponse>;

    async fn snapshot_delete(
        &self,
        request: pb::SnapshotDeleteRequest,
    ) -> Result<pb::TaskResponse>;

    async fn snapshot_revert(
        &self,
        request: pb::SnapshotRevertRequest,
    ) -> Result<pb::TaskResponse>;

    // =========================================================================
    // Clone
    // =========================================================================

    /// Clone a VM. The provider may downgrade the requested type; the type
    /// actually used is reported in the response.
    async fn clone_vm(&self, request: pb::CloneRequest) -> Result<pb::CloneResponse>;

    // =========================================================================
    // Disk Staging
    // =========================================================================

    async fn export_disk(&self, request: pb::ExportDiskRequest)
        -> Result<pb::ExportDiskResponse>;

    async fn import_disk(&self, request: pb::ImportDiskRequest)
        -> Result<pb::ImportDiskResponse>;

    async fn get_disk_info(
        &self,
        request: pb::GetDiskInfoRequest,
    ) -> Result<pb::GetDiskInfoResponse>;
}
