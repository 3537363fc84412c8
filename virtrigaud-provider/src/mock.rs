//! Mock provider backend for testing and development.
//!
//! Simulates a hypervisor in memory without any real endpoint. Async
//! operations become multi-tick tasks: each `task_status` poll advances the
//! task until it completes, so reconcilers exercise their real polling
//! paths. Faults can be injected per method and per task.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use virtrigaud_proto::provider as pb;

use crate::api::{ClassDocument, ProviderApi};
use crate::error::{ProviderError, Result};

/// Default polls before a mock task reports done.
const DEFAULT_TASK_TICKS: u32 = 2;

struct MockVm {
    id: String,
    name: String,
    power: String,
    cpu: u32,
    memory_bytes: u64,
    ips: Vec<String>,
}

struct MockTask {
    remaining: u32,
    total: u32,
    /// Fail once remaining polls drop to this count
    fail_at: Option<(u32, String)>,
    total_bytes: u64,
}

struct MockSnapshot {
    id: String,
    name: String,
}

/// A staged disk artifact written by `export_disk`.
struct StagedArtifact {
    checksum: String,
    size_bytes: u64,
    format: String,
}

/// In-memory provider used by unit and integration tests.
pub struct MockProvider {
    capabilities: RwLock<pb::GetCapabilitiesResponse>,
    vms: RwLock<HashMap<String, MockVm>>,
    /// Create idempotency: name -> id
    names: RwLock<HashMap<String, String>>,
    tasks: RwLock<HashMap<String, MockTask>>,
    snapshots: RwLock<HashMap<String, Vec<MockSnapshot>>>,
    disks: RwLock<HashMap<String, pb::GetDiskInfoResponse>>,
    staged: RwLock<HashMap<String, StagedArtifact>>,
    /// Injected per-method faults, popped in order
    faults: Mutex<HashMap<String, VecDeque<ProviderError>>>,
    /// Pending failure applied to the next created task
    next_task_failure: Mutex<Option<String>>,
    calls: Mutex<HashMap<String, u32>>,
    task_ticks: u32,
}

impl MockProvider {
    /// A full-featured mock provider.
    pub fn new() -> Self {
        Self {
            capabilities: RwLock::new(pb::GetCapabilitiesResponse {
                supports_snapshots: true,
                supports_memory_snapshots: true,
                supports_linked_clones: true,
                supports_instant_clones: true,
                supports_disk_export: true,
                supports_disk_import: true,
                reconfigure_online: true,
                supported_disk_formats: vec!["qcow2".to_string(), "raw".to_string()],
            }),
            vms: RwLock::new(HashMap::new()),
            names: RwLock::new(HashMap::new()),
            tasks: RwLock::new(HashMap::new()),
            snapshots: RwLock::new(HashMap::new()),
            disks: RwLock::new(HashMap::new()),
            staged: RwLock::new(HashMap::new()),
            faults: Mutex::new(HashMap::new()),
            next_task_failure: Mutex::new(None),
            calls: Mutex::new(HashMap::new()),
            task_ticks: DEFAULT_TASK_TICKS,
        }
    }

    /// Override the advertised capabilities.
    pub fn set_capabilities(&self, caps: pb::GetCapabilitiesResponse) {
        *self.capabilities.write().expect("lock poisoned") = caps;
    }

    /// Number of polls before tasks complete.
    pub fn set_task_ticks(&mut self, ticks: u32) {
        self.task_ticks = ticks.max(1);
    }

    /// Queue `error` for the next call to `method`.
    pub fn inject_fault(&self, method: &str, error: ProviderError) {
        self.faults
            .lock()
            .expect("lock poisoned")
            .entry(method.to_string())
            .or_default()
            .push_back(error);
    }

    /// Make the next created task fail mid-flight with `error`.
    ///
    /// The error string follows the task-error wire form ("Kind: message").
    pub fn fail_next_task(&self, error: impl Into<String>) {
        *self.next_task_failure.lock().expect("lock poisoned") = Some(error.into());
    }

    /// How many times `method` was invoked.
    pub fn call_count(&self, method: &str) -> u32 {
        self.calls
            .lock()
            .expect("lock poisoned")
            .get(method)
            .copied()
            .unwrap_or(0)
    }

    /// Direct power-state override, for simulating out-of-band changes.
    pub fn force_power_state(&self, vm_id: &str, state: &str) {
        if let Some(vm) = self.vms.write().expect("lock poisoned").get_mut(vm_id) {
            vm.power = state.to_string();
        }
    }

    fn record_call(&self, method: &str) {
        *self
            .calls
            .lock()
            .expect("lock poisoned")
            .entry(method.to_string())
            .or_insert(0) += 1;
    }

    fn take_fault(&self, method: &str) -> Option<ProviderError> {
        self.faults
            .lock()
            .expect("lock poisoned")
            .get_mut(method)
            .and_then(|queue| queue.pop_front())
    }

    fn check(&self, method: &str) -> Result<()> {
        self.record_call(method);
        match self.take_fault(method) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Create a task and return its id. Empty ticks complete synchronously.
    fn new_task(&self, total_bytes: u64) -> String {
        let task_id = format!("task-{}", uuid::Uuid::new_v4());
        let fail = self.next_task_failure.lock().expect("lock poisoned").take();
        // Mid-flight failure lands at roughly 40% progress.
        let fail_at = fail.map(|error| {
            let at = self.task_ticks - (self.task_ticks * 2 / 5).max(1);
            (at, error)
        });
        self.tasks.write().expect("lock poisoned").insert(
            task_id.clone(),
            MockTask {
                remaining: self.task_ticks,
                total: self.task_ticks,
                fail_at,
                total_bytes,
            },
        );
        task_id
    }

    fn deterministic_ip(id: &str) -> String {
        let octet = id.bytes().map(u32::from).sum::<u32>() % 200 + 10;
        format!("10.0.0.{octet}")
    }

    fn deterministic_checksum(seed: &str) -> String {
        // Stable fake digest; long enough to look like sha256 hex.
        let mut value: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in seed.bytes() {
            value ^= u64::from(byte);
            value = value.wrapping_mul(0x100_0000_01b3);
        }
        format!("{value:016x}{value:016x}{value:016x}{value:016x}")
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderApi for MockProvider {
    async fn validate(&self) -> Result<pb::ValidateResponse> {
        self.check("validate")?;
        Ok(pb::ValidateResponse {
            ok: true,
            message: "mock provider healthy".to_string(),
        })
    }

    async fn get_capabilities(&self) -> Result<pb::GetCapabilitiesResponse> {
        self.check("get_capabilities")?;
        Ok(self.capabilities.read().expect("lock poisoned").clone())
    }

    #[instrument(skip(self, request), fields(vm_name = %request.name))]
    async fn create(&self, request: pb::CreateRequest) -> Result<pb::CreateResponse> {
        self.check("create")?;

        // Idempotent by name.
        if let Some(existing) = self.names.read().expect("lock poisoned").get(&request.name) {
            debug!(vm_id = %existing, "Create replayed for existing name");
            return Ok(pb::CreateResponse {
                id: existing.clone(),
                task_id: String::new(),
            });
        }

        let class: ClassDocument =
            serde_json::from_str(&request.class_json).unwrap_or_default();
        let id = format!("mock-{}", uuid::Uuid::new_v4());

        self.vms.write().expect("lock poisoned").insert(
            id.clone(),
            MockVm {
                id: id.clone(),
                name: request.name.clone(),
                power: "Off".to_string(),
                cpu: class.cpu.max(1),
                memory_bytes: class.memory_bytes.max(128 << 20),
                ips: Vec::new(),
            },
        );
        self.names
            .write()
            .expect("lock poisoned")
            .insert(request.name.clone(), id.clone());

        let task_id = self.new_task(0);
        info!(vm_id = %id, "Mock VM created");
        Ok(pb::CreateResponse { id, task_id })
    }

    #[instrument(skip(self, request), fields(vm_id = %request.id))]
    async fn delete(&self, request: pb::DeleteRequest) -> Result<pb::TaskResponse> {
        self.check("delete")?;

        let removed = self.vms.write().expect("lock poisoned").remove(&request.id);
        if let Some(vm) = removed {
            self.names.write().expect("lock poisoned").remove(&vm.name);
            self.snapshots.write().expect("lock poisoned").remove(&vm.id);
            info!("Mock VM deleted");
            Ok(pb::TaskResponse {
                task_id: self.new_task(0),
            })
        } else {
            // Idempotent: already absent is success, no task needed.
            debug!("Delete for absent VM treated as success");
            Ok(pb::TaskResponse {
                task_id: String::new(),
            })
        }
    }

    #[instrument(skip(self, request), fields(vm_id = %request.id, op = request.op))]
    async fn power(&self, request: pb::PowerRequest) -> Result<pb::TaskResponse> {
        self.check("power")?;

        let mut vms = self.vms.write().expect("lock poisoned");
        let vm = vms
            .get_mut(&request.id)
            .ok_or_else(|| ProviderError::NotFound(format!("vm {}", request.id)))?;

        match pb::PowerOp::try_from(request.op).unwrap_or(pb::PowerOp::Unspecified) {
            pb::PowerOp::On | pb::PowerOp::Reboot => {
                vm.power = "On".to_string();
                if vm.ips.is_empty() {
                    vm.ips = vec![Self::deterministic_ip(&vm.id)];
                }
            }
            pb::PowerOp::Off | pb::PowerOp::OffGraceful => {
                vm.power = "Off".to_string();
                vm.ips.clear();
            }
            pb::PowerOp::Unspecified => {
                return Err(ProviderError::InvalidSpec("power op unspecified".to_string()))
            }
        }
        drop(vms);

        Ok(pb::TaskResponse {
            task_id: self.new_task(0),
        })
    }

    async fn reconfigure(&self, request: pb::ReconfigureRequest) -> Result<pb::TaskResponse> {
        self.check("reconfigure")?;

        let class: ClassDocument =
            serde_json::from_str(&request.class_json).unwrap_or_default();
        let mut vms = self.vms.write().expect("lock poisoned");
        let vm = vms
            .get_mut(&request.id)
            .ok_or_else(|| ProviderError::NotFound(format!("vm {}", request.id)))?;
        if class.cpu > 0 {
            vm.cpu = class.cpu;
        }
        if class.memory_bytes > 0 {
            vm.memory_bytes = class.memory_bytes;
        }
        drop(vms);

        Ok(pb::TaskResponse {
            task_id: self.new_task(0),
        })
    }

    async fn describe(&self, request: pb::DescribeRequest) -> Result<pb::DescribeResponse> {
        self.check("describe")?;

        let vms = self.vms.read().expect("lock poisoned");
        match vms.get(&request.id) {
            Some(vm) => Ok(pb::DescribeResponse {
                exists: true,
                power_state: vm.power.clone(),
                ips: vm.ips.clone(),
                console_url: format!("vnc://127.0.0.1/{}", vm.id),
                cpu: vm.cpu,
                memory_bytes: vm.memory_bytes,
                raw_json: String::new(),
            }),
            None => Ok(pb::DescribeResponse {
                exists: false,
                power_state: "Unknown".to_string(),
                ips: Vec::new(),
                console_url: String::new(),
                cpu: 0,
                memory_bytes: 0,
                raw_json: String::new(),
            }),
        }
    }

    async fn task_status(
        &self,
        request: pb::TaskStatusRequest,
    ) -> Result<pb::TaskStatusResponse> {
        self.check("task_status")?;

        let mut tasks = self.tasks.write().expect("lock poisoned");
        let task = tasks
            .get_mut(&request.task_id)
            .ok_or_else(|| ProviderError::NotFound(format!("task {}", request.task_id)))?;

        if task.remaining > 0 {
            task.remaining -= 1;
        }

        if let Some((fail_at, error)) = &task.fail_at {
            if task.remaining <= *fail_at {
                let error = error.clone();
                let done = pb::TaskStatusResponse {
                    done: true,
                    error,
                    progress_percent: 40,
                    transferred_bytes: task.total_bytes * 2 / 5,
                };
                tasks.remove(&request.task_id);
                return Ok(done);
            }
        }

        let completed = task.remaining == 0;
        let progress = ((task.total - task.remaining) * 100 / task.total.max(1)) as i32;
        let transferred = task.total_bytes * u64::from(task.total - task.remaining)
            / u64::from(task.total.max(1));
        let response = pb::TaskStatusResponse {
            done: completed,
            error: String::new(),
            progress_percent: progress,
            transferred_bytes: transferred,
        };
        if completed {
            tasks.remove(&request.task_id);
        }
        Ok(response)
    }

    async fn snapshot_create(
        &self,
        request: pb::SnapshotCreateRequest,
    ) -> Result<pb::SnapshotCreateResponse> {
        self.check("snapshot_create")?;

        if !self.vms.read().expect("lock poisoned").contains_key(&request.vm_id) {
            return Err(ProviderError::NotFound(format!("vm {}", request.vm_id)));
        }

        let snapshot_id = format!("snap-{}", uuid::Uuid::new_v4());
        self.snapshots
            .write()
            .expect("lock poisoned")
            .entry(request.vm_id.clone())
            .or_default()
            .push(MockSnapshot {
                id: snapshot_id.clone(),
                name: request.name.clone(),
            });

        info!(vm_id = %request.vm_id, snapshot_id = %snapshot_id, "Mock snapshot created");
        Ok(pb::SnapshotCreateResponse {
            snapshot_id,
            task_id: self.new_task(0),
        })
    }

    async fn snapshot_delete(
        &self,
        request: pb::SnapshotDeleteRequest,
    ) -> Result<pb::TaskResponse> {
        self.check("snapshot_delete")?;

        let mut snapshots = self.snapshots.write().expect("lock poisoned");
        if let Some(list) = snapshots.get_mut(&request.vm_id) {
            list.retain(|s| s.id != request.snapshot_id);
        }
        Ok(pb::TaskResponse {
            task_id: String::new(),
        })
    }

    async fn snapshot_revert(
        &self,
        request: pb::SnapshotRevertRequest,
    ) -> Result<pb::TaskResponse> {
        self.check("snapshot_revert")?;

        let snapshots = self.snapshots.read().expect("lock poisoned");
        let known = snapshots
            .get(&request.vm_id)
            .map(|list| list.iter().any(|s| s.id == request.snapshot_id))
            .unwrap_or(false);
        if !known {
            return Err(ProviderError::NotFound(format!(
                "snapshot {}",
                request.snapshot_id
            )));
        }
        Ok(pb::TaskResponse {
            task_id: self.new_task(0),
        })
    }

    async fn clone_vm(&self, request: pb::CloneRequest) -> Result<pb::CloneResponse> {
        self.check("clone_vm")?;

        let caps = self.capabilities.read().expect("lock poisoned").clone();
        let supported = match request.clone_type.as_str() {
            "Instant" => caps.supports_instant_clones,
            "Linked" => caps.supports_linked_clones,
            _ => true,
        };
        if !supported {
            return Err(ProviderError::NotSupported(format!(
                "{} clone",
                request.clone_type
            )));
        }

        let source_exists = self
            .vms
            .read()
            .expect("lock poisoned")
            .contains_key(&request.source_vm_id);
        if !source_exists {
            return Err(ProviderError::NotFound(format!(
                "vm {}",
                request.source_vm_id
            )));
        }

        let (cpu, memory_bytes) = {
            let vms = self.vms.read().expect("lock poisoned");
            let source = &vms[&request.source_vm_id];
            (source.cpu, source.memory_bytes)
        };
        let id = format!("mock-{}", uuid::Uuid::new_v4());
        self.vms.write().expect("lock poisoned").insert(
            id.clone(),
            MockVm {
                id: id.clone(),
                name: request.target_name.clone(),
                power: "Off".to_string(),
                cpu,
                memory_bytes,
                ips: Vec::new(),
            },
        );
        self.names
            .write()
            .expect("lock poisoned")
            .insert(request.target_name.clone(), id.clone());

        Ok(pb::CloneResponse {
            target_id: id,
            task_id: self.new_task(0),
            clone_type: request.clone_type,
        })
    }

    async fn export_disk(
        &self,
        request: pb::ExportDiskRequest,
    ) -> Result<pb::ExportDiskResponse> {
        self.check("export_disk")?;

        let size_bytes = {
            let vms = self.vms.read().expect("lock poisoned");
            let vm = vms
                .get(&request.vm_id)
                .ok_or_else(|| ProviderError::NotFound(format!("vm {}", request.vm_id)))?;
            // Disk size tracks memory in the mock; large enough to be visible.
            vm.memory_bytes.max(1 << 30)
        };

        let disk_id = format!("{}-disk0", request.vm_id);
        let checksum = Self::deterministic_checksum(&disk_id);
        self.staged.write().expect("lock poisoned").insert(
            request.destination_url.clone(),
            StagedArtifact {
                checksum: checksum.clone(),
                size_bytes,
                format: request.format.clone(),
            },
        );
        self.disks.write().expect("lock poisoned").insert(
            disk_id.clone(),
            pb::GetDiskInfoResponse {
                disk_id: disk_id.clone(),
                format: request.format,
                size_bytes,
                checksum,
            },
        );

        Ok(pb::ExportDiskResponse {
            task_id: self.new_task(size_bytes),
            disk_id,
            estimated_size_bytes: size_bytes,
        })
    }

    async fn import_disk(
        &self,
        request: pb::ImportDiskRequest,
    ) -> Result<pb::ImportDiskResponse> {
        self.check("import_disk")?;

        // Staged file:// artifacts must exist; remote URLs are "downloaded"
        // on the fly so image imports work without a prior export.
        if !self.staged.read().expect("lock poisoned").contains_key(&request.source_url)
            && !request.source_url.starts_with("file://")
        {
            self.staged.write().expect("lock poisoned").insert(
                request.source_url.clone(),
                StagedArtifact {
                    checksum: Self::deterministic_checksum(&request.source_url),
                    size_bytes: 2 << 30,
                    format: request.format.clone(),
                },
            );
        }

        let staged = self.staged.read().expect("lock poisoned");
        let artifact = staged
            .get(&request.source_url)
            .ok_or_else(|| ProviderError::NotFound(format!("artifact {}", request.source_url)))?;
        if request.verify_checksum
            && !request.expected_checksum.is_empty()
            && request.expected_checksum != artifact.checksum
        {
            return Err(ProviderError::InvalidSpec(format!(
                "checksum mismatch for {}",
                request.source_url
            )));
        }
        let (checksum, size_bytes) = (artifact.checksum.clone(), artifact.size_bytes);
        let format = if request.format.is_empty() {
            artifact.format.clone()
        } else {
            request.format.clone()
        };
        drop(staged);

        let disk_id = format!("imported-{}", uuid::Uuid::new_v4());
        self.disks.write().expect("lock poisoned").insert(
            disk_id.clone(),
            pb::GetDiskInfoResponse {
                disk_id: disk_id.clone(),
                format,
                size_bytes,
                checksum,
            },
        );

        Ok(pb::ImportDiskResponse {
            disk_id,
            task_id: self.new_task(size_bytes),
        })
    }

    async fn get_disk_info(
        &self,
        request: pb::GetDiskInfoRequest,
    ) -> Result<pb::GetDiskInfoResponse> {
        self.check("get_disk_info")?;

        self.disks
            .read()
            .expect("lock poisoned")
            .get(&request.disk_id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(format!("disk {}", request.disk_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_request(name: &str) -> pb::CreateRequest {
        pb::CreateRequest {
            name: name.to_string(),
            class_json: r#"{"cpu":2,"memory_bytes":2147483648,"firmware":"BIOS"}"#.to_string(),
            ..Default::default()
        }
    }

    async fn drain_task(provider: &MockProvider, task_id: &str) {
        if task_id.is_empty() {
            return;
        }
        loop {
            let status = provider
                .task_status(pb::TaskStatusRequest {
                    task_id: task_id.to_string(),
                })
                .await
                .unwrap();
            if status.done {
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_create_is_idempotent_by_name() {
        let provider = MockProvider::new();
        let first = provider.create(create_request("web-01")).await.unwrap();
        let second = provider.create(create_request("web-01")).await.unwrap();
        assert_eq!(first.id, second.id);
        assert!(second.task_id.is_empty());
    }

    #[tokio::test]
    async fn test_delete_absent_vm_succeeds() {
        let provider = MockProvider::new();
        let response = provider
            .delete(pb::DeleteRequest {
                id: "mock-nope".to_string(),
            })
            .await
            .unwrap();
        assert!(response.task_id.is_empty());
    }

    #[tokio::test]
    async fn test_power_cycle_assigns_ips() {
        let provider = MockProvider::new();
        let created = provider.create(create_request("web-01")).await.unwrap();
        drain_task(&provider, &created.task_id).await;

        let task = provider
            .power(pb::PowerRequest {
                id: created.id.clone(),
                op: pb::PowerOp::On as i32,
            })
            .await
            .unwrap();
        drain_task(&provider, &task.task_id).await;

        let described = provider
            .describe(pb::DescribeRequest {
                id: created.id.clone(),
            })
            .await
            .unwrap();
        assert_eq!(described.power_state, "On");
        assert!(!described.ips.is_empty());
    }

    #[tokio::test]
    async fn test_task_progress_is_monotonic() {
        let provider = MockProvider::new();
        let created = provider.create(create_request("db-01")).await.unwrap();
        drain_task(&provider, &created.task_id).await;

        let export = provider
            .export_disk(pb::ExportDiskRequest {
                vm_id: created.id.clone(),
                destination_url: "file:///mnt/migration-storage/db-01.qcow2".to_string(),
                format: "qcow2".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let mut last = 0;
        loop {
            let status = provider
                .task_status(pb::TaskStatusRequest {
                    task_id: export.task_id.clone(),
                })
                .await
                .unwrap();
            assert!(status.transferred_bytes >= last);
            last = status.transferred_bytes;
            if status.done {
                assert_eq!(status.transferred_bytes, export.estimated_size_bytes);
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_import_verifies_checksum() {
        let provider = MockProvider::new();
        let created = provider.create(create_request("db-01")).await.unwrap();
        drain_task(&provider, &created.task_id).await;

        let url = "file:///mnt/migration-storage/db-01.qcow2";
        let export = provider
            .export_disk(pb::ExportDiskRequest {
                vm_id: created.id.clone(),
                destination_url: url.to_string(),
                format: "qcow2".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        drain_task(&provider, &export.task_id).await;
        let info = provider
            .get_disk_info(pb::GetDiskInfoRequest {
                disk_id: export.disk_id.clone(),
                ..Default::default()
            })
            .await
            .unwrap();

        // Wrong checksum rejected.
        let err = provider
            .import_disk(pb::ImportDiskRequest {
                source_url: url.to_string(),
                verify_checksum: true,
                expected_checksum: "deadbeef".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidSpec);

        // Correct checksum accepted.
        let imported = provider
            .import_disk(pb::ImportDiskRequest {
                source_url: url.to_string(),
                verify_checksum: true,
                expected_checksum: info.checksum.clone(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(!imported.disk_id.is_empty());
    }

    #[tokio::test]
    async fn test_clone_respects_capabilities() {
        let provider = MockProvider::new();
        let created = provider.create(create_request("web-01")).await.unwrap();
        drain_task(&provider, &created.task_id).await;

        let mut caps = provider.get_capabilities().await.unwrap();
        caps.supports_instant_clones = false;
        caps.supports_linked_clones = false;
        provider.set_capabilities(caps);

        let err = provider
            .clone_vm(pb::CloneRequest {
                source_vm_id: created.id.clone(),
                target_name: "web-01-clone".to_string(),
                clone_type: "Instant".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotSupported);

        let cloned = provider
            .clone_vm(pb::CloneRequest {
                source_vm_id: created.id.clone(),
                target_name: "web-01-clone".to_string(),
                clone_type: "Full".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(cloned.clone_type, "Full");
    }

    #[tokio::test]
    async fn test_injected_fault_fires_once() {
        let provider = MockProvider::new();
        provider.inject_fault(
            "validate",
            ProviderError::Unavailable("endpoint down".to_string()),
        );
        assert!(provider.validate().await.is_err());
        assert!(provider.validate().await.is_ok());
        assert_eq!(provider.call_count("validate"), 2);
    }

    #[tokio::test]
    async fn test_mid_flight_task_failure() {
        let provider = MockProvider::new();
        let created = provider.create(create_request("db-01")).await.unwrap();
        drain_task(&provider, &created.task_id).await;

        provider.fail_next_task("Retryable: export interrupted");
        let export = provider
            .export_disk(pb::ExportDiskRequest {
                vm_id: created.id,
                destination_url: "file:///mnt/migration-storage/db-01.qcow2".to_string(),
                format: "qcow2".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let mut saw_error = false;
        loop {
            let status = provider
                .task_status(pb::TaskStatusRequest {
                    task_id: export.task_id.clone(),
                })
                .await
                .unwrap();
            if status.done {
                saw_error = !status.error.is_empty();
                break;
            }
        }
        assert!(saw_error);
    }
}
