//! The composed provider client used by every reconciler.
//!
//! Each call passes through the per-provider circuit breaker, then the
//! retry layer, under a single deadline. Retries never extend that
//! deadline; whatever budget is left after a failed attempt bounds the
//! next one.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, warn};

use virtrigaud_proto::provider as pb;

use crate::api::ProviderApi;
use crate::breaker::{BreakerRegistry, CircuitBreaker};
use crate::error::{ErrorKind, ProviderError, Result};
use crate::retry::RetryPolicy;

/// Default per-call deadline.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Terminal outcome of an awaited task.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub progress_percent: i32,
    pub transferred_bytes: u64,
}

/// A provider backend wrapped in the call policy.
#[derive(Clone)]
pub struct ProviderClient {
    name: String,
    backend: Arc<dyn ProviderApi>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
    call_timeout: Duration,
}

impl std::fmt::Debug for ProviderClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderClient")
            .field("name", &self.name)
            .field("retry", &self.retry)
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

impl ProviderClient {
    /// Wrap `backend`, sharing the process-global breaker for
    /// (name, provider_type).
    pub fn new(
        name: impl Into<String>,
        provider_type: &str,
        backend: Arc<dyn ProviderApi>,
    ) -> Self {
        Self::with_registry(name, provider_type, backend, BreakerRegistry::global())
    }

    /// Wrap `backend` with a caller-supplied breaker registry (tests).
    pub fn with_registry(
        name: impl Into<String>,
        provider_type: &str,
        backend: Arc<dyn ProviderApi>,
        registry: &BreakerRegistry,
    ) -> Self {
        let name = name.into();
        let breaker = registry.breaker(&name, provider_type);
        Self {
            name,
            backend,
            breaker,
            retry: RetryPolicy::default(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Run one RPC through the breaker + retry + deadline policy.
    async fn call<T, F, Fut>(&self, method: &'static str, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let deadline = Instant::now() + self.call_timeout;
        let attempts = self.retry.max_attempts.max(1);

        for attempt in 0..attempts {
            if !self.breaker.allow() {
                return Err(ProviderError::Unavailable(format!(
                    "circuit breaker open for provider {}",
                    self.name
                )));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ProviderError::Timeout(format!(
                    "{method} deadline exhausted after {attempt} attempts"
                )));
            }

            let error = match timeout(remaining, operation()).await {
                Ok(Ok(value)) => {
                    self.breaker.record_success();
                    return Ok(value);
                }
                Ok(Err(error)) => error,
                Err(_) => ProviderError::Timeout(format!("{method} exceeded its deadline")),
            };

            // Only infrastructure failures count toward the breaker; a
            // domain error proves the provider answered.
            match error.kind() {
                ErrorKind::Unavailable | ErrorKind::Timeout => self.breaker.record_failure(),
                _ => self.breaker.record_success(),
            }

            let last_attempt = attempt + 1 >= attempts;
            if !error.is_retryable() || last_attempt {
                return Err(error);
            }

            let delay = self
                .retry
                .delay(attempt, error.kind() == ErrorKind::RateLimit);
            if Instant::now() + delay >= deadline {
                // No room left for another attempt inside the deadline.
                return Err(error);
            }
            debug!(
                provider = %self.name,
                method,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying provider call"
            );
            sleep(delay).await;
        }

        unreachable!("retry loop returns before exhausting attempts")
    }

    // =========================================================================
    // Typed surface
    // =========================================================================

    pub async fn validate(&self) -> Result<pb::ValidateResponse> {
        self.call("Validate", || self.backend.validate()).await
    }

    pub async fn get_capabilities(&self) -> Result<pb::GetCapabilitiesResponse> {
        self.call("GetCapabilities", || self.backend.get_capabilities())
            .await
    }

    pub async fn create(&self, request: pb::CreateRequest) -> Result<pb::CreateResponse> {
        self.call("Create", || self.backend.create(request.clone()))
            .await
    }

    pub async fn delete(&self, id: &str) -> Result<pb::TaskResponse> {
        let request = pb::DeleteRequest { id: id.to_string() };
        self.call("Delete", || self.backend.delete(request.clone()))
            .await
    }

    pub async fn power(&self, id: &str, op: pb::PowerOp) -> Result<pb::TaskResponse> {
        let request = pb::PowerRequest {
            id: id.to_string(),
            op: op as i32,
        };
        self.call("Power", || self.backend.power(request.clone()))
            .await
    }

    pub async fn reconfigure(&self, request: pb::ReconfigureRequest) -> Result<pb::TaskResponse> {
        self.call("Reconfigure", || self.backend.reconfigure(request.clone()))
            .await
    }

    pub async fn describe(&self, id: &str) -> Result<pb::DescribeResponse> {
        let request = pb::DescribeRequest { id: id.to_string() };
        self.call("Describe", || self.backend.describe(request.clone()))
            .await
    }

    pub async fn task_status(&self, task_id: &str) -> Result<pb::TaskStatusResponse> {
        let request = pb::TaskStatusRequest {
            task_id: task_id.to_string(),
        };
        self.call("TaskStatus", || self.backend.task_status(request.clone()))
            .await
    }

    pub async fn snapshot_create(
        &self,
        request: pb::SnapshotCreateRequest,
    ) -> Result<pb::SnapshotCreateResponse> {
        self.call("SnapshotCreate", || {
            self.backend.snapshot_create(request.clone())
        })
        .await
    }

    pub async fn snapshot_delete(&self, vm_id: &str, snapshot_id: &str) -> Result<pb::TaskResponse> {
        let request = pb::SnapshotDeleteRequest {
            vm_id: vm_id.to_string(),
            snapshot_id: snapshot_id.to_string(),
        };
        self.call("SnapshotDelete", || {
            self.backend.snapshot_delete(request.clone())
        })
        .await
    }

    pub async fn snapshot_revert(&self, vm_id: &str, snapshot_id: &str) -> Result<pb::TaskResponse> {
        let request = pb::SnapshotRevertRequest {
            vm_id: vm_id.to_string(),
            snapshot_id: snapshot_id.to_string(),
        };
        self.call("SnapshotRevert", || {
            self.backend.snapshot_revert(request.clone())
        })
        .await
    }

    pub async fn clone_vm(&self, request: pb::CloneRequest) -> Result<pb::CloneResponse> {
        self.call("Clone", || self.backend.clone_vm(request.clone()))
            .await
    }

    pub async fn export_disk(
        &self,
        request: pb::ExportDiskRequest,
    ) -> Result<pb::ExportDiskResponse> {
        self.call("ExportDisk", || self.backend.export_disk(request.clone()))
            .await
    }

    pub async fn import_disk(
        &self,
        request: pb::ImportDiskRequest,
    ) -> Result<pb::ImportDiskResponse> {
        self.call("ImportDisk", || self.backend.import_disk(request.clone()))
            .await
    }

    pub async fn get_disk_info(&self, disk_id: &str) -> Result<pb::GetDiskInfoResponse> {
        let request = pb::GetDiskInfoRequest {
            disk_id: disk_id.to_string(),
            vm_id: String::new(),
        };
        self.call("GetDiskInfo", || self.backend.get_disk_info(request.clone()))
            .await
    }

    // =========================================================================
    // Task helpers
    // =========================================================================

    /// Poll a task until it is terminal or `budget` runs out.
    ///
    /// A done-with-error task surfaces as the parsed taxonomy error; a
    /// budget overrun surfaces as Timeout with the task still running
    /// provider-side.
    pub async fn await_task(
        &self,
        task_id: &str,
        poll_interval: Duration,
        budget: Duration,
    ) -> Result<TaskOutcome> {
        let deadline = Instant::now() + budget;
        loop {
            let status = self.task_status(task_id).await?;
            if status.done {
                if status.error.is_empty() {
                    return Ok(TaskOutcome {
                        progress_percent: status.progress_percent,
                        transferred_bytes: status.transferred_bytes,
                    });
                }
                warn!(provider = %self.name, task_id, error = %status.error, "Task failed");
                return Err(ProviderError::from_task_error(&status.error));
            }
            if Instant::now() + poll_interval >= deadline {
                return Err(ProviderError::Timeout(format!(
                    "task {task_id} still running after {}s",
                    budget.as_secs()
                )));
            }
            sleep(poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::{BreakerConfig, BreakerRegistry};
    use crate::mock::MockProvider;
    use virtrigaud_common::backoff::Backoff;

    fn fast_retry(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts: attempts,
            backoff: Backoff {
                base: Duration::from_millis(1),
                max: Duration::from_millis(5),
                multiplier: 2.0,
                jitter: false,
            },
        }
    }

    fn registry() -> BreakerRegistry {
        BreakerRegistry::new(BreakerConfig {
            failure_threshold: 2,
            reset_timeout: Duration::from_millis(50),
            half_open_probes: 1,
        })
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failure() {
        let mock = Arc::new(MockProvider::new());
        mock.inject_fault(
            "validate",
            ProviderError::Unavailable("first call drops".to_string()),
        );
        let registry = registry();
        let client = ProviderClient::with_registry("pve-1", "proxmox", mock.clone(), &registry)
            .with_retry(fast_retry(3));

        let response = client.validate().await.unwrap();
        assert!(response.ok);
        assert_eq!(mock.call_count("validate"), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_surfaces_immediately() {
        let mock = Arc::new(MockProvider::new());
        mock.inject_fault(
            "validate",
            ProviderError::InvalidSpec("bad credentials shape".to_string()),
        );
        let registry = registry();
        let client = ProviderClient::with_registry("pve-1", "proxmox", mock.clone(), &registry)
            .with_retry(fast_retry(3));

        let err = client.validate().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSpec);
        assert_eq!(mock.call_count("validate"), 1);
    }

    #[tokio::test]
    async fn test_breaker_open_rejects_without_calling_backend() {
        let mock = Arc::new(MockProvider::new());
        for _ in 0..2 {
            mock.inject_fault(
                "validate",
                ProviderError::Unavailable("down".to_string()),
            );
        }
        let registry = registry();
        let client = ProviderClient::with_registry("esx-1", "vsphere", mock.clone(), &registry)
            .with_retry(RetryPolicy::none());

        assert!(client.validate().await.is_err());
        assert!(client.validate().await.is_err());
        // Breaker is now open: the backend must not be reached.
        assert!(client.validate().await.is_err());
        assert_eq!(mock.call_count("validate"), 2);
    }

    #[tokio::test]
    async fn test_await_task_completes() {
        let mock = Arc::new(MockProvider::new());
        let registry = registry();
        let client = ProviderClient::with_registry("pve-1", "proxmox", mock.clone(), &registry);

        let created = client
            .create(pb::CreateRequest {
                name: "web-01".to_string(),
                class_json: r#"{"cpu":2,"memory_bytes":2147483648}"#.to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let outcome = client
            .await_task(
                &created.task_id,
                Duration::from_millis(1),
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        assert_eq!(outcome.progress_percent, 100);
    }

    #[tokio::test]
    async fn test_await_task_surfaces_task_error() {
        let mock = Arc::new(MockProvider::new());
        let registry = registry();
        let client = ProviderClient::with_registry("pve-1", "proxmox", mock.clone(), &registry);

        let created = client
            .create(pb::CreateRequest {
                name: "db-01".to_string(),
                class_json: r#"{"cpu":2,"memory_bytes":2147483648}"#.to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        client
            .await_task(
                &created.task_id,
                Duration::from_millis(1),
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        mock.fail_next_task("NotSupported: reconfigure offline only");
        let task = client
            .reconfigure(pb::ReconfigureRequest {
                id: created.id,
                class_json: r#"{"cpu":8,"memory_bytes":8589934592}"#.to_string(),
                disk_json: Vec::new(),
            })
            .await
            .unwrap();
        let err = client
            .await_task(
                &task.task_id,
                Duration::from_millis(1),
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotSupported);
    }
}
