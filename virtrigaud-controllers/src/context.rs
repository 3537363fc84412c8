//! Shared context handed to every reconciler.

use std::sync::Arc;
use std::time::Duration;

use virtrigaud_api::meta::ObjectRef;
use virtrigaud_api::v1beta1::{
    Provider, VMClass, VMClone, VMImage, VMMigration, VMNetworkAttachment, VMPlacementPolicy,
    VMSet, VMSnapshot, VirtualMachine,
};
use virtrigaud_api::workload::{Deployment, PersistentVolumeClaim, Secret, Service};
use virtrigaud_provider::api::ProviderApi;
use virtrigaud_provider::{GrpcProvider, MockProvider, ProviderClient, ProviderRegistry};
use virtrigaud_store::Store;

use crate::config::Intervals;
use crate::events::EventRecorder;
use crate::runtime::ReconcileError;

/// Builds a backend for a provider runtime endpoint.
///
/// Production wires lazy gRPC channels; tests substitute mocks.
pub type BackendFactory =
    Arc<dyn Fn(&Provider, &str) -> Arc<dyn ProviderApi> + Send + Sync>;

/// Everything a reconciler needs: typed stores, provider clients, events.
pub struct Context {
    pub vms: Arc<Store<VirtualMachine>>,
    pub vmsets: Arc<Store<VMSet>>,
    pub providers: Arc<Store<Provider>>,
    pub classes: Arc<Store<VMClass>>,
    pub images: Arc<Store<VMImage>>,
    pub networks: Arc<Store<VMNetworkAttachment>>,
    pub placements: Arc<Store<VMPlacementPolicy>>,
    pub snapshots: Arc<Store<VMSnapshot>>,
    pub clones: Arc<Store<VMClone>>,
    pub migrations: Arc<Store<VMMigration>>,

    pub deployments: Arc<Store<Deployment>>,
    pub services: Arc<Store<Service>>,
    pub pvcs: Arc<Store<PersistentVolumeClaim>>,
    pub secrets: Arc<Store<Secret>>,

    pub provider_clients: Arc<ProviderRegistry>,
    pub recorder: Arc<EventRecorder>,
    pub intervals: Intervals,

    backend_factory: BackendFactory,
}

impl Context {
    /// Context with gRPC backends (production shape).
    pub fn new(intervals: Intervals) -> Arc<Self> {
        Self::with_backend_factory(
            intervals,
            Arc::new(|_provider: &Provider, endpoint: &str| {
                // Channels dial lazily; connection failures surface on the
                // first call as Unavailable and trip the breaker.
                match GrpcProvider::connect_lazy(endpoint, Duration::from_secs(10)) {
                    Ok(backend) => Arc::new(backend) as Arc<dyn ProviderApi>,
                    Err(e) => {
                        tracing::warn!(endpoint, error = %e, "Invalid provider endpoint, falling back to mock backend");
                        Arc::new(MockProvider::new()) as Arc<dyn ProviderApi>
                    }
                }
            }),
        )
    }

    /// Context with mock backends for every provider (dev mode and tests).
    pub fn new_mock(intervals: Intervals) -> Arc<Self> {
        Self::with_backend_factory(
            intervals,
            Arc::new(|_provider: &Provider, _endpoint: &str| {
                Arc::new(MockProvider::new()) as Arc<dyn ProviderApi>
            }),
        )
    }

    /// Context with a caller-supplied backend factory.
    pub fn with_backend_factory(intervals: Intervals, backend_factory: BackendFactory) -> Arc<Self> {
        Arc::new(Self {
            vms: Arc::new(Store::new()),
            vmsets: Arc::new(Store::new()),
            providers: Arc::new(Store::new()),
            classes: Arc::new(Store::new()),
            images: Arc::new(Store::new()),
            networks: Arc::new(Store::new()),
            placements: Arc::new(Store::new()),
            snapshots: Arc::new(Store::new()),
            clones: Arc::new(Store::new()),
            migrations: Arc::new(Store::new()),
            deployments: Arc::new(Store::new()),
            services: Arc::new(Store::new()),
            pvcs: Arc::new(Store::new()),
            secrets: Arc::new(Store::new()),
            provider_clients: Arc::new(ProviderRegistry::new()),
            recorder: Arc::new(EventRecorder::new()),
            intervals,
            backend_factory,
        })
    }

    /// Build a backend for `provider` at `endpoint` using the factory.
    pub fn build_backend(&self, provider: &Provider, endpoint: &str) -> Arc<dyn ProviderApi> {
        (self.backend_factory)(provider, endpoint)
    }

    /// Resolve a provider reference to its object.
    pub async fn provider(
        &self,
        namespace: &str,
        provider_ref: &ObjectRef,
    ) -> Result<Provider, ReconcileError> {
        let ns = provider_ref.namespace_or(namespace);
        self.providers
            .try_get(ns, &provider_ref.name)
            .await
            .ok_or_else(|| {
                ReconcileError::DependencyNotReady(format!(
                    "provider {}/{} not found",
                    ns, provider_ref.name
                ))
            })
    }

    /// Resolve a provider reference to a connected client.
    pub async fn provider_client(
        &self,
        namespace: &str,
        provider_ref: &ObjectRef,
    ) -> Result<Arc<ProviderClient>, ReconcileError> {
        let ns = provider_ref.namespace_or(namespace);
        self.provider_clients
            .lookup(ns, &provider_ref.name)
            .await
            .map_err(|_| {
                ReconcileError::DependencyNotReady(format!(
                    "provider {}/{} has no registered runtime",
                    ns, provider_ref.name
                ))
            })
    }
}
