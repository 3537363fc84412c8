//! Shared harness for the integration suites: a full manager over the
//! in-memory store with per-provider mock backends.

// Each integration binary compiles its own copy; not every helper is used
// by every suite.
#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::{sleep, Instant};

use virtrigaud_api::meta::{LocalObjectReference, ObjectMeta, ObjectRef};
use virtrigaud_api::v1beta1::{
    ImageAvailability, ImagePhase, ImageSource, PowerState, Provider, ProviderSpec, ProviderType,
    VMClass, VMClassSpec, VMImage, VMImageSpec, VirtualMachine, VirtualMachineSpec,
};
use virtrigaud_controllers::config::{Config, Intervals};
use virtrigaud_controllers::context::{BackendFactory, Context};
use virtrigaud_controllers::Manager;
use virtrigaud_provider::api::ProviderApi;
use virtrigaud_provider::MockProvider;

pub struct Harness {
    pub ctx: Arc<Context>,
    pub mocks: Arc<Mutex<HashMap<String, Arc<MockProvider>>>>,
    _manager: Manager,
}

pub fn test_config() -> Config {
    Config {
        parallelism: 2,
        reconcile_timeout_secs: 10,
        dev_mode: true,
        intervals: Intervals::fast(),
    }
}

pub fn start_harness() -> Harness {
    let mocks: Arc<Mutex<HashMap<String, Arc<MockProvider>>>> =
        Arc::new(Mutex::new(HashMap::new()));
    let factory_mocks = mocks.clone();
    let factory: BackendFactory = Arc::new(move |provider: &Provider, _endpoint: &str| {
        factory_mocks
            .lock()
            .unwrap()
            .entry(provider.metadata.name.clone())
            .or_insert_with(|| Arc::new(MockProvider::new()))
            .clone() as Arc<dyn ProviderApi>
    });
    let ctx = Context::with_backend_factory(Intervals::fast(), factory);
    let manager = Manager::start(ctx.clone(), &test_config());
    Harness {
        ctx,
        mocks,
        _manager: manager,
    }
}

impl Harness {
    pub fn mock(&self, provider: &str) -> Arc<MockProvider> {
        self.mocks
            .lock()
            .unwrap()
            .entry(provider.to_string())
            .or_insert_with(|| Arc::new(MockProvider::new()))
            .clone()
    }

    /// Point `to` at the same backend as `from`, modeling two provider
    /// runtimes that mount the same staging volume. Must run before the
    /// second provider is seeded.
    pub fn share_backend(&self, from: &str, to: &str) {
        let shared = self.mock(from);
        self.mocks.lock().unwrap().insert(to.to_string(), shared);
    }

    pub async fn seed_provider(&self, name: &str) {
        self.seed_typed_provider(name, ProviderType::Libvirt).await;
    }

    pub async fn seed_typed_provider(&self, name: &str, provider_type: ProviderType) {
        // Materialize the mock before the runtime reconciler asks for it.
        self.mock(name);
        let provider = Provider {
            metadata: ObjectMeta::named("default", name),
            spec: ProviderSpec {
                provider_type,
                endpoint: format!("mock://{name}"),
                credential_secret_ref: None,
                runtime: None,
                health_check: Default::default(),
                connection_pool: Default::default(),
            },
            status: Default::default(),
        };
        self.ctx.providers.create(provider).await.unwrap();
    }

    pub async fn seed_class(&self, name: &str) {
        let class = VMClass {
            metadata: ObjectMeta::named("default", name),
            spec: VMClassSpec {
                cpu: 2,
                memory: "2Gi".to_string(),
                firmware: Default::default(),
                disk_defaults: None,
                guest_tools: Default::default(),
                performance_profile: None,
                security_profile: None,
                extra_config: Default::default(),
            },
        };
        self.ctx.classes.create(class).await.unwrap();
    }

    /// Seed an image without any prepared providers.
    pub async fn seed_raw_image(&self, name: &str) {
        let image = VMImage {
            metadata: ObjectMeta::named("default", name),
            spec: VMImageSpec {
                source: ImageSource::Http {
                    url: format!("https://images.example.com/{name}.qcow2"),
                    auth_secret_ref: None,
                },
                prepare: Default::default(),
            },
            status: Default::default(),
        };
        self.ctx.images.create(image).await.unwrap();
    }

    /// Seed an image already prepared on the given providers.
    pub async fn seed_image(&self, name: &str, providers: &[&str]) {
        self.seed_raw_image(name).await;
        let providers: Vec<String> = providers.iter().map(|p| p.to_string()).collect();
        self.ctx
            .images
            .modify_status("default", name, |image| {
                image.status.phase = ImagePhase::Ready;
                for provider in &providers {
                    image.status.providers.insert(
                        provider.clone(),
                        ImageAvailability {
                            available: true,
                            provider_image_id: Some(format!("img-{provider}")),
                            ..Default::default()
                        },
                    );
                }
            })
            .await
            .unwrap();
    }

    pub async fn seed_vm(&self, name: &str, provider: &str, power: PowerState) {
        let vm = VirtualMachine {
            metadata: ObjectMeta::named("default", name),
            spec: VirtualMachineSpec {
                provider_ref: ObjectRef::new(provider),
                class_ref: LocalObjectReference::new("medium"),
                image_ref: Some(LocalObjectReference::new("ubuntu-22")),
                power_state: power,
                ..Default::default()
            },
            status: Default::default(),
        };
        self.ctx.vms.create(vm).await.unwrap();
    }
}

pub async fn eventually<F, Fut>(what: &str, timeout_ms: u64, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    loop {
        if check().await {
            return;
        }
        if Instant::now() >= deadline {
            panic!("condition not met within {timeout_ms}ms: {what}");
        }
        sleep(Duration::from_millis(10)).await;
    }
}
