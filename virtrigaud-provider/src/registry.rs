//! Registry of connected provider clients.
//!
//! Reconcilers look providers up by (namespace, name); the provider-runtime
//! reconciler registers and refreshes entries as runtimes come and go.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::client::ProviderClient;
use crate::error::{ProviderError, Result};

/// Shared map of ready-to-use provider clients.
#[derive(Default)]
pub struct ProviderRegistry {
    clients: RwLock<HashMap<String, Arc<ProviderClient>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(namespace: &str, name: &str) -> String {
        format!("{namespace}/{name}")
    }

    /// Register or replace the client for a provider.
    pub async fn register(&self, namespace: &str, name: &str, client: Arc<ProviderClient>) {
        let key = Self::key(namespace, name);
        info!(provider = %key, "Registered provider client");
        self.clients.write().await.insert(key, client);
    }

    /// Drop the client for a provider (runtime gone or being replaced).
    pub async fn deregister(&self, namespace: &str, name: &str) {
        let key = Self::key(namespace, name);
        if self.clients.write().await.remove(&key).is_some() {
            debug!(provider = %key, "Deregistered provider client");
        }
    }

    /// Look up a provider client; Unavailable when no runtime is registered.
    pub async fn lookup(&self, namespace: &str, name: &str) -> Result<Arc<ProviderClient>> {
        let key = Self::key(namespace, name);
        self.clients
            .read()
            .await
            .get(&key)
            .cloned()
            .ok_or_else(|| {
                ProviderError::Unavailable(format!("no runtime registered for provider {key}"))
            })
    }

    /// Whether a client is registered.
    pub async fn contains(&self, namespace: &str, name: &str) -> bool {
        self.clients
            .read()
            .await
            .contains_key(&Self::key(namespace, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::{BreakerConfig, BreakerRegistry};
    use crate::mock::MockProvider;

    #[tokio::test]
    async fn test_register_lookup_deregister() {
        let registry = ProviderRegistry::new();
        let breakers = BreakerRegistry::new(BreakerConfig::default());
        let client = Arc::new(ProviderClient::with_registry(
            "pve-1",
            "proxmox",
            Arc::new(MockProvider::new()),
            &breakers,
        ));

        registry.register("default", "pve-1", client).await;
        assert!(registry.contains("default", "pve-1").await);
        assert!(registry.lookup("default", "pve-1").await.is_ok());

        registry.deregister("default", "pve-1").await;
        let err = registry.lookup("default", "pve-1").await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Unavailable);
    }
}
