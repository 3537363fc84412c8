//! gRPC backend speaking the wire contract to a provider runtime.

use std::time::Duration;

use async_trait::async_trait;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint, Identity};
use tracing::{debug, info};

use virtrigaud_proto::provider as pb;
use virtrigaud_proto::ProviderServiceClient;

use crate::api::ProviderApi;
use crate::error::{ProviderError, Result};

/// PEM material for the provider channel, loaded from the TLS secret
/// (`tls.crt`, `tls.key`, `ca.crt`).
#[derive(Clone)]
pub struct TlsMaterial {
    pub ca_pem: Vec<u8>,
    pub cert_pem: Vec<u8>,
    pub key_pem: Vec<u8>,
    /// Server-name override for certificate verification
    pub domain: Option<String>,
}

/// A connected provider runtime.
pub struct GrpcProvider {
    client: ProviderServiceClient<Channel>,
    endpoint: String,
}

impl GrpcProvider {
    /// Connect to `endpoint` ("https://host:9443" or "http://host:9443").
    ///
    /// TLS is mandatory for https endpoints; plaintext is only used when the
    /// Provider explicitly opted out of verification.
    pub async fn connect(
        endpoint: &str,
        tls: Option<TlsMaterial>,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let mut builder = Endpoint::from_shared(endpoint.to_string())
            .map_err(|e| ProviderError::InvalidSpec(format!("invalid endpoint {endpoint}: {e}")))?
            .connect_timeout(connect_timeout)
            .tcp_keepalive(Some(Duration::from_secs(60)));

        if let Some(material) = tls {
            let mut config = ClientTlsConfig::new()
                .ca_certificate(Certificate::from_pem(material.ca_pem))
                .identity(Identity::from_pem(material.cert_pem, material.key_pem));
            if let Some(domain) = material.domain {
                config = config.domain_name(domain);
            }
            builder = builder
                .tls_config(config)
                .map_err(|e| ProviderError::InvalidSpec(format!("invalid TLS config: {e}")))?;
            debug!(endpoint = %endpoint, "Provider channel configured with mTLS");
        }

        let channel = builder
            .connect()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("connect {endpoint}: {e}")))?;

        info!(endpoint = %endpoint, "Connected to provider runtime");
        Ok(Self {
            client: ProviderServiceClient::new(channel),
            endpoint: endpoint.to_string(),
        })
    }

    /// Lazy variant: the channel dials on first use.
    pub fn connect_lazy(endpoint: &str, connect_timeout: Duration) -> Result<Self> {
        let channel = Endpoint::from_shared(endpoint.to_string())
            .map_err(|e| ProviderError::InvalidSpec(format!("invalid endpoint {endpoint}: {e}")))?
            .connect_timeout(connect_timeout)
            .connect_lazy();
        Ok(Self {
            client: ProviderServiceClient::new(channel),
            endpoint: endpoint.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ProviderApi for GrpcProvider {
    async fn validate(&self) -> Result<pb::ValidateResponse> {
        let mut client = self.client.clone();
        Ok(client.validate(pb::ValidateRequest {}).await?.into_inner())
    }

    async fn get_capabilities(&self) -> Result<pb::GetCapabilitiesResponse> {
        let mut client = self.client.clone();
        Ok(client
            .get_capabilities(pb::GetCapabilitiesRequest {})
            .await?
            .into_inner())
    }

    async fn create(&self, request: pb::CreateRequest) -> Result<pb::CreateResponse> {
        let mut client = self.client.clone();
        Ok(client.create(request).await?.into_inner())
    }

    async fn delete(&self, request: pb::DeleteRequest) -> Result<pb::TaskResponse> {
        let mut client = self.client.clone();
        Ok(client.delete(request).await?.into_inner())
    }

    async fn power(&self, request: pb::PowerRequest) -> Result<pb::TaskResponse> {
        let mut client = self.client.clone();
        Ok(client.power(request).await?.into_inner())
    }

    async fn reconfigure(&self, request: pb::ReconfigureRequest) -> Result<pb::TaskResponse> {
        let mut client = self.client.clone();
        Ok(client.reconfigure(request).await?.into_inner())
    }

    async fn describe(&self, request: pb::DescribeRequest) -> Result<pb::DescribeResponse> {
        let mut client = self.client.clone();
        Ok(client.describe(request).await?.into_inner())
    }

    async fn task_status(
        &self,
        request: pb::TaskStatusRequest,
    ) -> Result<pb::TaskStatusResponse> {
        let mut client = self.client.clone();
        Ok(client.task_status(request).await?.into_inner())
    }

    async fn snapshot_create(
        &self,
        request: pb::SnapshotCreateRequest,
    ) -> Result<pb::SnapshotCreateResponse> {
        let mut client = self.client.clone();
        Ok(client.snapshot_create(request).await?.into_inner())
    }

    async fn snapshot_delete(
        &self,
        request: pb::SnapshotDeleteRequest,
    ) -> Result<pb::TaskResponse> {
        let mut client = self.client.clone();
        Ok(client.snapshot_delete(request).await?.into_inner())
    }

    async fn snapshot_revert(
        &self,
        request: pb::SnapshotRevertRequest,
    ) -> Result<pb::TaskResponse> {
        let mut client = self.client.clone();
        Ok(client.snapshot_revert(request).await?.into_inner())
    }

    async fn clone_vm(&self, request: pb::CloneRequest) -> Result<pb::CloneResponse> {
        let mut client = self.client.clone();
        Ok(client.clone_vm(request).await?.into_inner())
    }

    async fn export_disk(&self, request: pb::ExportDiskRequest) -> Result<pb::ExportDiskResponse> {
        let mut client = self.client.clone();
        Ok(client.export_disk(request).await?.into_inner())
    }

    async fn import_disk(&self, request: pb::ImportDiskRequest) -> Result<pb::ImportDiskResponse> {
        let mut client = self.client.clone();
        Ok(client.import_disk(request).await?.into_inner())
    }

    async fn get_disk_info(
        &self,
        request: pb::GetDiskInfoRequest,
    ) -> Result<pb::GetDiskInfoResponse> {
        let mut client = self.client.clone();
        Ok(client.get_disk_info(request).await?.into_inner())
    }
}
