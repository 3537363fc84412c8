#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ValidateRequest {}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ValidateResponse {
    #[prost(bool, tag = "1")]
    pub ok: bool,
    #[prost(string, tag = "2")]
    pub message: ::prost::alloc::string::String,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetCapabilitiesRequest {}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetCapabilitiesResponse {
    #[prost(bool, tag = "1")]
    pub supports_snapshots: bool,
    #[prost(bool, tag = "2")]
    pub supports_memory_snapshots: bool,
    #[prost(bool, tag = "3")]
    pub supports_linked_clones: bool,
    #[prost(bool, tag = "4")]
    pub supports_instant_clones: bool,
    #[prost(bool, tag = "5")]
    pub supports_disk_export: bool,
    #[prost(bool, tag = "6")]
    pub supports_disk_import: bool,
    /// Reconfigure may run while the VM is powered on.
    #[prost(bool, tag = "7")]
    pub reconfigure_online: bool,
    #[prost(string, repeated, tag = "8")]
    pub supported_disk_formats: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateRequest {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    /// JSON-encoded class, image, placement and per-network documents.
    #[prost(string, tag = "2")]
    pub class_json: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub image_json: ::prost::alloc::string::String,
    #[prost(string, repeated, tag = "4")]
    pub network_json: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    #[prost(string, tag = "5")]
    pub placement_json: ::prost::alloc::string::String,
    #[prost(string, repeated, tag = "6")]
    pub disk_json: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    #[prost(string, tag = "7")]
    pub user_data: ::prost::alloc::string::String,
    #[prost(string, repeated, tag = "8")]
    pub tags: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateResponse {
    #[prost(string, tag = "1")]
    pub id: ::prost::alloc::string::String,
    /// Empty when the create completed synchronously.
    #[prost(string, tag = "2")]
    pub task_id: ::prost::alloc::string::String,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteRequest {
    #[prost(string, tag = "1")]
    pub id: ::prost::alloc::string::String,
}
/// Common response for operations that may complete asynchronously.
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TaskResponse {
    /// Empty when the operation completed synchronously.
    #[prost(string, tag = "1")]
    pub task_id: ::prost::alloc::string::String,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PowerRequest {
    #[prost(string, tag = "1")]
    pub id: ::prost::alloc::string::String,
    #[prost(enumeration = "PowerOp", tag = "2")]
    pub op: i32,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReconfigureRequest {
    #[prost(string, tag = "1")]
    pub id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub class_json: ::prost::alloc::string::String,
    #[prost(string, repeated, tag = "3")]
    pub disk_json: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DescribeRequest {
    #[prost(string, tag = "1")]
    pub id: ::prost::alloc::string::String,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DescribeResponse {
    #[prost(bool, tag = "1")]
    pub exists: bool,
    /// "On", "Off" or "Unknown".
    #[prost(string, tag = "2")]
    pub power_state: ::prost::alloc::string::String,
    #[prost(string, repeated, tag = "3")]
    pub ips: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    #[prost(string, tag = "4")]
    pub console_url: ::prost::alloc::string::String,
    #[prost(uint32, tag = "5")]
    pub cpu: u32,
    #[prost(uint64, tag = "6")]
    pub memory_bytes: u64,
    /// Raw provider document for diagnostics.
    #[prost(string, tag = "7")]
    pub raw_json: ::prost::alloc::string::String,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TaskStatusRequest {
    #[prost(string, tag = "1")]
    pub task_id: ::prost::alloc::string::String,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TaskStatusResponse {
    #[prost(bool, tag = "1")]
    pub done: bool,
    /// Empty on success; wire-taxonomy error message otherwise.
    #[prost(string, tag = "2")]
    pub error: ::prost::alloc::string::String,
    #[prost(int32, tag = "3")]
    pub progress_percent: i32,
    #[prost(uint64, tag = "4")]
    pub transferred_bytes: u64,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SnapshotCreateRequest {
    #[prost(string, tag = "1")]
    pub vm_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub name: ::prost::alloc::string::String,
    #[prost(bool, tag = "3")]
    pub include_memory: bool,
    #[prost(bool, tag = "4")]
    pub quiesce: bool,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SnapshotCreateResponse {
    #[prost(string, tag = "1")]
    pub snapshot_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub task_id: ::prost::alloc::string::String,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SnapshotDeleteRequest {
    #[prost(string, tag = "1")]
    pub vm_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub snapshot_id: ::prost::alloc::string::String,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SnapshotRevertRequest {
    #[prost(string, tag = "1")]
    pub vm_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub snapshot_id: ::prost::alloc::string::String,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CloneRequest {
    #[prost(string, tag = "1")]
    pub source_vm_id: ::prost::alloc::string::String,
    /// Clone from a snapshot of the source instead of its live disks.
    #[prost(string, tag = "2")]
    pub source_snapshot_id: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub target_name: ::prost::alloc::string::String,
    /// "Full", "Linked" or "Instant".
    #[prost(string, tag = "4")]
    pub clone_type: ::prost::alloc::string::String,
    #[prost(string, tag = "5")]
    pub customization_json: ::prost::alloc::string::String,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CloneResponse {
    #[prost(string, tag = "1")]
    pub target_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub task_id: ::prost::alloc::string::String,
    /// Type actually used; the provider may downgrade.
    #[prost(string, tag = "3")]
    pub clone_type: ::prost::alloc::string::String,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ExportDiskRequest {
    #[prost(string, tag = "1")]
    pub vm_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub snapshot_id: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub destination_url: ::prost::alloc::string::String,
    #[prost(string, tag = "4")]
    pub format: ::prost::alloc::string::String,
    #[prost(bool, tag = "5")]
    pub compress: bool,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ExportDiskResponse {
    #[prost(string, tag = "1")]
    pub task_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub disk_id: ::prost::alloc::string::String,
    #[prost(uint64, tag = "3")]
    pub estimated_size_bytes: u64,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ImportDiskRequest {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub source_url: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub format: ::prost::alloc::string::String,
    #[prost(string, tag = "4")]
    pub storage_hint: ::prost::alloc::string::String,
    #[prost(bool, tag = "5")]
    pub verify_checksum: bool,
    #[prost(string, tag = "6")]
    pub expected_checksum: ::prost::alloc::string::String,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ImportDiskResponse {
    #[prost(string, tag = "1")]
    pub disk_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub task_id: ::prost::alloc::string::String,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetDiskInfoRequest {
    #[prost(string, tag = "1")]
    pub vm_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub disk_id: ::prost::alloc::string::String,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetDiskInfoResponse {
    #[prost(string, tag = "1")]
    pub disk_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub format: ::prost::alloc::string::String,
    #[prost(uint64, tag = "3")]
    pub size_bytes: u64,
    #[prost(string, tag = "4")]
    pub checksum: ::prost::alloc::string::String,
}
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum PowerOp {
    Unspecified = 0,
    On = 1,
    Off = 2,
    OffGraceful = 3,
    Reboot = 4,
}
impl PowerOp {
    /// String value of the enum field names used in the ProtoBuf definition.
    ///
    /// The values are not transformed in any way and thus are considered stable
    /// (if the ProtoBuf definition does not change) and safe for programmatic use.
    pub fn as_str_name(&self) -> &'static str {
        match self {
            PowerOp::Unspecified => "POWER_OP_UNSPECIFIED",
            PowerOp::On => "POWER_OP_ON",
            PowerOp::Off => "POWER_OP_OFF",
            PowerOp::OffGraceful => "POWER_OP_OFF_GRACEFUL",
            PowerOp::Reboot => "POWER_OP_REBOOT",
        }
    }
    /// Creates an enum from field names used in the ProtoBuf definition.
    pub fn from_str_name(value: &str) -> ::core::option::Option<Self> {
        match value {
            "POWER_OP_UNSPECIFIED" => Some(Self::Unspecified),
            "POWER_OP_ON" => Some(Self::On),
            "POWER_OP_OFF" => Some(Self::Off),
            "POWER_OP_OFF_GRACEFUL" => Some(Self::OffGraceful),
            "POWER_OP_REBOOT" => Some(Self::Reboot),
            _ => None,
        }
    }
}
/// Generated client implementations.
pub mod provider_service_client {
    #![allow(unused_variables, dead_code, missing_docs, clippy::let_unit_value)]
    use tonic::codegen::*;
    use tonic::codegen::http::Uri;
    #[derive(Debug, Clone)]
    pub struct ProviderServiceClient<T> {
        inner: tonic::client::Grpc<T>,
    }
    impl ProviderServiceClient<tonic::transport::Channel> {
        /// Attempt to create a new client by connecting to a given endpoint.
        pub async fn connect<D>(dst: D) -> Result<Self, tonic::transport::Error>
        where
            D: TryInto<tonic::transport::Endpoint>,
            D::Error: Into<StdError>,
        {
            let conn = tonic::transport::Endpoint::new(dst)?.connect().await?;
            Ok(Self::new(conn))
        }
    }
    impl<T> ProviderServiceClient<T>
    where
        T: tonic::client::GrpcService<tonic::body::BoxBody>,
        T::Error: Into<StdError>,
        T::ResponseBody: Body<Data = Bytes> + Send + 'static,
        <T::ResponseBody as Body>::Error: Into<StdError> + Send,
    {
        pub fn new(inner: T) -> Self {
            let inner = tonic::client::Grpc::new(inner);
            Self { inner }
        }
        pub fn with_origin(inner: T, origin: Uri) -> Self {
            let inner = tonic::client::Grpc::with_origin(inner, origin);
            Self { inner }
        }
        pub fn with_interceptor<F>(
            inner: T,
            interceptor: F,
        ) -> ProviderServiceClient<InterceptedService<T, F>>
        where
            F: tonic::service::Interceptor,
            T::ResponseBody: Default,
            T: tonic::codegen::Service<
                http::Request<tonic::body::BoxBody>,
                Response = http::Response<
                    <T as tonic::client::GrpcService<tonic::body::BoxBody>>::ResponseBody,
                >,
            >,
            <T as tonic::codegen::Service<
                http::Request<tonic::body::BoxBody>,
            >>::Error: Into<StdError> + Send + Sync,
        {
            ProviderServiceClient::new(InterceptedService::new(inner, interceptor))
        }
        /// Compress requests with the given encoding.
        ///
        /// This requires the server to support it otherwise it might respond with an
        /// error.
        #[must_use]
        pub fn send_compressed(mut self, encoding: CompressionEncoding) -> Self {
            self.inner = self.inner.send_compressed(encoding);
            self
        }
        /// Enable decompressing responses.
        #[must_use]
        pub fn accept_compressed(mut self, encoding: CompressionEncoding) -> Self {
            self.inner = self.inner.accept_compressed(encoding);
            self
        }
        /// Limits the maximum size of a decoded message.
        ///
        /// Default: `4MB`
        #[must_use]
        pub fn max_decoding_message_size(mut self, limit: usize) -> Self {
            self.inner = self.inner.max_decoding_message_size(limit);
            self
        }
        /// Limits the maximum size of an encoded message.
        ///
        /// Default: `usize::MAX`
        #[must_use]
        pub fn max_encoding_message_size(mut self, limit: usize) -> Self {
            self.inner = self.inner.max_encoding_message_size(limit);
            self
        }
        /// Credentials and endpoint are healthy. Cheap; called at startup and
        /// periodically by the health loop.
        pub async fn validate(
            &mut self,
            request: impl tonic::IntoRequest<super::ValidateRequest>,
        ) -> std::result::Result<
            tonic::Response<super::ValidateResponse>,
            tonic::Status,
        > {
            self.inner
                .ready()
                .await
                .map_err(|e| {
                    tonic::Status::new(
                        tonic::Code::Unknown,
                        format!("Service was not ready: {}", e.into()),
                    )
                })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static(
                "/virtrigaud.provider.v1.ProviderService/Validate",
            );
            let mut req = request.into_request();
            req.extensions_mut()
                .insert(
                    GrpcMethod::new("virtrigaud.provider.v1.ProviderService", "Validate"),
                );
            self.inner.unary(req, path, codec).await
        }
        /// Feature advertisement, refreshed into Provider status.
        pub async fn get_capabilities(
            &mut self,
            request: impl tonic::IntoRequest<super::GetCapabilitiesRequest>,
        ) -> std::result::Result<
            tonic::Response<super::GetCapabilitiesResponse>,
            tonic::Status,
        > {
            self.inner
                .ready()
                .await
                .map_err(|e| {
                    tonic::Status::new(
                        tonic::Code::Unknown,
                        format!("Service was not ready: {}", e.into()),
                    )
                })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static(
                "/virtrigaud.provider.v1.ProviderService/GetCapabilities",
            );
            let mut req = request.into_request();
            req.extensions_mut()
                .insert(
                    GrpcMethod::new(
                        "virtrigaud.provider.v1.ProviderService",
                        "GetCapabilities",
                    ),
                );
            self.inner.unary(req, path, codec).await
        }
        /// Idempotent by name: repeated calls with the same name return the same id.
        pub async fn create(
            &mut self,
            request: impl tonic::IntoRequest<super::CreateRequest>,
        ) -> std::result::Result<
            tonic::Response<super::CreateResponse>,
            tonic::Status,
        > {
            self.inner
                .ready()
                .await
                .map_err(|e| {
                    tonic::Status::new(
                        tonic::Code::Unknown,
                        format!("Service was not ready: {}", e.into()),
                    )
                })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static(
                "/virtrigaud.provider.v1.ProviderService/Create",
            );
            let mut req = request.into_request();
            req.extensions_mut()
                .insert(
                    GrpcMethod::new("virtrigaud.provider.v1.ProviderService", "Create"),
                );
            self.inner.unary(req, path, codec).await
        }
        /// Idempotent: succeeds even when the VM is already absent.
        pub async fn delete(
            &mut self,
            request: impl tonic::IntoRequest<super::DeleteRequest>,
        ) -> std::result::Result<tonic::Response<super::TaskResponse>, tonic::Status> {
            self.inner
                .ready()
                .await
                .map_err(|e| {
                    tonic::Status::new(
                        tonic::Code::Unknown,
                        format!("Service was not ready: {}", e.into()),
                    )
                })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static(
                "/virtrigaud.provider.v1.ProviderService/Delete",
            );
            let mut req = request.into_request();
            req.extensions_mut()
                .insert(
                    GrpcMethod::new("virtrigaud.provider.v1.ProviderService", "Delete"),
                );
            self.inner.unary(req, path, codec).await
        }
        /// Drive toward the requested power state; callable from any state.
        pub async fn power(
            &mut self,
            request: impl tonic::IntoRequest<super::PowerRequest>,
        ) -> std::result::Result<tonic::Response<super::TaskResponse>, tonic::Status> {
            self.inner
                .ready()
                .await
                .map_err(|e| {
                    tonic::Status::new(
                        tonic::Code::Unknown,
                        format!("Service was not ready: {}", e.into()),
                    )
                })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static(
                "/virtrigaud.provider.v1.ProviderService/Power",
            );
            let mut req = request.into_request();
            req.extensions_mut()
                .insert(
                    GrpcMethod::new("virtrigaud.provider.v1.ProviderService", "Power"),
                );
            self.inner.unary(req, path, codec).await
        }
        /// May be a partial no-op; unsupported changes fail with NOT_SUPPORTED.
        pub async fn reconfigure(
            &mut self,
            request: impl tonic::IntoRequest<super::ReconfigureRequest>,
        ) -> std::result::Result<tonic::Response<super::TaskResponse>, tonic::Status> {
            self.inner
                .ready()
                .await
                .map_err(|e| {
                    tonic::Status::new(
                        tonic::Code::Unknown,
                        format!("Service was not ready: {}", e.into()),
                    )
                })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static(
                "/virtrigaud.provider.v1.ProviderService/Reconfigure",
            );
            let mut req = request.into_request();
            req.extensions_mut()
                .insert(
                    GrpcMethod::new(
                        "virtrigaud.provider.v1.ProviderService",
                        "Reconfigure",
                    ),
                );
            self.inner.unary(req, path, codec).await
        }
        /// Cheap observation; safe under concurrent mutations.
        pub async fn describe(
            &mut self,
            request: impl tonic::IntoRequest<super::DescribeRequest>,
        ) -> std::result::Result<
            tonic::Response<super::DescribeResponse>,
            tonic::Status,
        > {
            self.inner
                .ready()
                .await
                .map_err(|e| {
                    tonic::Status::new(
                        tonic::Code::Unknown,
                        format!("Service was not ready: {}", e.into()),
                    )
                })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static(
                "/virtrigaud.provider.v1.ProviderService/Describe",
            );
            let mut req = request.into_request();
            req.extensions_mut()
                .insert(
                    GrpcMethod::new("virtrigaud.provider.v1.ProviderService", "Describe"),
                );
            self.inner.unary(req, path, codec).await
        }
        /// The only way to observe async completion.
        pub async fn task_status(
            &mut self,
            request: impl tonic::IntoRequest<super::TaskStatusRequest>,
        ) -> std::result::Result<
            tonic::Response<super::TaskStatusResponse>,
            tonic::Status,
        > {
            self.inner
                .ready()
                .await
                .map_err(|e| {
                    tonic::Status::new(
                        tonic::Code::Unknown,
                        format!("Service was not ready: {}", e.into()),
                    )
                })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static(
                "/virtrigaud.provider.v1.ProviderService/TaskStatus",
            );
            let mut req = request.into_request();
            req.extensions_mut()
                .insert(
                    GrpcMethod::new(
                        "virtrigaud.provider.v1.ProviderService",
                        "TaskStatus",
                    ),
                );
            self.inner.unary(req, path, codec).await
        }
        pub async fn snapshot_create(
            &mut self,
            request: impl tonic::IntoRequest<super::SnapshotCreateRequest>,
        ) -> std::result::Result<
            tonic::Response<super::SnapshotCreateResponse>,
            tonic::Status,
        > {
            self.inner
                .ready()
                .await
                .map_err(|e| {
                    tonic::Status::new(
                        tonic::Code::Unknown,
                        format!("Service was not ready: {}", e.into()),
                    )
                })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static(
                "/virtrigaud.provider.v1.ProviderService/SnapshotCreate",
            );
            let mut req = request.into_request();
            req.extensions_mut()
                .insert(
                    GrpcMethod::new(
                        "virtrigaud.provider.v1.ProviderService",
                        "SnapshotCreate",
                    ),
                );
            self.inner.unary(req, path, codec).await
        }
        pub async fn snapshot_delete(
            &mut self,
            request: impl tonic::IntoRequest<super::SnapshotDeleteRequest>,
        ) -> std::result::Result<tonic::Response<super::TaskResponse>, tonic::Status> {
            self.inner
                .ready()
                .await
                .map_err(|e| {
                    tonic::Status::new(
                        tonic::Code::Unknown,
                        format!("Service was not ready: {}", e.into()),
                    )
                })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static(
                "/virtrigaud.provider.v1.ProviderService/SnapshotDelete",
            );
            let mut req = request.into_request();
            req.extensions_mut()
                .insert(
                    GrpcMethod::new(
                        "virtrigaud.provider.v1.ProviderService",
                        "SnapshotDelete",
                    ),
                );
            self.inner.unary(req, path, codec).await
        }
        pub async fn snapshot_revert(
            &mut self,
            request: impl tonic::IntoRequest<super::SnapshotRevertRequest>,
        ) -> std::result::Result<tonic::Response<super::TaskResponse>, tonic::Status> {
            self.inner
                .ready()
                .await
                .map_err(|e| {
                    tonic::Status::new(
                        tonic::Code::Unknown,
                        format!("Service was not ready: {}", e.into()),
                    )
                })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static(
                "/virtrigaud.provider.v1.ProviderService/SnapshotRevert",
            );
            let mut req = request.into_request();
            req.extensions_mut()
                .insert(
                    GrpcMethod::new(
                        "virtrigaud.provider.v1.ProviderService",
                        "SnapshotRevert",
                    ),
                );
            self.inner.unary(req, path, codec).await
        }
        pub async fn clone_vm(
            &mut self,
            request: impl tonic::IntoRequest<super::CloneRequest>,
        ) -> std::result::Result<tonic::Response<super::CloneResponse>, tonic::Status> {
            self.inner
                .ready()
                .await
                .map_err(|e| {
                    tonic::Status::new(
                        tonic::Code::Unknown,
                        format!("Service was not ready: {}", e.into()),
                    )
                })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static(
                "/virtrigaud.provider.v1.ProviderService/CloneVm",
            );
            let mut req = request.into_request();
            req.extensions_mut()
                .insert(
                    GrpcMethod::new("virtrigaud.provider.v1.ProviderService", "CloneVm"),
                );
            self.inner.unary(req, path, codec).await
        }
        /// Disk staging: the backbone of cross-provider migration.
        pub async fn export_disk(
            &mut self,
            request: impl tonic::IntoRequest<super::ExportDiskRequest>,
        ) -> std::result::Result<
            tonic::Response<super::ExportDiskResponse>,
            tonic::Status,
        > {
            self.inner
                .ready()
                .await
                .map_err(|e| {
                    tonic::Status::new(
                        tonic::Code::Unknown,
                        format!("Service was not ready: {}", e.into()),
                    )
                })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static(
                "/virtrigaud.provider.v1.ProviderService/ExportDisk",
            );
            let mut req = request.into_request();
            req.extensions_mut()
                .insert(
                    GrpcMethod::new(
                        "virtrigaud.provider.v1.ProviderService",
                        "ExportDisk",
                    ),
                );
            self.inner.unary(req, path, codec).await
        }
        pub async fn import_disk(
            &mut self,
            request: impl tonic::IntoRequest<super::ImportDiskRequest>,
        ) -> std::result::Result<
            tonic::Response<super::ImportDiskResponse>,
            tonic::Status,
        > {
            self.inner
                .ready()
                .await
                .map_err(|e| {
                    tonic::Status::new(
                        tonic::Code::Unknown,
                        format!("Service was not ready: {}", e.into()),
                    )
                })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static(
                "/virtrigaud.provider.v1.ProviderService/ImportDisk",
            );
            let mut req = request.into_request();
            req.extensions_mut()
                .insert(
                    GrpcMethod::new(
                        "virtrigaud.provider.v1.ProviderService",
                        "ImportDisk",
                    ),
                );
            self.inner.unary(req, path, codec).await
        }
        pub async fn get_disk_info(
            &mut self,
            request: impl tonic::IntoRequest<super::GetDiskInfoRequest>,
        ) -> std::result::Result<
            tonic::Response<super::GetDiskInfoResponse>,
            tonic::Status,
        > {
            self.inner
                .ready()
                .await
                .map_err(|e| {
                    tonic::Status::new(
                        tonic::Code::Unknown,
                        format!("Service was not ready: {}", e.into()),
                    )
                })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static(
                "/virtrigaud.provider.v1.ProviderService/GetDiskInfo",
            );
            let mut req = request.into_request();
            req.extensions_mut()
                .insert(
                    GrpcMethod::new(
                        "virtrigaud.provider.v1.ProviderService",
                        "GetDiskInfo",
                    ),
                );
            self.inner.unary(req, path, codec).await
        }
    }
}
