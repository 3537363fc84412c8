//! # VirtRigaud Proto
//!
//! Generated Rust code from the provider protobuf contract.
//!
//! This crate contains the gRPC service definition and message types for
//! communication between the control plane and provider runtimes. Generated
//! code is committed; rebuild it with the `codegen` feature after editing
//! `proto/provider.proto`.

// Include generated code
pub mod generated {
    pub mod virtrigaud {
        pub mod provider {
            pub mod v1 {
                include!("generated/virtrigaud.provider.v1.rs");
            }
        }
    }
}

// =============================================================================
// Provider Protocol Re-exports
// =============================================================================

/// Provider service types and client.
pub mod provider {
    pub use crate::generated::virtrigaud::provider::v1::*;
    pub use crate::generated::virtrigaud::provider::v1::provider_service_client::ProviderServiceClient;
}

// Re-export provider types at crate root for ergonomic imports.
pub use generated::virtrigaud::provider::v1::*;
pub use generated::virtrigaud::provider::v1::provider_service_client::ProviderServiceClient;
