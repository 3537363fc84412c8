//! # VirtRigaud Provider
//!
//! The typed client every reconciler uses to talk to provider runtimes.
//! The [`ProviderApi`] trait is the contract; [`GrpcProvider`] speaks the
//! wire protocol, [`MockProvider`] simulates a hypervisor in memory for
//! tests and development. [`ProviderClient`] composes a backend with the
//! per-provider circuit breaker and the retry policy.

pub mod api;
pub mod breaker;
pub mod client;
pub mod error;
pub mod grpc;
pub mod mock;
pub mod registry;
pub mod retry;

pub use api::ProviderApi;
pub use breaker::{BreakerRegistry, BreakerState, CircuitBreaker};
pub use client::{ProviderClient, TaskOutcome};
pub use error::{ErrorKind, ProviderError, Result};
pub use grpc::{GrpcProvider, TlsMaterial};
pub use mock::MockProvider;
pub use registry::ProviderRegistry;
pub use retry::RetryPolicy;
