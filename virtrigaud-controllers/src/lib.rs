//! # VirtRigaud Controllers
//!
//! The control-plane library: shared context, controller runtime, and the
//! eight reconcilers. The binary in `main.rs` wires them together; the
//! integration tests drive them over the in-memory store with mock
//! providers.

pub mod cli;
pub mod clone;
pub mod config;
pub mod context;
pub mod events;
pub mod image;
pub mod manager;
pub mod migration;
pub mod placement;
pub mod provider_runtime;
pub mod runtime;
pub mod snapshot;
pub mod vm;
pub mod vmset;

pub use config::Config;
pub use context::Context;
pub use manager::Manager;
