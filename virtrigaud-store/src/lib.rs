//! # VirtRigaud Store
//!
//! The orchestrator object-store contract the reconcilers are written
//! against: typed per-kind stores with compare-and-swap on
//! `resource_version`, finalizer-aware deletion, watch events, and the
//! deduplicating workqueue that serializes reconciles per key.
//!
//! The in-memory implementation backs the control-plane binary's tests and
//! development mode; production deployments sit on the cluster API server,
//! which honors the same contract.

pub mod error;
pub mod memory;
pub mod queue;
pub mod watch;

pub use error::{Result, StoreError};
pub use memory::Store;
pub use queue::{ObjectKey, WorkQueue};
pub use watch::Event;
