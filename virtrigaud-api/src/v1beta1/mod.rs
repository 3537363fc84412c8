//! `v1beta1` is the hub version of every kind.

pub mod clone;
pub mod core;
pub mod migration;
pub mod network;
pub mod placement;
pub mod provider;
pub mod snapshot;
pub mod vm;
pub mod vmclass;
pub mod vmimage;
pub mod vmset;

pub use clone::*;
pub use core::*;
pub use migration::*;
pub use network::*;
pub use placement::*;
pub use provider::*;
pub use snapshot::*;
pub use vm::*;
pub use vmclass::*;
pub use vmimage::*;
pub use vmset::*;
