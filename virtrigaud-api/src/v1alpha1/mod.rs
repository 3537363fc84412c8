//! `v1alpha1` is the legacy version group.
//!
//! Alpha schemas are flatter than their beta counterparts: references are
//! bare names, several beta sub-objects do not exist, and enums carry fewer
//! variants. Conversion to and from the hub lives in [`crate::convert`].

pub mod kinds;
pub mod provider;
pub mod vm;

pub use kinds::*;
pub use provider::*;
pub use vm::*;
