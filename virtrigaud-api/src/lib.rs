//! # VirtRigaud API
//!
//! Typed schemas for every kind managed by the control plane, in two
//! versions: `v1beta1` (the conversion hub) and the legacy `v1alpha1`.
//! Also carries the minimal collaborator kinds (Deployment, Service,
//! PersistentVolumeClaim, Secret) the reconcilers own through the store,
//! object metadata, and schema-level validation.

pub mod convert;
pub mod meta;
pub mod v1alpha1;
pub mod v1beta1;
pub mod validation;
pub mod workload;

pub use meta::{LocalObjectReference, Object, ObjectMeta, ObjectRef, OwnerReference};
