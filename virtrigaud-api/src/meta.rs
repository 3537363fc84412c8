//! Object metadata and references shared by every kind.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata carried by every stored object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectMeta {
    /// Object name, unique within a namespace
    pub name: String,
    /// Namespace
    pub namespace: String,
    /// Store-assigned unique identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    /// Optimistic-concurrency token; every write bumps it
    pub resource_version: u64,
    /// Spec generation; bumped on spec changes only
    pub generation: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
    /// Set when deletion has been requested but finalizers remain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub finalizers: Vec<String>,
    pub owner_references: Vec<OwnerReference>,
}

impl ObjectMeta {
    /// Metadata for a fresh object in `namespace` named `name`.
    pub fn named(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    /// `namespace/name` key, unique per kind.
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Whether deletion has been requested.
    pub fn is_deleting(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers.iter().any(|f| f == finalizer)
    }

    /// Add a finalizer if absent. Returns true when the list changed.
    pub fn add_finalizer(&mut self, finalizer: &str) -> bool {
        if self.has_finalizer(finalizer) {
            return false;
        }
        self.finalizers.push(finalizer.to_string());
        true
    }

    /// Remove a finalizer if present. Returns true when the list changed.
    pub fn remove_finalizer(&mut self, finalizer: &str) -> bool {
        let before = self.finalizers.len();
        self.finalizers.retain(|f| f != finalizer);
        self.finalizers.len() != before
    }

    /// Whether `owner` appears in the owner references.
    pub fn is_owned_by(&self, kind: &str, name: &str) -> bool {
        self.owner_references
            .iter()
            .any(|r| r.kind == kind && r.name == name)
    }
}

/// A reference from an owned object back to its owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerReference {
    pub kind: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    /// Deleting the owner cascades to this object
    #[serde(default)]
    pub controller: bool,
}

impl OwnerReference {
    /// Controller owner reference to `owner`.
    pub fn controller_of<T: Object>(owner: &T) -> Self {
        Self {
            kind: T::KIND.to_string(),
            name: owner.meta().name.clone(),
            uid: owner.meta().uid.clone(),
            controller: true,
        }
    }
}

/// Reference to an object in the same namespace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalObjectReference {
    pub name: String,
}

impl LocalObjectReference {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Reference to an object, optionally in another namespace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ObjectRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
        }
    }

    /// Resolve against the referencing object's namespace.
    pub fn namespace_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.namespace.as_deref().unwrap_or(fallback)
    }
}

/// Label selector with exact-match semantics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelSelector {
    pub match_labels: BTreeMap<String, String>,
}

impl LabelSelector {
    /// True when every selector entry is present in `labels` with the same value.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.match_labels
            .iter()
            .all(|(k, v)| labels.get(k) == Some(v))
    }

    pub fn is_empty(&self) -> bool {
        self.match_labels.is_empty()
    }
}

/// Implemented by every storable kind.
///
/// `PartialEq` lets the store elide writes that change nothing, which is
/// what keeps converged reconcilers from re-triggering themselves through
/// their own status updates.
pub trait Object: Clone + PartialEq + Send + Sync + 'static {
    /// Kind name as it appears in owner references and events.
    const KIND: &'static str;

    fn meta(&self) -> &ObjectMeta;
    fn meta_mut(&mut self) -> &mut ObjectMeta;
}

/// Implement [`Object`] for a kind with a `metadata` field.
#[macro_export]
macro_rules! impl_object {
    ($type:ty, $kind:literal) => {
        impl $crate::meta::Object for $type {
            const KIND: &'static str = $kind;

            fn meta(&self) -> &$crate::meta::ObjectMeta {
                &self.metadata
            }

            fn meta_mut(&mut self) -> &mut $crate::meta::ObjectMeta {
                &mut self.metadata
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finalizer_roundtrip() {
        let mut meta = ObjectMeta::named("default", "web-01");
        assert!(meta.add_finalizer("virtualmachine.infra.virtrigaud.io/finalizer"));
        assert!(!meta.add_finalizer("virtualmachine.infra.virtrigaud.io/finalizer"));
        assert!(meta.has_finalizer("virtualmachine.infra.virtrigaud.io/finalizer"));
        assert!(meta.remove_finalizer("virtualmachine.infra.virtrigaud.io/finalizer"));
        assert!(meta.finalizers.is_empty());
    }

    #[test]
    fn test_label_selector() {
        let mut labels = BTreeMap::new();
        labels.insert("app".to_string(), "db".to_string());
        labels.insert("tier".to_string(), "backend".to_string());

        let mut selector = LabelSelector::default();
        selector
            .match_labels
            .insert("app".to_string(), "db".to_string());
        assert!(selector.matches(&labels));

        selector
            .match_labels
            .insert("tier".to_string(), "frontend".to_string());
        assert!(!selector.matches(&labels));
    }
}
