//! In-memory typed store with the full contract semantics.

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use virtrigaud_api::meta::Object;

use crate::error::{Result, StoreError};
use crate::watch::Event;

const WATCH_BUFFER: usize = 256;

/// A typed store for one kind.
///
/// Writes are optimistic: `update`/`update_status` reject stale
/// `resource_version`s with [`StoreError::Conflict`] and the caller retries
/// by re-reading. Deletion honors finalizers: while any are present only
/// the deletion timestamp is set; the object is removed once the last
/// finalizer is dropped by an `update`.
pub struct Store<T: Object> {
    objects: RwLock<HashMap<String, T>>,
    watch_tx: broadcast::Sender<Event<T>>,
}

impl<T: Object> Default for Store<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Object> Store<T> {
    pub fn new() -> Self {
        let (watch_tx, _) = broadcast::channel(WATCH_BUFFER);
        Self {
            objects: RwLock::new(HashMap::new()),
            watch_tx,
        }
    }

    fn key(namespace: &str, name: &str) -> String {
        format!("{namespace}/{name}")
    }

    /// Subscribe to change events. Slow consumers may observe lag; they
    /// must treat it as a resync trigger, not an error.
    pub fn watch(&self) -> broadcast::Receiver<Event<T>> {
        self.watch_tx.subscribe()
    }

    fn emit(&self, event: Event<T>) {
        // No receivers is fine; events are level-triggered hints.
        let _ = self.watch_tx.send(event);
    }

    /// Fetch one object.
    pub async fn get(&self, namespace: &str, name: &str) -> Result<T> {
        self.try_get(namespace, name).await.ok_or(StoreError::NotFound {
            kind: T::KIND,
            key: Self::key(namespace, name),
        })
    }

    /// Fetch one object, None when absent.
    pub async fn try_get(&self, namespace: &str, name: &str) -> Option<T> {
        self.objects
            .read()
            .await
            .get(&Self::key(namespace, name))
            .cloned()
    }

    /// List objects, optionally restricted to one namespace.
    pub async fn list(&self, namespace: Option<&str>) -> Vec<T> {
        let objects = self.objects.read().await;
        let mut items: Vec<T> = objects
            .values()
            .filter(|obj| namespace.map_or(true, |ns| obj.meta().namespace == ns))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.meta().name.cmp(&b.meta().name));
        items
    }

    /// Create an object. The store assigns uid, resource version,
    /// generation and creation timestamp.
    pub async fn create(&self, mut object: T) -> Result<T> {
        let key = object.meta().key();
        let mut objects = self.objects.write().await;
        if objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists { kind: T::KIND, key });
        }

        let meta = object.meta_mut();
        meta.uid = Some(uuid::Uuid::new_v4().to_string());
        meta.resource_version = 1;
        meta.generation = 1;
        meta.creation_timestamp = Some(Utc::now());
        meta.deletion_timestamp = None;

        objects.insert(key.clone(), object.clone());
        drop(objects);

        debug!(kind = T::KIND, key = %key, "Object created");
        self.emit(Event::Applied(object.clone()));
        Ok(object)
    }

    /// Spec-level update: CAS on resource version, bumps the generation.
    pub async fn update(&self, object: T) -> Result<T> {
        self.write(object, true).await
    }

    /// Status-level update: CAS on resource version, generation untouched.
    pub async fn update_status(&self, object: T) -> Result<T> {
        self.write(object, false).await
    }

    async fn write(&self, mut object: T, bump_generation: bool) -> Result<T> {
        let key = object.meta().key();
        let mut objects = self.objects.write().await;
        let stored = objects.get(&key).ok_or_else(|| StoreError::NotFound {
            kind: T::KIND,
            key: key.clone(),
        })?;

        let stored_version = stored.meta().resource_version;
        let submitted_version = object.meta().resource_version;
        if stored_version != submitted_version {
            return Err(StoreError::Conflict {
                kind: T::KIND,
                key,
                stored: stored_version,
                submitted: submitted_version,
            });
        }

        // Unchanged writes are elided: no version bump, no event. Without
        // this, a reconciler that rewrites identical status re-triggers
        // itself through its own watch forever.
        if *stored == object {
            return Ok(object);
        }

        // GC: dropping the last finalizer of a deleting object removes it.
        if object.meta().is_deleting() && object.meta().finalizers.is_empty() {
            objects.remove(&key);
            drop(objects);
            debug!(kind = T::KIND, key = %key, "Object removed after final finalizer");
            self.emit(Event::Deleted(object.clone()));
            return Ok(object);
        }

        {
            let meta = object.meta_mut();
            meta.resource_version = stored_version + 1;
            if bump_generation {
                meta.generation += 1;
            }
        }
        objects.insert(key.clone(), object.clone());
        drop(objects);

        self.emit(Event::Applied(object.clone()));
        Ok(object)
    }

    /// Request deletion.
    ///
    /// With finalizers present this only sets the deletion timestamp and
    /// re-emits the object; otherwise it removes the object immediately.
    pub async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        let key = Self::key(namespace, name);
        let mut objects = self.objects.write().await;
        let Some(stored) = objects.get_mut(&key) else {
            // Idempotent deletes keep retry loops simple.
            return Ok(());
        };

        if stored.meta().finalizers.is_empty() {
            let object = objects.remove(&key).expect("checked above");
            drop(objects);
            debug!(kind = T::KIND, key = %key, "Object removed");
            self.emit(Event::Deleted(object));
            return Ok(());
        }

        if stored.meta().deletion_timestamp.is_none() {
            let meta = stored.meta_mut();
            meta.deletion_timestamp = Some(Utc::now());
            meta.resource_version += 1;
            let object = stored.clone();
            drop(objects);
            debug!(kind = T::KIND, key = %key, "Deletion requested, awaiting finalizers");
            self.emit(Event::Applied(object));
        }
        Ok(())
    }

    /// Read-modify-write with conflict retry, spec-level.
    pub async fn modify<F>(&self, namespace: &str, name: &str, mut mutate: F) -> Result<T>
    where
        F: FnMut(&mut T),
    {
        loop {
            let mut object = self.get(namespace, name).await?;
            mutate(&mut object);
            match self.update(object).await {
                Ok(updated) => return Ok(updated),
                Err(e) if e.is_conflict() => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Read-modify-write with conflict retry, status-level.
    pub async fn modify_status<F>(&self, namespace: &str, name: &str, mut mutate: F) -> Result<T>
    where
        F: FnMut(&mut T),
    {
        loop {
            let mut object = self.get(namespace, name).await?;
            mutate(&mut object);
            match self.update_status(object).await {
                Ok(updated) => return Ok(updated),
                Err(e) if e.is_conflict() => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use virtrigaud_api::meta::ObjectMeta;
    use virtrigaud_api::v1beta1::{VMClassSpec, VMClass};

    fn vmclass(name: &str) -> VMClass {
        VMClass {
            metadata: ObjectMeta::named("default", name),
            spec: VMClassSpec {
                cpu: 2,
                memory: "2Gi".to_string(),
                firmware: Default::default(),
                disk_defaults: None,
                guest_tools: Default::default(),
                performance_profile: None,
                security_profile: None,
                extra_config: Default::default(),
            },
        }
    }

    #[tokio::test]
    async fn test_create_get_list() {
        let store = Store::<VMClass>::new();
        let created = store.create(vmclass("medium")).await.unwrap();
        assert_eq!(created.metadata.resource_version, 1);
        assert!(created.metadata.uid.is_some());

        assert!(store.get("default", "medium").await.is_ok());
        assert!(store.get("default", "missing").await.is_err());
        assert_eq!(store.list(Some("default")).await.len(), 1);
        assert_eq!(store.list(Some("other")).await.len(), 0);
    }

    #[tokio::test]
    async fn test_stale_update_conflicts() {
        let store = Store::<VMClass>::new();
        let created = store.create(vmclass("medium")).await.unwrap();

        let mut first = created.clone();
        first.spec.cpu = 4;
        store.update(first).await.unwrap();

        // Second writer still holds version 1.
        let mut second = created;
        second.spec.cpu = 8;
        let err = store.update(second).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_update_bumps_generation_but_status_does_not() {
        let store = Store::<VMClass>::new();
        let created = store.create(vmclass("medium")).await.unwrap();
        assert_eq!(created.metadata.generation, 1);

        let mut changed = created;
        changed.spec.cpu = 4;
        let updated = store.update(changed).await.unwrap();
        assert_eq!(updated.metadata.generation, 2);

        let mut status_write = updated;
        status_write.spec.cpu = 8;
        let status_updated = store.update_status(status_write).await.unwrap();
        assert_eq!(status_updated.metadata.generation, 2);
        assert_eq!(status_updated.metadata.resource_version, 3);
    }

    #[tokio::test]
    async fn test_unchanged_write_is_elided() {
        let store = Store::<VMClass>::new();
        let created = store.create(vmclass("medium")).await.unwrap();
        let mut watcher = store.watch();

        let written = store.update_status(created.clone()).await.unwrap();
        assert_eq!(written.metadata.resource_version, 1);
        // No event must have been emitted for the no-op write.
        assert!(matches!(
            watcher.try_recv(),
            Err(tokio::sync::broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_finalizer_defers_removal() {
        let store = Store::<VMClass>::new();
        let mut object = vmclass("protected");
        object.metadata.finalizers.push("test/finalizer".to_string());
        store.create(object).await.unwrap();

        store.delete("default", "protected").await.unwrap();
        let deleting = store.get("default", "protected").await.unwrap();
        assert!(deleting.metadata.is_deleting());

        // Dropping the finalizer lets the store GC the object.
        let mut final_write = deleting;
        final_write.metadata.finalizers.clear();
        store.update(final_write).await.unwrap();
        assert!(store.try_get("default", "protected").await.is_none());
    }

    #[tokio::test]
    async fn test_watch_sees_lifecycle() {
        let store = Store::<VMClass>::new();
        let mut watcher = store.watch();

        store.create(vmclass("watched")).await.unwrap();
        match watcher.recv().await.unwrap() {
            Event::Applied(obj) => assert_eq!(obj.metadata.name, "watched"),
            other => panic!("expected Applied, got {other:?}"),
        }

        store.delete("default", "watched").await.unwrap();
        match watcher.recv().await.unwrap() {
            Event::Deleted(obj) => assert_eq!(obj.metadata.name, "watched"),
            other => panic!("expected Deleted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_modify_retries_conflicts() {
        let store = Store::<VMClass>::new();
        store.create(vmclass("medium")).await.unwrap();
        let updated = store
            .modify("default", "medium", |c| c.spec.cpu = 16)
            .await
            .unwrap();
        assert_eq!(updated.spec.cpu, 16);
    }
}
