//! Deduplicating workqueue with per-key serialization.
//!
//! Keys added while queued are coalesced; keys added while being processed
//! are re-queued when the worker calls [`WorkQueue::done`]. A key is never
//! handed to two workers at once, which is what lets reconcilers assume
//! single-object serialization.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::trace;

/// "namespace/name" identity of one object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Parse a "namespace/name" string.
    pub fn parse(key: &str) -> Option<Self> {
        let (namespace, name) = key.split_once('/')?;
        Some(Self::new(namespace, name))
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

struct QueueInner {
    queue: VecDeque<ObjectKey>,
    queued: HashSet<ObjectKey>,
    active: HashSet<ObjectKey>,
    /// Keys that changed while active; re-queued on done()
    redo: HashSet<ObjectKey>,
    closed: bool,
}

/// The reconciler workqueue.
pub struct WorkQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                queue: VecDeque::new(),
                queued: HashSet::new(),
                active: HashSet::new(),
                redo: HashSet::new(),
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Enqueue a key. Duplicates of queued keys coalesce; keys currently
    /// being processed are marked for re-delivery instead.
    pub fn add(&self, key: ObjectKey) {
        let mut inner = self.inner.lock().expect("queue lock poisoned");
        if inner.closed {
            return;
        }
        if inner.active.contains(&key) {
            trace!(key = %key, "Key active, marking redo");
            inner.redo.insert(key);
            return;
        }
        if inner.queued.insert(key.clone()) {
            inner.queue.push_back(key);
            drop(inner);
            self.notify.notify_one();
        }
    }

    /// Enqueue a key after `delay`.
    pub fn add_after(self: &Arc<Self>, key: ObjectKey, delay: Duration) {
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key);
        });
    }

    /// Wait for the next key. None once the queue is closed and drained.
    ///
    /// The returned key is marked active; the worker must call [`done`]
    /// when it finishes, whatever the outcome.
    ///
    /// [`done`]: WorkQueue::done
    pub async fn next(&self) -> Option<ObjectKey> {
        loop {
            {
                let mut inner = self.inner.lock().expect("queue lock poisoned");
                if let Some(key) = inner.queue.pop_front() {
                    inner.queued.remove(&key);
                    inner.active.insert(key.clone());
                    return Some(key);
                }
                if inner.closed {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Mark a key finished; re-queues it when changes arrived meanwhile.
    pub fn done(&self, key: &ObjectKey) {
        let mut inner = self.inner.lock().expect("queue lock poisoned");
        inner.active.remove(key);
        if inner.redo.remove(key) && !inner.closed && inner.queued.insert(key.clone()) {
            inner.queue.push_back(key.clone());
            drop(inner);
            self.notify.notify_one();
        }
    }

    /// Close the queue; workers drain what is left and stop.
    pub fn close(&self) {
        self.inner.lock().expect("queue lock poisoned").closed = true;
        self.notify.notify_waiters();
    }

    /// Queued (not active) key count.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("queue lock poisoned").queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_duplicate_adds_coalesce() {
        let queue = WorkQueue::new();
        let key = ObjectKey::new("default", "web-01");
        queue.add(key.clone());
        queue.add(key.clone());
        queue.add(key.clone());
        assert_eq!(queue.len(), 1);

        let got = queue.next().await.unwrap();
        assert_eq!(got, key);
        queue.done(&got);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_add_while_active_redelivers() {
        let queue = WorkQueue::new();
        let key = ObjectKey::new("default", "web-01");
        queue.add(key.clone());

        let got = queue.next().await.unwrap();
        // Change arrives mid-reconcile.
        queue.add(key.clone());
        assert_eq!(queue.len(), 0);

        queue.done(&got);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.next().await.unwrap(), key);
    }

    #[tokio::test]
    async fn test_add_after_delivers_later() {
        let queue = Arc::new(WorkQueue::new());
        let key = ObjectKey::new("default", "web-01");
        queue.add_after(key.clone(), Duration::from_millis(5));
        let got = tokio::time::timeout(Duration::from_secs(1), queue.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, key);
    }

    #[tokio::test]
    async fn test_close_unblocks_workers() {
        let queue = Arc::new(WorkQueue::new());
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.next().await })
        };
        queue.close();
        assert!(waiter.await.unwrap().is_none());
    }
}
