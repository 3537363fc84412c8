//! Controller runtime: the Reconciler trait, requeue policy and worker pools.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use virtrigaud_api::meta::Object;
use virtrigaud_common::backoff::Backoff;
use virtrigaud_provider::error::{ErrorKind, ProviderError};
use virtrigaud_store::{Event, ObjectKey, Store, StoreError, WorkQueue};

/// What a reconciler wants to happen next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Re-run after the given delay
    Requeue(Duration),
    /// Nothing to do until the object (or a dependency) changes
    AwaitChange,
}

impl Action {
    pub fn requeue(delay: Duration) -> Self {
        Action::Requeue(delay)
    }

    pub fn await_change() -> Self {
        Action::AwaitChange
    }
}

/// Reconcile failures, mapped to requeue decisions by [`decide_requeue`].
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// A referenced object is missing or not yet ready.
    #[error("waiting for dependency: {0}")]
    DependencyNotReady(String),

    /// No recovery without a spec change.
    #[error("terminal: {0}")]
    Terminal(String),
}

/// Map an error to a requeue delay per the contract table.
///
/// `attempt` is the consecutive-failure count for this key, driving the
/// exponential backoff for transient kinds. `None` means wait for a spec
/// change instead of requeueing.
pub fn decide_requeue(error: &ReconcileError, attempt: u32) -> Option<Duration> {
    let backoff = Backoff::default();
    match error {
        ReconcileError::Provider(e) => match e.kind() {
            ErrorKind::NotFound | ErrorKind::InvalidSpec | ErrorKind::NotSupported => None,
            ErrorKind::Retryable | ErrorKind::Unavailable | ErrorKind::Timeout => {
                Some(backoff.delay(attempt))
            }
            ErrorKind::RateLimit => Some(backoff.delay(attempt) * 2),
            ErrorKind::Unauthorized | ErrorKind::QuotaExceeded | ErrorKind::Conflict => {
                Some(Duration::from_secs(120))
            }
        },
        ReconcileError::Store(e) if e.is_conflict() => Some(Duration::ZERO),
        ReconcileError::Store(e) if e.is_not_found() => None,
        ReconcileError::Store(_) => Some(backoff.delay(attempt)),
        ReconcileError::DependencyNotReady(_) => Some(backoff.delay(attempt).min(
            Duration::from_secs(30),
        )),
        ReconcileError::Terminal(_) => None,
    }
}

/// One reconciliation loop.
#[async_trait]
pub trait Reconciler: Send + Sync + 'static {
    /// Loop name for logs and spans.
    fn name(&self) -> &'static str;

    /// Drive one object toward its declared state. Must be idempotent and
    /// re-entrant; long provider work is left pending as tasks in status.
    async fn reconcile(&self, key: &ObjectKey) -> Result<Action, ReconcileError>;
}

/// Spawn `parallelism` workers draining `queue` into `reconciler`.
///
/// Each reconcile runs under `budget`; overruns are treated as retryable.
/// Per-key failure counts feed the backoff and reset on success.
pub fn spawn_workers(
    reconciler: Arc<dyn Reconciler>,
    queue: Arc<WorkQueue>,
    parallelism: usize,
    budget: Duration,
) -> Vec<JoinHandle<()>> {
    let attempts: Arc<Mutex<HashMap<ObjectKey, u32>>> = Arc::new(Mutex::new(HashMap::new()));

    (0..parallelism.max(1))
        .map(|worker| {
            let reconciler = Arc::clone(&reconciler);
            let queue = Arc::clone(&queue);
            let attempts = Arc::clone(&attempts);
            tokio::spawn(async move {
                while let Some(key) = queue.next().await {
                    let result =
                        tokio::time::timeout(budget, reconciler.reconcile(&key)).await;

                    match result {
                        Ok(Ok(action)) => {
                            attempts.lock().expect("attempts lock poisoned").remove(&key);
                            if let Action::Requeue(delay) = action {
                                queue.add_after(key.clone(), delay);
                            }
                        }
                        Ok(Err(err)) => {
                            let attempt = {
                                let mut map =
                                    attempts.lock().expect("attempts lock poisoned");
                                let counter = map.entry(key.clone()).or_insert(0);
                                let current = *counter;
                                *counter += 1;
                                current
                            };
                            match decide_requeue(&err, attempt) {
                                Some(delay) => {
                                    debug!(
                                        controller = reconciler.name(),
                                        worker,
                                        key = %key,
                                        attempt,
                                        delay_ms = delay.as_millis() as u64,
                                        error = %err,
                                        "Reconcile failed, requeueing"
                                    );
                                    queue.add_after(key.clone(), delay);
                                }
                                None => {
                                    warn!(
                                        controller = reconciler.name(),
                                        key = %key,
                                        error = %err,
                                        "Reconcile failed terminally, awaiting spec change"
                                    );
                                }
                            }
                        }
                        Err(_) => {
                            error!(
                                controller = reconciler.name(),
                                key = %key,
                                budget_secs = budget.as_secs(),
                                "Reconcile exceeded its budget"
                            );
                            queue.add_after(key.clone(), Duration::from_secs(5));
                        }
                    }

                    queue.done(&key);
                }
            })
        })
        .collect()
}

/// Forward every change of kind `T` into `queue` as its own key.
pub fn pump_watch<T: Object>(store: &Store<T>, queue: Arc<WorkQueue>) -> JoinHandle<()> {
    let mut watcher = store.watch();
    tokio::spawn(async move {
        loop {
            match watcher.recv().await {
                Ok(event) => {
                    let meta = event.object().meta();
                    queue.add(ObjectKey::new(meta.namespace.clone(), meta.name.clone()));
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Watch lagged; continuing with newer events");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Forward changes of kind `T` to the keys of their `owner_kind` owners.
///
/// This is how a VMSet learns that one of its VMs changed.
pub fn pump_owner_watch<T: Object>(
    store: &Store<T>,
    queue: Arc<WorkQueue>,
    owner_kind: &'static str,
) -> JoinHandle<()> {
    let mut watcher = store.watch();
    tokio::spawn(async move {
        loop {
            match watcher.recv().await {
                Ok(event) => {
                    let meta = event.object().meta();
                    for owner in &meta.owner_references {
                        if owner.kind == owner_kind {
                            queue.add(ObjectKey::new(meta.namespace.clone(), owner.name.clone()));
                        }
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Owner watch lagged; continuing with newer events");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Cascade-delete children of kind `C` when their controlling owner of kind
/// `O` leaves the store. Models the orchestrator's owner-reference GC.
pub fn spawn_owner_gc<O: Object, C: Object>(
    owners: &Store<O>,
    children: Arc<Store<C>>,
) -> JoinHandle<()> {
    let mut watcher = owners.watch();
    tokio::spawn(async move {
        loop {
            match watcher.recv().await {
                Ok(Event::Deleted(owner)) => {
                    let meta = owner.meta();
                    let namespace = meta.namespace.clone();
                    let owner_name = meta.name.clone();
                    for child in children.list(Some(&namespace)).await {
                        if child.meta().is_owned_by(O::KIND, &owner_name) {
                            debug!(
                                owner = %owner_name,
                                child = %child.meta().name,
                                "Cascading delete to owned object"
                            );
                            let _ = children
                                .delete(&namespace, &child.meta().name)
                                .await;
                        }
                    }
                }
                Ok(Event::Applied(_)) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "GC watch lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requeue_table() {
        // Terminal kinds wait for a spec change.
        for error in [
            ProviderError::NotFound("x".into()),
            ProviderError::InvalidSpec("x".into()),
            ProviderError::NotSupported("x".into()),
        ] {
            assert_eq!(decide_requeue(&ReconcileError::Provider(error), 0), None);
        }

        // Transient kinds back off.
        let delay = decide_requeue(
            &ReconcileError::Provider(ProviderError::Unavailable("x".into())),
            0,
        )
        .unwrap();
        assert!(delay > Duration::ZERO);

        // Rate limiting backs off at least twice as hard.
        let rate = decide_requeue(
            &ReconcileError::Provider(ProviderError::RateLimit("x".into())),
            0,
        )
        .unwrap();
        assert!(rate >= delay);

        // Quota and auth problems take the long lane.
        assert_eq!(
            decide_requeue(
                &ReconcileError::Provider(ProviderError::QuotaExceeded("x".into())),
                0,
            ),
            Some(Duration::from_secs(120))
        );

        // Store conflicts re-read immediately.
        assert_eq!(
            decide_requeue(
                &ReconcileError::Store(StoreError::Conflict {
                    kind: "VirtualMachine",
                    key: "default/web-01".into(),
                    stored: 4,
                    submitted: 3,
                }),
                0,
            ),
            Some(Duration::ZERO)
        );

        assert_eq!(
            decide_requeue(&ReconcileError::Terminal("bad".into()), 0),
            None
        );
    }
}
