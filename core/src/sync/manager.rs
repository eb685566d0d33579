//! Subscription lifecycle and snapshot merging.

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::types::{GraphEvent, Snapshot, SubscriptionHandle, SubscriptionKey};
use crate::error::CoreError;
use crate::graph::{Role, Task, UserId, WorkspaceId};
use crate::store::{
    collections, from_doc, DocumentStore, Predicate, StoreError, StoreEvent, UnsubscribeGuard,
};

const EVENT_CAPACITY: usize = 256;

/// Lifecycle of the single live subscription.
///
/// An explicit tagged state with a generation counter, so a stale async
/// result can never write into a slot reused for a new key.
enum SubscriptionState {
    /// No live subscription.
    Idle,
    /// Key chosen, store subscription being established.
    Subscribing {
        generation: u64,
        key: SubscriptionKey,
    },
    /// Live and delivering snapshots.
    Active {
        generation: u64,
        key: SubscriptionKey,
        guard: UnsubscribeGuard,
        driver: JoinHandle<()>,
    },
}

impl SubscriptionState {
    fn current(&self) -> Option<(u64, &SubscriptionKey)> {
        match self {
            SubscriptionState::Idle => None,
            SubscriptionState::Subscribing { generation, key }
            | SubscriptionState::Active {
                generation, key, ..
            } => Some((*generation, key)),
        }
    }
}

struct SyncState {
    state: Mutex<SubscriptionState>,
    generation: AtomicU64,
    seq: AtomicU64,
    /// Sequence of the newest primary snapshot; secondary merges check this
    /// to know whether they have been superseded.
    latest_primary_seq: AtomicU64,
    last_snapshot: RwLock<Option<Snapshot>>,
    events: broadcast::Sender<GraphEvent>,
}

impl SyncState {
    fn is_current(&self, generation: u64) -> bool {
        self.state
            .lock()
            .current()
            .is_some_and(|(current, _)| current == generation)
    }

    /// Installs `snapshot` and broadcasts it.
    ///
    /// Refused when the subscription key has moved on, or when an installed
    /// snapshot already carries a higher sequence: a late merge result must
    /// never rewind the delivered view. The checks run under the state and
    /// snapshot locks so a concurrent primary delivery cannot slip between
    /// them.
    fn publish(&self, snapshot: Snapshot) {
        let state = self.state.lock();
        if !state
            .current()
            .is_some_and(|(_, key)| *key == snapshot.key)
        {
            debug!(seq = snapshot.seq, "Dropping snapshot for a retired key");
            return;
        }
        let mut last = self.last_snapshot.write();
        if let Some(current) = last.as_ref() {
            if snapshot.seq < current.seq {
                debug!(
                    seq = snapshot.seq,
                    installed = current.seq,
                    "Dropping out-of-order snapshot"
                );
                return;
            }
        }
        *last = Some(snapshot.clone());
        let _ = self.events.send(GraphEvent::Snapshot(snapshot));
    }

    /// Forwards a store failure and leaves the manager unsubscribed.
    /// The last snapshot is kept: a transient error must not blank a live
    /// view.
    fn fail(&self, generation: u64, error: StoreError) {
        {
            let mut state = self.state.lock();
            if state
                .current()
                .is_some_and(|(current, _)| current == generation)
            {
                // The driver observing the error is the one being torn down;
                // dropping its guard closes the store-side query.
                *state = SubscriptionState::Idle;
            }
        }
        let _ = self
            .events
            .send(GraphEvent::Error(Arc::new(CoreError::Store(error))));
    }
}

/// Owns the single live subscription per `(workspace, role)` key.
pub struct SubscriptionManager {
    store: Arc<dyn DocumentStore>,
    inner: Arc<SyncState>,
}

impl SubscriptionManager {
    /// Creates a manager with the default observer channel capacity.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_capacity(store, EVENT_CAPACITY)
    }

    /// Creates a manager with an explicit observer channel capacity.
    #[must_use]
    pub fn with_capacity(store: Arc<dyn DocumentStore>, capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity);
        Self {
            store,
            inner: Arc::new(SyncState {
                state: Mutex::new(SubscriptionState::Idle),
                generation: AtomicU64::new(0),
                seq: AtomicU64::new(0),
                latest_primary_seq: AtomicU64::new(0),
                last_snapshot: RwLock::new(None),
                events,
            }),
        }
    }

    /// Subscribes to the live view for `(workspace_id, role)` as `viewer`.
    ///
    /// Subscribing to the key already live is a no-op returning the existing
    /// handle: exactly one store subscription exists per key. A key change
    /// tears the old subscription down synchronously and clears the cached
    /// snapshot before the new one is established, so stale data is never
    /// observed under the new key.
    pub fn subscribe(
        &self,
        workspace_id: WorkspaceId,
        viewer: UserId,
        role: Role,
    ) -> SubscriptionHandle {
        let key = SubscriptionKey { workspace_id, role };
        let mut state = self.inner.state.lock();

        if let Some((generation, current)) = state.current() {
            if current == &key {
                debug!(generation, "Subscribe is a no-op, key already live");
                return SubscriptionHandle::new(key, generation);
            }
        }

        Self::teardown(&mut state);
        *self.inner.last_snapshot.write() = None;

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *state = SubscriptionState::Subscribing {
            generation,
            key: key.clone(),
        };

        let live = self
            .store
            .subscribe(collections::TASKS, primary_predicates(&key, &viewer));
        let (rx, guard) = live.into_parts();
        let driver = tokio::spawn(drive(
            Arc::clone(&self.store),
            Arc::clone(&self.inner),
            key.clone(),
            viewer,
            generation,
            rx,
        ));
        debug!(generation, workspace = %key.workspace_id, role = %key.role, "Subscription established");

        *state = SubscriptionState::Active {
            generation,
            key: key.clone(),
            guard,
            driver,
        };
        SubscriptionHandle::new(key, generation)
    }

    /// Tears down the subscription the handle refers to, if still live.
    /// Handles from superseded generations are ignored.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        let mut state = self.inner.state.lock();
        let matches = state
            .current()
            .is_some_and(|(generation, _)| generation == handle.generation());
        if matches {
            Self::teardown(&mut state);
            *self.inner.last_snapshot.write() = None;
            debug!(generation = handle.generation(), "Unsubscribed");
        }
    }

    /// Attaches an observer to the snapshot/error stream.
    #[must_use]
    pub fn observe(&self) -> broadcast::Receiver<GraphEvent> {
        self.inner.events.subscribe()
    }

    /// The last delivered snapshot, if any. Stays available (stale) after a
    /// store error.
    #[must_use]
    pub fn snapshot(&self) -> Option<Snapshot> {
        self.inner.last_snapshot.read().clone()
    }

    /// Applies an optimistic local patch: replaces (or inserts) `task` in
    /// the cached snapshot for immediate consumer feedback.
    ///
    /// The patch is provisional; the next authoritative snapshot replaces
    /// the graph wholesale and reconciles it away.
    pub fn patch_local(&self, task: Task) {
        let patched = {
            let last = self.inner.last_snapshot.read();
            let Some(snapshot) = last.as_ref() else {
                return;
            };
            if snapshot.key.workspace_id != task.workspace_id {
                return;
            }
            let mut tasks: Vec<Task> = (*snapshot.tasks).clone();
            match tasks.iter_mut().find(|t| t.id == task.id) {
                Some(slot) => *slot = task,
                None => tasks.push(task),
            }
            Snapshot {
                key: snapshot.key.clone(),
                seq: snapshot.seq,
                tasks: Arc::new(tasks),
            }
        };
        self.inner.publish(patched);
    }

    fn teardown(state: &mut SubscriptionState) {
        let old = std::mem::replace(state, SubscriptionState::Idle);
        if let SubscriptionState::Active { guard, driver, .. } = old {
            // Store-side query is closed before the new key subscribes.
            guard.unsubscribe();
            driver.abort();
        }
    }
}

/// Primary query predicates per role. Privileged roles stream the whole
/// workspace; others stream only direct assignments, and the driver tops
/// that up with a secondary fetch.
fn primary_predicates(key: &SubscriptionKey, viewer: &UserId) -> Vec<Predicate> {
    let workspace = Predicate::eq("workspaceId", key.workspace_id.as_str());
    if key.role.is_privileged() {
        vec![workspace]
    } else {
        vec![
            workspace,
            Predicate::array_contains("assigneeIds", viewer.as_str()),
        ]
    }
}

/// Consumes store events for one subscription generation.
async fn drive(
    store: Arc<dyn DocumentStore>,
    inner: Arc<SyncState>,
    key: SubscriptionKey,
    viewer: UserId,
    generation: u64,
    mut rx: mpsc::UnboundedReceiver<StoreEvent>,
) {
    while let Some(event) = rx.recv().await {
        match event {
            StoreEvent::Snapshot(docs) => {
                if !inner.is_current(generation) {
                    break;
                }
                let tasks = decode_tasks(docs);
                let seq = inner.seq.fetch_add(1, Ordering::SeqCst) + 1;
                inner.latest_primary_seq.store(seq, Ordering::SeqCst);
                let snapshot = Snapshot {
                    key: key.clone(),
                    seq,
                    tasks: Arc::new(tasks),
                };
                // Primary applies before any merge for the same delivery.
                inner.publish(snapshot);

                if !key.role.is_privileged() {
                    spawn_secondary_fetch(
                        Arc::clone(&store),
                        Arc::clone(&inner),
                        key.clone(),
                        viewer.clone(),
                        generation,
                        seq,
                    );
                }
            }
            StoreEvent::Error(error) => {
                warn!(%error, generation, "Live query failed; forwarding to observers");
                inner.fail(generation, error);
                break;
            }
        }
    }
}

/// Issues the secondary fetch covering tasks the primary query cannot
/// express: the viewer appears only inside a subtask's assignee set, or (for
/// managers) is the creator without being assigned.
fn spawn_secondary_fetch(
    store: Arc<dyn DocumentStore>,
    inner: Arc<SyncState>,
    key: SubscriptionKey,
    viewer: UserId,
    generation: u64,
    primary_seq: u64,
) {
    tokio::spawn(async move {
        let result = store
            .query_where(
                collections::TASKS,
                &[Predicate::eq("workspaceId", key.workspace_id.as_str())],
            )
            .await;
        match result {
            Ok(docs) => merge_secondary(&inner, &key, &viewer, generation, primary_seq, docs),
            Err(error) => {
                warn!(%error, "Secondary fetch failed; primary snapshot stands");
            }
        }
    });
}

fn merge_secondary(
    inner: &SyncState,
    key: &SubscriptionKey,
    viewer: &UserId,
    generation: u64,
    primary_seq: u64,
    docs: Vec<serde_json::Value>,
) {
    if !inner.is_current(generation)
        || inner.latest_primary_seq.load(Ordering::SeqCst) != primary_seq
    {
        debug!(generation, primary_seq, "Discarding superseded secondary fetch");
        return;
    }
    let base = {
        let last = inner.last_snapshot.read();
        match last.as_ref() {
            Some(snapshot) if snapshot.key == *key => snapshot.clone(),
            _ => return,
        }
    };

    let mut tasks: Vec<Task> = (*base.tasks).clone();
    let mut added = 0usize;
    for task in decode_tasks(docs) {
        // Primary-query tasks take precedence on id collision.
        if tasks.iter().any(|t| t.id == task.id) {
            continue;
        }
        let subtask_only = !task.is_assigned(viewer) && task.has_subtask_assignee(viewer);
        let managed = key.role == Role::Manager && task.creator_id == *viewer;
        if subtask_only || managed {
            tasks.push(task);
            added += 1;
        }
    }
    if added == 0 {
        return;
    }
    debug!(added, primary_seq, "Merged secondary fetch into snapshot");
    inner.publish(Snapshot {
        key: key.clone(),
        seq: primary_seq,
        tasks: Arc::new(tasks),
    });
}

fn decode_tasks(docs: Vec<serde_json::Value>) -> Vec<Task> {
    let mut tasks = Vec::with_capacity(docs.len());
    for doc in docs {
        match from_doc::<Task>(doc) {
            Ok(task) => tasks.push(task),
            Err(error) => warn!(%error, "Skipping undecodable task document"),
        }
    }
    tasks
}
