//! In-memory document store with live query support.
//!
//! Reference implementation of [`DocumentStore`]: collections are maps of
//! JSON documents, live queries re-evaluate on every committed write, and
//! batches commit under a single write lock so their effects are observed
//! together.

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::adapter::{
    DocumentStore, LiveQuery, Predicate, StoreError, StoreEvent, UnsubscribeGuard, WriteOp,
};
use async_trait::async_trait;

type Collections = HashMap<String, BTreeMap<String, Value>>;

struct Watcher {
    id: u64,
    collection: String,
    predicates: Vec<Predicate>,
    tx: mpsc::UnboundedSender<StoreEvent>,
}

#[derive(Default)]
struct Inner {
    collections: RwLock<Collections>,
    watchers: Mutex<Vec<Watcher>>,
    next_watch_id: AtomicU64,
}

impl Inner {
    fn evaluate(&self, collection: &str, predicates: &[Predicate]) -> Vec<Value> {
        let collections = self.collections.read();
        collections
            .get(collection)
            .map(|docs| {
                docs.values()
                    .filter(|doc| predicates.iter().all(|p| p.matches(doc)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Re-runs every live query over the touched collections and pushes the
    /// fresh result set. Dead receivers are dropped.
    fn notify(&self, touched: &HashSet<String>) {
        let mut watchers = self.watchers.lock();
        watchers.retain(|watcher| {
            if !touched.contains(&watcher.collection) {
                return true;
            }
            let snapshot = self.evaluate(&watcher.collection, &watcher.predicates);
            watcher.tx.send(StoreEvent::Snapshot(snapshot)).is_ok()
        });
    }

    fn remove_watcher(&self, id: u64) {
        self.watchers.lock().retain(|w| w.id != id);
    }
}

/// Extracts or assigns the document id, ensuring the doc is an object.
fn ensure_id(doc: &mut Value) -> Result<String, StoreError> {
    let obj = doc
        .as_object_mut()
        .ok_or_else(|| StoreError::Malformed("document is not an object".to_string()))?;
    if let Some(id) = obj.get("id").and_then(Value::as_str) {
        return Ok(id.to_string());
    }
    let id = Uuid::new_v4().to_string();
    obj.insert("id".to_string(), Value::String(id.clone()));
    Ok(id)
}

fn merge_shallow(target: &mut Value, patch: &Value) -> Result<(), StoreError> {
    let patch_obj = patch
        .as_object()
        .ok_or_else(|| StoreError::Malformed("patch is not an object".to_string()))?;
    let target_obj = target
        .as_object_mut()
        .ok_or_else(|| StoreError::Malformed("stored document is not an object".to_string()))?;
    for (key, value) in patch_obj {
        target_obj.insert(key.clone(), value.clone());
    }
    Ok(())
}

/// Applies one write op to a staged view of the collections.
fn apply_op(staged: &mut Collections, op: WriteOp) -> Result<String, StoreError> {
    match op {
        WriteOp::Create {
            collection,
            mut doc,
        } => {
            let id = ensure_id(&mut doc)?;
            staged.entry(collection.clone()).or_default().insert(id, doc);
            Ok(collection)
        }
        WriteOp::Update {
            collection,
            id,
            mut patch,
            create_if_missing,
        } => {
            let docs = staged.entry(collection.clone()).or_default();
            match docs.get_mut(&id) {
                Some(existing) => merge_shallow(existing, &patch)?,
                None if create_if_missing => {
                    if let Some(obj) = patch.as_object_mut() {
                        obj.insert("id".to_string(), Value::String(id.clone()));
                    }
                    docs.insert(id, patch);
                }
                None => {
                    return Err(StoreError::Missing { collection, id });
                }
            }
            Ok(collection)
        }
        WriteOp::Delete { collection, id } => {
            if let Some(docs) = staged.get_mut(&collection) {
                docs.remove(&id);
            }
            Ok(collection)
        }
    }
}

/// In-memory [`DocumentStore`].
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a backend failure into every live query and drops them.
    ///
    /// Test support for exercising subscription error paths; a real backend
    /// produces these on transport loss.
    pub fn emit_error(&self, message: &str) {
        let mut watchers = self.inner.watchers.lock();
        for watcher in watchers.drain(..) {
            let _ = watcher
                .tx
                .send(StoreEvent::Error(StoreError::Backend(message.to_string())));
        }
        warn!(message, "Injected backend failure into live queries");
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    #[instrument(skip(self, doc), fields(collection = %collection))]
    async fn create(&self, collection: &str, doc: Value) -> Result<String, StoreError> {
        let mut doc = doc;
        let id = ensure_id(&mut doc)?;
        {
            let mut collections = self.inner.collections.write();
            collections
                .entry(collection.to_string())
                .or_default()
                .insert(id.clone(), doc);
        }
        debug!(id = %id, "Document created");
        self.inner
            .notify(&HashSet::from([collection.to_string()]));
        Ok(id)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        let collections = self.inner.collections.read();
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    #[instrument(skip(self, patch), fields(collection = %collection, id = %id))]
    async fn update(
        &self,
        collection: &str,
        id: &str,
        patch: Value,
        create_if_missing: bool,
    ) -> Result<(), StoreError> {
        {
            let mut collections = self.inner.collections.write();
            apply_op(
                &mut collections,
                WriteOp::Update {
                    collection: collection.to_string(),
                    id: id.to_string(),
                    patch,
                    create_if_missing,
                },
            )?;
        }
        debug!("Document updated");
        self.inner
            .notify(&HashSet::from([collection.to_string()]));
        Ok(())
    }

    #[instrument(skip(self), fields(collection = %collection, id = %id))]
    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        {
            let mut collections = self.inner.collections.write();
            if let Some(docs) = collections.get_mut(collection) {
                docs.remove(id);
            }
        }
        self.inner
            .notify(&HashSet::from([collection.to_string()]));
        Ok(())
    }

    async fn query_where(
        &self,
        collection: &str,
        predicates: &[Predicate],
    ) -> Result<Vec<Value>, StoreError> {
        Ok(self.inner.evaluate(collection, predicates))
    }

    async fn run_batch(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        let mut touched = HashSet::new();
        {
            let mut collections = self.inner.collections.write();
            // Stage on a copy so a failing op leaves nothing applied.
            let mut staged = collections.clone();
            for op in ops {
                touched.insert(apply_op(&mut staged, op)?);
            }
            *collections = staged;
        }
        debug!(collections = ?touched, "Batch committed");
        self.inner.notify(&touched);
        Ok(())
    }

    fn subscribe(&self, collection: &str, predicates: Vec<Predicate>) -> LiveQuery {
        let (tx, rx) = mpsc::unbounded_channel();
        let watch_id = self.inner.next_watch_id.fetch_add(1, Ordering::SeqCst);

        let initial = self.inner.evaluate(collection, &predicates);
        let _ = tx.send(StoreEvent::Snapshot(initial));

        self.inner.watchers.lock().push(Watcher {
            id: watch_id,
            collection: collection.to_string(),
            predicates,
            tx,
        });
        debug!(watch_id, collection, "Live query opened");

        let inner = Arc::clone(&self.inner);
        let guard = UnsubscribeGuard::new(Box::new(move || {
            inner.remove_watcher(watch_id);
            debug!(watch_id, "Live query closed");
        }));
        LiveQuery::new(rx, guard)
    }
}
