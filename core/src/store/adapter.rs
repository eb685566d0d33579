//! Store adapter trait and wire types.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

/// Names of the persisted document collections.
pub mod collections {
    /// Workspace documents.
    pub const WORKSPACES: &str = "workspaces";
    /// Membership bindings, one per (workspace, user).
    pub const WORKSPACE_MEMBERS: &str = "workspaceMembers";
    /// Task documents, embedding `subtasks[]` and `updates[]`.
    pub const TASKS: &str = "tasks";
    /// Task-scoped invitations.
    pub const TASK_INVITATIONS: &str = "taskInvitations";
    /// Workspace-scoped invitations.
    pub const WORKSPACE_INVITATIONS: &str = "workspaceInvitations";
}

/// Errors raised by a store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A document failed to (de)serialize.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// The referenced document does not exist.
    #[error("No document {id} in {collection}")]
    Missing {
        /// Collection queried.
        collection: String,
        /// Document id.
        id: String,
    },
    /// A document was not an object or lacked a usable `id` field.
    #[error("Malformed document: {0}")]
    Malformed(String),
    /// Opaque transport or backend failure.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// A single condition on a document field.
///
/// The predicate vocabulary mirrors what the backing store can index:
/// equality and array membership. Finer filtering happens client-side.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `doc[field] == value`.
    Eq {
        /// Field name.
        field: String,
        /// Expected value.
        value: Value,
    },
    /// `doc[field]` is an array containing `value`.
    ArrayContains {
        /// Field name.
        field: String,
        /// Element to look for.
        value: Value,
    },
}

impl Predicate {
    /// Equality predicate.
    #[must_use]
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Array-membership predicate.
    #[must_use]
    pub fn array_contains(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::ArrayContains {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Evaluates the predicate against a document.
    #[must_use]
    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Predicate::Eq { field, value } => doc.get(field) == Some(value),
            Predicate::ArrayContains { field, value } => doc
                .get(field)
                .and_then(Value::as_array)
                .is_some_and(|arr| arr.contains(value)),
        }
    }
}

/// One write inside an atomic batch.
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Insert a new document.
    Create {
        /// Target collection.
        collection: String,
        /// Document body; an `id` field is assigned if absent.
        doc: Value,
    },
    /// Shallow-merge a partial document into an existing one.
    Update {
        /// Target collection.
        collection: String,
        /// Document id.
        id: String,
        /// Fields to merge.
        patch: Value,
        /// Create the document if it does not exist.
        create_if_missing: bool,
    },
    /// Remove a document.
    Delete {
        /// Target collection.
        collection: String,
        /// Document id.
        id: String,
    },
}

/// Event delivered on a live query channel.
#[derive(Debug)]
pub enum StoreEvent {
    /// Full replacement of the query's current result set.
    Snapshot(Vec<Value>),
    /// The backend failed; the subscription is dead after this.
    Error(StoreError),
}

/// Cancels a live query when invoked (or dropped).
pub struct UnsubscribeGuard {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl UnsubscribeGuard {
    /// Wraps a cancellation closure.
    #[must_use]
    pub fn new(cancel: Box<dyn FnOnce() + Send>) -> Self {
        Self {
            cancel: Some(cancel),
        }
    }

    /// Cancels the subscription now.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for UnsubscribeGuard {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for UnsubscribeGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnsubscribeGuard")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// A live query: a channel of [`StoreEvent`]s plus its cancellation guard.
///
/// The first snapshot is delivered immediately on subscription; each
/// subsequent snapshot is a full replacement, never a diff.
#[derive(Debug)]
pub struct LiveQuery {
    rx: mpsc::UnboundedReceiver<StoreEvent>,
    guard: UnsubscribeGuard,
}

impl LiveQuery {
    /// Assembles a live query from its channel and guard.
    #[must_use]
    pub fn new(rx: mpsc::UnboundedReceiver<StoreEvent>, guard: UnsubscribeGuard) -> Self {
        Self { rx, guard }
    }

    /// Receives the next event, or `None` once the backend drops the query.
    pub async fn recv(&mut self) -> Option<StoreEvent> {
        self.rx.recv().await
    }

    /// Splits into the receiving half and the cancellation guard, so the
    /// owner can tear the query down without holding the receiver.
    #[must_use]
    pub fn into_parts(self) -> (mpsc::UnboundedReceiver<StoreEvent>, UnsubscribeGuard) {
        (self.rx, self.guard)
    }
}

/// Asynchronous document store consumed by the engine.
///
/// Implementations must deliver live-query snapshots in order and make a
/// batch's writes observable together: no snapshot may reflect a strict
/// subset of one batch.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Inserts a document and returns its id.
    async fn create(&self, collection: &str, doc: Value) -> Result<String, StoreError>;

    /// Reads a document by id, `None` if absent.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError>;

    /// Shallow-merges `patch` into the document.
    ///
    /// Fails with [`StoreError::Missing`] when the document is absent and
    /// `create_if_missing` is false.
    async fn update(
        &self,
        collection: &str,
        id: &str,
        patch: Value,
        create_if_missing: bool,
    ) -> Result<(), StoreError>;

    /// Deletes a document. Deleting an absent document is a no-op.
    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;

    /// Returns all documents matching every predicate.
    async fn query_where(
        &self,
        collection: &str,
        predicates: &[Predicate],
    ) -> Result<Vec<Value>, StoreError>;

    /// Applies a batch of writes atomically: either all writes land and are
    /// observed together, or none do.
    async fn run_batch(&self, ops: Vec<WriteOp>) -> Result<(), StoreError>;

    /// Opens a live query over `collection` filtered by `predicates`.
    fn subscribe(&self, collection: &str, predicates: Vec<Predicate>) -> LiveQuery;
}

/// Serializes a typed value into a store document.
///
/// # Errors
///
/// Returns an error if the value cannot be represented as JSON.
pub fn to_doc<T: Serialize>(value: &T) -> Result<Value, StoreError> {
    Ok(serde_json::to_value(value)?)
}

/// Deserializes a store document into a typed value.
///
/// # Errors
///
/// Returns an error if the document does not match the expected shape.
pub fn from_doc<T: DeserializeOwned>(doc: Value) -> Result<T, StoreError> {
    Ok(serde_json::from_value(doc)?)
}
