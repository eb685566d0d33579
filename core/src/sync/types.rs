//! Subscription domain types.

use std::sync::Arc;

use crate::error::CoreError;
use crate::graph::{Role, Task, WorkspaceId};

/// Identity of a live view: one subscription exists per key at a time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    /// Workspace being watched.
    pub workspace_id: WorkspaceId,
    /// Viewer role the query was shaped for.
    pub role: Role,
}

/// Handle returned by `subscribe`; passing it back tears the view down.
///
/// The generation pins the handle to one subscription lifetime, so a handle
/// from a torn-down subscription cannot cancel its successor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    key: SubscriptionKey,
    generation: u64,
}

impl SubscriptionHandle {
    pub(crate) fn new(key: SubscriptionKey, generation: u64) -> Self {
        Self { key, generation }
    }

    /// The key this handle subscribes to.
    #[must_use]
    pub fn key(&self) -> &SubscriptionKey {
        &self.key
    }

    /// Generation of the underlying subscription.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// A full replacement view of the task graph.
///
/// Snapshots are immutable; downstream components only ever read them, and
/// each delivery supersedes the previous one entirely.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Key the snapshot was produced under.
    pub key: SubscriptionKey,
    /// Monotonic sequence number; later snapshots supersede earlier ones.
    pub seq: u64,
    /// The tasks, shared cheaply across observers.
    pub tasks: Arc<Vec<Task>>,
}

/// Event delivered to subscription observers.
#[derive(Debug, Clone)]
pub enum GraphEvent {
    /// A new authoritative (or locally patched) snapshot.
    Snapshot(Snapshot),
    /// The store failed; the last snapshot stays available, stale.
    Error(Arc<CoreError>),
}
