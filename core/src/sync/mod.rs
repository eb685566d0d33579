//! Live task-graph synchronization.
//!
//! The subscription manager keeps one live store query per
//! `(workspace, role)` key, replaces its snapshot wholesale on every
//! delivery, and merges a secondary fetch for subtask-only assignments that
//! the primary query cannot express.

mod manager;
mod types;

pub use manager::SubscriptionManager;
pub use types::{GraphEvent, Snapshot, SubscriptionHandle, SubscriptionKey};
