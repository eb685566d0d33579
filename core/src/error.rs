//! Error taxonomy for the Lattice core.
//!
//! Guard violations (`PermissionDenied`, `InvalidState`) are raised before
//! any mutating store call; `Store` wraps transport and backing-store
//! failures so consumers can tell "you can't do that" apart from
//! "try again".

use crate::store::StoreError;

/// Errors produced by the core engine.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A referenced workspace, task, subtask, member, or invitation is absent.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Entity kind, e.g. `"task"` or `"invitation"`.
        kind: &'static str,
        /// Identifier that failed to resolve.
        id: String,
    },
    /// A role or assignment guard rejected the operation.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    /// The operation does not apply to the entity's current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),
    /// The backing store failed; the opaque cause is attached.
    #[error("Store failure: {0}")]
    Store(#[from] StoreError),
}

impl CoreError {
    /// Shorthand for a [`CoreError::NotFound`].
    #[must_use]
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Shorthand for a [`CoreError::PermissionDenied`].
    #[must_use]
    pub fn denied(reason: impl Into<String>) -> Self {
        Self::PermissionDenied(reason.into())
    }

    /// Shorthand for a [`CoreError::InvalidState`].
    #[must_use]
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState(reason.into())
    }
}
