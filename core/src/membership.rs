//! Workspace membership resolution.
//!
//! Resolves a caller's role within a workspace from the `workspaceMembers`
//! collection. The resolver caches one workspace's member table at a time
//! and reloads it when the caller switches workspace.

use parking_lot::RwLock;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::error::CoreError;
use crate::graph::{Member, Role, UserId, WorkspaceId};
use crate::store::{collections, from_doc, to_doc, DocumentStore, Predicate, StoreError};

/// Resolves and caches per-workspace roles.
pub struct MembershipResolver {
    store: Arc<dyn DocumentStore>,
    cache: RwLock<Option<(WorkspaceId, HashMap<UserId, Role>)>>,
}

impl MembershipResolver {
    /// Creates a resolver over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            cache: RwLock::new(None),
        }
    }

    /// Resolves `user`'s role in `workspace`.
    ///
    /// The first call for a workspace loads its full member table; later
    /// calls for the same workspace are served from the cache. Switching
    /// workspace discards the previous table.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the user is not a member, or a
    /// store failure if the member query fails.
    #[instrument(skip(self), fields(workspace = %workspace, user = %user))]
    pub async fn resolve(
        &self,
        workspace: &WorkspaceId,
        user: &UserId,
    ) -> Result<Role, CoreError> {
        if let Some(role) = self.cached_role(workspace, user) {
            return role;
        }

        let docs = self
            .store
            .query_where(
                collections::WORKSPACE_MEMBERS,
                &[Predicate::eq("workspaceId", workspace.as_str())],
            )
            .await?;

        let mut table = HashMap::with_capacity(docs.len());
        for doc in docs {
            let member: Member = from_doc(doc)?;
            table.insert(member.user_id, member.role);
        }
        debug!(members = table.len(), "Loaded workspace member table");

        let role = table.get(user).copied();
        *self.cache.write() = Some((workspace.clone(), table));

        role.ok_or_else(|| CoreError::not_found("member", Member::doc_id(workspace, user)))
    }

    /// Discards the cached member table, forcing a reload on next resolve.
    pub fn invalidate(&self) {
        *self.cache.write() = None;
    }

    /// Grants or changes `target`'s role. Requires `actor_role` admin+.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::PermissionDenied`] for non-admin actors, or a
    /// store failure if the write fails.
    pub async fn set_role(
        &self,
        workspace: &WorkspaceId,
        actor_role: Role,
        target: &UserId,
        role: Role,
    ) -> Result<(), CoreError> {
        if !actor_role.is_privileged() {
            return Err(CoreError::denied(format!(
                "{actor_role} may not manage workspace members"
            )));
        }
        let member = Member {
            workspace_id: workspace.clone(),
            user_id: target.clone(),
            role,
        };
        self.store
            .update(
                collections::WORKSPACE_MEMBERS,
                &Member::doc_id(workspace, target),
                to_doc(&member)?,
                true,
            )
            .await?;
        self.invalidate();
        Ok(())
    }

    /// Removes `target` from the workspace. Requires `actor_role` admin+.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::PermissionDenied`] for non-admin actors, or a
    /// store failure if the delete fails.
    pub async fn remove_member(
        &self,
        workspace: &WorkspaceId,
        actor_role: Role,
        target: &UserId,
    ) -> Result<(), CoreError> {
        if !actor_role.is_privileged() {
            return Err(CoreError::denied(format!(
                "{actor_role} may not manage workspace members"
            )));
        }
        self.store
            .delete(
                collections::WORKSPACE_MEMBERS,
                &Member::doc_id(workspace, target),
            )
            .await?;
        self.invalidate();
        Ok(())
    }

    fn cached_role(
        &self,
        workspace: &WorkspaceId,
        user: &UserId,
    ) -> Option<Result<Role, CoreError>> {
        let cache = self.cache.read();
        let (cached_workspace, table) = cache.as_ref()?;
        if cached_workspace != workspace {
            return None;
        }
        Some(table.get(user).copied().ok_or_else(|| {
            CoreError::not_found("member", Member::doc_id(workspace, user))
        }))
    }
}

/// Serializes a member record under its composite document id.
pub(crate) fn member_doc(member: &Member) -> Result<serde_json::Value, StoreError> {
    let mut doc = to_doc(member)?;
    if let Some(obj) = doc.as_object_mut() {
        obj.insert(
            "id".to_string(),
            json!(Member::doc_id(&member.workspace_id, &member.user_id)),
        );
    }
    Ok(doc)
}

/// Convenience for seeding the owner's member record at workspace creation.
///
/// # Errors
///
/// Returns a store failure if the write fails.
pub async fn seed_owner(
    store: &dyn DocumentStore,
    workspace: &WorkspaceId,
    owner: &UserId,
) -> Result<(), CoreError> {
    let member = Member {
        workspace_id: workspace.clone(),
        user_id: owner.clone(),
        role: Role::Owner,
    };
    store
        .create(collections::WORKSPACE_MEMBERS, member_doc(&member)?)
        .await?;
    Ok(())
}
