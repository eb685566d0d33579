//! Invitation state machine.
//!
//! Invitations move `pending -> accepted | declined` and never leave a
//! terminal state; re-inviting after a decline creates a new record.
//! Acceptance is the only path by which an assignee set gains a user the
//! inviter could not assign directly, and it lands atomically with the
//! status flip via a store write batch.

use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::error::CoreError;
use crate::graph::{
    Invitation, InvitationId, InvitationStatus, InvitationTarget, Member, Role, SubTaskId, Task,
    TaskId, UserId, WorkspaceId,
};
use crate::notify::{NotificationEvent, NotificationKind, NotificationSink};
use crate::store::{collections, from_doc, to_doc, DocumentStore, Predicate, WriteOp};

/// Creates, accepts, and declines invitations.
pub struct InvitationManager {
    store: Arc<dyn DocumentStore>,
    notifier: Arc<dyn NotificationSink>,
}

impl InvitationManager {
    /// Creates a manager over the given store and notification sink.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, notifier: Arc<dyn NotificationSink>) -> Self {
        Self { store, notifier }
    }

    /// Invites `invitee` to a task, or to one of its subtasks.
    ///
    /// Only a manager+ role or a user already in the *parent* task's
    /// assignee set may invite; a non-manager inviting to a subtask
    /// additionally requires the invitee not already be assigned there.
    /// Creating an invitation identical to a pending one returns the
    /// existing id instead of a duplicate record.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] if the task is absent, [`CoreError::InvalidState`]
    /// if the subtask id does not resolve, [`CoreError::PermissionDenied`] on
    /// guard failure, or a store failure.
    #[instrument(skip(self), fields(task = %task_id, invitee = %invitee))]
    pub async fn invite(
        &self,
        inviter: &UserId,
        inviter_role: Role,
        task_id: &TaskId,
        subtask_id: Option<&SubTaskId>,
        invitee: &UserId,
    ) -> Result<InvitationId, CoreError> {
        let task = self.load_task(task_id).await?;

        // Guards run before any write.
        if inviter_role < Role::Manager && !task.is_assigned(inviter) {
            return Err(CoreError::denied(format!(
                "{inviter} is neither manager+ nor assigned to task {task_id}"
            )));
        }
        if let Some(sub_id) = subtask_id {
            let subtask = task.subtask(sub_id).ok_or_else(|| {
                CoreError::invalid_state(format!("subtask {sub_id} does not resolve in {task_id}"))
            })?;
            if inviter_role < Role::Manager && subtask.is_assigned(invitee) {
                return Err(CoreError::denied(format!(
                    "{invitee} is already assigned to subtask {sub_id}"
                )));
            }
        }

        if let Some(existing) = self.pending_duplicate(task_id, subtask_id, invitee).await? {
            debug!(invitation = %existing, "Returning existing pending invitation");
            return Ok(existing);
        }

        let invitation = Invitation {
            id: InvitationId::generate(),
            inviter_id: inviter.clone(),
            invitee_id: Some(invitee.clone()),
            invitee_email: None,
            target: InvitationTarget::Task {
                task_id: task_id.clone(),
                subtask_id: subtask_id.cloned(),
            },
            status: InvitationStatus::Pending,
            created_at: Utc::now(),
            responded_at: None,
        };
        self.store
            .create(collections::TASK_INVITATIONS, to_doc(&invitation)?)
            .await?;

        self.notifier.dispatch(NotificationEvent {
            kind: NotificationKind::InvitationReceived,
            user_id: invitee.clone(),
            title: "New task invitation".to_string(),
            message: format!("{} invited you to \"{}\"", inviter, task.title),
            action_ref: invitation.id.to_string(),
            metadata: json!({ "taskId": task_id.as_str() }),
        });
        Ok(invitation.id)
    }

    /// Accepts a task invitation as `user`.
    ///
    /// Flips the invitation to accepted and unions the invitee into the
    /// target task's (or subtask's) assignee set in one atomic batch; no
    /// observer can see one effect without the other.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] for a missing invitation or task,
    /// [`CoreError::InvalidState`] for a non-pending invitation or an
    /// unresolvable subtask, [`CoreError::PermissionDenied`] when `user` is
    /// not the invitee, or a store failure.
    #[instrument(skip(self), fields(invitation = %invitation_id, user = %user))]
    pub async fn accept(
        &self,
        invitation_id: &InvitationId,
        user: &UserId,
    ) -> Result<(), CoreError> {
        let invitation = self.load_pending(invitation_id, user).await?;
        let InvitationTarget::Task {
            task_id,
            subtask_id,
        } = &invitation.target
        else {
            return Err(CoreError::invalid_state(
                "workspace invitations are accepted with accept_workspace",
            ));
        };

        let task = self.load_task(task_id).await?;
        let task_patch = assignee_patch(&task, subtask_id.as_ref(), user)?;
        let responded = Utc::now();

        self.store
            .run_batch(vec![
                WriteOp::Update {
                    collection: collections::TASK_INVITATIONS.to_string(),
                    id: invitation_id.to_string(),
                    patch: json!({
                        "status": InvitationStatus::Accepted,
                        "respondedAt": responded,
                    }),
                    create_if_missing: false,
                },
                WriteOp::Update {
                    collection: collections::TASKS.to_string(),
                    id: task_id.to_string(),
                    patch: task_patch,
                    create_if_missing: false,
                },
            ])
            .await?;

        self.notifier.dispatch(NotificationEvent {
            kind: NotificationKind::InvitationAccepted,
            user_id: invitation.inviter_id.clone(),
            title: "Invitation accepted".to_string(),
            message: format!("{} joined \"{}\"", user, task.title),
            action_ref: task_id.to_string(),
            metadata: json!({ "invitationId": invitation_id.as_str() }),
        });
        Ok(())
    }

    /// Declines a task invitation as `user`. No graph mutation occurs.
    ///
    /// # Errors
    ///
    /// Same guard errors as [`InvitationManager::accept`].
    #[instrument(skip(self), fields(invitation = %invitation_id, user = %user))]
    pub async fn decline(
        &self,
        invitation_id: &InvitationId,
        user: &UserId,
    ) -> Result<(), CoreError> {
        let invitation = self.load_pending(invitation_id, user).await?;

        self.store
            .update(
                collections::TASK_INVITATIONS,
                invitation_id.as_str(),
                json!({
                    "status": InvitationStatus::Declined,
                    "respondedAt": Utc::now(),
                }),
                false,
            )
            .await?;

        self.notifier.dispatch(NotificationEvent {
            kind: NotificationKind::InvitationDeclined,
            user_id: invitation.inviter_id.clone(),
            title: "Invitation declined".to_string(),
            message: format!("{user} declined your invitation"),
            action_ref: invitation_id.to_string(),
            metadata: json!({}),
        });
        Ok(())
    }

    /// Invites an email address into a workspace with the given role.
    ///
    /// Requires admin+, matching membership management. Idempotent against
    /// an identical pending invitation.
    ///
    /// # Errors
    ///
    /// [`CoreError::PermissionDenied`] for non-admin inviters, or a store
    /// failure.
    pub async fn invite_to_workspace(
        &self,
        inviter: &UserId,
        inviter_role: Role,
        workspace_id: &WorkspaceId,
        invitee_email: &str,
        role: Role,
    ) -> Result<InvitationId, CoreError> {
        if !inviter_role.is_privileged() {
            return Err(CoreError::denied(format!(
                "{inviter_role} may not invite into the workspace"
            )));
        }

        let existing = self
            .store
            .query_where(
                collections::WORKSPACE_INVITATIONS,
                &[
                    Predicate::eq("workspaceId", workspace_id.as_str()),
                    Predicate::eq("inviteeEmail", invitee_email),
                    Predicate::eq("status", "pending"),
                ],
            )
            .await?;
        if let Some(doc) = existing.into_iter().next() {
            let invitation: Invitation = from_doc(doc)?;
            return Ok(invitation.id);
        }

        let invitation = Invitation {
            id: InvitationId::generate(),
            inviter_id: inviter.clone(),
            invitee_id: None,
            invitee_email: Some(invitee_email.to_string()),
            target: InvitationTarget::Workspace {
                workspace_id: workspace_id.clone(),
                role,
            },
            status: InvitationStatus::Pending,
            created_at: Utc::now(),
            responded_at: None,
        };
        self.store
            .create(collections::WORKSPACE_INVITATIONS, to_doc(&invitation)?)
            .await?;
        Ok(invitation.id)
    }

    /// Accepts a workspace invitation, creating the member record and
    /// resolving the invitee in one atomic batch.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] for a missing invitation,
    /// [`CoreError::InvalidState`] for a non-pending one or a task-scoped id,
    /// [`CoreError::PermissionDenied`] when `email` does not match, or a
    /// store failure.
    pub async fn accept_workspace(
        &self,
        invitation_id: &InvitationId,
        user: &UserId,
        email: &str,
    ) -> Result<(), CoreError> {
        let invitation = self.load_pending_workspace(invitation_id, email).await?;
        let InvitationTarget::Workspace { workspace_id, role } = &invitation.target else {
            return Err(CoreError::invalid_state(
                "task invitations are accepted with accept",
            ));
        };

        let member = Member {
            workspace_id: workspace_id.clone(),
            user_id: user.clone(),
            role: *role,
        };
        self.store
            .run_batch(vec![
                WriteOp::Update {
                    collection: collections::WORKSPACE_INVITATIONS.to_string(),
                    id: invitation_id.to_string(),
                    patch: json!({
                        "status": InvitationStatus::Accepted,
                        "respondedAt": Utc::now(),
                        "inviteeId": user,
                    }),
                    create_if_missing: false,
                },
                WriteOp::Update {
                    collection: collections::WORKSPACE_MEMBERS.to_string(),
                    id: Member::doc_id(workspace_id, user),
                    patch: to_doc(&member)?,
                    create_if_missing: true,
                },
            ])
            .await?;
        Ok(())
    }

    /// Declines a workspace invitation as `user`. Terminal; no member
    /// record is created, and re-inviting the email opens a fresh record.
    ///
    /// # Errors
    ///
    /// Same guards as [`InvitationManager::accept_workspace`].
    #[instrument(skip(self), fields(invitation = %invitation_id, user = %user))]
    pub async fn decline_workspace(
        &self,
        invitation_id: &InvitationId,
        user: &UserId,
        email: &str,
    ) -> Result<(), CoreError> {
        let invitation = self.load_pending_workspace(invitation_id, email).await?;
        if !matches!(invitation.target, InvitationTarget::Workspace { .. }) {
            return Err(CoreError::invalid_state(
                "task invitations are declined with decline",
            ));
        }

        self.store
            .update(
                collections::WORKSPACE_INVITATIONS,
                invitation_id.as_str(),
                json!({
                    "status": InvitationStatus::Declined,
                    "respondedAt": Utc::now(),
                    "inviteeId": user,
                }),
                false,
            )
            .await?;

        self.notifier.dispatch(NotificationEvent {
            kind: NotificationKind::InvitationDeclined,
            user_id: invitation.inviter_id.clone(),
            title: "Invitation declined".to_string(),
            message: format!("{email} declined your workspace invitation"),
            action_ref: invitation_id.to_string(),
            metadata: json!({}),
        });
        Ok(())
    }

    async fn pending_duplicate(
        &self,
        task_id: &TaskId,
        subtask_id: Option<&SubTaskId>,
        invitee: &UserId,
    ) -> Result<Option<InvitationId>, CoreError> {
        let subtask_value = subtask_id.map_or(Value::Null, |s| Value::String(s.to_string()));
        let docs = self
            .store
            .query_where(
                collections::TASK_INVITATIONS,
                &[
                    Predicate::eq("taskId", task_id.as_str()),
                    Predicate::eq("subtaskId", subtask_value),
                    Predicate::eq("inviteeId", invitee.as_str()),
                    Predicate::eq("status", "pending"),
                ],
            )
            .await?;
        match docs.into_iter().next() {
            Some(doc) => {
                let invitation: Invitation = from_doc(doc)?;
                Ok(Some(invitation.id))
            }
            None => Ok(None),
        }
    }

    async fn load_pending(
        &self,
        invitation_id: &InvitationId,
        user: &UserId,
    ) -> Result<Invitation, CoreError> {
        let invitation = self
            .load_invitation(collections::TASK_INVITATIONS, invitation_id)
            .await?;
        if invitation.status != InvitationStatus::Pending {
            return Err(CoreError::invalid_state(format!(
                "invitation {invitation_id} is not pending"
            )));
        }
        if invitation.invitee_id.as_ref() != Some(user) {
            return Err(CoreError::denied(format!(
                "invitation {invitation_id} is addressed to another user"
            )));
        }
        Ok(invitation)
    }

    async fn load_pending_workspace(
        &self,
        invitation_id: &InvitationId,
        email: &str,
    ) -> Result<Invitation, CoreError> {
        let invitation = self
            .load_invitation(collections::WORKSPACE_INVITATIONS, invitation_id)
            .await?;
        if invitation.status != InvitationStatus::Pending {
            return Err(CoreError::invalid_state(format!(
                "invitation {invitation_id} is not pending"
            )));
        }
        if invitation.invitee_email.as_deref() != Some(email) {
            return Err(CoreError::denied("invitation addressed to another email"));
        }
        Ok(invitation)
    }

    async fn load_invitation(
        &self,
        collection: &str,
        invitation_id: &InvitationId,
    ) -> Result<Invitation, CoreError> {
        let doc = self
            .store
            .get(collection, invitation_id.as_str())
            .await?
            .ok_or_else(|| CoreError::not_found("invitation", invitation_id.as_str()))?;
        Ok(from_doc(doc)?)
    }

    async fn load_task(&self, task_id: &TaskId) -> Result<Task, CoreError> {
        let doc = self
            .store
            .get(collections::TASKS, task_id.as_str())
            .await?
            .ok_or_else(|| CoreError::not_found("task", task_id.as_str()))?;
        Ok(from_doc(doc)?)
    }
}

/// Builds the task-document patch that unions `user` into the task's or the
/// addressed subtask's assignee set. Set semantics: no duplicate ids.
fn assignee_patch(
    task: &Task,
    subtask_id: Option<&SubTaskId>,
    user: &UserId,
) -> Result<Value, CoreError> {
    match subtask_id {
        None => {
            let assignees = union_assignees(&task.assignee_ids, user);
            Ok(json!({ "assigneeIds": assignees }))
        }
        Some(sub_id) => {
            let mut subtasks = task.subtasks.clone();
            let subtask = subtasks.iter_mut().find(|s| &s.id == sub_id).ok_or_else(|| {
                CoreError::invalid_state(format!(
                    "subtask {sub_id} does not resolve in {}",
                    task.id
                ))
            })?;
            subtask.assignee_ids = union_assignees(&subtask.assignee_ids, user);
            Ok(json!({ "subtasks": subtasks }))
        }
    }
}

fn union_assignees(existing: &[UserId], user: &UserId) -> Vec<UserId> {
    let mut assignees = existing.to_vec();
    if !assignees.contains(user) {
        assignees.push(user.clone());
    }
    assignees
}
