//! Task and workspace mutation commands.
//!
//! All guards run before the first store write. Direct assignment is a
//! manager+ privilege; everyone else self-assigns or routes through an
//! invitation. Top-level task creation is owner-only.

use chrono::{NaiveDate, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::instrument;

use crate::error::CoreError;
use crate::graph::{
    FileRef, InvitationId, Member, Role, SubTask, SubTaskId, Task, TaskId, TaskStatus, Update,
    UpdateId, UserId, Workspace, WorkspaceId, WorkspaceSettings,
};
use crate::invitation::InvitationManager;
use crate::membership::{member_doc, MembershipResolver};
use crate::notify::{NotificationEvent, NotificationKind, NotificationSink};
use crate::store::{collections, from_doc, to_doc, DocumentStore, WriteOp};

/// Fields for creating a top-level task.
#[derive(Debug, Clone)]
pub struct TaskDraft {
    /// Workspace the task belongs to.
    pub workspace_id: WorkspaceId,
    /// Display title.
    pub title: String,
    /// Free-text description.
    pub description: String,
    /// Scheduled start.
    pub start_date: NaiveDate,
    /// Scheduled end.
    pub end_date: NaiveDate,
    /// Complexity rating, 1–5.
    pub complexity: Option<u8>,
    /// Workload rating, 1–5.
    pub workload: Option<u8>,
    /// Initial assignees. The owner is manager+ and may assign freely.
    pub assignee_ids: Vec<UserId>,
    /// Whether completion requires approval.
    pub requires_approval: bool,
}

/// Outcome of an assignment request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignOutcome {
    /// The user was added to the assignee set directly.
    Assigned,
    /// The request was routed through an invitation awaiting acceptance.
    Invited(InvitationId),
}

/// Issues guarded graph mutations against the store.
pub struct TaskCommands {
    store: Arc<dyn DocumentStore>,
    members: Arc<MembershipResolver>,
    invitations: Arc<InvitationManager>,
    notifier: Arc<dyn NotificationSink>,
}

impl TaskCommands {
    /// Creates a command surface over the given collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        members: Arc<MembershipResolver>,
        invitations: Arc<InvitationManager>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            store,
            members,
            invitations,
            notifier,
        }
    }

    /// Creates a workspace and seeds its owner's member record atomically.
    ///
    /// # Errors
    ///
    /// Returns a store failure if the batch fails.
    pub async fn create_workspace(
        &self,
        owner: &UserId,
        name: impl Into<String>,
        settings: WorkspaceSettings,
    ) -> Result<Workspace, CoreError> {
        let workspace = Workspace {
            id: WorkspaceId::generate(),
            name: name.into(),
            owner_id: owner.clone(),
            settings,
        };
        let member = Member {
            workspace_id: workspace.id.clone(),
            user_id: owner.clone(),
            role: Role::Owner,
        };
        self.store
            .run_batch(vec![
                WriteOp::Create {
                    collection: collections::WORKSPACES.to_string(),
                    doc: to_doc(&workspace)?,
                },
                WriteOp::Create {
                    collection: collections::WORKSPACE_MEMBERS.to_string(),
                    doc: member_doc(&member)?,
                },
            ])
            .await?;
        Ok(workspace)
    }

    /// Creates a top-level task. Owner-only; rejected before any store call.
    ///
    /// # Errors
    ///
    /// [`CoreError::PermissionDenied`] for any non-owner role or an initial
    /// assignee without a member record, or a store failure.
    #[instrument(skip(self, draft), fields(creator = %creator))]
    pub async fn create_task(
        &self,
        creator: &UserId,
        role: Role,
        draft: TaskDraft,
    ) -> Result<Task, CoreError> {
        if role != Role::Owner {
            return Err(CoreError::denied(format!(
                "{role} may not create top-level tasks"
            )));
        }
        for assignee in &draft.assignee_ids {
            self.require_member(&draft.workspace_id, assignee).await?;
        }
        let task = Task {
            id: TaskId::generate(),
            workspace_id: draft.workspace_id,
            creator_id: creator.clone(),
            title: draft.title,
            description: draft.description,
            start_date: draft.start_date,
            end_date: draft.end_date,
            status: TaskStatus::Pending,
            completion: 0,
            complexity: draft.complexity,
            workload: draft.workload,
            assignee_ids: draft.assignee_ids,
            requires_approval: draft.requires_approval,
            updates: vec![],
            subtasks: vec![],
        };
        self.store
            .create(collections::TASKS, to_doc(&task)?)
            .await?;
        Ok(task)
    }

    /// Adds a subtask to its parent task as a single parent mutation.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] for a missing parent,
    /// [`CoreError::PermissionDenied`] when the actor may not mutate the
    /// parent, or a store failure.
    pub async fn add_subtask(
        &self,
        actor: &UserId,
        actor_role: Role,
        task_id: &TaskId,
        title: impl Into<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
        requires_acceptance: bool,
    ) -> Result<SubTaskId, CoreError> {
        let task = self.load_task(task_id).await?;
        Self::require_participant(&task, actor, actor_role)?;

        let subtask = SubTask {
            id: SubTaskId::generate(),
            parent_id: task_id.clone(),
            title: title.into(),
            start_date,
            end_date,
            status: TaskStatus::Pending,
            completion: 0,
            assignee_ids: vec![],
            requires_acceptance,
            creator_id: actor.clone(),
        };
        let mut subtasks = task.subtasks;
        let sub_id = subtask.id.clone();
        subtasks.push(subtask);
        self.store
            .update(
                collections::TASKS,
                task_id.as_str(),
                json!({ "subtasks": subtasks }),
                false,
            )
            .await?;
        Ok(sub_id)
    }

    /// Requests that `assignee` be added to a task or subtask.
    ///
    /// Manager+ actors assign directly. A non-manager creator may assign
    /// only themselves; any other target is routed through an invitation
    /// (whose own guards then apply). The direct path requires the assignee
    /// to hold a member record in the task's workspace; joining without one
    /// goes through an invitation.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] for a missing task,
    /// [`CoreError::PermissionDenied`] for a direct assignee who is not a
    /// workspace member, or the invitation path's guard errors.
    #[instrument(skip(self), fields(task = %task_id, assignee = %assignee))]
    pub async fn assign(
        &self,
        actor: &UserId,
        actor_role: Role,
        task_id: &TaskId,
        subtask_id: Option<&SubTaskId>,
        assignee: &UserId,
    ) -> Result<AssignOutcome, CoreError> {
        let task = self.load_task(task_id).await?;

        let direct = actor_role >= Role::Manager
            || (assignee == actor && task.creator_id == *actor);
        if !direct {
            let id = self
                .invitations
                .invite(actor, actor_role, task_id, subtask_id, assignee)
                .await?;
            return Ok(AssignOutcome::Invited(id));
        }
        self.require_member(&task.workspace_id, assignee).await?;

        let patch = match subtask_id {
            None => {
                let mut assignees = task.assignee_ids.clone();
                if !assignees.contains(assignee) {
                    assignees.push(assignee.clone());
                }
                json!({ "assigneeIds": assignees })
            }
            Some(sub_id) => {
                let mut subtasks = task.subtasks.clone();
                let subtask =
                    subtasks.iter_mut().find(|s| &s.id == sub_id).ok_or_else(|| {
                        CoreError::invalid_state(format!(
                            "subtask {sub_id} does not resolve in {task_id}"
                        ))
                    })?;
                if !subtask.assignee_ids.contains(assignee) {
                    subtask.assignee_ids.push(assignee.clone());
                }
                json!({ "subtasks": subtasks })
            }
        };
        self.store
            .update(collections::TASKS, task_id.as_str(), patch, false)
            .await?;
        Ok(AssignOutcome::Assigned)
    }

    /// Transitions a task's status and appends the tagged update entry.
    ///
    /// Assignees, the creator, and manager+ roles may transition status.
    /// Other task participants are notified of the change.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] for a missing task,
    /// [`CoreError::PermissionDenied`] on the mutation guard, or a store
    /// failure.
    #[instrument(skip(self, note), fields(task = %task_id, status = %new_status))]
    pub async fn update_status(
        &self,
        actor: &UserId,
        actor_role: Role,
        task_id: &TaskId,
        new_status: TaskStatus,
        note: impl Into<String> + Send,
    ) -> Result<(), CoreError> {
        let task = self.load_task(task_id).await?;
        Self::require_participant(&task, actor, actor_role)?;

        let mut updates = task.updates.clone();
        updates.push(Update {
            id: UpdateId::generate(),
            author_id: actor.clone(),
            timestamp: Utc::now(),
            body: note.into(),
            status_transition: Some(new_status),
            attachment: None,
        });
        self.store
            .update(
                collections::TASKS,
                task_id.as_str(),
                json!({ "status": new_status, "updates": updates }),
                false,
            )
            .await?;

        for assignee in task.assignee_ids.iter().filter(|a| *a != actor) {
            self.notifier.dispatch(NotificationEvent {
                kind: NotificationKind::TaskStatusChanged,
                user_id: assignee.clone(),
                title: "Task status changed".to_string(),
                message: format!("\"{}\" is now {new_status}", task.title),
                action_ref: task_id.to_string(),
                metadata: json!({ "status": new_status }),
            });
        }
        Ok(())
    }

    /// Appends a free-text update, optionally with an attachment descriptor.
    ///
    /// # Errors
    ///
    /// Same guards as [`TaskCommands::update_status`].
    pub async fn add_update(
        &self,
        actor: &UserId,
        actor_role: Role,
        task_id: &TaskId,
        body: impl Into<String> + Send,
        attachment: Option<FileRef>,
    ) -> Result<(), CoreError> {
        let task = self.load_task(task_id).await?;
        Self::require_participant(&task, actor, actor_role)?;

        let mut updates = task.updates;
        updates.push(Update {
            id: UpdateId::generate(),
            author_id: actor.clone(),
            timestamp: Utc::now(),
            body: body.into(),
            status_transition: None,
            attachment,
        });
        self.store
            .update(
                collections::TASKS,
                task_id.as_str(),
                json!({ "updates": updates }),
                false,
            )
            .await?;
        Ok(())
    }

    /// Deletes a task and, with it, its embedded subtasks as a unit.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] for a missing task,
    /// [`CoreError::PermissionDenied`] unless the actor is the creator or
    /// manager+, or a store failure.
    pub async fn delete_task(
        &self,
        actor: &UserId,
        actor_role: Role,
        task_id: &TaskId,
    ) -> Result<(), CoreError> {
        let task = self.load_task(task_id).await?;
        if actor_role < Role::Manager && task.creator_id != *actor {
            return Err(CoreError::denied(format!(
                "{actor} may not delete task {task_id}"
            )));
        }
        self.store
            .delete(collections::TASKS, task_id.as_str())
            .await?;
        Ok(())
    }

    /// An assignee set gains a user only through membership or an accepted
    /// invitation; the direct paths enforce the former here.
    async fn require_member(
        &self,
        workspace_id: &WorkspaceId,
        user: &UserId,
    ) -> Result<(), CoreError> {
        match self.members.resolve(workspace_id, user).await {
            Ok(_) => Ok(()),
            Err(CoreError::NotFound { .. }) => Err(CoreError::denied(format!(
                "{user} is not a member of workspace {workspace_id}"
            ))),
            Err(err) => Err(err),
        }
    }

    fn require_participant(task: &Task, actor: &UserId, actor_role: Role) -> Result<(), CoreError> {
        if actor_role >= Role::Manager || task.is_assigned(actor) || task.creator_id == *actor {
            return Ok(());
        }
        Err(CoreError::denied(format!(
            "{actor} may not mutate task {}",
            task.id
        )))
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
