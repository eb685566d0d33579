//! Task graph types.
//!
//! These are the persisted shapes: field names serialize in camelCase to
//! match the document-store collections. Subtasks and updates are embedded
//! arrays on their parent task document, never top-level documents.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generates a fresh random id.
            #[must_use]
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Wraps an existing id.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// String form of the id.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(
    /// Unique identifier of a workspace.
    WorkspaceId
);
entity_id!(
    /// Unique identifier of a user account.
    UserId
);
entity_id!(
    /// Unique identifier of a top-level task.
    TaskId
);
entity_id!(
    /// Unique identifier of a subtask within its parent task.
    SubTaskId
);
entity_id!(
    /// Unique identifier of an update entry.
    UpdateId
);
entity_id!(
    /// Unique identifier of an invitation.
    InvitationId
);

/// Per-workspace role, totally ordered by privilege.
///
/// Declaration order matters: the derived `Ord` makes
/// `Role::Owner > Role::Admin > Role::Manager > Role::Member`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Sees only assigned work.
    Member,
    /// Sees created and assigned work; may direct-assign and invite.
    Manager,
    /// Full visibility and membership management.
    Admin,
    /// Workspace creator; the only role that may create top-level tasks.
    Owner,
}

impl Role {
    /// Whether this role sees every task in the workspace unconditionally.
    #[must_use]
    pub fn is_privileged(self) -> bool {
        self >= Role::Admin
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Member => write!(f, "member"),
            Role::Manager => write!(f, "manager"),
            Role::Admin => write!(f, "admin"),
            Role::Owner => write!(f, "owner"),
        }
    }
}

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    /// Created but not started.
    #[default]
    Pending,
    /// Actively worked on.
    InProgress,
    /// Finished by its assignees.
    Completed,
    /// Finished and signed off.
    Approved,
}

impl TaskStatus {
    /// Whether the status closes the task for aggregation purposes.
    #[must_use]
    pub fn is_closed(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Approved)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::InProgress => write!(f, "in-progress"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Approved => write!(f, "approved"),
        }
    }
}

/// Invitation lifecycle status. `Accepted` and `Declined` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    /// Awaiting a response from the invitee.
    Pending,
    /// Accepted; the invitee was added to the target's assignee set.
    Accepted,
    /// Declined; no graph mutation occurred.
    Declined,
}

/// Workspace-level settings that affect the core's behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceSettings {
    /// Whether completed/approved tasks appear in default views.
    #[serde(default = "default_show_completed")]
    pub show_completed_tasks: bool,
}

fn default_show_completed() -> bool {
    true
}

impl Default for WorkspaceSettings {
    fn default() -> Self {
        Self {
            show_completed_tasks: true,
        }
    }
}

/// Top-level tenant container for tasks and members.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    /// Workspace id.
    pub id: WorkspaceId,
    /// Display name.
    pub name: String,
    /// User who created the workspace and holds the `Owner` role.
    pub owner_id: UserId,
    /// Workspace settings.
    #[serde(default)]
    pub settings: WorkspaceSettings,
}

/// A user's role binding within one workspace.
///
/// Exactly one record exists per (workspace, user) pair; the document id is
/// the composite of both so duplicate bindings cannot be created.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    /// Workspace the binding belongs to.
    pub workspace_id: WorkspaceId,
    /// Bound user.
    pub user_id: UserId,
    /// Role held in this workspace.
    pub role: Role,
}

impl Member {
    /// Composite document id for the (workspace, user) pair.
    #[must_use]
    pub fn doc_id(workspace_id: &WorkspaceId, user_id: &UserId) -> String {
        format!("{workspace_id}:{user_id}")
    }
}

/// Descriptor of a file attached to an update.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRef {
    /// Original file name.
    pub file_name: String,
    /// Opaque reference into the external attachment store.
    pub storage_ref: String,
}

/// An append-only progress entry on a task or subtask.
///
/// Updates are never edited or reordered after insertion; chronological
/// order is insertion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Update {
    /// Update id.
    pub id: UpdateId,
    /// Author of the entry.
    pub author_id: UserId,
    /// When the entry was written.
    pub timestamp: DateTime<Utc>,
    /// Free-text body.
    pub body: String,
    /// Status the task transitioned to with this update, if any.
    #[serde(default)]
    pub status_transition: Option<TaskStatus>,
    /// Attached file, if any.
    #[serde(default)]
    pub attachment: Option<FileRef>,
}

/// A unit of work embedded in exactly one parent task.
///
/// Subtasks have no independent lifecycle; they are created, mutated, and
/// deleted only as part of a parent-task mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubTask {
    /// Subtask id, unique within the parent.
    pub id: SubTaskId,
    /// Owning task. Never dangling while the subtask is live.
    pub parent_id: TaskId,
    /// Display title.
    pub title: String,
    /// Scheduled start.
    pub start_date: NaiveDate,
    /// Scheduled end. May fall outside the parent's range in malformed data.
    pub end_date: NaiveDate,
    /// Lifecycle status.
    #[serde(default)]
    pub status: TaskStatus,
    /// Completion percent, 0–100.
    #[serde(default)]
    pub completion: u8,
    /// Assigned users.
    #[serde(default)]
    pub assignee_ids: Vec<UserId>,
    /// Whether joining requires accepting an invitation.
    #[serde(default)]
    pub requires_acceptance: bool,
    /// User who created the subtask.
    pub creator_id: UserId,
}

impl SubTask {
    /// Whether `user` is in this subtask's assignee set.
    #[must_use]
    pub fn is_assigned(&self, user: &UserId) -> bool {
        self.assignee_ids.contains(user)
    }
}

/// A top-level unit of tracked work.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Task id.
    pub id: TaskId,
    /// Workspace the task belongs to.
    pub workspace_id: WorkspaceId,
    /// User who created the task.
    pub creator_id: UserId,
    /// Display title.
    pub title: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Scheduled start.
    pub start_date: NaiveDate,
    /// Scheduled end.
    pub end_date: NaiveDate,
    /// Lifecycle status.
    #[serde(default)]
    pub status: TaskStatus,
    /// Completion percent, 0–100. Presentation field independent of status.
    #[serde(default)]
    pub completion: u8,
    /// Complexity rating, 1–5. Absent on malformed documents.
    #[serde(default)]
    pub complexity: Option<u8>,
    /// Workload rating, 1–5. Absent on malformed documents.
    #[serde(default)]
    pub workload: Option<u8>,
    /// Assigned users. The model tolerates an empty set.
    #[serde(default)]
    pub assignee_ids: Vec<UserId>,
    /// Whether completion requires an approval step.
    #[serde(default)]
    pub requires_approval: bool,
    /// Append-only list of progress updates, in insertion order.
    #[serde(default)]
    pub updates: Vec<Update>,
    /// Embedded subtasks.
    #[serde(default)]
    pub subtasks: Vec<SubTask>,
}

impl Task {
    /// Whether `user` is a direct top-level assignee.
    #[must_use]
    pub fn is_assigned(&self, user: &UserId) -> bool {
        self.assignee_ids.contains(user)
    }

    /// Whether `user` is assigned to at least one subtask.
    #[must_use]
    pub fn has_subtask_assignee(&self, user: &UserId) -> bool {
        self.subtasks.iter().any(|s| s.is_assigned(user))
    }

    /// Looks up an embedded subtask by id.
    #[must_use]
    pub fn subtask(&self, id: &SubTaskId) -> Option<&SubTask> {
        self.subtasks.iter().find(|s| &s.id == id)
    }

    /// Mutable lookup of an embedded subtask by id.
    pub fn subtask_mut(&mut self, id: &SubTaskId) -> Option<&mut SubTask> {
        self.subtasks.iter_mut().find(|s| &s.id == id)
    }
}

/// Explicitly discriminated task-graph node.
///
/// Whether a node is a task or a subtask is carried in the `kind` tag, never
/// inferred from id patterns or field presence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Node {
    /// A top-level task.
    Task(Task),
    /// A subtask embedded in its parent.
    SubTask(SubTask),
}

impl Node {
    /// The node's assignee set.
    #[must_use]
    pub fn assignee_ids(&self) -> &[UserId] {
        match self {
            Node::Task(t) => &t.assignee_ids,
            Node::SubTask(s) => &s.assignee_ids,
        }
    }

    /// The node's display title.
    #[must_use]
    pub fn title(&self) -> &str {
        match self {
            Node::Task(t) => &t.title,
            Node::SubTask(s) => &s.title,
        }
    }
}

/// What an invitation grants access to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "camelCase")]
pub enum InvitationTarget {
    /// Assignment to a task or to one of its subtasks.
    #[serde(rename_all = "camelCase")]
    Task {
        /// Parent task.
        task_id: TaskId,
        /// Specific subtask within the parent, if any.
        subtask_id: Option<SubTaskId>,
    },
    /// Membership in a workspace with the given role.
    #[serde(rename_all = "camelCase")]
    Workspace {
        /// Target workspace.
        workspace_id: WorkspaceId,
        /// Role granted on acceptance.
        role: Role,
    },
}

/// A pending proposal to add a user to a task, subtask, or workspace.
///
/// Terminal once accepted or declined; re-inviting after a decline creates a
/// new record rather than reopening the old one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invitation {
    /// Invitation id.
    pub id: InvitationId,
    /// User who issued the invitation.
    pub inviter_id: UserId,
    /// Resolved invitee. Workspace invitations may be addressed by email
    /// only, before the invitee has an account.
    #[serde(default)]
    pub invitee_id: Option<UserId>,
    /// Email address for workspace invitations.
    #[serde(default)]
    pub invitee_email: Option<String>,
    /// What the invitation grants.
    #[serde(flatten)]
    pub target: InvitationTarget,
    /// Lifecycle status.
    pub status: InvitationStatus,
    /// When the invitation was created.
    pub created_at: DateTime<Utc>,
    /// When the invitee responded, if they have.
    #[serde(default)]
    pub responded_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_privilege_order() {
        assert!(Role::Owner > Role::Admin);
        assert!(Role::Admin > Role::Manager);
        assert!(Role::Manager > Role::Member);
        assert!(Role::Admin.is_privileged());
        assert!(!Role::Manager.is_privileged());
    }

    #[test]
    fn task_status_serializes_kebab_case() {
        let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(json, r#""in-progress""#);
    }

    #[test]
    fn member_doc_id_is_composite() {
        let ws = WorkspaceId::new("w1");
        let user = UserId::new("u1");
        assert_eq!(Member::doc_id(&ws, &user), "w1:u1");
    }

    #[test]
    fn node_carries_explicit_discriminant() {
        let sub = SubTask {
            id: SubTaskId::new("s1"),
            parent_id: TaskId::new("t1"),
            title: "wire the header".into(),
            start_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, 3, 5).unwrap(),
            status: TaskStatus::Pending,
            completion: 0,
            assignee_ids: vec![],
            requires_acceptance: false,
            creator_id: UserId::new("u1"),
        };
        let json = serde_json::to_value(Node::SubTask(sub)).unwrap();
        assert_eq!(json["kind"], "subTask");
    }

    #[test]
    fn invitation_target_flattens_scope_tag() {
        let inv = Invitation {
            id: InvitationId::new("i1"),
            inviter_id: UserId::new("u1"),
            invitee_id: Some(UserId::new("u2")),
            invitee_email: None,
            target: InvitationTarget::Task {
                task_id: TaskId::new("t1"),
                subtask_id: None,
            },
            status: InvitationStatus::Pending,
            created_at: Utc::now(),
            responded_at: None,
        };
        let json = serde_json::to_value(&inv).unwrap();
        assert_eq!(json["scope"], "task");
        assert_eq!(json["taskId"], "t1");
    }
}
