//! Domain model for the Lattice task graph.
//!
//! Workspaces contain tasks; tasks embed subtasks and an append-only list of
//! updates. Membership binds a user to a workspace with a single role.

mod types;

pub use types::{
    FileRef, Invitation, InvitationId, InvitationStatus, InvitationTarget, Member, Node, Role,
    SubTask, SubTaskId, Task, TaskId, TaskStatus, Update, UpdateId, UserId, Workspace,
    WorkspaceId, WorkspaceSettings,
};
