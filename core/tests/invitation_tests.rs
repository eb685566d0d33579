//! Invitation state machine and mutation guard flows.

use chrono::NaiveDate;
use lattice_core::commands::{AssignOutcome, TaskCommands, TaskDraft};
use lattice_core::error::CoreError;
use lattice_core::graph::{
    Role, SubTaskId, Task, TaskId, TaskStatus, UserId, WorkspaceId, WorkspaceSettings,
};
use lattice_core::invitation::InvitationManager;
use lattice_core::membership::MembershipResolver;
use lattice_core::notify::{BroadcastSink, NotificationKind, NullSink};
use lattice_core::store::{collections, from_doc, DocumentStore, MemoryStore, Predicate};
use std::sync::Arc;

struct Fixture {
    store: Arc<MemoryStore>,
    members: Arc<MembershipResolver>,
    invitations: Arc<InvitationManager>,
    commands: TaskCommands,
    workspace: WorkspaceId,
    owner: UserId,
}

impl Fixture {
    /// Grants `name` a member record, as workspace onboarding would.
    async fn join(&self, name: &str) {
        self.members
            .set_role(&self.workspace, Role::Owner, &UserId::new(name), Role::Member)
            .await
            .unwrap();
    }
}

fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 5, d).unwrap()
}

async fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(NullSink);
    let members = Arc::new(MembershipResolver::new(store.clone()));
    let invitations = Arc::new(InvitationManager::new(store.clone(), sink.clone()));
    let commands = TaskCommands::new(store.clone(), members.clone(), invitations.clone(), sink);
    let owner = UserId::new("owner");
    let workspace = commands
        .create_workspace(&owner, "studio", WorkspaceSettings::default())
        .await
        .unwrap()
        .id;
    Fixture {
        store,
        members,
        invitations,
        commands,
        workspace,
        owner,
    }
}

fn draft(workspace: &WorkspaceId, assignees: &[&str]) -> TaskDraft {
    TaskDraft {
        workspace_id: workspace.clone(),
        title: "launch checklist".into(),
        description: String::new(),
        start_date: date(1),
        end_date: date(20),
        complexity: Some(3),
        workload: Some(2),
        assignee_ids: assignees.iter().map(|a| UserId::new(*a)).collect(),
        requires_approval: false,
    }
}

async fn load_task(store: &MemoryStore, id: &TaskId) -> Task {
    let doc = store
        .get(collections::TASKS, id.as_str())
        .await
        .unwrap()
        .unwrap();
    from_doc(doc).unwrap()
}

#[tokio::test]
async fn only_owners_create_top_level_tasks() {
    let fx = fixture().await;

    for role in [Role::Admin, Role::Manager, Role::Member] {
        let err = fx
            .commands
            .create_task(&UserId::new("someone"), role, draft(&fx.workspace, &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::PermissionDenied(_)), "{role}");
    }
    // Rejected before any store call: no task documents exist.
    let docs = fx
        .store
        .query_where(collections::TASKS, &[])
        .await
        .unwrap();
    assert!(docs.is_empty());

    fx.join("m").await;
    let task = fx
        .commands
        .create_task(&fx.owner, Role::Owner, draft(&fx.workspace, &["m"]))
        .await
        .unwrap();
    assert_eq!(load_task(&fx.store, &task.id).await.title, "launch checklist");
}

#[tokio::test]
async fn invitation_creation_is_idempotent() {
    let fx = fixture().await;
    fx.join("m").await;
    let task = fx
        .commands
        .create_task(&fx.owner, Role::Owner, draft(&fx.workspace, &["m"]))
        .await
        .unwrap();

    let invitee = UserId::new("newcomer");
    let first = fx
        .invitations
        .invite(&fx.owner, Role::Owner, &task.id, None, &invitee)
        .await
        .unwrap();
    let second = fx
        .invitations
        .invite(&fx.owner, Role::Owner, &task.id, None, &invitee)
        .await
        .unwrap();
    assert_eq!(first, second);

    let docs = fx
        .store
        .query_where(
            collections::TASK_INVITATIONS,
            &[Predicate::eq("taskId", task.id.as_str())],
        )
        .await
        .unwrap();
    assert_eq!(docs.len(), 1, "no duplicate record created");
}

#[tokio::test]
async fn acceptance_flips_status_and_unions_assignee_together() {
    let fx = fixture().await;
    let task = fx
        .commands
        .create_task(&fx.owner, Role::Owner, draft(&fx.workspace, &[]))
        .await
        .unwrap();

    let invitee = UserId::new("newcomer");
    let invitation_id = fx
        .invitations
        .invite(&fx.owner, Role::Owner, &task.id, None, &invitee)
        .await
        .unwrap();
    fx.invitations.accept(&invitation_id, &invitee).await.unwrap();

    let stored = load_task(&fx.store, &task.id).await;
    assert!(stored.is_assigned(&invitee));

    let doc = fx
        .store
        .get(collections::TASK_INVITATIONS, invitation_id.as_str())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc["status"], "accepted");
    assert!(!doc["respondedAt"].is_null());

    // Terminal: a second response is rejected.
    let err = fx
        .invitations
        .accept(&invitation_id, &invitee)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidState(_)));
}

#[tokio::test]
async fn subtask_acceptance_targets_the_embedded_subtask() {
    let fx = fixture().await;
    let task = fx
        .commands
        .create_task(&fx.owner, Role::Owner, draft(&fx.workspace, &[]))
        .await
        .unwrap();
    let sub_id = fx
        .commands
        .add_subtask(
            &fx.owner,
            Role::Owner,
            &task.id,
            "wire the header",
            date(2),
            date(8),
            true,
        )
        .await
        .unwrap();

    let invitee = UserId::new("newcomer");
    let invitation_id = fx
        .invitations
        .invite(&fx.owner, Role::Owner, &task.id, Some(&sub_id), &invitee)
        .await
        .unwrap();
    fx.invitations.accept(&invitation_id, &invitee).await.unwrap();

    let stored = load_task(&fx.store, &task.id).await;
    assert!(!stored.is_assigned(&invitee), "top-level set untouched");
    assert!(stored.subtask(&sub_id).unwrap().is_assigned(&invitee));
}

#[tokio::test]
async fn decline_is_terminal_and_mutates_nothing() {
    let fx = fixture().await;
    let task = fx
        .commands
        .create_task(&fx.owner, Role::Owner, draft(&fx.workspace, &[]))
        .await
        .unwrap();

    let invitee = UserId::new("newcomer");
    let invitation_id = fx
        .invitations
        .invite(&fx.owner, Role::Owner, &task.id, None, &invitee)
        .await
        .unwrap();
    fx.invitations.decline(&invitation_id, &invitee).await.unwrap();

    let stored = load_task(&fx.store, &task.id).await;
    assert!(!stored.is_assigned(&invitee));

    let err = fx
        .invitations
        .accept(&invitation_id, &invitee)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidState(_)));

    // Re-inviting after a decline opens a fresh record.
    let fresh = fx
        .invitations
        .invite(&fx.owner, Role::Owner, &task.id, None, &invitee)
        .await
        .unwrap();
    assert_ne!(fresh, invitation_id);
}

#[tokio::test]
async fn acceptance_requires_the_addressed_invitee() {
    let fx = fixture().await;
    let task = fx
        .commands
        .create_task(&fx.owner, Role::Owner, draft(&fx.workspace, &[]))
        .await
        .unwrap();
    let invitation_id = fx
        .invitations
        .invite(&fx.owner, Role::Owner, &task.id, None, &UserId::new("a"))
        .await
        .unwrap();

    let err = fx
        .invitations
        .accept(&invitation_id, &UserId::new("b"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::PermissionDenied(_)));
}

#[tokio::test]
async fn invite_guards_on_role_and_parent_assignment() {
    let fx = fixture().await;
    fx.join("assigned").await;
    let task = fx
        .commands
        .create_task(&fx.owner, Role::Owner, draft(&fx.workspace, &["assigned"]))
        .await
        .unwrap();

    // A member not on the parent task may not invite.
    let err = fx
        .invitations
        .invite(
            &UserId::new("outsider"),
            Role::Member,
            &task.id,
            None,
            &UserId::new("x"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::PermissionDenied(_)));

    // A member on the parent task may.
    fx.invitations
        .invite(
            &UserId::new("assigned"),
            Role::Member,
            &task.id,
            None,
            &UserId::new("x"),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn member_may_not_invite_someone_already_on_the_subtask() {
    let fx = fixture().await;
    fx.join("assigned").await;
    fx.join("x").await;
    let task = fx
        .commands
        .create_task(&fx.owner, Role::Owner, draft(&fx.workspace, &["assigned"]))
        .await
        .unwrap();
    let sub_id = fx
        .commands
        .add_subtask(&fx.owner, Role::Owner, &task.id, "sub", date(2), date(8), false)
        .await
        .unwrap();
    fx.commands
        .assign(&fx.owner, Role::Owner, &task.id, Some(&sub_id), &UserId::new("x"))
        .await
        .unwrap();

    let err = fx
        .invitations
        .invite(
            &UserId::new("assigned"),
            Role::Member,
            &task.id,
            Some(&sub_id),
            &UserId::new("x"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::PermissionDenied(_)));
}

#[tokio::test]
async fn unresolvable_subtask_is_an_invalid_state() {
    let fx = fixture().await;
    let task = fx
        .commands
        .create_task(&fx.owner, Role::Owner, draft(&fx.workspace, &[]))
        .await
        .unwrap();

    let err = fx
        .invitations
        .invite(
            &fx.owner,
            Role::Owner,
            &task.id,
            Some(&SubTaskId::new("ghost")),
            &UserId::new("x"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidState(_)));
}

#[tokio::test]
async fn assignment_routes_by_privilege() {
    let fx = fixture().await;
    fx.join("helper").await;
    fx.join("direct").await;
    let task = fx
        .commands
        .create_task(&fx.owner, Role::Owner, draft(&fx.workspace, &["helper"]))
        .await
        .unwrap();

    // Manager+ assigns directly.
    let outcome = fx
        .commands
        .assign(
            &UserId::new("mgr"),
            Role::Manager,
            &task.id,
            None,
            &UserId::new("direct"),
        )
        .await
        .unwrap();
    assert_eq!(outcome, AssignOutcome::Assigned);
    assert!(load_task(&fx.store, &task.id).await.is_assigned(&UserId::new("direct")));

    // A non-manager assignee routes others through an invitation.
    let outcome = fx
        .commands
        .assign(
            &UserId::new("helper"),
            Role::Member,
            &task.id,
            None,
            &UserId::new("friend"),
        )
        .await
        .unwrap();
    assert!(matches!(outcome, AssignOutcome::Invited(_)));
    assert!(!load_task(&fx.store, &task.id).await.is_assigned(&UserId::new("friend")));

    // A non-manager creator may still self-assign.
    let outcome = fx
        .commands
        .assign(&fx.owner, Role::Member, &task.id, None, &fx.owner)
        .await
        .unwrap();
    assert_eq!(outcome, AssignOutcome::Assigned);
}

#[tokio::test]
async fn direct_assignment_requires_membership() {
    let fx = fixture().await;
    let task = fx
        .commands
        .create_task(&fx.owner, Role::Owner, draft(&fx.workspace, &[]))
        .await
        .unwrap();

    // No member record: even an owner may not place the user on a task.
    let stranger = UserId::new("stranger");
    let err = fx
        .commands
        .assign(&fx.owner, Role::Owner, &task.id, None, &stranger)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::PermissionDenied(_)));
    assert!(!load_task(&fx.store, &task.id).await.is_assigned(&stranger));

    // Initial assignees on a draft are held to the same rule.
    let err = fx
        .commands
        .create_task(&fx.owner, Role::Owner, draft(&fx.workspace, &["stranger"]))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::PermissionDenied(_)));

    // Once a member, the same assignment goes through.
    fx.join("stranger").await;
    let outcome = fx
        .commands
        .assign(&fx.owner, Role::Owner, &task.id, None, &stranger)
        .await
        .unwrap();
    assert_eq!(outcome, AssignOutcome::Assigned);
}

#[tokio::test]
async fn status_transition_appends_update_and_notifies_assignees() {
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(BroadcastSink::new());
    let members = Arc::new(MembershipResolver::new(store.clone()));
    let invitations = Arc::new(InvitationManager::new(store.clone(), sink.clone()));
    let commands = TaskCommands::new(store.clone(), members.clone(), invitations, sink.clone());
    let owner = UserId::new("owner");
    let workspace = commands
        .create_workspace(&owner, "studio", WorkspaceSettings::default())
        .await
        .unwrap()
        .id;
    for name in ["a", "b"] {
        members
            .set_role(&workspace, Role::Owner, &UserId::new(name), Role::Member)
            .await
            .unwrap();
    }
    let task = commands
        .create_task(&owner, Role::Owner, draft(&workspace, &["a", "b"]))
        .await
        .unwrap();

    let mut rx = sink.subscribe();
    commands
        .update_status(
            &UserId::new("a"),
            Role::Member,
            &task.id,
            TaskStatus::InProgress,
            "kicked off",
        )
        .await
        .unwrap();

    let stored = load_task(&store, &task.id).await;
    assert_eq!(stored.status, TaskStatus::InProgress);
    assert_eq!(stored.updates.len(), 1);
    assert_eq!(stored.updates[0].status_transition, Some(TaskStatus::InProgress));

    let event = rx.recv().await.unwrap();
    assert_eq!(event.kind, NotificationKind::TaskStatusChanged);
    assert_eq!(event.user_id, UserId::new("b"), "actor is not notified");
}

#[tokio::test]
async fn workspace_invitation_creates_member_on_acceptance() {
    let fx = fixture().await;
    let invitation_id = fx
        .invitations
        .invite_to_workspace(
            &fx.owner,
            Role::Owner,
            &fx.workspace,
            "new@example.com",
            Role::Manager,
        )
        .await
        .unwrap();

    // Idempotent while pending.
    let again = fx
        .invitations
        .invite_to_workspace(
            &fx.owner,
            Role::Owner,
            &fx.workspace,
            "new@example.com",
            Role::Manager,
        )
        .await
        .unwrap();
    assert_eq!(invitation_id, again);

    let user = UserId::new("new-user");
    fx.invitations
        .accept_workspace(&invitation_id, &user, "new@example.com")
        .await
        .unwrap();

    let resolver = MembershipResolver::new(fx.store.clone());
    let role = resolver.resolve(&fx.workspace, &user).await.unwrap();
    assert_eq!(role, Role::Manager);

    let doc = fx
        .store
        .get(collections::WORKSPACE_INVITATIONS, invitation_id.as_str())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc["status"], "accepted");
    assert_eq!(doc["inviteeId"], "new-user");
}

#[tokio::test]
async fn workspace_invitation_rejects_wrong_email_and_role() {
    let fx = fixture().await;
    let err = fx
        .invitations
        .invite_to_workspace(
            &UserId::new("mgr"),
            Role::Manager,
            &fx.workspace,
            "x@example.com",
            Role::Member,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::PermissionDenied(_)));

    let invitation_id = fx
        .invitations
        .invite_to_workspace(&fx.owner, Role::Owner, &fx.workspace, "x@example.com", Role::Member)
        .await
        .unwrap();
    let err = fx
        .invitations
        .accept_workspace(&invitation_id, &UserId::new("u"), "other@example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::PermissionDenied(_)));
}

#[tokio::test]
async fn workspace_invitation_decline_is_terminal() {
    let fx = fixture().await;
    let invitation_id = fx
        .invitations
        .invite_to_workspace(&fx.owner, Role::Owner, &fx.workspace, "no@example.com", Role::Member)
        .await
        .unwrap();

    let user = UserId::new("decliner");
    let err = fx
        .invitations
        .decline_workspace(&invitation_id, &user, "other@example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::PermissionDenied(_)));

    fx.invitations
        .decline_workspace(&invitation_id, &user, "no@example.com")
        .await
        .unwrap();

    let doc = fx
        .store
        .get(collections::WORKSPACE_INVITATIONS, invitation_id.as_str())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc["status"], "declined");

    // Terminal: no membership, and a later acceptance is rejected.
    let resolver = MembershipResolver::new(fx.store.clone());
    assert!(resolver.resolve(&fx.workspace, &user).await.is_err());
    let err = fx
        .invitations
        .accept_workspace(&invitation_id, &user, "no@example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidState(_)));
}

#[tokio::test]
async fn deleting_a_task_removes_its_subtasks_as_a_unit() {
    let fx = fixture().await;
    let task = fx
        .commands
        .create_task(&fx.owner, Role::Owner, draft(&fx.workspace, &[]))
        .await
        .unwrap();
    fx.commands
        .add_subtask(&fx.owner, Role::Owner, &task.id, "sub", date(2), date(8), false)
        .await
        .unwrap();

    let err = fx
        .commands
        .delete_task(&UserId::new("outsider"), Role::Member, &task.id)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::PermissionDenied(_)));

    fx.commands
        .delete_task(&fx.owner, Role::Owner, &task.id)
        .await
        .unwrap();
    assert!(fx
        .store
        .get(collections::TASKS, task.id.as_str())
        .await
        .unwrap()
        .is_none());
}
