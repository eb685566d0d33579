//! Role-aware task visibility.
//!
//! A pure predicate over the task graph: the same rules back the default
//! view, "my tasks", and "managed tasks", which differ only in the
//! [`VisibilityOptions`] overrides.

use crate::graph::{Role, Task, UserId};

/// Overrides applied on top of the viewer's actual role.
#[derive(Debug, Clone, Copy)]
pub struct VisibilityOptions {
    /// Include tasks whose status is completed or approved.
    pub show_completed: bool,
    /// Force the member rule regardless of actual role ("my tasks").
    pub only_assigned_to_me: bool,
    /// Show only tasks the viewer created ("managed tasks").
    pub only_managed_by_me: bool,
}

impl Default for VisibilityOptions {
    fn default() -> Self {
        Self {
            show_completed: true,
            only_assigned_to_me: false,
            only_managed_by_me: false,
        }
    }
}

/// Whether a single task is visible to `viewer` holding `role`.
///
/// Role rules apply in order, first match winning: owner/admin see
/// everything; managers see created, assigned, or subtask-assigned tasks;
/// members see assigned or subtask-assigned tasks.
#[must_use]
pub fn is_visible(task: &Task, viewer: &UserId, role: Role, options: &VisibilityOptions) -> bool {
    if !options.show_completed && task.status.is_closed() {
        return false;
    }
    if options.only_managed_by_me {
        return &task.creator_id == viewer;
    }
    let effective = if options.only_assigned_to_me {
        Role::Member
    } else {
        role
    };
    match effective {
        Role::Owner | Role::Admin => true,
        Role::Manager => {
            &task.creator_id == viewer
                || task.is_assigned(viewer)
                || task.has_subtask_assignee(viewer)
        }
        Role::Member => task.is_assigned(viewer) || task.has_subtask_assignee(viewer),
    }
}

/// Filters `tasks` down to the subset visible to `viewer`.
#[must_use]
pub fn visible(
    tasks: &[Task],
    viewer: &UserId,
    role: Role,
    options: &VisibilityOptions,
) -> Vec<Task> {
    tasks
        .iter()
        .filter(|task| is_visible(task, viewer, role, options))
        .cloned()
        .collect()
}
