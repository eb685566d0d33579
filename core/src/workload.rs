//! Burden scoring over the task graph.
//!
//! A task's burden is `complexity + workload` (each 1–5). A member's score
//! is the one-decimal average of their share of burden across *active*
//! assignments: load per active commitment, not total load, so many small
//! tasks do not outweigh few large ones.

use chrono::NaiveDate;

use crate::graph::{Task, UserId};

/// Burden of a single task: `complexity + workload`, in `[2, 10]`.
///
/// `None` when either rating is missing; such tasks are excluded from
/// scoring entirely rather than contributing a zero.
#[must_use]
pub fn task_burden(task: &Task) -> Option<u8> {
    Some(task.complexity? + task.workload?)
}

/// Whether a task counts toward workload as of `as_of`.
///
/// Active means not completed/approved, not past due, and assigned to the
/// member in question (checked by the caller).
fn is_active(task: &Task, as_of: NaiveDate) -> bool {
    !task.status.is_closed() && task.end_date >= as_of
}

/// Average burden share across `member`'s active tasks, rounded to one
/// decimal. Zero when the member has no active tasks.
///
/// Multi-assignee tasks split their burden evenly:
/// `burden / max(1, assignee_count)`.
#[must_use]
pub fn member_burden_score(member: &UserId, tasks: &[Task], as_of: NaiveDate) -> f64 {
    let mut total = 0.0;
    let mut count: u32 = 0;

    for task in tasks {
        if !is_active(task, as_of) || !task.is_assigned(member) {
            continue;
        }
        let Some(burden) = task_burden(task) else {
            continue;
        };
        let split = task.assignee_ids.len().max(1);
        #[allow(clippy::cast_precision_loss)]
        let share = f64::from(burden) / split as f64;
        total += share;
        count += 1;
    }

    if count == 0 {
        return 0.0;
    }
    round1(total / f64::from(count))
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
