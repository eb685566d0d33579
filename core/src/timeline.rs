//! Schedule-view windowing.
//!
//! Maps a center date and zoom level to the visible date range and column
//! layout used by schedule views, and computes summary-bar spans over a
//! member's tasks and subtasks.

use chrono::{Days, NaiveDate};

use crate::graph::Task;

/// Days visible per zoom level, index 0 = zoom 1. More zoomed in means
/// fewer days and wider columns.
pub const DAYS_PER_ZOOM: [u64; 5] = [60, 45, 30, 15, 7];

/// Base column width in pixels at zoom 0.
const COLUMN_BASE_PX: u32 = 40;
/// Column width gained per zoom step, in pixels.
const COLUMN_STEP_PX: u32 = 10;

/// A resolved timeline window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineWindow {
    /// First visible day (inclusive).
    pub start: NaiveDate,
    /// Last visible day (inclusive).
    pub end: NaiveDate,
    /// Every visible day from `start` to `end`.
    pub days: Vec<NaiveDate>,
    /// Column width in pixels at this zoom level.
    pub column_width: u32,
}

/// Computes the window around `center` at `zoom` (clamped to 1–5).
///
/// The visible span splits floor/ceil around the center, so the window
/// always contains the center day and has `DAYS_PER_ZOOM[zoom-1] + 1` days.
#[must_use]
pub fn window(center: NaiveDate, zoom: u8) -> TimelineWindow {
    let zoom = zoom.clamp(1, 5);
    let days_visible = DAYS_PER_ZOOM[usize::from(zoom) - 1];

    let start = center - Days::new(days_visible / 2);
    let end = center + Days::new(days_visible.div_ceil(2));

    let mut days = Vec::with_capacity(usize::try_from(days_visible).unwrap_or(0) + 1);
    let mut day = start;
    while day <= end {
        days.push(day);
        day = day + Days::new(1);
    }

    TimelineWindow {
        start,
        end,
        days,
        column_width: COLUMN_BASE_PX + u32::from(zoom) * COLUMN_STEP_PX,
    }
}

/// Horizontal scroll offset that centers today's column in the viewport,
/// clamped to zero.
#[must_use]
pub fn scroll_to_today(
    today_index: usize,
    lane_label_width: f64,
    viewport_width: f64,
    column_width: f64,
) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let offset = lane_label_width + today_index as f64 * column_width - viewport_width / 2.0
        + column_width / 2.0;
    offset.max(0.0)
}

/// Inclusive date span covering all of `tasks` and their subtasks.
///
/// Both bounds consider subtask dates independently of their parents: a
/// subtask may start before or end after its parent's stated range in
/// malformed data, and the span must not assume containment. `None` when
/// `tasks` is empty.
#[must_use]
pub fn summary_span(tasks: &[Task]) -> Option<(NaiveDate, NaiveDate)> {
    let mut span: Option<(NaiveDate, NaiveDate)> = None;
    let mut widen = |start: NaiveDate, end: NaiveDate| {
        span = Some(match span {
            None => (start, end),
            Some((s, e)) => (s.min(start), e.max(end)),
        });
    };
    for task in tasks {
        widen(task.start_date, task.end_date);
        for sub in &task.subtasks {
            widen(sub.start_date, sub.end_date);
        }
    }
    span
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{SubTask, SubTaskId, TaskId, TaskStatus, UserId, WorkspaceId};

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, d).unwrap()
    }

    #[test]
    fn window_length_and_center_per_zoom() {
        let center = date(3, 15);
        for zoom in 1..=5_u8 {
            let w = window(center, zoom);
            let expected = usize::try_from(DAYS_PER_ZOOM[usize::from(zoom) - 1]).unwrap() + 1;
            assert_eq!(w.days.len(), expected, "zoom {zoom}");
            assert!(w.days.contains(&center), "zoom {zoom} misses center");
            assert_eq!(w.days.first(), Some(&w.start));
            assert_eq!(w.days.last(), Some(&w.end));
        }
    }

    #[test]
    fn zoom_is_clamped() {
        assert_eq!(window(date(3, 15), 0), window(date(3, 15), 1));
        assert_eq!(window(date(3, 15), 9), window(date(3, 15), 5));
    }

    #[test]
    fn column_width_grows_with_zoom() {
        assert_eq!(window(date(3, 15), 1).column_width, 50);
        assert_eq!(window(date(3, 15), 5).column_width, 90);
    }

    #[test]
    fn odd_day_counts_split_floor_before_ceil_after() {
        let center = date(3, 15);
        let w = window(center, 5); // 7 days visible
        assert_eq!(w.start, date(3, 12));
        assert_eq!(w.end, date(3, 19));
    }

    #[test]
    fn scroll_offset_clamps_at_zero() {
        assert!((scroll_to_today(0, 0.0, 1200.0, 50.0) - 0.0).abs() < f64::EPSILON);
        let offset = scroll_to_today(30, 160.0, 1200.0, 50.0);
        assert!((offset - (160.0 + 1500.0 - 600.0 + 25.0)).abs() < f64::EPSILON);
    }

    #[test]
    fn summary_span_considers_subtask_dates_independently() {
        let mut task = Task {
            id: TaskId::new("t1"),
            workspace_id: WorkspaceId::new("w1"),
            creator_id: UserId::new("u1"),
            title: "t1".into(),
            description: String::new(),
            start_date: date(3, 10),
            end_date: date(3, 20),
            status: TaskStatus::Pending,
            completion: 0,
            complexity: None,
            workload: None,
            assignee_ids: vec![],
            requires_approval: false,
            updates: vec![],
            subtasks: vec![],
        };
        // Subtask outside the parent's stated range.
        task.subtasks.push(SubTask {
            id: SubTaskId::new("s1"),
            parent_id: task.id.clone(),
            title: "early".into(),
            start_date: date(3, 5),
            end_date: date(3, 25),
            status: TaskStatus::Pending,
            completion: 0,
            assignee_ids: vec![],
            requires_acceptance: false,
            creator_id: UserId::new("u1"),
        });

        let (start, end) = summary_span(&[task]).unwrap();
        assert_eq!(start, date(3, 5));
        assert_eq!(end, date(3, 25));
    }

    #[test]
    fn summary_span_of_nothing_is_none() {
        assert!(summary_span(&[]).is_none());
    }
}
