//! Client-side progress estimate for in-progress tasks.

use chrono::{DateTime, Utc};
use wardops_core::task::{Task, TaskStatus};

/// `clamp(100 * elapsed / estimated, 0, 100)`, or `None` when the task is not
/// in progress or has no start time.
pub fn projected_progress(task: &Task, now: DateTime<Utc>) -> Option<f64> {
    if task.status != TaskStatus::InProgress {
        return None;
    }
    let started = task.started_at?;
    if task.estimated_duration_seconds == 0 {
        return Some(100.0);
    }
    let elapsed = (now - started).num_milliseconds() as f64 / 1000.0;
    let estimated = f64::from(task.estimated_duration_seconds);
    Some((100.0 * elapsed / estimated).clamp(0.0, 100.0))
}
