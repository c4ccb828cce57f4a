//! Retention cleanup for finished tasks.

use crate::models::TaskStatus;
use crate::store::TaskStore;
use tracing::info;

pub const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Remove completed and cancelled tasks whose terminal instant is at or
/// before `now - max_age_days`. Failed tasks are kept so they stay
/// inspectable and manually retryable; schedules are untouched (a schedule
/// whose task was removed deactivates itself at its next firing).
///
/// `max_age_days == 0` removes every completed and cancelled task.
pub(crate) fn cleanup_tasks(store: &TaskStore, max_age_days: i64, now_ms: i64) -> usize {
    // Saturate: callers pass arbitrary day counts.
    let cutoff = now_ms.saturating_sub(max_age_days.saturating_mul(DAY_MS));
    let removed = store.remove_tasks_where(|task| {
        matches!(task.status, TaskStatus::Completed | TaskStatus::Cancelled)
            && task.terminal_at() <= cutoff
    });
    if removed > 0 {
        info!(removed, max_age_days, "retention cleanup removed finished tasks");
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AgentType, Task, TaskPriority, TaskSpec};

    fn task_with_status(status: TaskStatus, terminal_ms: i64) -> Task {
        let mut task = Task::from_spec(&TaskSpec::new(
            "t",
            "d",
            TaskPriority::Low,
            AgentType::Support,
        ));
        task.status = status;
        match status {
            TaskStatus::Completed | TaskStatus::Failed => {
                task.completed_at = Some(terminal_ms);
            }
            // Cancelled never gets completed_at; retention falls back to
            // updated_at.
            _ => task.updated_at = terminal_ms,
        }
        task
    }

    #[test]
    fn test_old_completed_and_cancelled_removed() {
        let store = TaskStore::new();
        let now = 10 * DAY_MS;
        store.insert_task(task_with_status(TaskStatus::Completed, now - 8 * DAY_MS));
        store.insert_task(task_with_status(TaskStatus::Cancelled, now - 8 * DAY_MS));
        store.insert_task(task_with_status(TaskStatus::Completed, now - DAY_MS));

        let removed = cleanup_tasks(&store, 7, now);
        assert_eq!(removed, 2);
        assert_eq!(store.task_count(), 1);
    }

    #[test]
    fn test_failed_tasks_are_retained() {
        let store = TaskStore::new();
        let now = 10 * DAY_MS;
        store.insert_task(task_with_status(TaskStatus::Failed, now - 9 * DAY_MS));

        assert_eq!(cleanup_tasks(&store, 1, now), 0);
        assert_eq!(store.task_count(), 1);
    }

    #[test]
    fn test_active_tasks_are_retained() {
        let store = TaskStore::new();
        let now = 10 * DAY_MS;
        store.insert_task(task_with_status(TaskStatus::Pending, 0));
        store.insert_task(task_with_status(TaskStatus::Running, 0));

        assert_eq!(cleanup_tasks(&store, 0, now), 0);
        assert_eq!(store.task_count(), 2);
    }

    #[test]
    fn test_huge_age_keeps_everything_without_overflow() {
        let store = TaskStore::new();
        let now = 10 * DAY_MS;
        store.insert_task(task_with_status(TaskStatus::Completed, now - DAY_MS));

        assert_eq!(cleanup_tasks(&store, i64::MAX, now), 0);
        assert_eq!(store.task_count(), 1);
    }

    #[test]
    fn test_zero_age_removes_all_finished() {
        let store = TaskStore::new();
        let now = 10 * DAY_MS;
        store.insert_task(task_with_status(TaskStatus::Completed, now - 1));
        store.insert_task(task_with_status(TaskStatus::Cancelled, now - 1));

        assert_eq!(cleanup_tasks(&store, 0, now), 2);
        assert_eq!(store.task_count(), 0);
    }
}
