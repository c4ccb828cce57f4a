//! Aggregate statistics and engine status snapshots.

use crate::models::{AgentType, Task, TaskStatus};
use chrono::{Local, TimeZone};
use serde::Serialize;
use std::collections::HashMap;

/// Counts per lifecycle status plus today's throughput.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct TaskStatistics {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Completed since local midnight
    pub completed_today: usize,
    /// Failed since local midnight
    pub failed_today: usize,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AgentHealth {
    Idle,
    Busy,
}

/// Point-in-time snapshot of the engine as a whole.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    /// Whether the scheduler loop is running
    pub running: bool,
    /// Tasks currently in `Running` status
    pub active_tasks: usize,
    pub completed_today: usize,
    pub failed_today: usize,
    /// Busy iff at least one running task targets the agent type
    pub agents_status: HashMap<AgentType, AgentHealth>,
    /// Milliseconds since epoch of the last registry mutation
    pub last_activity: i64,
    pub task_count: usize,
    pub schedule_count: usize,
    pub subscriber_count: usize,
}

/// Start of the current day in the host's local timezone, as Unix ms.
pub(crate) fn local_midnight_ms() -> i64 {
    let now = Local::now();
    let midnight = now.date_naive().and_hms_opt(0, 0, 0).expect("valid midnight");
    Local
        .from_local_datetime(&midnight)
        .earliest()
        .map(|dt| dt.timestamp_millis())
        .unwrap_or_else(|| now.timestamp_millis())
}

pub(crate) fn compute_statistics(tasks: &[Task], since_ms: i64) -> TaskStatistics {
    let mut stats = TaskStatistics {
        total: tasks.len(),
        ..Default::default()
    };
    for task in tasks {
        match task.status {
            TaskStatus::Pending => stats.pending += 1,
            TaskStatus::Running => stats.running += 1,
            TaskStatus::Completed => {
                stats.completed += 1;
                if task.completed_at.is_some_and(|at| at >= since_ms) {
                    stats.completed_today += 1;
                }
            }
            TaskStatus::Failed => {
                stats.failed += 1;
                if task.completed_at.is_some_and(|at| at >= since_ms) {
                    stats.failed_today += 1;
                }
            }
            TaskStatus::Cancelled => stats.cancelled += 1,
        }
    }
    stats
}

pub(crate) fn agents_status(tasks: &[Task]) -> HashMap<AgentType, AgentHealth> {
    AgentType::ALL
        .iter()
        .map(|&agent_type| {
            let busy = tasks
                .iter()
                .any(|t| t.agent_type == agent_type && t.status == TaskStatus::Running);
            let health = if busy {
                AgentHealth::Busy
            } else {
                AgentHealth::Idle
            };
            (agent_type, health)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TaskPriority, TaskSpec};

    fn task(status: TaskStatus, agent: AgentType, completed_at: Option<i64>) -> Task {
        let mut task = Task::from_spec(&TaskSpec::new("t", "d", TaskPriority::Low, agent));
        task.status = status;
        task.completed_at = completed_at;
        task
    }

    #[test]
    fn test_counts_per_status() {
        let tasks = vec![
            task(TaskStatus::Pending, AgentType::Intake, None),
            task(TaskStatus::Running, AgentType::Pm, None),
            task(TaskStatus::Completed, AgentType::Pm, Some(5_000)),
            task(TaskStatus::Failed, AgentType::Launch, Some(5_000)),
            task(TaskStatus::Cancelled, AgentType::Support, None),
        ];

        let stats = compute_statistics(&tasks, 0);
        assert_eq!(stats.total, 5);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.running, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.cancelled, 1);
    }

    #[test]
    fn test_today_window_excludes_yesterday() {
        let midnight = 1_000_000;
        let tasks = vec![
            task(TaskStatus::Completed, AgentType::Pm, Some(midnight - 1)),
            task(TaskStatus::Completed, AgentType::Pm, Some(midnight)),
            task(TaskStatus::Completed, AgentType::Pm, Some(midnight + 1)),
            task(TaskStatus::Failed, AgentType::Pm, Some(midnight - 1)),
            task(TaskStatus::Failed, AgentType::Pm, Some(midnight + 500)),
        ];

        let stats = compute_statistics(&tasks, midnight);
        assert_eq!(stats.completed, 3);
        assert_eq!(stats.completed_today, 2);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.failed_today, 1);
    }

    #[test]
    fn test_agents_status_reflects_running_tasks() {
        let tasks = vec![
            task(TaskStatus::Running, AgentType::Pm, None),
            task(TaskStatus::Running, AgentType::Pm, None),
            task(TaskStatus::Pending, AgentType::Intake, None),
        ];

        let agents = agents_status(&tasks);
        assert_eq!(agents.len(), AgentType::ALL.len());
        assert_eq!(agents[&AgentType::Pm], AgentHealth::Busy);
        assert_eq!(agents[&AgentType::Intake], AgentHealth::Idle);
        assert_eq!(agents[&AgentType::Support], AgentHealth::Idle);
    }

    #[test]
    fn test_local_midnight_is_not_in_the_future() {
        let midnight = local_midnight_ms();
        assert!(midnight <= chrono::Utc::now().timestamp_millis());
    }
}
