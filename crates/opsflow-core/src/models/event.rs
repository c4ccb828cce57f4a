//! Typed state-transition events broadcast to observers.

use crate::models::Task;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Discriminated transition kind with its transition-specific payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEventKind {
    /// Task accepted into the registry
    Created,
    /// Execution started (pending -> running)
    Started,
    /// A checkpoint was reached
    Progress { progress: u8 },
    /// Terminal success
    Completed,
    /// Terminal failure after the retry budget was exhausted
    Failed { error: String },
    /// User-initiated cancellation
    Cancelled,
}

/// One state-transition notification.
///
/// Carries an owned snapshot of the task, never a live reference, so
/// observers cannot mutate engine state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    pub task_id: String,
    /// Milliseconds since epoch
    pub timestamp: i64,
    pub kind: TaskEventKind,
    /// Immutable snapshot of the task at transition time
    pub task: Task,
}

impl TaskEvent {
    pub fn new(kind: TaskEventKind, task: &Task) -> Self {
        Self {
            task_id: task.id.clone(),
            timestamp: Utc::now().timestamp_millis(),
            kind,
            task: task.clone(),
        }
    }
}
