//! Task model: the unit of work tracked through the orchestration lifecycle.

use crate::error::EngineError;
use crate::models::schedule;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle status of a task
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Terminal statuses never transition automatically; only an explicit
    /// user retry (from `Failed`) or retention cleanup moves them.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl FromStr for TaskPriority {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(TaskPriority::Low),
            "medium" => Ok(TaskPriority::Medium),
            "high" => Ok(TaskPriority::High),
            "urgent" => Ok(TaskPriority::Urgent),
            other => Err(EngineError::Validation(format!(
                "unknown priority `{}`",
                other
            ))),
        }
    }
}

/// Logical agent category a task is routed to.
///
/// A classification only; agents are not separate executing processes in
/// this engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Intake,
    SpinUp,
    Pm,
    Launch,
    Handover,
    Support,
}

impl AgentType {
    pub const ALL: [AgentType; 6] = [
        AgentType::Intake,
        AgentType::SpinUp,
        AgentType::Pm,
        AgentType::Launch,
        AgentType::Handover,
        AgentType::Support,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Intake => "intake",
            AgentType::SpinUp => "spin_up",
            AgentType::Pm => "pm",
            AgentType::Launch => "launch",
            AgentType::Handover => "handover",
            AgentType::Support => "support",
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "intake" => Ok(AgentType::Intake),
            "spin_up" => Ok(AgentType::SpinUp),
            "pm" => Ok(AgentType::Pm),
            "launch" => Ok(AgentType::Launch),
            "handover" => Ok(AgentType::Handover),
            "support" => Ok(AgentType::Support),
            other => Err(EngineError::Validation(format!(
                "unknown agent type `{}`",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Success,
}

/// One entry in a task's append-only execution log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskLog {
    pub id: String,
    pub task_id: String,
    pub level: LogLevel,
    pub message: String,
    /// Milliseconds since epoch
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl TaskLog {
    pub fn new(task_id: impl Into<String>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            task_id: task_id.into(),
            level,
            message: message.into(),
            timestamp: Utc::now().timestamp_millis(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Work request accepted by `Orchestrator::submit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub name: String,
    pub description: String,
    pub priority: TaskPriority,
    pub agent_type: AgentType,
    /// Defer execution until this instant; absent or past means run now
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Standard 5-field cron expression; presence makes the task recurring
    #[serde(default)]
    pub cron_expression: Option<String>,
    /// IANA timezone name for the cron expression, defaults to "UTC"
    #[serde(default)]
    pub timezone: Option<String>,
}

impl TaskSpec {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        priority: TaskPriority,
        agent_type: AgentType,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            priority,
            agent_type,
            scheduled_at: None,
            cron_expression: None,
            timezone: None,
        }
    }

    pub fn with_scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(at);
        self
    }

    pub fn with_cron(mut self, expression: impl Into<String>) -> Self {
        self.cron_expression = Some(expression.into());
        self
    }

    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    /// Reject malformed specs synchronously, before anything enters the
    /// registry. A bad cron expression fails here, not at fire time.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.name.trim().is_empty() {
            return Err(EngineError::Validation("task name must not be empty".into()));
        }
        if self.description.trim().is_empty() {
            return Err(EngineError::Validation(
                "task description must not be empty".into(),
            ));
        }
        if let Some(expr) = &self.cron_expression {
            schedule::parse_cron(expr)?;
        }
        if let Some(tz) = &self.timezone {
            schedule::parse_timezone(tz)?;
        }
        Ok(())
    }
}

/// A unit of work targeting an agent type, tracked through its status
/// lifecycle. All timestamps are Unix milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub agent_type: AgentType,
    #[serde(default)]
    pub scheduled_at: Option<i64>,
    #[serde(default)]
    pub started_at: Option<i64>,
    #[serde(default)]
    pub completed_at: Option<i64>,
    /// 0..=100, monotonically non-decreasing within one execution attempt
    pub progress: u8,
    /// Append-only execution log
    #[serde(default)]
    pub logs: Vec<TaskLog>,
    /// Bumped on every `start`; lets a superseded run detect that a newer
    /// run owns the task and stop touching it
    #[serde(default)]
    pub run_seq: u64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Task {
    /// Build a pending task from a validated spec.
    pub fn from_spec(spec: &TaskSpec) -> Self {
        let now = Utc::now().timestamp_millis();
        let id = Uuid::new_v4().to_string();
        let mut task = Self {
            id: id.clone(),
            name: spec.name.clone(),
            description: spec.description.clone(),
            status: TaskStatus::Pending,
            priority: spec.priority,
            agent_type: spec.agent_type,
            scheduled_at: spec.scheduled_at.map(|at| at.timestamp_millis()),
            started_at: None,
            completed_at: None,
            progress: 0,
            logs: Vec::new(),
            run_seq: 0,
            created_at: now,
            updated_at: now,
        };
        task.push_log(
            LogLevel::Info,
            format!("task created for agent `{}`", spec.agent_type),
        );
        task
    }

    pub fn push_log(&mut self, level: LogLevel, message: impl Into<String>) {
        self.logs.push(TaskLog::new(self.id.clone(), level, message));
        self.touch();
    }

    pub fn push_log_with_details(
        &mut self,
        level: LogLevel,
        message: impl Into<String>,
        details: Value,
    ) {
        self.logs
            .push(TaskLog::new(self.id.clone(), level, message).with_details(details));
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now().timestamp_millis();
    }

    /// Pending -> Running
    pub fn start(&mut self) {
        self.status = TaskStatus::Running;
        self.run_seq += 1;
        self.started_at = Some(Utc::now().timestamp_millis());
        self.push_log(LogLevel::Info, "execution started");
    }

    /// Running -> Running, advancing to the given checkpoint
    pub fn advance(&mut self, progress: u8, phase: &str) {
        self.progress = progress;
        self.push_log(LogLevel::Info, format!("{} ({}%)", phase, progress));
    }

    /// Running -> Completed
    pub fn complete(&mut self) {
        self.status = TaskStatus::Completed;
        self.completed_at = Some(Utc::now().timestamp_millis());
        self.push_log(LogLevel::Success, "execution completed successfully");
    }

    /// Running -> Failed, once the retry budget is exhausted
    pub fn fail(&mut self, error: &str) {
        self.status = TaskStatus::Failed;
        self.completed_at = Some(Utc::now().timestamp_millis());
        self.push_log(LogLevel::Error, format!("execution failed: {}", error));
    }

    /// Any non-terminal -> Cancelled. Cancelling is not completing, so
    /// `completed_at` stays unset.
    pub fn cancel(&mut self) {
        self.status = TaskStatus::Cancelled;
        self.push_log(LogLevel::Warning, "task cancelled");
    }

    /// Running -> Pending. In-flight checkpoint continuations observe the
    /// status change and collapse to a no-op; progress is kept so a resume
    /// continues where the run left off.
    pub fn pause(&mut self) {
        self.status = TaskStatus::Pending;
        self.push_log(LogLevel::Info, "execution paused");
    }

    /// Failed -> Pending for an explicit user retry: progress and the
    /// execution timestamps are cleared for a fresh attempt.
    pub fn reset_for_retry(&mut self) {
        self.status = TaskStatus::Pending;
        self.progress = 0;
        self.started_at = None;
        self.completed_at = None;
        self.push_log(LogLevel::Info, "manual retry requested");
    }

    /// Re-arm a recurring task for the next scheduled firing.
    pub fn reset_for_scheduled_run(&mut self) {
        self.status = TaskStatus::Pending;
        self.progress = 0;
        self.started_at = None;
        self.completed_at = None;
        self.push_log(LogLevel::Info, "scheduled run triggered");
    }

    /// Instant the task reached its terminal state, for retention decisions.
    /// Cancelled tasks never get `completed_at`, so fall back to the last
    /// update.
    pub fn terminal_at(&self) -> i64 {
        self.completed_at.unwrap_or(self.updated_at)
    }
}
