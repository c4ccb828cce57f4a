//! OpsFlow core: an in-process agent task orchestration engine.
//!
//! Tasks move through a pending/running/terminal lifecycle driven by an
//! execution pipeline with bounded automatic retry. A background scheduler
//! releases deferred tasks and fires recurring cron schedules, and every
//! state transition fans out to subscribed observers.

pub mod engine;
pub mod error;
pub mod events;
pub mod models;
pub mod services;

pub(crate) mod store;

#[cfg(test)]
pub(crate) mod testkit;

pub use engine::{
    CHECKPOINTS, Checkpoint, EngineConfig, Orchestrator, PipelineConfig, RetryPolicy,
    SchedulerConfig, SchedulerHandle, SimulatedStepExecutor, StepExecutor,
};
pub use error::{EngineError, ExecutionError};
pub use events::{EventBus, SubscriberId, TaskObserver};
pub use models::{
    AgentType, LogLevel, Schedule, Task, TaskEvent, TaskEventKind, TaskLog, TaskPriority, TaskSpec,
    TaskStatus,
};
pub use services::{AgentHealth, EngineStatus, TaskStatistics};
