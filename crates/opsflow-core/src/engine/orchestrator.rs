//! Orchestrator: the engine's public facade.
//!
//! Owns the task registry, the event bus and the execution pipeline, and
//! lazily starts the background scheduler. All operations are cheap
//! synchronous calls; actual execution happens on spawned pipeline runs.

use crate::engine::pipeline::{
    ExecutionPipeline, PipelineConfig, SimulatedStepExecutor, StepExecutor,
};
use crate::engine::scheduler::{SchedulerConfig, SchedulerHandle, SchedulerRunner};
use crate::error::EngineError;
use crate::events::{EventBus, SubscriberId, TaskObserver};
use crate::models::schedule::DEFAULT_TIMEZONE;
use crate::models::{Schedule, Task, TaskEvent, TaskEventKind, TaskSpec, TaskStatus};
use crate::services::cleanup::cleanup_tasks;
use crate::services::stats::{agents_status, compute_statistics, local_midnight_ms};
use crate::services::{EngineStatus, TaskStatistics};
use crate::store::TaskStore;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub pipeline: PipelineConfig,
    pub scheduler: SchedulerConfig,
}

pub struct Orchestrator {
    store: Arc<TaskStore>,
    bus: Arc<EventBus>,
    pipeline: Arc<ExecutionPipeline>,
    scheduler_config: SchedulerConfig,
    scheduler_running: Arc<AtomicBool>,
    scheduler: Mutex<Option<SchedulerHandle>>,
}

impl Orchestrator {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_step_executor(config, Arc::new(SimulatedStepExecutor))
    }

    /// Build an engine whose checkpoint work is performed by `executor`
    /// instead of the built-in simulation.
    pub fn with_step_executor(config: EngineConfig, executor: Arc<dyn StepExecutor>) -> Self {
        let store = Arc::new(TaskStore::new());
        let bus = Arc::new(EventBus::new());
        let pipeline = Arc::new(ExecutionPipeline::new(
            store.clone(),
            bus.clone(),
            executor,
            config.pipeline,
        ));
        Self {
            store,
            bus,
            pipeline,
            scheduler_config: config.scheduler,
            scheduler_running: Arc::new(AtomicBool::new(false)),
            scheduler: Mutex::new(None),
        }
    }

    /// Accept a new task. Unless `scheduled_at` defers it, the task is
    /// handed to the pipeline right away; a cron expression additionally
    /// registers a recurring schedule that re-arms the task on each firing.
    pub fn submit(&self, spec: TaskSpec) -> Result<Task, EngineError> {
        spec.validate()?;

        let task = Task::from_spec(&spec);
        let snapshot = task.clone();
        self.store.insert_task(task);

        if let Some(expr) = &spec.cron_expression {
            let timezone = spec
                .timezone
                .clone()
                .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
            let schedule = Schedule::new(&snapshot.id, expr, timezone);
            info!(
                task_id = %snapshot.id,
                cron = %expr,
                next_run = ?schedule.next_run,
                "recurring schedule registered"
            );
            self.store.insert_schedule(schedule);
        }

        info!(task_id = %snapshot.id, name = %snapshot.name, "task submitted");
        self.bus
            .emit(TaskEvent::new(TaskEventKind::Created, &snapshot));

        let now = Utc::now().timestamp_millis();
        if snapshot.scheduled_at.is_none_or(|at| at <= now) {
            self.pipeline.spawn_run(snapshot.id.clone());
        }
        Ok(snapshot)
    }

    pub fn get(&self, id: &str) -> Option<Task> {
        self.store.get_task(id)
    }

    /// All tasks, newest first.
    pub fn list(&self) -> Vec<Task> {
        self.store.list_tasks()
    }

    pub fn list_schedules(&self) -> Vec<Schedule> {
        self.store.list_schedules()
    }

    /// Cancel a non-terminal task. In-flight checkpoint continuations
    /// observe the new status and stop without further effects. Returns
    /// false on an unknown id or an already terminal task.
    pub fn cancel(&self, id: &str) -> bool {
        let cancelled = self.guarded_transition(id, |t| {
            if t.status.is_terminal() {
                return None;
            }
            t.cancel();
            Some(t.clone())
        });
        let Some(cancelled) = cancelled else {
            debug!(task_id = %id, "cancel was a no-op");
            return false;
        };
        info!(task_id = %id, "task cancelled");
        self.bus
            .emit(TaskEvent::new(TaskEventKind::Cancelled, &cancelled));
        true
    }

    /// Manually retry a failed task with a fresh retry budget. Returns
    /// false unless the task exists and is currently failed.
    pub fn retry(&self, id: &str) -> bool {
        let reset = self.guarded_transition(id, |t| {
            if t.status != TaskStatus::Failed {
                return None;
            }
            t.reset_for_retry();
            Some(t.clone())
        });
        let Some(reset) = reset else {
            debug!(task_id = %id, "retry was a no-op");
            return false;
        };
        info!(task_id = %id, "manual retry");
        self.pipeline.spawn_run(reset.id);
        true
    }

    /// Pause a running task, keeping its progress for a later resume.
    pub fn pause(&self, id: &str) -> bool {
        let paused = self.guarded_transition(id, |t| {
            if t.status != TaskStatus::Running {
                return None;
            }
            t.pause();
            Some(t.clone())
        });
        let Some(paused) = paused else {
            debug!(task_id = %id, "pause was a no-op");
            return false;
        };
        info!(task_id = %id, progress = paused.progress, "task paused");
        true
    }

    /// Resume a pending task; a previously paused one continues from the
    /// last checkpoint it reached.
    pub fn resume(&self, id: &str) -> bool {
        let Some(task) = self.store.get_task(id) else {
            debug!(task_id = %id, "resume was a no-op");
            return false;
        };
        if task.status != TaskStatus::Pending {
            debug!(task_id = %id, status = %task.status, "resume was a no-op");
            return false;
        }
        info!(task_id = %id, progress = task.progress, "task resumed");
        self.pipeline.spawn_run(task.id);
        true
    }

    pub fn statistics(&self) -> TaskStatistics {
        compute_statistics(&self.store.list_tasks(), local_midnight_ms())
    }

    pub fn status(&self) -> EngineStatus {
        let tasks = self.store.list_tasks();
        let stats = compute_statistics(&tasks, local_midnight_ms());
        EngineStatus {
            running: self.scheduler_running.load(Ordering::SeqCst),
            active_tasks: stats.running,
            completed_today: stats.completed_today,
            failed_today: stats.failed_today,
            agents_status: agents_status(&tasks),
            last_activity: self.store.last_activity(),
            task_count: tasks.len(),
            schedule_count: self.store.schedule_count(),
            subscriber_count: self.bus.subscriber_count(),
        }
    }

    /// Remove completed and cancelled tasks older than `max_age_days`.
    /// Returns the number of removed tasks.
    pub fn cleanup(&self, max_age_days: i64) -> usize {
        cleanup_tasks(&self.store, max_age_days, Utc::now().timestamp_millis())
    }

    pub fn subscribe(&self, observer: Arc<dyn TaskObserver>) -> SubscriberId {
        self.bus.subscribe(observer)
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// Start the background scheduler loop. Idempotent; a second call
    /// returns a handle to the already running loop.
    pub fn start_scheduler(&self) -> SchedulerHandle {
        let mut guard = self.scheduler.lock();
        if let Some(handle) = guard.as_ref() {
            return handle.clone();
        }
        let runner = Arc::new(SchedulerRunner::new(
            self.store.clone(),
            self.pipeline.clone(),
            self.scheduler_config.clone(),
            self.scheduler_running.clone(),
        ));
        let handle = runner.start();
        *guard = Some(handle.clone());
        handle
    }

    pub async fn stop_scheduler(&self) {
        let handle = self.scheduler.lock().take();
        if let Some(handle) = handle {
            handle.stop().await;
        }
    }

    pub fn is_scheduler_running(&self) -> bool {
        self.scheduler_running.load(Ordering::SeqCst)
    }

    /// Check-and-mutate under the store lock; `None` means unknown id or a
    /// status the closure refused to transition from.
    fn guarded_transition(
        &self,
        id: &str,
        f: impl FnOnce(&mut Task) -> Option<Task>,
    ) -> Option<Task> {
        self.store.update_task(id, f).flatten()
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
