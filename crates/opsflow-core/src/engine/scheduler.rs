//! Background scheduler: releases deferred tasks and fires cron schedules.
//!
//! One spawned loop owns all time-based triggering. Each tick scans the
//! registries for work that has become due; commands arrive over an mpsc
//! channel so callers never touch the loop's state directly.

use crate::engine::pipeline::ExecutionPipeline;
use crate::models::{Schedule, Task, TaskStatus};
use crate::store::TaskStore;
use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often the loop scans for due work
    pub tick_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
enum SchedulerCommand {
    /// Scan for due work immediately instead of waiting for the next tick
    CheckNow,
    Stop,
}

/// Cheap cloneable handle to a running scheduler loop.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    pub async fn check_now(&self) {
        let _ = self.tx.send(SchedulerCommand::CheckNow).await;
    }

    pub async fn stop(&self) {
        let _ = self.tx.send(SchedulerCommand::Stop).await;
    }
}

pub(crate) struct SchedulerRunner {
    store: Arc<TaskStore>,
    pipeline: Arc<ExecutionPipeline>,
    config: SchedulerConfig,
    running: Arc<AtomicBool>,
}

impl SchedulerRunner {
    pub fn new(
        store: Arc<TaskStore>,
        pipeline: Arc<ExecutionPipeline>,
        config: SchedulerConfig,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            store,
            pipeline,
            config,
            running,
        }
    }

    pub fn start(self: Arc<Self>) -> SchedulerHandle {
        let (tx, rx) = mpsc::channel(16);
        let runner = Arc::clone(&self);
        tokio::spawn(async move {
            runner.run_loop(rx).await;
        });
        SchedulerHandle { tx }
    }

    async fn run_loop(&self, mut rx: mpsc::Receiver<SchedulerCommand>) {
        self.running.store(true, Ordering::SeqCst);
        info!(tick = ?self.config.tick_interval, "scheduler loop started");

        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.fire_due(Utc::now().timestamp_millis());
                }
                command = rx.recv() => match command {
                    Some(SchedulerCommand::CheckNow) => {
                        self.fire_due(Utc::now().timestamp_millis());
                    }
                    Some(SchedulerCommand::Stop) | None => break,
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("scheduler loop stopped");
    }

    /// One scan: release due deferred tasks, then fire due cron schedules.
    pub(crate) fn fire_due(&self, now_ms: i64) {
        for task in self.store.due_deferred_tasks(now_ms) {
            debug!(task_id = %task.id, "deferred task released");
            self.pipeline.spawn_run(task.id);
        }

        for (schedule, task) in self.store.due_schedules(now_ms) {
            self.fire_schedule(schedule, task, now_ms);
        }
    }

    fn fire_schedule(&self, schedule: Schedule, task: Option<Task>, now_ms: i64) {
        let Some(task) = task else {
            warn!(
                schedule_id = %schedule.id,
                task_id = %schedule.task_id,
                "schedule points at a missing task, deactivating"
            );
            let _ = self
                .store
                .update_schedule(&schedule.id, |s| s.is_active = false);
            return;
        };

        match task.status {
            TaskStatus::Cancelled => {
                info!(
                    schedule_id = %schedule.id,
                    task_id = %task.id,
                    "bound task was cancelled, deactivating schedule"
                );
                let _ = self
                    .store
                    .update_schedule(&schedule.id, |s| s.is_active = false);
            }
            TaskStatus::Running => {
                // Previous run still in flight. Leave next_run in the past
                // so the next tick re-checks instead of dropping the firing.
                debug!(
                    schedule_id = %schedule.id,
                    task_id = %task.id,
                    "previous run still active, skipping this firing"
                );
            }
            TaskStatus::Pending if task.started_at.is_some() => {
                // Paused mid-run by the user; the schedule must not stomp
                // on the saved progress.
                debug!(
                    schedule_id = %schedule.id,
                    task_id = %task.id,
                    "bound task is paused, skipping this firing"
                );
            }
            TaskStatus::Pending => {
                let _ = self
                    .store
                    .update_schedule(&schedule.id, |s| s.record_fire(now_ms));
                info!(schedule_id = %schedule.id, task_id = %task.id, "cron schedule fired");
                self.pipeline.spawn_run(task.id);
            }
            TaskStatus::Completed | TaskStatus::Failed => {
                let rearmed = self
                    .store
                    .update_task(&task.id, |t| {
                        if !t.status.is_terminal() {
                            return false;
                        }
                        t.reset_for_scheduled_run();
                        true
                    })
                    .unwrap_or(false);
                if !rearmed {
                    return;
                }
                let _ = self
                    .store
                    .update_schedule(&schedule.id, |s| s.record_fire(now_ms));
                info!(schedule_id = %schedule.id, task_id = %task.id, "cron schedule fired");
                self.pipeline.spawn_run(task.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::pipeline::{PipelineConfig, SimulatedStepExecutor};
    use crate::events::EventBus;
    use crate::models::{AgentType, TaskEventKind, TaskPriority, TaskSpec};
    use crate::testkit::event_channel;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Rig {
        runner: Arc<SchedulerRunner>,
        store: Arc<TaskStore>,
        running: Arc<AtomicBool>,
        rx: UnboundedReceiver<crate::models::TaskEvent>,
    }

    fn rig(config: SchedulerConfig) -> Rig {
        let store = Arc::new(TaskStore::new());
        let bus = Arc::new(EventBus::new());
        let (observer, rx) = event_channel();
        bus.subscribe(observer);
        let pipeline = Arc::new(ExecutionPipeline::new(
            store.clone(),
            bus,
            Arc::new(SimulatedStepExecutor),
            PipelineConfig::default(),
        ));
        let running = Arc::new(AtomicBool::new(false));
        let runner = Arc::new(SchedulerRunner::new(
            store.clone(),
            pipeline,
            config,
            running.clone(),
        ));
        Rig {
            runner,
            store,
            running,
            rx,
        }
    }

    fn insert_task(store: &TaskStore) -> String {
        let task = Task::from_spec(&TaskSpec::new(
            "nightly",
            "d",
            TaskPriority::Medium,
            AgentType::Pm,
        ));
        let id = task.id.clone();
        store.insert_task(task);
        id
    }

    fn insert_due_schedule(store: &TaskStore, task_id: &str) -> String {
        let mut schedule = Schedule::new(task_id, "* * * * *", "UTC");
        schedule.next_run = Some(Utc::now().timestamp_millis() - 1_000);
        let id = schedule.id.clone();
        store.insert_schedule(schedule);
        id
    }

    async fn wait_for_completion(rx: &mut UnboundedReceiver<crate::models::TaskEvent>) {
        while let Some(event) = rx.recv().await {
            if event.kind == TaskEventKind::Completed {
                return;
            }
        }
        panic!("event stream closed before completion");
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_task_released_when_due() {
        let mut rig = rig(SchedulerConfig::default());
        let id = insert_task(&rig.store);
        let _ = rig.store
            .update_task(&id, |t| t.scheduled_at = Some(Utc::now().timestamp_millis() - 500));

        rig.runner.fire_due(Utc::now().timestamp_millis());
        wait_for_completion(&mut rig.rx).await;

        assert_eq!(
            rig.store.get_task(&id).unwrap().status,
            TaskStatus::Completed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_task_not_released_early() {
        let rig = rig(SchedulerConfig::default());
        let id = insert_task(&rig.store);
        let _ = rig.store
            .update_task(&id, |t| t.scheduled_at = Some(Utc::now().timestamp_millis() + 60_000));

        rig.runner.fire_due(Utc::now().timestamp_millis());
        tokio::task::yield_now().await;

        assert_eq!(rig.store.get_task(&id).unwrap().status, TaskStatus::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_due_schedule_fires_and_advances_next_run() {
        let mut rig = rig(SchedulerConfig::default());
        let task_id = insert_task(&rig.store);
        let schedule_id = insert_due_schedule(&rig.store, &task_id);

        let now = Utc::now().timestamp_millis();
        rig.runner.fire_due(now);
        wait_for_completion(&mut rig.rx).await;

        let schedule = rig
            .store
            .list_schedules()
            .into_iter()
            .find(|s| s.id == schedule_id)
            .unwrap();
        assert_eq!(schedule.last_run, Some(now));
        assert!(schedule.next_run.unwrap() > now);
        assert_eq!(
            rig.store.get_task(&task_id).unwrap().status,
            TaskStatus::Completed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_running_task_suppresses_firing() {
        let rig = rig(SchedulerConfig::default());
        let task_id = insert_task(&rig.store);
        let _ = rig.store.update_task(&task_id, |t| t.start());
        let schedule_id = insert_due_schedule(&rig.store, &task_id);

        let now = Utc::now().timestamp_millis();
        rig.runner.fire_due(now);
        tokio::task::yield_now().await;

        let schedule = rig
            .store
            .list_schedules()
            .into_iter()
            .find(|s| s.id == schedule_id)
            .unwrap();
        // Skipped firing: next_run stays in the past for the next tick.
        assert!(schedule.last_run.is_none());
        assert!(schedule.next_run.unwrap() < now);
        assert_eq!(rig.store.get_task(&task_id).unwrap().run_seq, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_task_rearmed_on_next_firing() {
        let mut rig = rig(SchedulerConfig::default());
        let task_id = insert_task(&rig.store);
        let _ = rig.store.update_task(&task_id, |t| {
            t.start();
            t.advance(100, "done");
            t.complete();
        });
        insert_due_schedule(&rig.store, &task_id);

        rig.runner.fire_due(Utc::now().timestamp_millis());
        wait_for_completion(&mut rig.rx).await;

        let task = rig.store.get_task(&task_id).unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        // Re-armed and run again: two starts in total.
        assert_eq!(task.run_seq, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_task_deactivates_schedule() {
        let rig = rig(SchedulerConfig::default());
        let schedule_id = insert_due_schedule(&rig.store, "no-such-task");

        rig.runner.fire_due(Utc::now().timestamp_millis());

        let schedule = rig
            .store
            .list_schedules()
            .into_iter()
            .find(|s| s.id == schedule_id)
            .unwrap();
        assert!(!schedule.is_active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_task_deactivates_schedule() {
        let rig = rig(SchedulerConfig::default());
        let task_id = insert_task(&rig.store);
        let _ = rig.store.update_task(&task_id, |t| t.cancel());
        let schedule_id = insert_due_schedule(&rig.store, &task_id);

        rig.runner.fire_due(Utc::now().timestamp_millis());

        let schedule = rig
            .store
            .list_schedules()
            .into_iter()
            .find(|s| s.id == schedule_id)
            .unwrap();
        assert!(!schedule.is_active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_now_fires_without_waiting_for_tick() {
        let mut rig = rig(SchedulerConfig {
            tick_interval: Duration::from_secs(3600),
        });
        let handle = rig.runner.clone().start();
        // Let the loop consume its immediate first tick.
        tokio::task::yield_now().await;

        let id = insert_task(&rig.store);
        let _ = rig.store
            .update_task(&id, |t| t.scheduled_at = Some(Utc::now().timestamp_millis() - 500));

        handle.check_now().await;
        wait_for_completion(&mut rig.rx).await;

        assert_eq!(
            rig.store.get_task(&id).unwrap().status,
            TaskStatus::Completed
        );
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_command_terminates_loop() {
        let rig = rig(SchedulerConfig::default());
        let handle = rig.runner.clone().start();
        tokio::task::yield_now().await;
        assert!(rig.running.load(Ordering::SeqCst));

        handle.stop().await;
        tokio::task::yield_now().await;
        assert!(!rig.running.load(Ordering::SeqCst));
    }
}
