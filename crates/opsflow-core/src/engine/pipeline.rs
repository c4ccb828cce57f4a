//! Execution pipeline: drives one task through its checkpoint ladder.
//!
//! A run is a spawned tokio task that walks the fixed checkpoint sequence,
//! one step delay apart. The unit of atomic work is one checkpoint: every
//! continuation re-checks that the task is still `Running` under the store
//! lock before mutating or emitting, so cancellation and pause are
//! cooperative no-ops rather than preemption.

use crate::engine::retry::{RetryPolicy, RetryState};
use crate::error::ExecutionError;
use crate::events::EventBus;
use crate::models::{LogLevel, Task, TaskEvent, TaskEventKind, TaskStatus};
use crate::store::TaskStore;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// One discrete progress milestone within a task's simulated execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    /// Progress value reached when this checkpoint completes (0..=100)
    pub progress: u8,
    pub phase: &'static str,
}

/// The fixed checkpoint ladder every run walks in order.
pub const CHECKPOINTS: [Checkpoint; 5] = [
    Checkpoint { progress: 20, phase: "initialization" },
    Checkpoint { progress: 40, phase: "processing input" },
    Checkpoint { progress: 60, phase: "executing business logic" },
    Checkpoint { progress: 80, phase: "finalizing" },
    Checkpoint { progress: 100, phase: "done" },
];

/// Work performed at each checkpoint, injectable so hosts can plug in real
/// agent work and tests can inject faults or gates.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn run_step(&self, task: &Task, checkpoint: &Checkpoint) -> Result<(), ExecutionError>;
}

/// Default executor: the simulated multi-phase job always succeeds.
pub struct SimulatedStepExecutor;

#[async_trait]
impl StepExecutor for SimulatedStepExecutor {
    async fn run_step(&self, _task: &Task, _checkpoint: &Checkpoint) -> Result<(), ExecutionError> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Delay between successive checkpoints
    pub step_delay: Duration,
    pub retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            step_delay: Duration::from_secs(1),
            retry: RetryPolicy::default(),
        }
    }
}

pub(crate) struct ExecutionPipeline {
    store: Arc<TaskStore>,
    bus: Arc<EventBus>,
    executor: Arc<dyn StepExecutor>,
    config: PipelineConfig,
}

impl ExecutionPipeline {
    pub fn new(
        store: Arc<TaskStore>,
        bus: Arc<EventBus>,
        executor: Arc<dyn StepExecutor>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            bus,
            executor,
            config,
        }
    }

    /// Start a run for a pending task on the runtime. Anything other than a
    /// pending task at spawn time makes the run a no-op, which also
    /// collapses duplicate spawns for the same task.
    pub fn spawn_run(self: &Arc<Self>, task_id: String) {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            pipeline.run(task_id).await;
        });
    }

    async fn run(&self, task_id: String) {
        let started = self
            .store
            .update_task(&task_id, |t| {
                if t.status != TaskStatus::Pending {
                    return None;
                }
                t.start();
                Some(t.clone())
            })
            .flatten();

        let Some(task) = started else {
            debug!(task_id = %task_id, "run skipped, task missing or not pending");
            return;
        };

        info!(task_id = %task_id, agent = %task.agent_type, "task execution started");
        self.bus.emit(TaskEvent::new(TaskEventKind::Started, &task));

        // Pause-then-resume spawns a fresh run while this one may still be
        // parked in a step delay; the run_seq captured here lets the stale
        // run notice it was superseded.
        let seq = task.run_seq;

        // A resumed run continues from the first checkpoint above the
        // progress the paused run reached; progress never decreases within
        // an attempt.
        let mut index = CHECKPOINTS
            .iter()
            .position(|c| c.progress > task.progress)
            .unwrap_or(CHECKPOINTS.len());
        let mut retry = RetryState::new();

        while index < CHECKPOINTS.len() {
            let checkpoint = &CHECKPOINTS[index];
            sleep(self.config.step_delay).await;

            let Some(snapshot) = self.store.get_task(&task_id) else {
                return;
            };
            if snapshot.status != TaskStatus::Running || snapshot.run_seq != seq {
                debug!(
                    task_id = %task_id,
                    status = ?snapshot.status,
                    "checkpoint continuation no longer owns the task, stopping"
                );
                return;
            }

            match self.executor.run_step(&snapshot, checkpoint).await {
                Ok(()) => {
                    let advanced = self
                        .store
                        .update_task(&task_id, |t| {
                            if t.status != TaskStatus::Running || t.run_seq != seq {
                                return None;
                            }
                            t.advance(checkpoint.progress, checkpoint.phase);
                            Some(t.clone())
                        })
                        .flatten();

                    let Some(updated) = advanced else {
                        // Cancelled or paused while the step ran
                        return;
                    };
                    self.bus.emit(TaskEvent::new(
                        TaskEventKind::Progress {
                            progress: checkpoint.progress,
                        },
                        &updated,
                    ));
                    index += 1;
                }
                Err(fault) => {
                    if !self
                        .absorb_fault(&task_id, seq, checkpoint, &fault, &mut retry)
                        .await
                    {
                        return;
                    }
                }
            }
        }

        let completed = self
            .store
            .update_task(&task_id, |t| {
                if t.status != TaskStatus::Running || t.run_seq != seq {
                    return None;
                }
                t.complete();
                Some(t.clone())
            })
            .flatten();

        let Some(done) = completed else { return };
        info!(task_id = %task_id, "task completed");
        self.bus.emit(TaskEvent::new(TaskEventKind::Completed, &done));
    }

    /// Apply the retry policy to one checkpoint fault. Returns true when the
    /// run should re-attempt the checkpoint, false when it terminated (or
    /// was cancelled underneath us).
    async fn absorb_fault(
        &self,
        task_id: &str,
        seq: u64,
        checkpoint: &Checkpoint,
        fault: &ExecutionError,
        retry: &mut RetryState,
    ) -> bool {
        let policy = &self.config.retry;
        retry.record_failure(&fault.0);

        if retry.attempt <= policy.max_retries {
            warn!(
                task_id = %task_id,
                phase = checkpoint.phase,
                attempt = retry.attempt,
                max_retries = policy.max_retries,
                error = %fault,
                "checkpoint fault, will retry"
            );
            let message = format!(
                "checkpoint `{}` failed: {} (attempt {}/{}, retry delay {}s)",
                checkpoint.phase,
                fault,
                retry.attempt,
                policy.max_retries,
                policy.retry_delay.as_secs()
            );
            let logged = self
                .store
                .update_task(task_id, |t| {
                    if t.status != TaskStatus::Running || t.run_seq != seq {
                        return None;
                    }
                    t.push_log(LogLevel::Warning, message);
                    Some(())
                })
                .flatten();
            if logged.is_none() {
                return false;
            }
        }

        if retry.is_exhausted(policy) {
            let failed = self
                .store
                .update_task(task_id, |t| {
                    if t.status != TaskStatus::Running || t.run_seq != seq {
                        return None;
                    }
                    t.fail(&fault.0);
                    Some(t.clone())
                })
                .flatten();

            if let Some(updated) = failed {
                error!(task_id = %task_id, error = %fault, "task failed, retry budget exhausted");
                self.bus.emit(TaskEvent::new(
                    TaskEventKind::Failed {
                        error: fault.0.clone(),
                    },
                    &updated,
                ));
            }
            return false;
        }

        sleep(policy.retry_delay).await;
        true
    }
}
