//! Shared test doubles for engine tests.

use crate::engine::{Checkpoint, StepExecutor};
use crate::error::ExecutionError;
use crate::events::TaskObserver;
use crate::models::{Task, TaskEvent};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::Semaphore;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Forwards every event into an mpsc channel for assertion.
pub(crate) struct ChannelObserver(UnboundedSender<TaskEvent>);

impl TaskObserver for ChannelObserver {
    fn on_event(&self, event: &TaskEvent) -> anyhow::Result<()> {
        // A dropped receiver just means the test stopped listening.
        let _ = self.0.send(event.clone());
        Ok(())
    }
}

pub(crate) fn event_channel() -> (Arc<ChannelObserver>, UnboundedReceiver<TaskEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(ChannelObserver(tx)), rx)
}

/// Step executor that fails a configurable number of times before
/// succeeding.
pub(crate) struct FailingStepExecutor {
    message: String,
    remaining: AtomicI64,
}

impl FailingStepExecutor {
    pub fn always(message: &str) -> Self {
        Self {
            message: message.to_string(),
            remaining: AtomicI64::new(i64::MAX),
        }
    }

    pub fn times(count: i64, message: &str) -> Self {
        Self {
            message: message.to_string(),
            remaining: AtomicI64::new(count),
        }
    }
}

#[async_trait]
impl StepExecutor for FailingStepExecutor {
    async fn run_step(&self, _task: &Task, _checkpoint: &Checkpoint) -> Result<(), ExecutionError> {
        if self.remaining.fetch_sub(1, Ordering::SeqCst) > 0 {
            Err(ExecutionError::new(&self.message))
        } else {
            Ok(())
        }
    }
}

/// Step executor that blocks each step on a semaphore permit, so tests
/// control exactly how far a run advances.
#[derive(Clone)]
pub(crate) struct GatedStepExecutor {
    gate: Arc<Semaphore>,
}

impl GatedStepExecutor {
    pub fn closed() -> Self {
        Self {
            gate: Arc::new(Semaphore::new(0)),
        }
    }

    pub fn open(&self, steps: usize) {
        self.gate.add_permits(steps);
    }
}

#[async_trait]
impl StepExecutor for GatedStepExecutor {
    async fn run_step(&self, _task: &Task, _checkpoint: &Checkpoint) -> Result<(), ExecutionError> {
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| ExecutionError::new("step gate closed"))?;
        permit.forget();
        Ok(())
    }
}
