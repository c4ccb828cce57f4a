//! Event bus: synchronous fan-out of task transitions to observers.

use crate::models::TaskEvent;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

pub type SubscriberId = u64;

/// Observer of task state transitions.
///
/// Dispatch is synchronous on the engine's writer path; implementations
/// should hand heavy work off to a channel rather than block here.
pub trait TaskObserver: Send + Sync {
    fn on_event(&self, event: &TaskEvent) -> anyhow::Result<()>;
}

/// Fan-out of transition events to a dynamic set of subscribers.
///
/// A failing subscriber is logged and skipped; it never aborts dispatch to
/// the remaining subscribers or affects engine state.
pub struct EventBus {
    next_id: AtomicU64,
    subscribers: RwLock<Vec<(SubscriberId, Arc<dyn TaskObserver>)>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, observer: Arc<dyn TaskObserver>) -> SubscriberId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.subscribers.write().push((id, observer));
        id
    }

    /// Returns false when no subscriber with that id exists.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(sub_id, _)| *sub_id != id);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn emit(&self, event: TaskEvent) {
        // Snapshot the subscriber list so observer callbacks run without
        // holding the bus lock.
        let subscribers: Vec<_> = self.subscribers.read().clone();
        for (id, observer) in subscribers {
            if let Err(error) = observer.on_event(&event) {
                warn!(
                    subscriber = id,
                    task_id = %event.task_id,
                    %error,
                    "task observer failed, skipping"
                );
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
