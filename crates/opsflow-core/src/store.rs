//! In-memory task and schedule registries.
//!
//! One `RwLock` is the engine's single logical writer domain: every
//! mutating operation goes through it, and reads hand out snapshot clones.
//! State is process-memory only and lost on restart by design.

use crate::models::{Schedule, Task, TaskStatus};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

#[derive(Default)]
struct StoreInner {
    tasks: HashMap<String, Task>,
    schedules: HashMap<String, Schedule>,
}

pub(crate) struct TaskStore {
    inner: RwLock<StoreInner>,
    last_activity: AtomicI64,
}

impl TaskStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            last_activity: AtomicI64::new(Utc::now().timestamp_millis()),
        }
    }

    fn touch_activity(&self) {
        self.last_activity
            .store(Utc::now().timestamp_millis(), Ordering::SeqCst);
    }

    pub fn last_activity(&self) -> i64 {
        self.last_activity.load(Ordering::SeqCst)
    }

    pub fn insert_task(&self, task: Task) {
        self.inner.write().tasks.insert(task.id.clone(), task);
        self.touch_activity();
    }

    pub fn get_task(&self, id: &str) -> Option<Task> {
        self.inner.read().tasks.get(id).cloned()
    }

    /// All tasks, newest first by creation time.
    pub fn list_tasks(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.inner.read().tasks.values().cloned().collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tasks
    }

    pub fn task_count(&self) -> usize {
        self.inner.read().tasks.len()
    }

    /// Mutate one task under the write lock. Returns `None` for an unknown
    /// id; otherwise whatever the closure produced. Transition guards live
    /// in the closures so check-and-mutate is atomic.
    pub fn update_task<R>(&self, id: &str, f: impl FnOnce(&mut Task) -> R) -> Option<R> {
        let mut inner = self.inner.write();
        let result = inner.tasks.get_mut(id).map(f);
        drop(inner);
        if result.is_some() {
            self.touch_activity();
        }
        result
    }

    /// Bulk removal for retention cleanup; returns the removed count.
    pub fn remove_tasks_where(&self, predicate: impl Fn(&Task) -> bool) -> usize {
        let mut inner = self.inner.write();
        let before = inner.tasks.len();
        inner.tasks.retain(|_, task| !predicate(task));
        let removed = before - inner.tasks.len();
        drop(inner);
        if removed > 0 {
            self.touch_activity();
        }
        removed
    }

    /// Pending tasks whose deferred start time has arrived and that have
    /// never been started.
    pub fn due_deferred_tasks(&self, now_ms: i64) -> Vec<Task> {
        self.inner
            .read()
            .tasks
            .values()
            .filter(|t| {
                t.status == TaskStatus::Pending
                    && t.started_at.is_none()
                    && t.scheduled_at.is_some_and(|at| at <= now_ms)
            })
            .cloned()
            .collect()
    }

    pub fn insert_schedule(&self, schedule: Schedule) {
        self.inner
            .write()
            .schedules
            .insert(schedule.id.clone(), schedule);
        self.touch_activity();
    }

    pub fn list_schedules(&self) -> Vec<Schedule> {
        self.inner.read().schedules.values().cloned().collect()
    }

    pub fn schedule_count(&self) -> usize {
        self.inner.read().schedules.len()
    }

    pub fn update_schedule<R>(&self, id: &str, f: impl FnOnce(&mut Schedule) -> R) -> Option<R> {
        let mut inner = self.inner.write();
        let result = inner.schedules.get_mut(id).map(f);
        drop(inner);
        if result.is_some() {
            self.touch_activity();
        }
        result
    }

    /// Active schedules due at `now_ms`, paired with a snapshot of their
    /// bound task (when it still exists).
    pub fn due_schedules(&self, now_ms: i64) -> Vec<(Schedule, Option<Task>)> {
        let inner = self.inner.read();
        inner
            .schedules
            .values()
            .filter(|s| s.is_due(now_ms))
            .map(|s| (s.clone(), inner.tasks.get(&s.task_id).cloned()))
            .collect()
    }
}
