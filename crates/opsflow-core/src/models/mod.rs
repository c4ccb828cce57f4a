pub mod event;
pub mod schedule;
pub mod task;

pub use event::{TaskEvent, TaskEventKind};
pub use schedule::Schedule;
pub use task::{AgentType, LogLevel, Task, TaskLog, TaskPriority, TaskSpec, TaskStatus};
