pub mod cleanup;
pub mod stats;

pub use stats::{AgentHealth, EngineStatus, TaskStatistics};
