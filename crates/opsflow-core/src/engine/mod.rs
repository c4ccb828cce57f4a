pub mod orchestrator;
pub mod pipeline;
pub mod retry;
pub mod scheduler;

pub use orchestrator::{EngineConfig, Orchestrator};
pub use pipeline::{CHECKPOINTS, Checkpoint, PipelineConfig, SimulatedStepExecutor, StepExecutor};
pub use retry::RetryPolicy;
pub use scheduler::{SchedulerConfig, SchedulerHandle};
