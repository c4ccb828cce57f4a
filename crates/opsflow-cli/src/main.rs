mod cli;
mod output;

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use cli::{Cli, Commands};
use opsflow_core::{
    AgentType, Checkpoint, EngineConfig, ExecutionError, Orchestrator, PipelineConfig,
    SchedulerConfig, StepExecutor, Task, TaskEventKind, TaskPriority, TaskSpec,
};
use output::ConsolePrinter;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Demo {
            tasks,
            flaky,
            step_delay_ms,
            priority,
            agent,
        } => demo(tasks, flaky, step_delay_ms, priority, agent).await,
        Commands::Cron {
            expression,
            timezone,
            tick_secs,
        } => cron(expression, timezone, tick_secs).await,
    }
}

/// Fails the first couple of steps per process, then recovers.
struct FlakySteps {
    faults: AtomicU32,
}

#[async_trait]
impl StepExecutor for FlakySteps {
    async fn run_step(&self, _task: &Task, _checkpoint: &Checkpoint) -> Result<(), ExecutionError> {
        if self.faults.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            Err(ExecutionError::new("simulated transient fault"))
        } else {
            Ok(())
        }
    }
}

const DEMO_AGENTS: [AgentType; 3] = [AgentType::Intake, AgentType::Pm, AgentType::Launch];

async fn demo(
    tasks: usize,
    flaky: bool,
    step_delay_ms: u64,
    priority: TaskPriority,
    agent: Option<AgentType>,
) -> Result<()> {
    info!(tasks, flaky, ?priority, "submitting demo batch");
    let config = EngineConfig {
        pipeline: PipelineConfig {
            step_delay: Duration::from_millis(step_delay_ms),
            ..Default::default()
        },
        ..Default::default()
    };
    let engine = if flaky {
        Orchestrator::with_step_executor(
            config,
            Arc::new(FlakySteps {
                faults: AtomicU32::new(2),
            }),
        )
    } else {
        Orchestrator::new(config)
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    engine.subscribe(Arc::new(ConsolePrinter::new(tx)));

    for i in 0..tasks {
        let agent = agent.unwrap_or(DEMO_AGENTS[i % DEMO_AGENTS.len()]);
        engine.submit(
            TaskSpec::new(
                format!("demo task {}", i + 1),
                format!("demo workload routed to the {agent} agent"),
                priority,
                agent,
            ),
        )?;
    }

    let mut finished = 0;
    while finished < tasks {
        let Some(event) = rx.recv().await else { break };
        if matches!(
            event.kind,
            TaskEventKind::Completed | TaskEventKind::Failed { .. } | TaskEventKind::Cancelled
        ) {
            finished += 1;
        }
    }

    println!();
    output::print_statistics(&engine.statistics());
    Ok(())
}

async fn cron(expression: String, timezone: String, tick_secs: u64) -> Result<()> {
    let engine = Orchestrator::new(EngineConfig {
        scheduler: SchedulerConfig {
            tick_interval: Duration::from_secs(tick_secs),
        },
        ..Default::default()
    });

    let (tx, _rx) = mpsc::unbounded_channel();
    engine.subscribe(Arc::new(ConsolePrinter::new(tx)));

    let task = engine.submit(
        TaskSpec::new(
            "recurring demo task",
            format!("fires on `{expression}` in {timezone}"),
            TaskPriority::Medium,
            AgentType::Support,
        )
        .with_cron(&expression)
        .with_timezone(&timezone),
    )?;
    println!("registered task {} on `{}` ({})", task.id, expression, timezone);

    engine.start_scheduler();
    info!(tick_secs, "scheduler loop started");
    println!("scheduler running, press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;

    engine.stop_scheduler().await;
    println!();
    output::print_status(&engine.status());
    output::print_statistics(&engine.statistics());
    Ok(())
}
