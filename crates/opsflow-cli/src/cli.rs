use clap::{Parser, Subcommand};
use opsflow_core::{AgentType, TaskPriority};

#[derive(Parser)]
#[command(name = "opsflow", about = "Agent task orchestration engine", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Submit a batch of demo tasks and stream their lifecycle events
    Demo {
        /// Number of tasks to submit
        #[arg(short = 'n', long, default_value_t = 3)]
        tasks: usize,
        /// Inject transient step faults to exercise the retry path
        #[arg(long)]
        flaky: bool,
        /// Delay between checkpoints, in milliseconds
        #[arg(long, default_value_t = 250)]
        step_delay_ms: u64,
        /// Priority assigned to every submitted task
        #[arg(long, default_value = "medium")]
        priority: TaskPriority,
        /// Route every task to this agent instead of rotating
        #[arg(long)]
        agent: Option<AgentType>,
    },
    /// Register a recurring task and run the scheduler until interrupted
    Cron {
        /// 5-field cron expression
        #[arg(default_value = "* * * * *")]
        expression: String,
        /// IANA timezone the expression is evaluated in
        #[arg(long, default_value = "UTC")]
        timezone: String,
        /// Scheduler scan interval, in seconds
        #[arg(long, default_value_t = 5)]
        tick_secs: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_parses_priority_and_agent() {
        let cli =
            Cli::try_parse_from(["opsflow", "demo", "--priority", "urgent", "--agent", "pm"])
                .unwrap();
        let Commands::Demo { priority, agent, .. } = cli.command else {
            panic!("expected the demo subcommand");
        };
        assert_eq!(priority, TaskPriority::Urgent);
        assert_eq!(agent, Some(AgentType::Pm));
    }

    #[test]
    fn test_demo_defaults_to_medium_priority_rotating_agents() {
        let cli = Cli::try_parse_from(["opsflow", "demo"]).unwrap();
        let Commands::Demo { priority, agent, .. } = cli.command else {
            panic!("expected the demo subcommand");
        };
        assert_eq!(priority, TaskPriority::Medium);
        assert_eq!(agent, None);
    }

    #[test]
    fn test_unknown_agent_rejected() {
        assert!(Cli::try_parse_from(["opsflow", "demo", "--agent", "warehouse"]).is_err());
    }
}
