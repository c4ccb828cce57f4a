//! Console rendering for events and statistics.

use colored::Colorize;
use comfy_table::Table;
use opsflow_core::{
    EngineStatus, TaskEvent, TaskEventKind, TaskObserver, TaskStatistics,
};
use tokio::sync::mpsc::UnboundedSender;

/// Prints every event to stdout and forwards a copy for completion
/// tracking.
pub struct ConsolePrinter {
    forward: UnboundedSender<TaskEvent>,
}

impl ConsolePrinter {
    pub fn new(forward: UnboundedSender<TaskEvent>) -> Self {
        Self { forward }
    }
}

impl TaskObserver for ConsolePrinter {
    fn on_event(&self, event: &TaskEvent) -> anyhow::Result<()> {
        print_event(event);
        let _ = self.forward.send(event.clone());
        Ok(())
    }
}

fn print_event(event: &TaskEvent) {
    let short_id = &event.task_id[..8.min(event.task_id.len())];
    if let TaskEventKind::Progress { progress } = &event.kind {
        println!("[{}] {:<30} {:>3}%", short_id, event.task.name, progress);
        return;
    }
    let label = match &event.kind {
        TaskEventKind::Created => "created".cyan(),
        TaskEventKind::Started => "started".blue(),
        TaskEventKind::Completed => "completed".green().bold(),
        TaskEventKind::Failed { .. } => "failed".red().bold(),
        TaskEventKind::Cancelled => "cancelled".yellow(),
        TaskEventKind::Progress { .. } => unreachable!(),
    };
    let detail = match &event.kind {
        TaskEventKind::Failed { error } => format!(" ({error})"),
        _ => String::new(),
    };
    println!("[{}] {:<30} {}{}", short_id, event.task.name, label, detail);
}

pub fn print_statistics(stats: &TaskStatistics) {
    let mut table = Table::new();
    table.set_header(vec![
        "total",
        "pending",
        "running",
        "completed",
        "failed",
        "cancelled",
        "completed today",
        "failed today",
    ]);
    table.add_row(vec![
        stats.total.to_string(),
        stats.pending.to_string(),
        stats.running.to_string(),
        stats.completed.to_string(),
        stats.failed.to_string(),
        stats.cancelled.to_string(),
        stats.completed_today.to_string(),
        stats.failed_today.to_string(),
    ]);
    println!("{table}");
}

pub fn print_status(status: &EngineStatus) {
    let mut table = Table::new();
    table.set_header(vec!["agent", "health"]);
    let mut agents: Vec<_> = status.agents_status.iter().collect();
    agents.sort_by_key(|(agent, _)| agent.as_str());
    for (agent, health) in agents {
        table.add_row(vec![
            agent.to_string(),
            format!("{health:?}").to_lowercase(),
        ]);
    }
    println!(
        "scheduler: {}  tasks: {}  schedules: {}  active: {}",
        if status.running {
            "running".green()
        } else {
            "stopped".yellow()
        },
        status.task_count,
        status.schedule_count,
        status.active_tasks
    );
    println!("{table}");
}
