//! CLI output formatting

use crate::execution::{RunEvent, RunReport, RunStatus};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static PLUG: Emoji<'_, '_> = Emoji("🔌 ", "* ");

/// Create a spinner for long-running waits (e.g. provider startup)
pub fn create_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Format a run status for display
pub fn format_status(status: RunStatus) -> String {
    match status {
        RunStatus::Completed => style("COMPLETED").green().to_string(),
        RunStatus::Failed => style("FAILED").red().to_string(),
        RunStatus::Cancelled => style("CANCELLED").yellow().to_string(),
    }
}

/// Format a run event for display
pub fn format_run_event(event: &RunEvent) -> String {
    match event {
        RunEvent::RunStarted {
            run_id,
            pipeline_name,
        } => format!(
            "{} Starting pipeline {} ({})",
            ROCKET,
            style(pipeline_name).bold(),
            style(&run_id.to_string()[..8]).dim()
        ),
        RunEvent::StepStarted { path, target } => format!(
            "  {} {} {}",
            style("→").cyan(),
            style(target).bold(),
            style(format!("[{}]", path)).dim()
        ),
        RunEvent::StepCompleted {
            target, outputs, ..
        } => {
            if outputs.is_empty() {
                format!("  {} {}", style("✓").green(), target)
            } else {
                format!(
                    "  {} {} {} {}",
                    style("✓").green(),
                    target,
                    style("→").dim(),
                    style(outputs.join(", ")).cyan()
                )
            }
        }
        RunEvent::LoopEntered { path, times } => format!(
            "  {} loop ×{} {}",
            style("↻").cyan(),
            style(times).bold(),
            style(format!("[{}]", path)).dim()
        ),
        RunEvent::IterationStarted {
            iteration, times, ..
        } => format!(
            "  {} iteration {}/{}",
            style("·").dim(),
            iteration + 1,
            times
        ),
        RunEvent::BranchRouted { path, label } => format!(
            "  {} branch {} {}",
            style("⎇").cyan(),
            style(label).bold(),
            style(format!("[{}]", path)).dim()
        ),
        RunEvent::RunCompleted { status, .. } => {
            format!("{} Run {}", INFO, format_status(*status))
        }
    }
}

/// Format a run report summary line
pub fn format_report(report: &RunReport) -> String {
    let elapsed = report
        .finished_at
        .signed_duration_since(report.started_at)
        .to_std()
        .unwrap_or_default();
    format!(
        "{} - {} tool call(s) in {}",
        format_status(report.status),
        style(report.steps_executed).cyan(),
        style(format_duration(elapsed)).dim()
    )
}

/// Format a state value for terminal display, truncating long renderings
pub fn format_value(value: &Value) -> String {
    let rendered = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if rendered.len() > 120 {
        let mut end = 119;
        while !rendered.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &rendered[..end])
    } else {
        rendered
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 1 {
        format!("{}ms", duration.as_millis())
    } else if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
