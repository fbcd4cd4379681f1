//! CLI output formatting

use crate::{
    core::{ExecutionStatus, StepState},
    execution::{ExecutionEvent, PlannedStep, RunReport, StepRecord},
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");
pub static EYES: Emoji<'_, '_> = Emoji("👀 ", "* ");

/// Spinner shown while a long step runs
pub fn create_spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let template = ProgressStyle::default_spinner()
        .template("{spinner:.green} [{elapsed_precise}] {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    spinner.set_style(template);
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Format a step state for display
pub fn format_step_state(state: &StepState) -> String {
    match state {
        StepState::Pending => style("PENDING").dim().to_string(),
        StepState::Running { .. } => style("RUNNING").yellow().to_string(),
        StepState::Completed { .. } => style("COMPLETED").green().to_string(),
        StepState::Failed { kind, .. } => style(format!("FAILED ({})", kind)).red().to_string(),
        StepState::Skipped { .. } => style("SKIPPED").dim().to_string(),
    }
}

/// Format an execution status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Pending => style("PENDING").dim().to_string(),
        ExecutionStatus::Running => style("RUNNING").yellow().to_string(),
        ExecutionStatus::Completed => style("COMPLETED").green().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
    }
}

/// One line of a run summary: `  COMPLETED  copy:cssResources[2]`
pub fn format_step_record(record: &StepRecord) -> String {
    format!("  {} {}", format_step_state(&record.state), style(&record.step_id).dim())
}

/// How far a run got, with a warning when steps were never reached
pub fn format_run_progress(report: &RunReport) -> String {
    let mut line = format!(
        "{}/{} steps finished ({:.0}%)",
        report.state.completed_steps,
        report.state.total_steps,
        report.state.progress() * 100.0
    );
    let not_run = report.steps.iter().filter(|s| !s.state.is_terminal()).count();
    if not_run > 0 {
        line.push_str(&format!(" {}{} step(s) not run", WARN, style(not_run).yellow()));
    }
    line
}

/// One line of a plan listing: `  3. task[1]  kind  summary`
pub fn format_plan_step(number: usize, step: &PlannedStep, summary: &str) -> String {
    format!(
        "{:>4}. {} {} {}",
        number,
        style(step.id()).cyan(),
        style(format!("[{}]", step.action.kind())).dim(),
        summary
    )
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::RunStarted {
            execution_id,
            task,
            total_steps,
        } => format!(
            "{} Running {} ({} steps, {})",
            ROCKET,
            style(task).bold(),
            total_steps,
            style(&execution_id.to_string()[..8]).dim()
        ),
        ExecutionEvent::StepStarted {
            step_id,
            summary,
            index,
            total,
            ..
        } => format!(
            "{} [{}/{}] {} {}",
            SPINNER,
            style(index + 1).cyan(),
            style(total).dim(),
            style(step_id).cyan(),
            style(summary).dim()
        ),
        ExecutionEvent::StepCompleted { step_id, .. } => {
            format!("{} {}", CHECK, style(step_id).green())
        }
        ExecutionEvent::StepSkipped { step_id, reason } => {
            format!("{} {} ({})", SKIP, style(step_id).dim(), reason)
        }
        ExecutionEvent::StepFailed {
            step_id,
            kind,
            error,
        } => format!(
            "{} {} {}: {}",
            CROSS,
            style(step_id).red(),
            style(kind).red().bold(),
            style(error).dim()
        ),
        ExecutionEvent::WatchStarted { files } => format!(
            "{} Watching {} file(s), press Ctrl-C to stop",
            EYES,
            style(files).cyan()
        ),
        ExecutionEvent::WatchTriggered { rule, tasks } => format!(
            "{} {} changed, running {}",
            INFO,
            style(rule).yellow(),
            style(tasks.join(", ")).cyan()
        ),
        ExecutionEvent::RunCompleted {
            execution_id,
            status,
        } => format!(
            "{} Run ({}) {}",
            INFO,
            style(&execution_id.to_string()[..8]).dim(),
            format_status(*status)
        ),
    }
}

/// Format step output with truncation
pub fn format_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();

    if lines.len() <= max_lines {
        output.to_string()
    } else {
        let truncated = lines[..max_lines].join("\n");
        format!(
            "{}\n{}... ({} more lines)",
            truncated,
            style("[truncated]").dim(),
            lines.len() - max_lines
        )
    }
}

/// A horizontal rule as wide as the terminal
pub fn separator() -> String {
    let width = term_size::dimensions_stdout()
        .map(|(w, _)| w)
        .unwrap_or(80);
    "─".repeat(width)
}
