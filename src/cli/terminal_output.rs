//! Terminal reporter for engine events
//!
//! Prints one line per event and keeps a spinner running while a long step
//! (build command, remote call, SQL script, package build) is in flight.
//! Confirmations and prompts never get a spinner so the question stays
//! readable.

use crate::cli::output::{create_spinner, format_execution_event, format_output, separator};
use crate::execution::ExecutionEvent;
use console::style;
use indicatif::ProgressBar;
use std::sync::Mutex;

/// Step kinds that talk to the user and must not be drawn over
const INTERACTIVE_KINDS: &[&str] = &["confirm", "prompt", "watch"];

/// Renders [`ExecutionEvent`]s to stdout
pub struct TerminalReporter {
    /// Lines of step output shown on completion (0 hides output)
    output_lines: usize,
    spinner: Mutex<Option<ProgressBar>>,
}

impl TerminalReporter {
    pub fn new(output_lines: usize) -> Self {
        Self {
            output_lines,
            spinner: Mutex::new(None),
        }
    }

    /// Whether a step of this kind gets a spinner
    pub fn wants_spinner(kind: &str) -> bool {
        !INTERACTIVE_KINDS.contains(&kind)
    }

    fn finish_spinner(&self) {
        if let Ok(mut spinner) = self.spinner.lock() {
            if let Some(bar) = spinner.take() {
                bar.finish_and_clear();
            }
        }
    }

    fn start_spinner(&self, message: String) {
        if let Ok(mut spinner) = self.spinner.lock() {
            *spinner = Some(create_spinner(message));
        }
    }

    pub fn on_event(&self, event: &ExecutionEvent) {
        self.finish_spinner();
        println!("{}", format_execution_event(event));

        match event {
            ExecutionEvent::StepStarted { kind, step_id, .. } if Self::wants_spinner(kind) => {
                self.start_spinner(step_id.clone());
            }
            ExecutionEvent::StepCompleted { kind, output, .. } => {
                if *kind == "dump-config" {
                    println!("{}\n{}{}", separator(), output, separator());
                } else if self.output_lines > 0 && !output.trim().is_empty() {
                    println!("{}", style(format_output(output.trim_end(), self.output_lines)).dim());
                }
            }
            _ => {}
        }
    }
}
