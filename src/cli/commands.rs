//! CLI command definitions

use clap::Args;

/// Run a task and everything it references
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Task to run (e.g. build, build-rpm, deploy-devnet-db)
    pub task: String,

    /// Configuration overrides (key=value)
    #[arg(long = "set", value_parser = parse_key_value)]
    pub overrides: Vec<(String, String)>,

    /// Pre-supplied answers to confirmations and prompts (key=value)
    #[arg(long = "answer", value_parser = parse_key_value)]
    pub answers: Vec<(String, String)>,

    /// Answer yes to every confirmation that has no pre-supplied answer
    #[arg(short, long)]
    pub yes: bool,
}

/// Show the steps a task expands to without running them
#[derive(Debug, Args, Clone)]
pub struct PlanCommand {
    /// Task to plan
    pub task: String,

    /// Show templates resolved against the current configuration
    #[arg(long)]
    pub resolve: bool,
}

/// List the registered tasks
#[derive(Debug, Args, Clone)]
pub struct ListCommand {
    /// Include sub-tasks, not just the top-level flows
    #[arg(short, long)]
    pub all: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Check configuration and the task table
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Output the resolved settings in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("Invalid key=value pair: {}", s)),
    }
}
