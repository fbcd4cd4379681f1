//! Command-line interface

pub mod commands;
pub mod output;
pub mod terminal_output;

use clap::{Parser, Subcommand};
use commands::{ListCommand, PlanCommand, RunCommand, ValidateCommand};
use std::ffi::OsString;

/// Build, package and deploy the web application
#[derive(Debug, Parser, Clone)]
#[command(name = "relpipe")]
#[command(version)]
#[command(about = "A declarative build-and-release pipeline", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the project configuration file (default: ./relpipe.yaml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run a task
    Run(RunCommand),

    /// Show a task's execution plan
    Plan(PlanCommand),

    /// List available tasks
    List(ListCommand),

    /// Validate the configuration and task table
    Validate(ValidateCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
