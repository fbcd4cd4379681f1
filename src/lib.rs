//! relpipe - a declarative build-and-release pipeline

pub mod cli;
pub mod core;
pub mod database;
pub mod execution;
pub mod gate;
pub mod local;
pub mod package;
pub mod pipeline;
pub mod remote;

// Re-export commonly used types
pub use crate::core::{ConfigLoader, ConfigStore, PipelineError, Result, Task, TemplateResolver};
pub use crate::execution::{ExecutionEngine, ExecutionEvent, RunContext, RunReport, StepExecutor, TaskGraph};
pub use crate::gate::{ConfirmationGate, InteractiveGate, ScriptedGate};
