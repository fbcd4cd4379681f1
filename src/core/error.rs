//! Pipeline error types

use thiserror::Error;

/// Errors raised while configuring, planning or running a pipeline.
///
/// Every variant is fatal to the current run. Nothing is retried.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("missing config key '{key}' while resolving '{template}'")]
    MissingConfigKey { key: String, template: String },

    #[error("template expansion exceeded depth {depth} while resolving '{template}' ({chain})")]
    ExpansionDepthExceeded {
        template: String,
        depth: usize,
        chain: String,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("cyclic task reference: {}", cycle.join(" -> "))]
    CyclicTaskReference { cycle: Vec<String> },

    #[error("duplicate task: {0}")]
    DuplicateTask(String),

    #[error("unknown task: {0}")]
    UnknownTask(String),

    #[error("invalid input for '{key}': {reason}")]
    InvalidInput { key: String, reason: String },

    #[error("confirmation '{key}' was declined")]
    ConfirmationDeclined { key: String },

    #[error("remote {operation} on {host} failed{}: {stderr}", exit_code.map(|c| format!(" with exit code {}", c)).unwrap_or_default())]
    RemoteOperationFailed {
        host: String,
        operation: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("SQL script {script} failed{}: {message}", statement.map(|s| format!(" at statement {}", s)).unwrap_or_default())]
    SqlScriptFailed {
        script: String,
        statement: Option<usize>,
        message: String,
    },

    #[error("command '{command}' failed{}: {stderr}", exit_code.map(|c| format!(" with exit code {}", c)).unwrap_or_default())]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("task '{task}' failed at step '{step}': {source}")]
    StepFailed {
        task: String,
        step: String,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        PipelineError::Io {
            context: context.into(),
            source,
        }
    }

    /// The innermost error, looking through step location wrappers
    pub fn root(&self) -> &PipelineError {
        match self {
            PipelineError::StepFailed { source, .. } => source.root(),
            other => other,
        }
    }

    /// Short name of the error kind, used in reports
    pub fn kind(&self) -> &'static str {
        match self.root() {
            PipelineError::MissingConfigKey { .. } => "MissingConfigKey",
            PipelineError::ExpansionDepthExceeded { .. } => "ExpansionDepthExceeded",
            PipelineError::InvalidConfig(_) => "InvalidConfig",
            PipelineError::CyclicTaskReference { .. } => "CyclicTaskReference",
            PipelineError::DuplicateTask(_) => "DuplicateTask",
            PipelineError::UnknownTask(_) => "UnknownTask",
            PipelineError::InvalidInput { .. } => "InvalidInput",
            PipelineError::ConfirmationDeclined { .. } => "ConfirmationDeclined",
            PipelineError::RemoteOperationFailed { .. } => "RemoteOperationFailed",
            PipelineError::SqlScriptFailed { .. } => "SqlScriptFailed",
            PipelineError::CommandFailed { .. } => "CommandFailed",
            PipelineError::Io { .. } => "Io",
            PipelineError::StepFailed { .. } => unreachable!("root() never returns StepFailed"),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
