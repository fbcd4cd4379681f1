//! Task domain model

use crate::core::environment::ConnectionRole;

/// A named, declaratively ordered unit of work
#[derive(Debug, Clone)]
pub struct Task {
    /// Unique task identifier
    pub id: String,

    /// Optional human-readable description
    pub description: Option<String>,

    /// Steps in declared order
    pub steps: Vec<StepRef>,
}

/// One entry in a task's step list
#[derive(Debug, Clone)]
pub enum StepRef {
    /// A primitive action owned by the task
    Action(Action),
    /// A nested task, expanded in place
    Task(String),
}

/// Files to watch and the tasks to re-run when they change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchRule {
    pub name: String,
    pub patterns: Vec<String>,
    pub tasks: Vec<String>,
}

/// An indivisible pipeline action.
///
/// String fields are templates, resolved against the config store right
/// before the step runs.
#[derive(Debug, Clone)]
pub enum Action {
    /// Opaque local build action or library installer
    Command { command: String, cwd: Option<String> },
    /// Remove files or directories if they exist
    Clean { paths: Vec<String> },
    /// Copy files matching glob patterns under `cwd` into `dest`, keeping
    /// their relative layout
    Copy {
        cwd: String,
        patterns: Vec<String>,
        dest: String,
    },
    /// Create directories; existing ones are left alone
    CreateDirs { paths: Vec<String> },
    /// Yes/no confirmation stored under `key`. With `when_exists`, the
    /// question is only asked when that path exists.
    Confirm {
        key: String,
        message: String,
        when_exists: Option<String>,
    },
    /// Free-text (or hidden) answer stored under `key`
    Prompt {
        key: String,
        message: String,
        secret: bool,
        required: bool,
    },
    /// Delete a directory if the answer under `confirm_key` is yes.
    /// A decline is an error only when `required` is set.
    DeleteDir {
        path: String,
        confirm_key: String,
        required: bool,
    },
    /// Clone a branch of a repository into a directory
    GitClone {
        repository: String,
        branch: String,
        directory: String,
    },
    /// Build the distributable package from the `package` config section
    Package,
    /// Copy a local file to an environment's remote host
    RemoteCopy {
        environment: String,
        local_path: String,
        remote_path: String,
    },
    /// Run a command on an environment's remote host
    RemoteExec { environment: String, command: String },
    /// Run SQL scripts in order against an environment's database
    RunSql {
        environment: String,
        role: ConnectionRole,
        scripts: Vec<String>,
    },
    /// Watch files and re-run tasks on change until interrupted
    Watch { rules: Vec<WatchRule> },
    /// Print the configuration
    DumpConfig,
}

impl Action {
    /// Short kind label used in step identifiers and plan listings
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Command { .. } => "command",
            Action::Clean { .. } => "clean",
            Action::Copy { .. } => "copy",
            Action::CreateDirs { .. } => "mkdir",
            Action::Confirm { .. } => "confirm",
            Action::Prompt { .. } => "prompt",
            Action::DeleteDir { .. } => "delete-dir",
            Action::GitClone { .. } => "git-clone",
            Action::Package => "package",
            Action::RemoteCopy { .. } => "remote-copy",
            Action::RemoteExec { .. } => "remote-exec",
            Action::RunSql { .. } => "run-sql",
            Action::Watch { .. } => "watch",
            Action::DumpConfig => "dump-config",
        }
    }

    /// One-line description with unresolved templates
    pub fn summary(&self) -> String {
        match self {
            Action::Command { command, .. } => command.clone(),
            Action::Clean { paths } => paths.join(", "),
            Action::Copy { cwd, patterns, dest } => {
                format!("{}/{{{}}} -> {}", cwd, patterns.join(","), dest)
            }
            Action::CreateDirs { paths } => paths.join(", "),
            Action::Confirm { message, .. } | Action::Prompt { message, .. } => message.clone(),
            Action::DeleteDir { path, .. } => path.clone(),
            Action::GitClone { repository, branch, directory } => {
                format!("{}#{} -> {}", repository, branch, directory)
            }
            Action::Package => "build package".to_string(),
            Action::RemoteCopy { environment, local_path, remote_path } => {
                format!("{} -> {}:{}", local_path, environment, remote_path)
            }
            Action::RemoteExec { environment, command } => format!("{}: {}", environment, command),
            Action::RunSql { environment, scripts, .. } => {
                format!("{}: {}", environment, scripts.join(", "))
            }
            Action::Watch { rules } => rules
                .iter()
                .map(|r| r.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            Action::DumpConfig => "print configuration".to_string(),
        }
    }

    /// Environment this action targets, if any
    pub fn environment(&self) -> Option<&str> {
        match self {
            Action::RemoteCopy { environment, .. }
            | Action::RemoteExec { environment, .. }
            | Action::RunSql { environment, .. } => Some(environment),
            _ => None,
        }
    }
}

impl Task {
    /// Create an empty task
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: None,
            steps: Vec::new(),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Append a nested task reference
    pub fn then(mut self, task_id: impl Into<String>) -> Self {
        self.steps.push(StepRef::Task(task_id.into()));
        self
    }

    /// Append several nested task references
    pub fn then_all<I, S>(mut self, task_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.steps
            .extend(task_ids.into_iter().map(|id| StepRef::Task(id.into())));
        self
    }

    /// Append a primitive action
    pub fn action(mut self, action: Action) -> Self {
        self.steps.push(StepRef::Action(action));
        self
    }

    /// Identifiers of the tasks this task references directly
    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().filter_map(|step| match step {
            StepRef::Task(id) => Some(id.as_str()),
            StepRef::Action(_) => None,
        })
    }
}
