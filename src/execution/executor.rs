//! Step executor - runs one primitive action against the collaborators

use crate::{
    core::{
        config::Settings,
        environment::Environment,
        error::{PipelineError, Result},
        store::ConfigStore,
        task::Action,
        template::TemplateResolver,
    },
    database::{DatabaseBootstrapper, SqlExecutor},
    execution::plan::PlannedStep,
    gate::ConfirmationGate,
    local::{fs, CommandRunner, Invocation},
    package::{PackageBuilder, PackageSpec},
    remote::RemoteExecutor,
};
use serde_yaml::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of a step that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The action ran; carries its output
    Completed(String),
    /// The action had nothing to do
    Skipped(String),
}

/// The external systems steps act on
#[derive(Clone)]
pub struct Collaborators {
    pub runner: Arc<dyn CommandRunner>,
    pub gate: Arc<dyn ConfirmationGate>,
    pub remote: Arc<dyn RemoteExecutor>,
    pub sql: Arc<dyn SqlExecutor>,
}

/// Mutable state of one run: the config store and the environments resolved so far
pub struct RunContext {
    pub store: ConfigStore,
    environments: HashMap<String, Environment>,
}

impl RunContext {
    pub fn new(store: ConfigStore) -> Self {
        Self {
            store,
            environments: HashMap::new(),
        }
    }

    /// Resolve an environment on first use; later calls return the cached copy
    pub fn environment(&mut self, name: &str) -> Result<&Environment> {
        if !self.environments.contains_key(name) {
            let environment = Environment::resolve(name, &self.store)?;
            info!("Resolved environment {}", name);
            self.environments.insert(name.to_string(), environment);
        }
        self.environments
            .get(name)
            .ok_or_else(|| PipelineError::InvalidConfig(format!("environment '{}' is not configured", name)))
    }

    pub fn resolve(&self, template: &str) -> Result<String> {
        TemplateResolver::new(&self.store).resolve(template)
    }

    pub fn resolve_all(&self, templates: &[String]) -> Result<Vec<String>> {
        TemplateResolver::new(&self.store).resolve_all(templates)
    }
}

/// Executes a single planned step
pub struct StepExecutor {
    collaborators: Collaborators,
    settings: Settings,
    base_dir: PathBuf,
}

impl StepExecutor {
    pub fn new(collaborators: Collaborators, settings: Settings) -> Self {
        Self {
            collaborators,
            settings,
            base_dir: PathBuf::from("."),
        }
    }

    /// Directory that relative paths in actions are resolved against
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Execute the step's action
    pub async fn execute(&self, step: &PlannedStep, ctx: &mut RunContext) -> Result<StepOutcome> {
        debug!("Executing step {} ({})", step.id(), step.action.kind());

        if let Some(name) = step.action.environment() {
            ctx.environment(name)?;
        }

        match &step.action {
            Action::Command { command, cwd } => {
                let command = ctx.resolve(command)?;
                let cwd = match cwd {
                    Some(cwd) => self.path(&ctx.resolve(cwd)?),
                    None => self.base_dir.clone(),
                };
                let invocation = Invocation::shell(&command, self.settings.command_timeout_secs).current_dir(cwd);
                self.run_command(&command, invocation).await
            }

            Action::Clean { paths } => {
                let paths = self.paths(&ctx.resolve_all(paths)?);
                let removed = fs::clean(&paths)?;
                Ok(StepOutcome::Completed(format!("removed {} path(s)", removed)))
            }

            Action::Copy { cwd, patterns, dest } => {
                let cwd = self.path(&ctx.resolve(cwd)?);
                let patterns = ctx.resolve_all(patterns)?;
                let dest = self.path(&ctx.resolve(dest)?);
                let copied = fs::copy_matching(&cwd, &patterns, &dest)?;
                Ok(StepOutcome::Completed(format!("copied {} file(s)", copied)))
            }

            Action::CreateDirs { paths } => {
                let paths = self.paths(&ctx.resolve_all(paths)?);
                fs::create_dirs(&paths)?;
                Ok(StepOutcome::Completed(format!("created {} director(ies)", paths.len())))
            }

            Action::Confirm {
                key,
                message,
                when_exists,
            } => self.confirm(ctx, key, message, when_exists.as_deref()).await,

            Action::Prompt {
                key,
                message,
                secret,
                required,
            } => self.prompt(ctx, key, message, *secret, *required).await,

            Action::DeleteDir {
                path,
                confirm_key,
                required,
            } => {
                let path = self.path(&ctx.resolve(path)?);
                if !path.exists() {
                    return Ok(StepOutcome::Skipped(format!("{} does not exist", path.display())));
                }
                if ctx.store.get_flag(confirm_key) {
                    fs::delete_dir(&path)?;
                    return Ok(StepOutcome::Completed(format!("deleted {}", path.display())));
                }
                if *required {
                    return Err(PipelineError::ConfirmationDeclined {
                        key: confirm_key.clone(),
                    });
                }
                info!("Keeping {}: deletion was not confirmed", path.display());
                Ok(StepOutcome::Skipped(format!(
                    "deletion of {} declined",
                    path.display()
                )))
            }

            Action::GitClone {
                repository,
                branch,
                directory,
            } => {
                let repository = ctx.resolve(repository)?;
                let branch = ctx.resolve(branch)?;
                let directory = self.path(&ctx.resolve(directory)?);
                let invocation = Invocation::new("git", self.settings.command_timeout_secs)
                    .args(["clone", "--branch", branch.as_str(), "--single-branch", repository.as_str()])
                    .arg(directory.to_string_lossy())
                    .current_dir(self.base_dir.clone());
                let command = invocation.command_line();
                self.run_command(&command, invocation).await
            }

            Action::Package => {
                let spec = PackageSpec::from_store(&ctx.store)?.rooted_at(&self.base_dir);
                let builder = PackageBuilder::new(
                    self.collaborators.runner.clone(),
                    self.settings.command_timeout_secs,
                );
                let artifact = builder.build(&spec).await?;
                Ok(StepOutcome::Completed(artifact.display().to_string()))
            }

            Action::RemoteCopy {
                environment,
                local_path,
                remote_path,
            } => {
                let local_path = self.path(&ctx.resolve(local_path)?);
                let remote_path = ctx.resolve(remote_path)?;
                let host = ctx.environment(environment)?.remote_host()?.clone();
                self.collaborators
                    .remote
                    .copy(&host, &local_path.to_string_lossy(), &remote_path)
                    .await?;
                Ok(StepOutcome::Completed(format!(
                    "{} -> {}:{}",
                    local_path.display(),
                    host,
                    remote_path
                )))
            }

            Action::RemoteExec { environment, command } => {
                let command = ctx.resolve(command)?;
                let host = ctx.environment(environment)?.remote_host()?.clone();
                let output = self.collaborators.remote.execute(&host, &command).await?;
                Ok(StepOutcome::Completed(output.stdout))
            }

            Action::RunSql {
                environment,
                role,
                scripts,
            } => {
                let scripts = ctx.resolve_all(scripts)?;
                let connection = ctx.environment(environment)?.connection_for(*role).clone();
                let executed = DatabaseBootstrapper::new(self.collaborators.sql.clone())
                    .with_base_dir(self.base_dir.clone())
                    .run(&scripts, &connection)
                    .await?;
                Ok(StepOutcome::Completed(format!(
                    "{} statement(s) against {}",
                    executed, connection
                )))
            }

            Action::DumpConfig => {
                let yaml = serde_yaml::to_string(ctx.store.as_mapping())
                    .map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;
                Ok(StepOutcome::Completed(yaml))
            }

            Action::Watch { .. } => Err(PipelineError::InvalidConfig(format!(
                "task '{}' watches files and cannot run inside a watch",
                step.task
            ))),
        }
    }

    async fn confirm(
        &self,
        ctx: &mut RunContext,
        key: &str,
        message: &str,
        when_exists: Option<&str>,
    ) -> Result<StepOutcome> {
        if let Some(path) = when_exists {
            let path = self.path(&ctx.resolve(path)?);
            if !path.exists() {
                return Ok(StepOutcome::Skipped(format!("{} does not exist", path.display())));
            }
        }
        if ctx.store.is_answered(key) {
            return Ok(StepOutcome::Skipped(format!("'{}' already answered", key)));
        }

        let message = ctx.resolve(message)?;
        let answer = self.collaborators.gate.confirm(key, &message).await?;
        ctx.store.set_answer(key, Value::Bool(answer), false)?;
        Ok(StepOutcome::Completed(if answer { "yes" } else { "no" }.to_string()))
    }

    async fn prompt(
        &self,
        ctx: &mut RunContext,
        key: &str,
        message: &str,
        secret: bool,
        required: bool,
    ) -> Result<StepOutcome> {
        if ctx.store.is_answered(key) {
            return Ok(StepOutcome::Skipped(format!("'{}' already answered", key)));
        }

        let message = ctx.resolve(message)?;
        let attempts = self.settings.prompt_retries + 1;

        for attempt in 1..=attempts {
            let answer = self.collaborators.gate.ask(key, &message, secret).await?;
            if required && answer.trim().is_empty() {
                warn!("Empty answer for '{}' (attempt {}/{})", key, attempt, attempts);
                continue;
            }
            ctx.store.set_answer(key, Value::String(answer), secret)?;
            return Ok(StepOutcome::Completed(format!("'{}' answered", key)));
        }

        Err(PipelineError::InvalidInput {
            key: key.to_string(),
            reason: "an answer is required".to_string(),
        })
    }

    async fn run_command(&self, command: &str, invocation: Invocation) -> Result<StepOutcome> {
        let output = self
            .collaborators
            .runner
            .run(&invocation)
            .await
            .map_err(|e| PipelineError::CommandFailed {
                command: command.to_string(),
                exit_code: None,
                stderr: e.to_string(),
            })?;

        if !output.is_success() {
            return Err(PipelineError::CommandFailed {
                command: command.to_string(),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(StepOutcome::Completed(output.stdout))
    }

    fn path(&self, raw: &str) -> PathBuf {
        self.base_dir.join(raw)
    }

    fn paths(&self, raw: &[String]) -> Vec<PathBuf> {
        raw.iter().map(|p| self.path(p)).collect()
    }
}
