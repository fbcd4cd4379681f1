//! Test utility functions for relpipe

#![allow(dead_code)]

use async_trait::async_trait;
use relpipe::core::{
    ConfigLoader, ConfigStore, ConnectionDescriptor, PipelineError, RemoteHost, Settings, StepState,
};
use relpipe::database::{SqlExecutor, SqlFailure};
use relpipe::execution::{
    Collaborators, ExecutionEngine, ExecutionEvent, RunContext, RunReport, StepExecutor, TaskGraph,
};
use relpipe::gate::ScriptedGate;
use relpipe::local::{CommandOutput, CommandRunner, Invocation, RunError};
use relpipe::pipeline;
use relpipe::remote::RemoteExecutor;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Records every local command and fails the first one containing a marker
#[derive(Default)]
pub struct RecordingRunner {
    commands: Mutex<Vec<String>>,
    fail_on: Option<String>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(marker: &str) -> Self {
        Self {
            commands: Mutex::new(Vec::new()),
            fail_on: Some(marker.to_string()),
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, RunError> {
        let line = invocation.command_line();
        self.commands.lock().unwrap().push(line.clone());
        match &self.fail_on {
            Some(marker) if line.contains(marker.as_str()) => {
                Ok(CommandOutput::failure(2, format!("{} failed", marker)))
            }
            _ => Ok(CommandOutput::success("")),
        }
    }
}

/// A call made against the remote executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Copy { host: String, local: String, remote: String },
    Exec { host: String, command: String },
}

/// Remote executor that records calls and can fail copies or commands
#[derive(Default)]
pub struct MockRemote {
    calls: Mutex<Vec<RemoteCall>>,
    fail_copy: bool,
    fail_exec: Option<i32>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_copy() -> Self {
        Self {
            fail_copy: true,
            ..Self::default()
        }
    }

    pub fn failing_exec(exit_code: i32) -> Self {
        Self {
            fail_exec: Some(exit_code),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteExecutor for MockRemote {
    async fn copy(&self, host: &RemoteHost, local_path: &str, remote_path: &str) -> relpipe::Result<()> {
        self.calls.lock().unwrap().push(RemoteCall::Copy {
            host: host.host.clone(),
            local: local_path.to_string(),
            remote: remote_path.to_string(),
        });
        if self.fail_copy {
            return Err(PipelineError::RemoteOperationFailed {
                host: host.to_string(),
                operation: "copy".to_string(),
                exit_code: Some(1),
                stderr: "lost connection".to_string(),
            });
        }
        Ok(())
    }

    async fn execute(&self, host: &RemoteHost, command: &str) -> relpipe::Result<CommandOutput> {
        self.calls.lock().unwrap().push(RemoteCall::Exec {
            host: host.host.clone(),
            command: command.to_string(),
        });
        match self.fail_exec {
            Some(code) => Err(PipelineError::RemoteOperationFailed {
                host: host.to_string(),
                operation: "command".to_string(),
                exit_code: Some(code),
                stderr: "error: package is broken".to_string(),
            }),
            None => Ok(CommandOutput::success("installed")),
        }
    }
}

/// One batch handed to the SQL executor
#[derive(Debug, Clone)]
pub struct SqlBatch {
    pub connection: ConnectionDescriptor,
    pub statements: Vec<String>,
}

/// SQL executor that records batches and can fail one of them
#[derive(Default)]
pub struct MockSql {
    batches: Mutex<Vec<SqlBatch>>,
    /// (batch index, 1-based statement) to fail at
    fail_at: Option<(usize, usize)>,
}

impl MockSql {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_at(batch: usize, statement: usize) -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
            fail_at: Some((batch, statement)),
        }
    }

    pub fn batches(&self) -> Vec<SqlBatch> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl SqlExecutor for MockSql {
    async fn execute(
        &self,
        connection: &ConnectionDescriptor,
        statements: &[String],
    ) -> Result<(), SqlFailure> {
        let mut batches = self.batches.lock().unwrap();
        let index = batches.len();
        batches.push(SqlBatch {
            connection: connection.clone(),
            statements: statements.to_vec(),
        });
        match self.fail_at {
            Some((batch, statement)) if batch == index => Err(SqlFailure {
                statement: Some(statement),
                message: "relation already exists".to_string(),
            }),
            _ => Ok(()),
        }
    }
}

/// SQL scripts written into every test project
pub const CREATE_DATABASE_SQL: &str = "CREATE DATABASE app OWNER app_user;";
pub const CREATE_TABLES_SQL: &str =
    "CREATE TABLE hosts (id serial PRIMARY KEY, name text);\nCREATE TABLE alerts (id serial PRIMARY KEY, host_id int);";
pub const CREATE_DATA_SQL: &str = "INSERT INTO hosts (name) VALUES ('web-1');";

/// A temporary project directory plus mock collaborators
pub struct Harness {
    pub dir: TempDir,
    pub runner: Arc<RecordingRunner>,
    pub remote: Arc<MockRemote>,
    pub sql: Arc<MockSql>,
    pub gate: Arc<ScriptedGate>,
    pub version: String,
    pub events: Arc<Mutex<Vec<ExecutionEvent>>>,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sql")).unwrap();
        std::fs::write(dir.path().join("sql/create_database.sql"), CREATE_DATABASE_SQL).unwrap();
        std::fs::write(dir.path().join("sql/create_tables.sql"), CREATE_TABLES_SQL).unwrap();
        std::fs::write(dir.path().join("sql/create_data.sql"), CREATE_DATA_SQL).unwrap();

        Self {
            dir,
            runner: Arc::new(RecordingRunner::new()),
            remote: Arc::new(MockRemote::new()),
            sql: Arc::new(MockSql::new()),
            gate: Arc::new(ScriptedGate::new()),
            version: "1.2.3".to_string(),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_runner(mut self, runner: RecordingRunner) -> Self {
        self.runner = Arc::new(runner);
        self
    }

    pub fn with_remote(mut self, remote: MockRemote) -> Self {
        self.remote = Arc::new(remote);
        self
    }

    pub fn with_sql(mut self, sql: MockSql) -> Self {
        self.sql = Arc::new(sql);
        self
    }

    pub fn with_gate(mut self, gate: ScriptedGate) -> Self {
        self.gate = Arc::new(gate);
        self
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    pub fn build_dir(&self) -> PathBuf {
        self.dir.path().join("build")
    }

    /// Defaults plus a project layer pointing the build directory into the tempdir
    pub fn loader(&self) -> ConfigLoader {
        let project = format!(
            "project:\n  name: app\n  version: \"{}\"\nvariables:\n  build_dir: \"{}\"\n",
            self.version,
            self.build_dir().display()
        );
        ConfigLoader::new()
            .unwrap()
            .with_base_dir(self.dir.path())
            .layer_yaml(&project)
            .unwrap()
    }

    pub fn store(&self) -> relpipe::Result<ConfigStore> {
        self.loader().load()?.into_store()
    }

    pub fn engine(&self) -> ExecutionEngine {
        self.engine_with_graph(pipeline::task_graph().unwrap())
    }

    pub fn engine_with_graph(&self, graph: TaskGraph) -> ExecutionEngine {
        let collaborators = Collaborators {
            runner: self.runner.clone(),
            gate: self.gate.clone(),
            remote: self.remote.clone(),
            sql: self.sql.clone(),
        };
        let executor = StepExecutor::new(collaborators, Settings::default()).with_base_dir(self.dir.path());
        let mut engine = ExecutionEngine::new(Arc::new(graph), executor);
        let events = self.events.clone();
        engine.add_event_handler(move |event| events.lock().unwrap().push(event));
        engine
    }

    /// Run a task from the real task table
    pub async fn run(&self, task: &str) -> relpipe::Result<RunReport> {
        let mut ctx = RunContext::new(self.store()?);
        self.engine().run(task, &mut ctx).await
    }

    /// Run a task and hand back the context for inspecting answers
    pub async fn run_with_context(&self, task: &str) -> (relpipe::Result<RunReport>, RunContext) {
        let mut ctx = RunContext::new(self.store().unwrap());
        let report = self.engine().run(task, &mut ctx).await;
        (report, ctx)
    }

    pub fn events(&self) -> Vec<ExecutionEvent> {
        self.events.lock().unwrap().clone()
    }
}

/// Tasks of the steps that were dispatched, in order
pub fn executed_tasks(report: &RunReport) -> Vec<String> {
    report.executed().map(|s| s.task.clone()).collect()
}

/// Assert that the run completed
pub fn assert_run_completed(report: &RunReport) {
    assert!(
        report.is_success(),
        "run of {} failed: {:?}",
        report.task,
        report.error
    );
}

/// Assert that the run failed at `task` with an error of `kind`
pub fn assert_run_failed_at(report: &RunReport, task: &str, kind: &str) {
    match &report.error {
        Some(PipelineError::StepFailed { task: failed, .. }) => {
            assert_eq!(failed, task, "run failed at an unexpected task");
        }
        other => panic!("expected a step failure at {}, got {:?}", task, other),
    }
    let error = report.error.as_ref().unwrap();
    assert_eq!(error.kind(), kind, "unexpected error kind: {}", error);
}

/// Assert that every step after the failure is still pending
pub fn assert_nothing_after_failure(report: &RunReport) {
    let failed = report
        .steps
        .iter()
        .position(|s| matches!(s.state, StepState::Failed { .. }))
        .expect("no failed step in report");
    for step in &report.steps[failed + 1..] {
        assert!(
            matches!(step.state, StepState::Pending),
            "{} ran after the failure",
            step.step_id
        );
    }
}

/// Assert that the steps of `task` were skipped
pub fn assert_task_skipped(report: &RunReport, task: &str) {
    let steps: Vec<_> = report.steps.iter().filter(|s| s.task == task).collect();
    assert!(!steps.is_empty(), "{} is not in the plan", task);
    for step in steps {
        assert!(
            matches!(step.state, StepState::Skipped { .. }),
            "{} was not skipped: {:?}",
            step.step_id,
            step.state
        );
    }
}

/// Assert that the steps of `task` completed
pub fn assert_task_completed(report: &RunReport, task: &str) {
    let steps: Vec<_> = report.steps.iter().filter(|s| s.task == task).collect();
    assert!(!steps.is_empty(), "{} is not in the plan", task);
    for step in steps {
        assert!(
            matches!(step.state, StepState::Completed { .. }),
            "{} did not complete: {:?}",
            step.step_id,
            step.state
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_harness_store_derives_release_values() {
        let harness = Harness::new();
        let store = harness.store().unwrap();
        assert_eq!(store.get_string("app_name").as_deref(), Some("App"));
        assert_eq!(store.get_string("app_version").as_deref(), Some("1.2"));
        assert_eq!(store.get_string("app_release").as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn test_recording_runner_fails_on_marker() {
        let runner = RecordingRunner::failing_on("r.js");
        let ok = runner.run(&Invocation::shell("npx bower install", 5)).await.unwrap();
        let failed = runner.run(&Invocation::shell("npx r.js -o build.js", 5)).await.unwrap();
        assert!(ok.is_success());
        assert_eq!(failed.exit_code, Some(2));
        assert_eq!(runner.commands().len(), 2);
    }
}
