//! Main execution engine - runs a task's plan one step at a time

use crate::{
    core::{
        error::{PipelineError, Result},
        task::{Action, WatchRule},
        ExecutionStatus, RunState, StepState,
    },
    execution::{
        executor::{RunContext, StepExecutor, StepOutcome},
        graph::TaskGraph,
        plan::PlannedStep,
        watch::Watcher,
    },
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Events that can occur during a run
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    RunStarted {
        execution_id: Uuid,
        task: String,
        total_steps: usize,
    },
    StepStarted {
        step_id: String,
        kind: &'static str,
        summary: String,
        index: usize,
        total: usize,
    },
    StepCompleted {
        step_id: String,
        kind: &'static str,
        output: String,
    },
    StepSkipped {
        step_id: String,
        reason: String,
    },
    StepFailed {
        step_id: String,
        kind: String,
        error: String,
    },
    WatchStarted {
        files: usize,
    },
    WatchTriggered {
        rule: String,
        tasks: Vec<String>,
    },
    RunCompleted {
        execution_id: Uuid,
        status: ExecutionStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// One step of a run and where it ended up
#[derive(Debug, Clone)]
pub struct StepRecord {
    pub step_id: String,
    pub task: String,
    pub kind: &'static str,
    pub state: StepState,
}

/// Outcome of a run
#[derive(Debug)]
pub struct RunReport {
    pub task: String,
    pub state: RunState,
    pub steps: Vec<StepRecord>,
    /// The failure that stopped the run, located by task and step
    pub error: Option<PipelineError>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Steps that were dispatched, in order
    pub fn executed(&self) -> impl Iterator<Item = &StepRecord> {
        self.steps.iter().filter(|s| s.state.was_executed())
    }

    /// Turn a failed report into its error
    pub fn into_result(self) -> Result<RunReport> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self),
        }
    }
}

/// Sequential, fail-fast pipeline engine
pub struct ExecutionEngine {
    graph: Arc<TaskGraph>,
    executor: StepExecutor,
    event_handlers: Vec<EventHandler>,
    shutdown: Arc<Notify>,
}

impl ExecutionEngine {
    pub fn new(graph: Arc<TaskGraph>, executor: StepExecutor) -> Self {
        Self {
            graph,
            executor,
            event_handlers: Vec::new(),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
    }

    /// Handle that ends a running watch loop when notified
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    fn emit_event(&self, event: ExecutionEvent) {
        for handler in &self.event_handlers {
            handler(event.clone());
        }
    }

    /// Plan and run a task.
    ///
    /// Planning errors (unknown task, cycle) are returned before anything
    /// runs. Step failures stop the run and are reported in the
    /// [`RunReport`]; every later step stays `Pending`.
    pub async fn run(&self, task_id: &str, ctx: &mut RunContext) -> Result<RunReport> {
        let plan = self.graph.plan(task_id)?;
        let mut state = RunState::new();
        let execution_id = state.execution_id;

        info!("Starting {} ({} steps, {})", task_id, plan.len(), execution_id);
        self.emit_event(ExecutionEvent::RunStarted {
            execution_id,
            task: task_id.to_string(),
            total_steps: plan.len(),
        });
        state.start(plan.len());

        let mut records: Vec<StepRecord> = plan
            .steps()
            .iter()
            .map(|step| StepRecord {
                step_id: step.id(),
                task: step.task.clone(),
                kind: step.action.kind(),
                state: StepState::Pending,
            })
            .collect();

        let mut failure = None;

        for (index, step) in plan.steps().iter().enumerate() {
            let started_at = Utc::now();
            records[index].state = StepState::Running { started_at };

            let result = match &step.action {
                Action::Watch { rules } => {
                    self.step_started(step, index, plan.len());
                    self.watch(rules, ctx).await
                }
                _ => self.execute_step(step, index, plan.len(), ctx).await,
            };

            match result {
                Ok(StepOutcome::Completed(output)) => {
                    self.emit_event(ExecutionEvent::StepCompleted {
                        step_id: step.id(),
                        kind: step.action.kind(),
                        output: output.clone(),
                    });
                    records[index].state = StepState::Completed {
                        output,
                        started_at,
                        completed_at: Utc::now(),
                    };
                    state.completed_steps += 1;
                }
                Ok(StepOutcome::Skipped(reason)) => {
                    info!("Skipped {}: {}", step.id(), reason);
                    self.emit_event(ExecutionEvent::StepSkipped {
                        step_id: step.id(),
                        reason: reason.clone(),
                    });
                    records[index].state = StepState::Skipped { reason };
                    state.completed_steps += 1;
                }
                Err(err) => {
                    error!("Step {} failed: {}", step.id(), err);
                    self.emit_event(ExecutionEvent::StepFailed {
                        step_id: step.id(),
                        kind: err.kind().to_string(),
                        error: err.to_string(),
                    });
                    records[index].state = StepState::Failed {
                        kind: err.kind().to_string(),
                        error: err.to_string(),
                        started_at,
                        failed_at: Utc::now(),
                    };
                    failure = Some(PipelineError::StepFailed {
                        task: step.task.clone(),
                        step: step.id(),
                        source: Box::new(err),
                    });
                    break;
                }
            }
        }

        if failure.is_some() {
            state.fail();
        } else {
            state.complete();
        }

        info!("Finished {} - {:?}", task_id, state.status);
        self.emit_event(ExecutionEvent::RunCompleted {
            execution_id,
            status: state.status,
        });

        Ok(RunReport {
            task: task_id.to_string(),
            state,
            steps: records,
            error: failure,
        })
    }

    fn step_started(&self, step: &PlannedStep, index: usize, total: usize) {
        self.emit_event(ExecutionEvent::StepStarted {
            step_id: step.id(),
            kind: step.action.kind(),
            summary: step.action.summary(),
            index,
            total,
        });
    }

    async fn execute_step(
        &self,
        step: &PlannedStep,
        index: usize,
        total: usize,
        ctx: &mut RunContext,
    ) -> Result<StepOutcome> {
        self.step_started(step, index, total);
        self.executor.execute(step, ctx).await
    }

    /// Re-run the rules' tasks whenever their files change, until shut down
    /// or interrupted. Failures of triggered runs are reported and watching
    /// goes on.
    async fn watch(&self, rules: &[WatchRule], ctx: &mut RunContext) -> Result<StepOutcome> {
        let rules = rules
            .iter()
            .map(|rule| {
                Ok(WatchRule {
                    patterns: ctx.resolve_all(&rule.patterns)?,
                    ..rule.clone()
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let mut watcher = Watcher::new(self.executor.base_dir(), &rules)?;
        let mut interval =
            tokio::time::interval(Duration::from_millis(self.executor.settings().watch_interval_ms));
        let mut runs = 0usize;

        info!("Watching {} file(s)", watcher.watched_files());
        self.emit_event(ExecutionEvent::WatchStarted {
            files: watcher.watched_files(),
        });

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => break,
                _ = &mut ctrl_c => break,
                _ = interval.tick() => {
                    for rule in watcher.poll()? {
                        self.emit_event(ExecutionEvent::WatchTriggered {
                            rule: rule.name.clone(),
                            tasks: rule.tasks.clone(),
                        });
                        for task in &rule.tasks {
                            runs += 1;
                            if let Err(e) = self.run_triggered(task, ctx).await {
                                warn!("Watch run of {} failed: {}", task, e);
                            }
                        }
                    }
                }
            }
        }

        info!("Stopped watching");
        Ok(StepOutcome::Completed(format!("{} triggered run(s)", runs)))
    }

    /// Run a task from the watch loop; nested watch steps are rejected
    async fn run_triggered(&self, task_id: &str, ctx: &mut RunContext) -> Result<()> {
        let plan = self.graph.plan(task_id)?;
        for (index, step) in plan.steps().iter().enumerate() {
            let outcome = self
                .execute_step(step, index, plan.len(), ctx)
                .await
                .map_err(|err| {
                    self.emit_event(ExecutionEvent::StepFailed {
                        step_id: step.id(),
                        kind: err.kind().to_string(),
                        error: err.to_string(),
                    });
                    PipelineError::StepFailed {
                        task: step.task.clone(),
                        step: step.id(),
                        source: Box::new(err),
                    }
                })?;

            match outcome {
                StepOutcome::Completed(output) => self.emit_event(ExecutionEvent::StepCompleted {
                    step_id: step.id(),
                    kind: step.action.kind(),
                    output,
                }),
                StepOutcome::Skipped(reason) => self.emit_event(ExecutionEvent::StepSkipped {
                    step_id: step.id(),
                    reason,
                }),
            }
        }
        Ok(())
    }
}
