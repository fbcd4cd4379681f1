//! Test: fail-fast execution and planning errors

use crate::helpers::*;
use relpipe::core::{Action, PipelineError, Task};
use relpipe::execution::{ExecutionEvent, RunContext, TaskGraph};

fn command(cmd: &str) -> Action {
    Action::Command {
        command: cmd.to_string(),
        cwd: None,
    }
}

#[tokio::test]
async fn test_failure_at_step_i_runs_exactly_steps_one_to_i() {
    let harness = Harness::new().with_runner(RecordingRunner::failing_on("r.js"));

    let report = harness.run("build").await.unwrap();

    assert_run_failed_at(&report, "requirejs:dist", "CommandFailed");
    assert_nothing_after_failure(&report);

    let executed = executed_tasks(&report);
    let failed_at = report
        .steps
        .iter()
        .position(|s| s.task == "requirejs:dist")
        .unwrap();
    assert_eq!(executed.len(), failed_at + 1);
    assert_eq!(executed.last().map(String::as_str), Some("requirejs:dist"));
    assert!(!executed.contains(&"cssmin:combine".to_string()));

    let commands = harness.runner.commands();
    assert!(commands.last().unwrap().contains("r.js"));
    assert!(!commands.iter().any(|c| c.contains("cleancss")));
}

#[tokio::test]
async fn test_failure_is_reported_once_with_location() {
    let harness = Harness::new().with_runner(RecordingRunner::failing_on("bower"));

    let report = harness.run("build").await.unwrap();

    let failures: Vec<_> = harness
        .events()
        .into_iter()
        .filter(|e| matches!(e, ExecutionEvent::StepFailed { .. }))
        .collect();
    assert_eq!(failures.len(), 1);

    match report.error {
        Some(PipelineError::StepFailed { task, step, source }) => {
            assert_eq!(task, "bower:install");
            assert_eq!(step, "bower:install[0]");
            assert!(matches!(
                *source,
                PipelineError::CommandFailed {
                    exit_code: Some(2),
                    ..
                }
            ));
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_cyclic_registry_fails_before_any_step() {
    let harness = Harness::new();
    let mut graph = TaskGraph::new();
    graph
        .register(Task::new("package").action(command("echo package")).then("deploy"))
        .unwrap();
    graph
        .register(Task::new("deploy").action(command("echo deploy")).then("package"))
        .unwrap();

    assert!(matches!(
        graph.validate(),
        Err(PipelineError::CyclicTaskReference { .. })
    ));

    let mut ctx = RunContext::new(harness.store().unwrap());
    let result = harness.engine_with_graph(graph).run("package", &mut ctx).await;

    match result {
        Err(PipelineError::CyclicTaskReference { cycle }) => {
            assert_eq!(cycle.first().map(String::as_str), Some("package"));
            assert_eq!(cycle.last().map(String::as_str), Some("package"));
        }
        other => panic!("expected a cycle, got {:?}", other.map(|r| r.task)),
    }
    assert!(harness.runner.commands().is_empty());
    assert!(harness.events().is_empty());
}

#[tokio::test]
async fn test_unknown_task_is_rejected() {
    let harness = Harness::new();

    let result = harness.run("deploy-production").await;

    assert!(matches!(result, Err(PipelineError::UnknownTask(ref id)) if id == "deploy-production"));
    assert!(harness.runner.commands().is_empty());
}

#[tokio::test]
async fn test_duplicate_task_is_rejected() {
    let mut graph = TaskGraph::new();
    graph.register(Task::new("build")).unwrap();

    assert!(matches!(
        graph.register(Task::new("build")),
        Err(PipelineError::DuplicateTask(ref id)) if id == "build"
    ));
}
