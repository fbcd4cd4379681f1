//! Test: configuration errors and template resolution during runs

use crate::helpers::*;
use relpipe::core::{Action, PipelineError, Task};
use relpipe::execution::{RunContext, TaskGraph};
use relpipe::gate::ScriptedGate;

#[tokio::test]
async fn test_two_part_version_fails_before_any_task_runs() {
    let harness = Harness::new().with_version("1.2");

    let result = harness.run("build").await;

    match result {
        Err(PipelineError::InvalidConfig(message)) => assert!(message.contains("1.2"), "{}", message),
        other => panic!("expected InvalidConfig, got {:?}", other.map(|r| r.task)),
    }
    assert!(harness.runner.commands().is_empty());
    assert!(harness.events().is_empty());
}

#[tokio::test]
async fn test_missing_key_names_the_key() {
    let harness = Harness::new();
    let mut graph = TaskGraph::new();
    graph
        .register(
            Task::new("publish")
                .action(Action::Command {
                    command: "echo <%= app_name %>".to_string(),
                    cwd: None,
                })
                .action(Action::Command {
                    command: "scp <%= rpm_path %> <%= mirror.host %>:/srv".to_string(),
                    cwd: None,
                }),
        )
        .unwrap();

    let mut ctx = RunContext::new(harness.store().unwrap());
    let report = harness.engine_with_graph(graph).run("publish", &mut ctx).await.unwrap();

    assert_run_failed_at(&report, "publish", "MissingConfigKey");
    match report.error.as_ref().map(|e| e.root()) {
        Some(PipelineError::MissingConfigKey { key, .. }) => assert_eq!(key, "mirror.host"),
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(harness.runner.commands(), vec!["sh -c echo App"]);
}

#[tokio::test]
async fn test_runaway_expansion_is_rejected_at_load() {
    let harness = Harness::new();
    let result = harness
        .loader()
        .layer_yaml("variables:\n  a: \"<%= b %>\"\n  b: \"<%= a %>\"\n")
        .unwrap()
        .load()
        .unwrap()
        .into_store();

    assert!(matches!(
        result,
        Err(PipelineError::ExpansionDepthExceeded { .. })
    ));
}

#[tokio::test]
async fn test_prompt_answer_is_visible_to_later_steps() {
    let harness = Harness::new().with_gate(ScriptedGate::new().with_answer("db.password", "s3cret"));
    let mut graph = TaskGraph::new();
    graph
        .register(
            Task::new("connect")
                .then("prompt:password")
                .action(Action::Command {
                    command: "psql --password=<%= db.password %>".to_string(),
                    cwd: None,
                }),
        )
        .unwrap();
    graph
        .register(Task::new("prompt:password").action(Action::Prompt {
            key: "db.password".to_string(),
            message: "Database Password:".to_string(),
            secret: true,
            required: true,
        }))
        .unwrap();

    let mut ctx = RunContext::new(harness.store().unwrap());
    let report = harness.engine_with_graph(graph).run("connect", &mut ctx).await.unwrap();

    assert_run_completed(&report);
    assert_eq!(harness.runner.commands(), vec!["sh -c psql --password=s3cret"]);
    assert!(ctx.store.is_answered("db.password"));
}

#[tokio::test]
async fn test_empty_required_answer_is_invalid_input() {
    let harness = Harness::new().with_gate(ScriptedGate::new().with_answer("db.password", "  "));

    let report = harness.run("prompt:db_password").await.unwrap();

    assert_run_failed_at(&report, "prompt:db_password", "InvalidInput");
}

#[tokio::test]
async fn test_dump_config_prints_resolved_identity() {
    let harness = Harness::new();

    let report = harness.run("dump-config").await.unwrap();

    assert_run_completed(&report);
    match &report.steps[0].state {
        relpipe::core::StepState::Completed { output, .. } => {
            assert!(output.contains("app_version: '1.2'") || output.contains("app_version: \"1.2\""));
            assert!(output.contains("environments:"));
        }
        other => panic!("unexpected state {:?}", other),
    }
}
