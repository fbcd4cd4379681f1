//! Test: the confirmation-gated build directory reset

use crate::helpers::*;
use relpipe::core::{Action, Task};
use relpipe::execution::{RunContext, TaskGraph};
use relpipe::gate::ScriptedGate;
use relpipe::pipeline::DELETE_BUILD_DIR_KEY;

fn existing_build_dir(harness: &Harness) -> std::path::PathBuf {
    let marker = harness.build_dir().join("keep.txt");
    std::fs::create_dir_all(harness.build_dir()).unwrap();
    std::fs::write(&marker, "previous build").unwrap();
    marker
}

#[tokio::test]
async fn test_declined_delete_keeps_directory_and_create_succeeds() {
    let harness =
        Harness::new().with_gate(ScriptedGate::new().with_answer(DELETE_BUILD_DIR_KEY, "n"));
    let marker = existing_build_dir(&harness);

    let (report, ctx) = harness.run_with_context("check-build-dir").await;
    let report = report.unwrap();

    assert_run_completed(&report);
    assert_task_completed(&report, "prompt:delete-build-dir");
    assert_task_skipped(&report, "delete-build-dir");
    assert_task_completed(&report, "create-build-dir");

    assert!(marker.exists(), "declined delete removed the directory");
    assert!(harness.build_dir().join("app").is_dir());
    assert_eq!(harness.gate.asked(), vec![DELETE_BUILD_DIR_KEY]);
    assert!(ctx.store.is_answered(DELETE_BUILD_DIR_KEY));
    assert!(!ctx.store.get_flag(DELETE_BUILD_DIR_KEY));
}

#[tokio::test]
async fn test_confirmed_delete_recreates_directory() {
    let harness =
        Harness::new().with_gate(ScriptedGate::new().with_answer(DELETE_BUILD_DIR_KEY, "yes"));
    let marker = existing_build_dir(&harness);

    let report = harness.run("check-build-dir").await.unwrap();

    assert_run_completed(&report);
    assert_task_completed(&report, "delete-build-dir");
    assert!(!marker.exists());
    assert!(harness.build_dir().join("app").is_dir());
}

#[tokio::test]
async fn test_missing_directory_is_not_prompted() {
    let harness = Harness::new();

    let report = harness.run("check-build-dir").await.unwrap();

    assert_run_completed(&report);
    assert_task_skipped(&report, "prompt:delete-build-dir");
    assert_task_skipped(&report, "delete-build-dir");
    assert!(harness.gate.asked().is_empty());
    assert!(harness.build_dir().is_dir());
}

#[tokio::test]
async fn test_required_delete_turns_decline_into_failure() {
    let harness = Harness::new().with_gate(ScriptedGate::new().with_answer("wipe", "no"));
    existing_build_dir(&harness);

    let mut graph = TaskGraph::new();
    graph
        .register(
            Task::new("reset")
                .action(Action::Confirm {
                    key: "wipe".to_string(),
                    message: "Wipe <%= build_dir %>?".to_string(),
                    when_exists: None,
                })
                .action(Action::DeleteDir {
                    path: "<%= build_dir %>".to_string(),
                    confirm_key: "wipe".to_string(),
                    required: true,
                })
                .action(Action::CreateDirs {
                    paths: vec!["<%= build_dir %>".to_string()],
                }),
        )
        .unwrap();

    let mut ctx = RunContext::new(harness.store().unwrap());
    let report = harness.engine_with_graph(graph).run("reset", &mut ctx).await.unwrap();

    assert_run_failed_at(&report, "reset", "ConfirmationDeclined");
    assert_nothing_after_failure(&report);
}

#[tokio::test]
async fn test_unanswered_confirmation_fails_without_fallback() {
    let harness = Harness::new();
    existing_build_dir(&harness);

    let report = harness.run("check-build-dir").await.unwrap();

    assert_run_failed_at(&report, "prompt:delete-build-dir", "InvalidInput");
    assert_eq!(executed_tasks(&report), vec!["prompt:delete-build-dir"]);
}
