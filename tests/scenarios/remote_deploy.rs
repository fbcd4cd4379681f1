//! Test: package build and devnet deployment

use crate::helpers::*;

#[tokio::test]
async fn test_build_deploy_devnet_runs_to_install() {
    let harness = Harness::new();

    let report = harness.run("build-deploy-devnet").await.unwrap();

    assert_run_completed(&report);
    let rpm_path = harness
        .build_dir()
        .join("rpm/RPMS/x86_64/App-1.2-3.x86_64.rpm");
    assert_eq!(
        harness.remote.calls(),
        vec![
            RemoteCall::Copy {
                host: "devnet.example.internal".to_string(),
                local: rpm_path.to_string_lossy().to_string(),
                remote: ".".to_string(),
            },
            RemoteCall::Exec {
                host: "devnet.example.internal".to_string(),
                command: "rpm -i --force App-1.2-3.x86_64.rpm".to_string(),
            },
        ]
    );

    let commands = harness.runner.commands();
    let clone = commands.iter().position(|c| c.starts_with("git clone")).unwrap();
    let rpmbuild = commands.iter().position(|c| c.starts_with("rpmbuild")).unwrap();
    assert!(clone < rpmbuild);
    assert!(commands[clone].contains("--branch 1.2.3"));
    assert!(harness.build_dir().join("rpm/SPECS/App.spec").exists());
}

#[tokio::test]
async fn test_remote_install_failure_halts_the_run() {
    let harness = Harness::new().with_remote(MockRemote::failing_exec(1));

    let report = harness.run("build-deploy-devnet").await.unwrap();

    assert_run_failed_at(&report, "sshexec:install-devnet", "RemoteOperationFailed");
    assert_nothing_after_failure(&report);
    assert_eq!(harness.remote.calls().len(), 2);

    let error = report.error.as_ref().unwrap().to_string();
    assert!(error.contains("exit code 1"), "{}", error);
    assert!(error.contains("package is broken"), "{}", error);
}

#[tokio::test]
async fn test_failed_copy_prevents_install() {
    let harness = Harness::new().with_remote(MockRemote::failing_copy());

    let report = harness.run("deploy-devnet").await.unwrap();

    assert_run_failed_at(&report, "scp:devnet", "RemoteOperationFailed");
    assert_eq!(executed_tasks(&report), vec!["scp:devnet"]);
    assert!(harness
        .remote
        .calls()
        .iter()
        .all(|call| matches!(call, RemoteCall::Copy { .. })));
}

#[tokio::test]
async fn test_failed_package_build_skips_deployment() {
    let harness = Harness::new().with_runner(RecordingRunner::failing_on("rpmbuild"));

    let report = harness.run("build-deploy-devnet").await.unwrap();

    assert_run_failed_at(&report, "easy_rpm", "CommandFailed");
    assert_nothing_after_failure(&report);
    assert!(harness.remote.calls().is_empty());
}
