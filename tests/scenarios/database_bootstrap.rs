//! Test: environment-scoped database bootstrap

use crate::helpers::*;

#[tokio::test]
async fn test_local_db_runs_database_tables_data_in_order() {
    let harness = Harness::new();

    let report = harness.run("deploy-local-db").await.unwrap();

    assert_run_completed(&report);
    let batches = harness.sql.batches();
    assert_eq!(batches.len(), 3);

    assert_eq!(batches[0].statements, vec!["CREATE DATABASE app OWNER app_user"]);
    assert_eq!(batches[0].connection.user, "postgres");
    assert_eq!(batches[0].connection.database, None);

    assert_eq!(batches[1].statements.len(), 2);
    assert!(batches[1].statements[0].starts_with("CREATE TABLE hosts"));
    assert!(batches[1].statements[1].starts_with("CREATE TABLE alerts"));
    assert_eq!(batches[1].connection.database.as_deref(), Some("app"));

    assert!(batches[2].statements[0].starts_with("INSERT INTO hosts"));
    assert!(batches.iter().all(|b| b.connection.host == "localhost"));
}

#[tokio::test]
async fn test_devnet_db_targets_devnet_host() {
    let harness = Harness::new();

    let report = harness.run("deploy-devnet-db").await.unwrap();

    assert_run_completed(&report);
    let hosts: Vec<String> = harness
        .sql
        .batches()
        .into_iter()
        .map(|b| b.connection.host)
        .collect();
    assert_eq!(hosts, vec!["devnet.example.internal"; 3]);
}

#[tokio::test]
async fn test_failed_tables_script_stops_before_data() {
    let harness = Harness::new().with_sql(MockSql::failing_at(1, 2));

    let report = harness.run("deploy-local-db").await.unwrap();

    assert_run_failed_at(&report, "run-sql:create-local-tables", "SqlScriptFailed");
    assert_nothing_after_failure(&report);
    assert_eq!(harness.sql.batches().len(), 2);

    let error = report.error.as_ref().unwrap().to_string();
    assert!(error.contains("sql/create_tables.sql"), "{}", error);
    assert!(error.contains("statement 2"), "{}", error);
}

#[tokio::test]
async fn test_missing_script_is_an_io_failure() {
    let harness = Harness::new();
    std::fs::remove_file(harness.dir.path().join("sql/create_data.sql")).unwrap();

    let report = harness.run("deploy-local-db").await.unwrap();

    assert_run_failed_at(&report, "run-sql:create-local-data", "Io");
    assert_eq!(harness.sql.batches().len(), 2);
}
