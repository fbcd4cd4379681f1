//! The fixed task table
//!
//! Every task the tool knows is declared here. Build commands are looked up
//! under `actions.*` in the configuration so they can be changed without
//! touching the table; paths and hosts come from the usual config keys.

use crate::core::environment::ConnectionRole;
use crate::core::error::Result;
use crate::core::task::{Action, Task, WatchRule};
use crate::execution::graph::TaskGraph;

/// Top-level flows, in the order `list` shows them
pub const ENTRY_POINTS: &[&str] = &[
    "build",
    "build-rpm",
    "deploy-devnet",
    "build-deploy-devnet",
    "deploy-local-db",
    "deploy-devnet-db",
    "compile-watch",
    "jst-dev",
    "dump-config",
];

/// Config key holding the delete-build-dir answer
pub const DELETE_BUILD_DIR_KEY: &str = "delete_build_dir";

/// Build command stored at `actions.<key>`
fn action(key: &str) -> Action {
    Action::Command {
        command: format!("<%= actions.{} %>", key),
        cwd: None,
    }
}

fn copy(cwd: &str, patterns: &[&str], dest: &str) -> Action {
    Action::Copy {
        cwd: cwd.to_string(),
        patterns: patterns.iter().map(|p| p.to_string()).collect(),
        dest: dest.to_string(),
    }
}

fn clean(paths: &[&str]) -> Action {
    Action::Clean {
        paths: paths.iter().map(|p| p.to_string()).collect(),
    }
}

fn run_sql(environment: &str, role: ConnectionRole, script_key: &str) -> Action {
    Action::RunSql {
        environment: environment.to_string(),
        role,
        scripts: vec![format!("<%= sql.{} %>", script_key)],
    }
}

fn watch_rule(name: &str, patterns: &[&str], tasks: &[&str]) -> WatchRule {
    WatchRule {
        name: name.to_string(),
        patterns: patterns.iter().map(|p| p.to_string()).collect(),
        tasks: tasks.iter().map(|t| t.to_string()).collect(),
    }
}

/// Client and server compilation
fn build_tasks() -> Vec<Task> {
    vec![
        Task::new("clean:preBuild").action(clean(&["static"])),
        Task::new("clean:postBuild").action(clean(&["static/client/js/.tmp"])),
        Task::new("jst:uac").action(action("jst.uac")),
        Task::new("jst:alerts").action(action("jst.alerts")),
        Task::new("jst:sf").action(action("jst.sf")),
        Task::new("jst:uac-dev").action(action("jst.uac")),
        Task::new("jst:alerts-dev").action(action("jst.alerts")),
        Task::new("jst:sf-dev").action(action("jst.sf")),
        Task::new("jst")
            .describe("Compile every template bundle")
            .then_all(["jst:uac", "jst:sf", "jst:alerts", "jst:uac-dev", "jst:sf-dev", "jst:alerts-dev"]),
        Task::new("jst-dev")
            .describe("Compile the templates for development")
            .then_all(["jst:uac-dev", "jst:alerts-dev", "jst:sf-dev"]),
        Task::new("coffee:uac-server").action(action("coffee.server_entry")),
        Task::new("coffee:node").action(action("coffee.node")),
        Task::new("coffee:web").action(action("coffee.web")),
        Task::new("coffee:web-dev").action(action("coffee.web_dev")),
        Task::new("coffee")
            .describe("Compile every coffee target")
            .then_all(["coffee:uac-server", "coffee:node", "coffee:web", "coffee:web-dev"]),
        Task::new("copy:preBuild").action(copy("src/client/js", &["**/*.js"], "static/client/js/raw")),
        Task::new("copy:cssResources")
            .action(copy(
                "static/client/js/raw/lib/font-awesome/fonts",
                &["**/*"],
                "static/client/fonts",
            ))
            .action(copy("static/client/js/raw/lib/select2", &["*.png"], "static/client/css"))
            .action(copy(
                "static/client/js/raw/lib/bootstrap/css",
                &["bootstrap.min.css"],
                "static/client/css/bootstrap",
            ))
            .action(copy(
                "static/client/js/raw/lib/bootswatch",
                &["**/*.css"],
                "static/client/css/bootswatch",
            ))
            .action(copy("src/client/css/img", &["**/*"], "static/client/css/img"))
            .action(copy("src/client/css/img", &["sort_*.png"], "static/client/img")),
        Task::new("copy:unconvertedNode").action(copy(
            "src/server",
            &["**/*.js", "**/*.json", "**/*.html"],
            "static/server",
        )),
        Task::new("bower:install").action(action("bower")),
        Task::new("requirejs:dist").action(action("requirejs")),
        Task::new("cssmin:combine").action(action("cssmin")),
        Task::new("build")
            .describe("Compile the client and server sources")
            .then_all([
                "clean:preBuild",
                "jst:uac",
                "jst:alerts",
                "jst:sf",
                "coffee",
                "copy:preBuild",
                "bower:install",
                "requirejs:dist",
                "cssmin:combine",
                "copy:cssResources",
                "clean:postBuild",
                "coffee:node",
                "copy:unconvertedNode",
            ]),
    ]
}

/// Package building from a fresh clone
fn package_tasks() -> Vec<Task> {
    vec![
        Task::new("prompt:delete-build-dir").action(Action::Confirm {
            key: DELETE_BUILD_DIR_KEY.to_string(),
            message: "Delete directory: <%= build_dir %>".to_string(),
            when_exists: Some("<%= build_dir %>".to_string()),
        }),
        Task::new("delete-build-dir")
            .describe("Delete the build directory if deletion was confirmed")
            .action(Action::DeleteDir {
                path: "<%= build_dir %>".to_string(),
                confirm_key: DELETE_BUILD_DIR_KEY.to_string(),
                required: false,
            }),
        Task::new("create-build-dir")
            .describe("Create the build directories")
            .action(Action::CreateDirs {
                paths: vec!["<%= build_dir %>".to_string(), "<%= build_app_dir %>".to_string()],
            }),
        Task::new("check-build-dir")
            .describe("Offer to delete an existing build directory, then create it")
            .then_all(["prompt:delete-build-dir", "delete-build-dir", "create-build-dir"]),
        Task::new("gitclone:uac").action(Action::GitClone {
            repository: "<%= repository %>".to_string(),
            branch: "<%= branch %>".to_string(),
            directory: "<%= build_app_dir %>".to_string(),
        }),
        Task::new("shell:install-libs").action(action("install_libs")),
        Task::new("uglify:default")
            .action(action("uglify.async"))
            .action(action("uglify.datatables"))
            .action(action("uglify.uac"))
            .action(action("uglify.sf"))
            .action(action("uglify.ioc_viewer")),
        Task::new("uglify")
            .describe("Compress the packaged scripts")
            .then("uglify:default"),
        Task::new("easy_rpm")
            .describe("Build the RPM from the package section")
            .action(Action::Package),
        Task::new("build-rpm")
            .describe("Build the RPM package from a fresh clone")
            .then_all([
                "check-build-dir",
                "gitclone:uac",
                "shell:install-libs",
                "uglify",
                "jst",
                "easy_rpm",
            ]),
    ]
}

/// Remote deployment and database bootstrap
fn deploy_tasks() -> Vec<Task> {
    vec![
        Task::new("scp:devnet").action(Action::RemoteCopy {
            environment: "devnet".to_string(),
            local_path: "<%= rpm_path %>".to_string(),
            remote_path: ".".to_string(),
        }),
        Task::new("sshexec:install-devnet").action(Action::RemoteExec {
            environment: "devnet".to_string(),
            command: "rpm -i --force <%= rpm_file %>".to_string(),
        }),
        Task::new("deploy-devnet")
            .describe("Copy an existing RPM to devnet and install it")
            .then_all(["scp:devnet", "sshexec:install-devnet"]),
        Task::new("build-deploy-devnet")
            .describe("Build the RPM and install it on devnet")
            .then_all(["build-rpm", "deploy-devnet"]),
        Task::new("run-sql:create-local-db").action(run_sql("local", ConnectionRole::Admin, "database")),
        Task::new("run-sql:create-local-tables").action(run_sql("local", ConnectionRole::App, "tables")),
        Task::new("run-sql:create-local-data").action(run_sql("local", ConnectionRole::App, "data")),
        Task::new("run-sql:create-devnet-db").action(run_sql("devnet", ConnectionRole::Admin, "database")),
        Task::new("run-sql:create-devnet-tables").action(run_sql("devnet", ConnectionRole::App, "tables")),
        Task::new("run-sql:create-devnet-data").action(run_sql("devnet", ConnectionRole::App, "data")),
        Task::new("deploy-local-db")
            .describe("Create the database, tables and data on localhost")
            .then_all([
                "run-sql:create-local-db",
                "run-sql:create-local-tables",
                "run-sql:create-local-data",
            ]),
        Task::new("deploy-devnet-db")
            .describe("Create the database, tables and data on devnet")
            .then_all([
                "run-sql:create-devnet-db",
                "run-sql:create-devnet-tables",
                "run-sql:create-devnet-data",
            ]),
    ]
}

/// Development helpers
fn dev_tasks() -> Vec<Task> {
    vec![
        Task::new("prompt:db_password").action(Action::Prompt {
            key: "db.password".to_string(),
            message: "Database Password:".to_string(),
            secret: true,
            required: true,
        }),
        Task::new("dump-config")
            .describe("Print the configuration")
            .action(Action::DumpConfig),
        Task::new("watch").action(Action::Watch {
            rules: vec![
                watch_rule(
                    "templates",
                    &[
                        "src/client/js/uac/ejs/*.ejs",
                        "src/client/js/alerts/ejs/*.ejs",
                        "src/client/js/sf/ejs/*.ejs",
                    ],
                    &["jst-dev"],
                ),
                watch_rule("pipeline", &["relpipe.yaml"], &["build"]),
                watch_rule(
                    "node-coffee",
                    &["<%= server_script %>.coffee", "src/server/js/**/*.coffee"],
                    &["coffee:node", "coffee:uac-server"],
                ),
                watch_rule("node-js", &["src/server/js/**/*.js"], &["copy:unconvertedNode"]),
                watch_rule("web-coffee", &["src/client/js/**/*.coffee"], &["coffee:web-dev"]),
            ],
        }),
        Task::new("compile-watch")
            .describe("Compile templates and coffee, then recompile on change")
            .then_all(["jst-dev", "coffee", "watch"]),
    ]
}

/// Register every task and check the table for unknown references and cycles
pub fn task_graph() -> Result<TaskGraph> {
    let mut graph = TaskGraph::new();
    for task in build_tasks()
        .into_iter()
        .chain(package_tasks())
        .chain(deploy_tasks())
        .chain(dev_tasks())
    {
        graph.register(task)?;
    }
    graph.validate()?;
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_ids(graph: &TaskGraph, task: &str) -> Vec<String> {
        graph
            .plan(task)
            .unwrap()
            .steps()
            .iter()
            .map(|s| s.task.clone())
            .collect()
    }

    #[test]
    fn test_table_is_valid() {
        let graph = task_graph().unwrap();
        for entry in ENTRY_POINTS {
            assert!(graph.contains(entry), "missing entry point {}", entry);
        }
    }

    #[test]
    fn test_database_flows_run_in_fixed_order() {
        let graph = task_graph().unwrap();
        assert_eq!(
            task_ids(&graph, "deploy-local-db"),
            vec![
                "run-sql:create-local-db",
                "run-sql:create-local-tables",
                "run-sql:create-local-data"
            ]
        );

        let plan = graph.plan("deploy-devnet-db").unwrap();
        let roles: Vec<_> = plan
            .steps()
            .iter()
            .map(|s| match &s.action {
                Action::RunSql { role, .. } => *role,
                other => panic!("unexpected {}", other.kind()),
            })
            .collect();
        assert_eq!(roles, vec![ConnectionRole::Admin, ConnectionRole::App, ConnectionRole::App]);
    }

    #[test]
    fn test_build_deploy_devnet_order() {
        let graph = task_graph().unwrap();
        let tasks = task_ids(&graph, "build-deploy-devnet");

        assert_eq!(tasks.first().map(String::as_str), Some("prompt:delete-build-dir"));
        let package = tasks.iter().position(|t| t == "easy_rpm").unwrap();
        let copy = tasks.iter().position(|t| t == "scp:devnet").unwrap();
        let install = tasks.iter().position(|t| t == "sshexec:install-devnet").unwrap();
        assert!(package < copy && copy < install);
        assert_eq!(install, tasks.len() - 1);
    }

    #[test]
    fn test_build_flattens_aliases() {
        let graph = task_graph().unwrap();
        let tasks = task_ids(&graph, "build");
        assert_eq!(tasks.first().map(String::as_str), Some("clean:preBuild"));
        assert_eq!(tasks.last().map(String::as_str), Some("copy:unconvertedNode"));
        assert!(tasks.contains(&"coffee:web-dev".to_string()));
        assert_eq!(tasks.iter().filter(|t| *t == "copy:cssResources").count(), 6);
    }

    #[test]
    fn test_compile_watch_ends_with_watch() {
        let graph = task_graph().unwrap();
        let plan = graph.plan("compile-watch").unwrap();
        assert!(matches!(
            plan.steps().last().map(|s| &s.action),
            Some(Action::Watch { .. })
        ));
    }

    #[test]
    fn test_watch_rules_cover_sources_and_project_file() {
        let graph = task_graph().unwrap();
        let plan = graph.plan("watch").unwrap();
        let rules = match &plan.steps()[0].action {
            Action::Watch { rules } => rules.clone(),
            other => panic!("unexpected action {:?}", other),
        };

        let names: Vec<&str> = rules.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["templates", "pipeline", "node-coffee", "node-js", "web-coffee"]
        );

        let pipeline = &rules[1];
        assert_eq!(pipeline.patterns, vec!["relpipe.yaml"]);
        assert_eq!(pipeline.tasks, vec!["build"]);
        for rule in &rules {
            for task in &rule.tasks {
                assert!(graph.contains(task), "watch rule {} names unknown task {}", rule.name, task);
            }
        }
    }
}
