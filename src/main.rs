use anyhow::{Context, Result};
use relpipe::cli::commands::{ListCommand, PlanCommand, RunCommand, ValidateCommand};
use relpipe::cli::output::*;
use relpipe::cli::terminal_output::TerminalReporter;
use relpipe::cli::{Cli, Command};
use relpipe::core::{ConfigLoader, ConfigStore, PipelineError, Settings};
use relpipe::database::SqlExecutor;
use relpipe::execution::{
    Collaborators, ExecutionEngine, RunContext, RunReport, StepExecutor, TaskGraph,
};
use relpipe::gate::{InteractiveGate, ScriptedGate};
use relpipe::local::{CommandRunner, ProcessRunner};
use relpipe::pipeline::{self, ENTRY_POINTS};
use relpipe::remote::SshRemoteExecutor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

/// Project configuration picked up from the working directory
const PROJECT_CONFIG: &str = "relpipe.yaml";

/// Lines of step output echoed after each step
const OUTPUT_LINES: usize = 5;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    match &cli.command {
        Command::Run(cmd) => run_task(&cli, cmd).await?,
        Command::Plan(cmd) => show_plan(&cli, cmd)?,
        Command::List(cmd) => list_tasks(cmd)?,
        Command::Validate(cmd) => validate(&cli, cmd)?,
    }

    Ok(())
}

/// Configuration ready for a run
struct Loaded {
    settings: Settings,
    store: ConfigStore,
    base_dir: PathBuf,
}

/// Merge defaults, the user file, the project file and `--set` overrides
fn load_config(cli: &Cli, overrides: &[(String, String)]) -> Result<Loaded> {
    let project_file = match &cli.config {
        Some(path) => Some(PathBuf::from(path)),
        None => Some(PathBuf::from(PROJECT_CONFIG)).filter(|p| p.exists()),
    };
    let base_dir = project_file
        .as_deref()
        .and_then(Path::parent)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .map_or_else(std::env::current_dir, Ok)
        .context("Failed to determine the working directory")?;

    let mut loader = ConfigLoader::new()?.with_base_dir(&base_dir);
    if let Some(dir) = dirs::config_dir() {
        loader = loader.layer_file_if_exists(dir.join("relpipe").join("config.yaml"))?;
    }
    if let Some(path) = &project_file {
        loader = loader
            .layer_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?;
    }
    for (key, value) in overrides {
        debug!("Override {}", key);
        loader = loader.with_override(key.clone(), value.clone());
    }

    let loaded = loader.load().context("Invalid configuration")?;
    let settings = loaded.settings().clone();
    let store = loaded.into_store().context("Invalid configuration")?;
    Ok(Loaded {
        settings,
        store,
        base_dir,
    })
}

#[cfg(feature = "postgres")]
fn sql_executor(settings: &Settings) -> Arc<dyn SqlExecutor> {
    Arc::new(relpipe::database::PgSqlExecutor::new(settings.sql_timeout_secs))
}

#[cfg(not(feature = "postgres"))]
fn sql_executor(_settings: &Settings) -> Arc<dyn SqlExecutor> {
    Arc::new(relpipe::database::UnsupportedSqlExecutor)
}

async fn run_task(cli: &Cli, cmd: &RunCommand) -> Result<()> {
    let loaded = load_config(cli, &cmd.overrides)?;
    let graph = Arc::new(pipeline::task_graph()?);

    let mut gate = ScriptedGate::new()
        .assume_yes(cmd.yes)
        .with_fallback(Arc::new(InteractiveGate::new()));
    for (key, answer) in &cmd.answers {
        gate = gate.with_answer(key.clone(), answer.clone());
    }

    let runner: Arc<dyn CommandRunner> = Arc::new(ProcessRunner::new());
    let collaborators = Collaborators {
        runner: runner.clone(),
        gate: Arc::new(gate),
        remote: Arc::new(SshRemoteExecutor::new(runner, loaded.settings.remote_timeout_secs)),
        sql: sql_executor(&loaded.settings),
    };
    let executor = StepExecutor::new(collaborators, loaded.settings).with_base_dir(&loaded.base_dir);

    let mut engine = ExecutionEngine::new(graph, executor);
    let reporter = Arc::new(TerminalReporter::new(if cli.verbose { OUTPUT_LINES } else { 0 }));
    engine.add_event_handler(move |event| reporter.on_event(&event));

    let mut ctx = RunContext::new(loaded.store);
    let report = match engine.run(&cmd.task, &mut ctx).await {
        Ok(report) => report,
        Err(err) => fail(&cmd.task, &err, None),
    };

    if cli.verbose {
        for record in report.executed() {
            println!("{}", format_step_record(record));
        }
    }

    match &report.error {
        None => {
            println!(
                "\n{} {} completed {} ({} steps)",
                CHECK,
                style(&cmd.task).bold(),
                style("successfully").green(),
                report.executed().count()
            );
            Ok(())
        }
        Some(err) => fail(&cmd.task, err, Some(&report)),
    }
}

/// Print the failing task and step to stderr and exit with status 1
fn fail(task: &str, err: &PipelineError, report: Option<&RunReport>) -> ! {
    eprintln!("\n{} {} {}", CROSS, style(task).bold(), style("failed").red());
    if let PipelineError::StepFailed { task, step, .. } = err {
        eprintln!("  Task: {}", style(task).bold());
        eprintln!("  Step: {}", style(step).cyan());
    }
    eprintln!("  Kind: {}", style(err.kind()).red());
    eprintln!("  Error: {}", err.root());
    if let Some(report) = report {
        eprintln!("  {}", format_run_progress(report));
    }
    std::process::exit(1);
}

fn show_plan(cli: &Cli, cmd: &PlanCommand) -> Result<()> {
    let graph = pipeline::task_graph()?;
    let plan = graph.plan(&cmd.task)?;

    let ctx = if cmd.resolve {
        Some(RunContext::new(load_config(cli, &[])?.store))
    } else {
        None
    };

    println!(
        "{} {} expands to {} step(s)",
        INFO,
        style(plan.root()).bold(),
        style(plan.len()).cyan()
    );
    for (index, step) in plan.steps().iter().enumerate() {
        let summary = step.action.summary();
        let summary = match &ctx {
            Some(ctx) => ctx.resolve(&summary).unwrap_or_else(|e| {
                format!("{} {}", summary, style(format!("({})", e)).yellow())
            }),
            None => summary,
        };
        println!("{}", format_plan_step(index + 1, step, &summary));
    }

    let environments = plan.environments();
    if !environments.is_empty() {
        println!("  Environments: {}", style(environments.join(", ")).cyan());
    }
    Ok(())
}

fn list_tasks(cmd: &ListCommand) -> Result<()> {
    let graph = pipeline::task_graph()?;

    let ids: Vec<&str> = if cmd.all {
        graph.tasks().map(|t| t.id.as_str()).collect()
    } else {
        ENTRY_POINTS.to_vec()
    };

    if cmd.json {
        let tasks: Vec<_> = ids
            .iter()
            .filter_map(|id| graph.get(id))
            .map(|task| {
                serde_json::json!({
                    "id": task.id,
                    "description": task.description,
                    "references": task.references().collect::<Vec<_>>(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&serde_json::json!({ "tasks": tasks }))?);
        return Ok(());
    }

    println!("{} Available tasks:", INFO);
    for task in ids.iter().filter_map(|id| graph.get(id)) {
        println!(
            "  {:<28} {}",
            style(&task.id).bold(),
            style(task.description.as_deref().unwrap_or("")).dim()
        );
    }
    Ok(())
}

fn validate(cli: &Cli, cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating configuration...", INFO);

    let result = load_config(cli, &[]).and_then(|loaded| {
        let graph = pipeline::task_graph()?;
        check_environments(&graph, &loaded.store)?;
        Ok((loaded, graph))
    });

    match result {
        Ok((loaded, graph)) => {
            println!("{} Configuration is valid!", CHECK);
            println!(
                "  Project: {} {}",
                style(loaded.store.get_string("pkg.name").unwrap_or_default()).bold(),
                style(loaded.store.get_string("pkg.version").unwrap_or_default()).cyan()
            );
            println!("  Tasks: {}", style(graph.len()).cyan());
            println!("  Base directory: {}", style(loaded.base_dir.display()).dim());

            if cmd.json {
                println!("\n{}", serde_json::to_string_pretty(&loaded.settings)?);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    }
}

/// Every environment a task targets must resolve
fn check_environments(graph: &TaskGraph, store: &ConfigStore) -> Result<()> {
    let mut ctx = RunContext::new(store.clone());
    let mut names: Vec<&str> = graph
        .tasks()
        .flat_map(|task| task.steps.iter())
        .filter_map(|step| match step {
            relpipe::core::StepRef::Action(action) => action.environment(),
            relpipe::core::StepRef::Task(_) => None,
        })
        .collect();
    names.sort_unstable();
    names.dedup();
    for name in names {
        ctx.environment(name)
            .with_context(|| format!("environment '{}'", name))?;
    }
    Ok(())
}
