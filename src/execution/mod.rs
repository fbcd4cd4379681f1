//! Pipeline execution: planning, step dispatch and the run loop

pub mod engine;
pub mod executor;
pub mod graph;
pub mod plan;
pub mod watch;

pub use engine::{EventHandler, ExecutionEngine, ExecutionEvent, RunReport, StepRecord};
pub use executor::{Collaborators, RunContext, StepExecutor, StepOutcome};
pub use graph::TaskGraph;
pub use plan::{ExecutionPlan, PlannedStep};
pub use watch::{Snapshot, Watcher};
