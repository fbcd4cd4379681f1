//! Task registry and plan flattening

use crate::core::error::{PipelineError, Result};
use crate::core::task::{StepRef, Task};
use crate::execution::plan::{ExecutionPlan, PlannedStep};
use std::collections::BTreeMap;
use tracing::debug;

/// Registry of named tasks.
///
/// Tasks are registered once at startup and never change afterwards.
#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    tasks: BTreeMap<String, Task>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task; identifiers must be unique
    pub fn register(&mut self, task: Task) -> Result<()> {
        if self.tasks.contains_key(&task.id) {
            return Err(PipelineError::DuplicateTask(task.id));
        }
        debug!("Registered task {}", task.id);
        self.tasks.insert(task.id.clone(), task);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tasks.contains_key(id)
    }

    /// All tasks ordered by identifier
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Flatten a task into its primitive steps, depth-first in declared order.
    ///
    /// Nothing is executed; cycles and unknown references are reported here.
    pub fn plan(&self, id: &str) -> Result<ExecutionPlan> {
        let mut steps = Vec::new();
        let mut path = Vec::new();
        self.flatten(id, &mut path, &mut steps)?;
        Ok(ExecutionPlan::new(id, steps))
    }

    /// Check every task for unknown references and cycles
    pub fn validate(&self) -> Result<()> {
        for id in self.tasks.keys() {
            let mut path = Vec::new();
            self.visit(id, &mut path)?;
        }
        Ok(())
    }

    fn flatten(&self, id: &str, path: &mut Vec<String>, out: &mut Vec<PlannedStep>) -> Result<()> {
        let task = self.enter(id, path)?;

        for (position, step) in task.steps.iter().enumerate() {
            match step {
                StepRef::Action(action) => out.push(PlannedStep {
                    task: task.id.clone(),
                    position,
                    action: action.clone(),
                }),
                StepRef::Task(nested) => self.flatten(nested, path, out)?,
            }
        }

        path.pop();
        Ok(())
    }

    fn visit(&self, id: &str, path: &mut Vec<String>) -> Result<()> {
        let task = self.enter(id, path)?;
        for nested in task.references() {
            self.visit(nested, path)?;
        }
        path.pop();
        Ok(())
    }

    /// Push `id` onto the current reference path, failing if it is already on it
    fn enter(&self, id: &str, path: &mut Vec<String>) -> Result<&Task> {
        if let Some(start) = path.iter().position(|p| p == id) {
            let mut cycle = path[start..].to_vec();
            cycle.push(id.to_string());
            return Err(PipelineError::CyclicTaskReference { cycle });
        }

        let task = self
            .tasks
            .get(id)
            .ok_or_else(|| PipelineError::UnknownTask(id.to_string()))?;
        path.push(id.to_string());
        Ok(task)
    }
}
