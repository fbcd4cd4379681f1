//! Linear execution plans

use crate::core::task::Action;

/// A primitive step together with the task that declared it
#[derive(Debug, Clone)]
pub struct PlannedStep {
    /// Task that owns the action
    pub task: String,
    /// Index of the action within that task's step list
    pub position: usize,
    pub action: Action,
}

impl PlannedStep {
    /// `task[position]`, unique within a plan unless a task is planned twice
    pub fn id(&self) -> String {
        format!("{}[{}]", self.task, self.position)
    }
}

/// Ordered primitive steps for one invocation
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    root: String,
    steps: Vec<PlannedStep>,
}

impl ExecutionPlan {
    pub fn new(root: impl Into<String>, steps: Vec<PlannedStep>) -> Self {
        Self {
            root: root.into(),
            steps,
        }
    }

    /// The requested task
    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn steps(&self) -> &[PlannedStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Environments targeted by the plan, in order of first use
    pub fn environments(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for env in self.steps.iter().filter_map(|s| s.action.environment()) {
            if !seen.contains(&env) {
                seen.push(env);
            }
        }
        seen
    }
}
