//! Task definitions and the plans they compose into.
//!
//! A task is one named step of a pipeline, such as cleaning the output
//! directory or compiling stylesheets. Pipelines are described with the
//! [`Step`] combinators and compiled into a [`TaskPlan`] whose dependencies
//! encode the series/parallel structure.

use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Kind of work a task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Delete the generated-CSS cache
    CleanGeneratedCss,
    /// Compile stylesheets into the generated-CSS cache
    CompileDevCss,
    /// Run the live-reload server and watcher
    Serve,
    /// Delete the output directory
    CleanOutput,
    /// Minify top-level markup
    BuildMarkup,
    /// Compile and compress stylesheets
    BuildStyles,
    /// Transpile and minify scripts
    BuildScripts,
    /// Compress images
    BuildImages,
}

impl TaskKind {
    /// The task's pipeline name.
    pub fn name(&self) -> &'static str {
        match self {
            TaskKind::CleanGeneratedCss => "clean-css",
            TaskKind::CompileDevCss => "dev-css",
            TaskKind::Serve => "serve",
            TaskKind::CleanOutput => "clean-dist",
            TaskKind::BuildMarkup => "html",
            TaskKind::BuildStyles => "css",
            TaskKind::BuildScripts => "js",
            TaskKind::BuildImages => "img",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A task representing work to be done.
#[derive(Debug, Clone)]
pub struct Task {
    /// Unique identifier for this task within its plan
    pub id: String,
    /// What kind of task this is
    pub kind: TaskKind,
    /// Dependencies (other task IDs that must complete first)
    pub dependencies: Vec<String>,
}

impl Task {
    /// Create a task named after its kind.
    pub fn new(kind: TaskKind) -> Self {
        Self { id: kind.name().to_string(), kind, dependencies: vec![] }
    }

    /// Override the task id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Add a dependency to this task.
    pub fn with_dependency(mut self, dep: impl Into<String>) -> Self {
        self.dependencies.push(dep.into());
        self
    }

    /// Add multiple dependencies to this task.
    pub fn with_dependencies(mut self, deps: Vec<String>) -> Self {
        self.dependencies.extend(deps);
        self
    }
}

/// Composition of tasks.
///
/// `Series` runs its children one after another; `Parallel` runs them
/// concurrently, and whatever follows a `Parallel` waits for all of them.
#[derive(Debug, Clone)]
pub enum Step {
    Task(Task),
    Series(Vec<Step>),
    Parallel(Vec<Step>),
}

impl Step {
    /// A single task of the given kind.
    pub fn task(kind: TaskKind) -> Self {
        Step::Task(Task::new(kind))
    }

    pub fn series(steps: Vec<Step>) -> Self {
        Step::Series(steps)
    }

    pub fn parallel(steps: Vec<Step>) -> Self {
        Step::Parallel(steps)
    }

    /// Compile the step tree into a plan.
    pub fn into_plan(self) -> TaskPlan {
        let mut plan = TaskPlan::new();
        self.compile(&[], &mut plan);
        plan
    }

    /// Add this step's tasks to `plan`, each depending on `after`.
    ///
    /// Returns the ids a following step must wait for.
    fn compile(self, after: &[String], plan: &mut TaskPlan) -> Vec<String> {
        match self {
            Step::Task(task) => {
                let id = task.id.clone();
                plan.add_task(task.with_dependencies(after.to_vec()));
                vec![id]
            }
            Step::Series(steps) => {
                let mut exits = after.to_vec();
                for step in steps {
                    exits = step.compile(&exits, plan);
                }
                exits
            }
            Step::Parallel(steps) => {
                let mut exits = Vec::new();
                for step in steps {
                    exits.extend(step.compile(after, plan));
                }
                if exits.is_empty() {
                    after.to_vec()
                } else {
                    exits
                }
            }
        }
    }
}

/// A collection of tasks with dependency information.
#[derive(Debug, Default, Clone)]
pub struct TaskPlan {
    /// All tasks in the plan, in insertion order
    tasks: Vec<Task>,
}

impl TaskPlan {
    /// Create a new empty plan.
    pub fn new() -> Self {
        Self { tasks: vec![] }
    }

    /// Add a task to the plan.
    pub fn add_task(&mut self, task: Task) {
        self.tasks.push(task);
    }

    /// Get all tasks in the plan.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Find a task by id.
    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Get the number of tasks in the plan.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Check if the plan is empty.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Get tasks in run order (respecting dependencies).
    ///
    /// Returns tasks sorted so that dependencies come before dependents.
    pub fn build_order(&self) -> Result<Vec<&Task>, PlanError> {
        let mut result = Vec::new();
        let mut visited = HashSet::new();
        let mut visiting = HashSet::new();

        for task in &self.tasks {
            self.visit_task(task, &mut visited, &mut visiting, &mut result)?;
        }

        Ok(result)
    }

    fn visit_task<'a>(
        &'a self,
        task: &'a Task,
        visited: &mut HashSet<String>,
        visiting: &mut HashSet<String>,
        result: &mut Vec<&'a Task>,
    ) -> Result<(), PlanError> {
        if visited.contains(&task.id) {
            return Ok(());
        }

        if visiting.contains(&task.id) {
            return Err(PlanError::CyclicDependency(task.id.clone()));
        }

        visiting.insert(task.id.clone());

        for dep_id in &task.dependencies {
            let dep = self.get(dep_id).ok_or_else(|| PlanError::UnknownDependency {
                task: task.id.clone(),
                dependency: dep_id.clone(),
            })?;
            self.visit_task(dep, visited, visiting, result)?;
        }

        visiting.remove(&task.id);
        visited.insert(task.id.clone());
        result.push(task);

        Ok(())
    }

    /// Group tasks into levels where all dependencies are in earlier levels.
    ///
    /// Tasks within a level keep their plan order and may run concurrently.
    pub fn levels(&self) -> Result<Vec<Vec<&Task>>, PlanError> {
        let ordered = self.build_order()?;

        let mut depth: HashMap<&str, usize> = HashMap::new();
        for task in &ordered {
            let level = task
                .dependencies
                .iter()
                .filter_map(|d| depth.get(d.as_str()))
                .map(|l| l + 1)
                .max()
                .unwrap_or(0);
            depth.insert(task.id.as_str(), level);
        }

        let max_level = match depth.values().copied().max() {
            Some(max) => max,
            None => return Ok(vec![]),
        };

        let mut levels: Vec<Vec<&Task>> = vec![Vec::new(); max_level + 1];
        for task in &self.tasks {
            if let Some(&level) = depth.get(task.id.as_str()) {
                levels[level].push(task);
            }
        }

        Ok(levels)
    }

    /// Ids of every task that transitively depends on `id`.
    pub fn dependents_of(&self, id: &str) -> HashSet<String> {
        let mut found = HashSet::new();
        let mut frontier = vec![id.to_string()];

        while let Some(current) = frontier.pop() {
            for task in &self.tasks {
                if task.dependencies.contains(&current) && found.insert(task.id.clone()) {
                    frontier.push(task.id.clone());
                }
            }
        }

        found
    }

    /// Render the plan as one line per level, e.g. `clean-dist -> [html, css]`.
    pub fn describe(&self) -> Result<String, PlanError> {
        let levels = self.levels()?;
        let parts: Vec<String> = levels
            .iter()
            .map(|level| {
                let ids: Vec<&str> = level.iter().map(|t| t.id.as_str()).collect();
                if ids.len() == 1 {
                    ids[0].to_string()
                } else {
                    format!("[{}]", ids.join(", "))
                }
            })
            .collect();
        Ok(parts.join(" -> "))
    }
}

/// Error while ordering a plan.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    /// Circular dependency detected
    #[error("Circular dependency detected involving task '{0}'")]
    CyclicDependency(String),
    /// A task depends on an id that is not in the plan
    #[error("Task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: String, dependency: String },
}
