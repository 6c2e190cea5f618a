//! Parallel task execution.
//!
//! Runs a [`TaskPlan`] level by level: every task in a level has all of its
//! dependencies in earlier levels, so a level's tasks run concurrently on
//! scoped worker threads.
//!
//! # Failure handling
//!
//! A failed task aborts everything that depends on it. With fail-fast on
//! (the default) it also trips the shared [`CancelToken`]: running siblings
//! notice between files and stop with a `cancelled` status, and tasks that
//! had not started are reported as cancelled.
//!
//! # Example
//!
//! ```ignore
//! use sitepipe::build::{BuildContext, Pipeline, TaskRunner};
//!
//! let context = BuildContext::new(config, project_root);
//! let result = TaskRunner::new(context).with_jobs(4).run(&Pipeline::Build.plan())?;
//!
//! println!("{}", result.summary());
//! ```

use crate::build::{execute_task, BuildContext, BuildResult, PlanError, Task, TaskPlan, TaskResult};
use crate::tasks::{TaskError, TaskOutput};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Default number of parallel jobs (uses available parallelism).
fn default_jobs() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

/// Shared cancellation flag observed by running tasks.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of every task holding this token.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Return `Err(TaskError::Cancelled)` once cancellation was requested.
    ///
    /// Tasks call this between files.
    pub fn check(&self) -> Result<(), TaskError> {
        if self.is_cancelled() {
            Err(TaskError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Parallel plan executor.
pub struct TaskRunner {
    /// Build context handed to every task
    context: BuildContext,
    /// Number of parallel jobs
    jobs: usize,
    /// Whether a failure cancels the rest of the run
    fail_fast: bool,
    /// Cancellation shared with running tasks
    cancel: CancelToken,
}

impl TaskRunner {
    /// Create a new runner.
    pub fn new(context: BuildContext) -> Self {
        Self { context, jobs: default_jobs(), fail_fast: true, cancel: CancelToken::new() }
    }

    /// Set the number of parallel jobs.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Set fail-fast mode (cancel siblings on first error).
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Get the number of parallel jobs.
    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// The token tasks of this runner observe.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run a plan, dispatching each task to its adapter.
    pub fn run(&self, plan: &TaskPlan) -> Result<BuildResult, PlanError> {
        self.run_with(plan, |task, context, cancel| execute_task(task.kind, context, cancel))
    }

    /// Run a plan with a custom executor.
    pub fn run_with<F>(&self, plan: &TaskPlan, executor: F) -> Result<BuildResult, PlanError>
    where
        F: Fn(&Task, &BuildContext, &CancelToken) -> Result<TaskOutput, TaskError> + Sync,
    {
        let start = Instant::now();
        let levels = plan.levels()?;

        debug!(
            tasks = plan.len(),
            levels = levels.len(),
            workers = self.jobs,
            "Running plan {}",
            plan.describe()?
        );

        let mut result = BuildResult::new();
        let mut blocked: HashSet<String> = HashSet::new();

        for level in levels {
            let (runnable, skipped): (Vec<&Task>, Vec<&Task>) = level
                .into_iter()
                .partition(|t| !blocked.contains(&t.id) && !self.cancel.is_cancelled());

            for task in skipped {
                debug!(task = %task.id, "Skipping '{}'", task.id);
                result.add_result(TaskResult::cancelled(task.id.clone(), Duration::ZERO));
            }

            for task_result in self.execute_level(&runnable, &executor) {
                if !task_result.is_success() {
                    blocked.extend(plan.dependents_of(&task_result.task_id));
                }
                result.add_result(task_result);
            }
        }

        Ok(result.with_duration(start.elapsed()))
    }

    /// Execute a single level of tasks, in parallel when possible.
    ///
    /// Results come back in the level's plan order.
    fn execute_level<F>(&self, tasks: &[&Task], executor: &F) -> Vec<TaskResult>
    where
        F: Fn(&Task, &BuildContext, &CancelToken) -> Result<TaskOutput, TaskError> + Sync,
    {
        if tasks.is_empty() {
            return vec![];
        }

        if self.jobs == 1 || tasks.len() == 1 {
            return tasks.iter().map(|t| self.execute_task(t, executor)).collect();
        }

        let results = Mutex::new(Vec::with_capacity(tasks.len()));
        let next_idx = AtomicUsize::new(0);

        std::thread::scope(|s| {
            let num_workers = self.jobs.min(tasks.len());

            for _ in 0..num_workers {
                let results = &results;
                let next_idx = &next_idx;

                s.spawn(move || loop {
                    let idx = next_idx.fetch_add(1, Ordering::SeqCst);
                    if idx >= tasks.len() {
                        break;
                    }

                    let task_result = self.execute_task(tasks[idx], executor);
                    results.lock().unwrap_or_else(|e| e.into_inner()).push((idx, task_result));
                });
            }
        });

        let mut results = results.into_inner().unwrap_or_else(|e| e.into_inner());
        results.sort_by_key(|(idx, _)| *idx);

        results.into_iter().map(|(_, r)| r).collect()
    }

    /// Execute a single task and record its outcome.
    fn execute_task<F>(&self, task: &Task, executor: &F) -> TaskResult
    where
        F: Fn(&Task, &BuildContext, &CancelToken) -> Result<TaskOutput, TaskError> + Sync,
    {
        let start = Instant::now();

        if self.cancel.is_cancelled() {
            return TaskResult::cancelled(task.id.clone(), start.elapsed());
        }

        info!(task = %task.id, "Starting '{}'...", task.id);

        let outcome = executor(task, &self.context, &self.cancel);
        let duration = start.elapsed();

        match &outcome {
            Ok(_) => info!(task = %task.id, "Finished '{}' after {:?}", task.id, duration),
            Err(TaskError::Cancelled) => {
                info!(task = %task.id, "Cancelled '{}' after {:?}", task.id, duration)
            }
            Err(e) => {
                error!(task = %task.id, "'{}' errored after {:?}: {}", task.id, duration, e);
                if self.fail_fast {
                    self.cancel.cancel();
                }
            }
        }

        TaskResult::from_outcome(task.id.clone(), outcome, duration)
    }
}
