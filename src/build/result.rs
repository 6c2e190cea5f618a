//! Outcome of a pipeline run, per task and overall.

use crate::tasks::{TaskError, TaskOutput};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// How a task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStatus {
    Success,
    /// Stopped, or never started, because another task failed
    Cancelled,
    Failed(String),
}

impl BuildStatus {
    pub fn is_success(&self) -> bool {
        *self == BuildStatus::Success
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, BuildStatus::Failed(_))
    }

    pub fn is_cancelled(&self) -> bool {
        *self == BuildStatus::Cancelled
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildStatus::Success => f.write_str("success"),
            BuildStatus::Cancelled => f.write_str("cancelled"),
            BuildStatus::Failed(message) => write!(f, "failed: {}", message),
        }
    }
}

/// What one task did.
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub task_id: String,
    pub status: BuildStatus,
    /// Files written
    pub outputs: Vec<PathBuf>,
    pub duration: Duration,
    pub warnings: Vec<String>,
}

impl TaskResult {
    fn new(task_id: impl Into<String>, status: BuildStatus, duration: Duration) -> Self {
        Self { task_id: task_id.into(), status, outputs: vec![], duration, warnings: vec![] }
    }

    pub fn success(task_id: impl Into<String>, outputs: Vec<PathBuf>, duration: Duration) -> Self {
        Self { outputs, ..Self::new(task_id, BuildStatus::Success, duration) }
    }

    pub fn cancelled(task_id: impl Into<String>, duration: Duration) -> Self {
        Self::new(task_id, BuildStatus::Cancelled, duration)
    }

    pub fn failed(task_id: impl Into<String>, error: impl Into<String>, duration: Duration) -> Self {
        Self::new(task_id, BuildStatus::Failed(error.into()), duration)
    }

    /// Record how a task adapter returned.
    pub fn from_outcome(
        task_id: impl Into<String>,
        outcome: Result<TaskOutput, TaskError>,
        duration: Duration,
    ) -> Self {
        match outcome {
            Ok(output) => Self::success(task_id, output.outputs, duration).with_warnings(output.warnings),
            Err(TaskError::Cancelled) => Self::cancelled(task_id, duration),
            Err(e) => Self::failed(task_id, e.to_string(), duration),
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Results of every task in a run, in the order they finished levels.
#[derive(Debug, Default)]
pub struct BuildResult {
    pub tasks: Vec<TaskResult>,
    pub total_duration: Duration,
}

/// Warnings listed in a summary before the rest are elided
const SUMMARY_WARNING_LIMIT: usize = 5;

impl BuildResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_result(&mut self, result: TaskResult) {
        self.tasks.push(result);
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.total_duration = duration;
        self
    }

    pub fn get(&self, task_id: &str) -> Option<&TaskResult> {
        self.tasks.iter().find(|r| r.task_id == task_id)
    }

    fn count(&self, pred: impl Fn(&BuildStatus) -> bool) -> usize {
        self.tasks.iter().filter(|r| pred(&r.status)).count()
    }

    pub fn success_count(&self) -> usize {
        self.count(BuildStatus::is_success)
    }

    pub fn cancelled_count(&self) -> usize {
        self.count(BuildStatus::is_cancelled)
    }

    pub fn failed_count(&self) -> usize {
        self.count(BuildStatus::is_failure)
    }

    /// True only when every task completed; a cancellation is not a success.
    pub fn is_success(&self) -> bool {
        self.tasks.iter().all(TaskResult::is_success)
    }

    pub fn all_outputs(&self) -> Vec<&PathBuf> {
        self.tasks.iter().flat_map(|r| &r.outputs).collect()
    }

    pub fn all_warnings(&self) -> Vec<&String> {
        self.tasks.iter().flat_map(|r| &r.warnings).collect()
    }

    pub fn failures(&self) -> Vec<&TaskResult> {
        self.tasks.iter().filter(|r| r.status.is_failure()).collect()
    }

    /// One line per task with its status, duration and output count.
    pub fn details(&self) -> Vec<String> {
        self.tasks
            .iter()
            .map(|task| {
                format!(
                    "  {}: {} in {:?} ({} files)",
                    task.task_id,
                    task.status,
                    task.duration,
                    task.outputs.len()
                )
            })
            .collect()
    }

    /// Human-readable report printed after a run.
    ///
    /// ```text
    /// Build failed: 3 built, 1 cancelled, 1 failed (5 total) in 1.2s
    ///   - css: failed: src/scss/main.scss: expected "}".
    /// ```
    pub fn summary(&self) -> String {
        let total = self.tasks.len();
        let mut out = if self.is_success() {
            format!(
                "Build succeeded: {} built ({} total) in {:?}",
                self.success_count(),
                total,
                self.total_duration
            )
        } else {
            format!(
                "Build failed: {} built, {} cancelled, {} failed ({} total) in {:?}",
                self.success_count(),
                self.cancelled_count(),
                self.failed_count(),
                total,
                self.total_duration
            )
        };

        for task in self.failures() {
            out.push_str(&format!("\n  - {}: {}", task.task_id, task.status));
        }

        let warnings = self.all_warnings();
        if !warnings.is_empty() {
            out.push_str(&format!("\nWarnings ({}):", warnings.len()));
            for warning in warnings.iter().take(SUMMARY_WARNING_LIMIT) {
                out.push_str(&format!("\n  - {}", warning));
            }
            if let Some(rest) = warnings.len().checked_sub(SUMMARY_WARNING_LIMIT).filter(|n| *n > 0) {
                out.push_str(&format!("\n  ... and {} more", rest));
            }
        }

        out
    }
}
