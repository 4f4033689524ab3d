//! Per-task results and per-host run reports

use crate::error::Error;
use crate::types::{ApplyResult, ExecuteSummary};
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::time::Duration;

/// Final outcome of one task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// A change was made (or, in check mode, would be made)
    Applied,
    /// Host already matched the desired state
    Unchanged,
    /// Task was not executed
    Skipped { reason: String },
    /// Task failed; `error` is the human-readable cause
    Failed { error: String, category: String },
}

impl Outcome {
    pub fn failed(error: &Error) -> Self {
        Self::Failed {
            error: error.to_string(),
            category: error.category().label().to_string(),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Short label for terminal output
    pub fn label(&self, check: bool) -> &'static str {
        match self {
            Self::Applied if check => "would change",
            Self::Applied => "applied",
            Self::Unchanged => "unchanged",
            Self::Skipped { .. } => "skipped",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Result of one task on one host
#[derive(Debug, Clone, Serialize)]
pub struct TaskResult {
    pub task_id: String,
    pub resource_type: String,
    pub description: String,
    #[serde(flatten)]
    pub outcome: Outcome,
    /// Resource-level change, when the task was applied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change: Option<ApplyResult>,
    pub attempts: u32,
    #[serde(rename = "duration_secs", serialize_with = "serialize_secs")]
    pub duration: Duration,
    /// Unified content diff, when requested and the content changes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
}

impl TaskResult {
    /// Result for a task that never reached the executor
    pub fn skipped(
        task_id: &str,
        resource_type: &str,
        description: String,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.to_string(),
            resource_type: resource_type.to_string(),
            description,
            outcome: Outcome::skipped(reason),
            change: None,
            attempts: 0,
            duration: Duration::ZERO,
            diff: None,
        }
    }
}

fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64((duration.as_secs_f64() * 1000.0).round() / 1000.0)
}

/// Ordered results of one run on one host
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub host: String,
    /// Run only determined what would change
    pub check: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub results: Vec<TaskResult>,
}

impl RunReport {
    /// A run succeeds iff no task failed
    pub fn is_success(&self) -> bool {
        !self.results.iter().any(|r| r.outcome.is_failed())
    }

    /// First failing task in execution order
    pub fn first_failure(&self) -> Option<&TaskResult> {
        self.results.iter().find(|r| r.outcome.is_failed())
    }

    /// Look up the result of a task
    pub fn result(&self, task_id: &str) -> Option<&TaskResult> {
        self.results.iter().find(|r| r.task_id == task_id)
    }

    pub fn summary(&self) -> ExecuteSummary {
        let mut summary = ExecuteSummary::default();
        for result in &self.results {
            match (&result.outcome, result.change) {
                (Outcome::Applied, Some(ApplyResult::Created)) => summary.created += 1,
                (Outcome::Applied, _) => summary.modified += 1,
                (Outcome::Unchanged, _) => summary.unchanged += 1,
                (Outcome::Skipped { .. }, _) => summary.skipped += 1,
                (Outcome::Failed { .. }, _) => summary.failed += 1,
            }
        }
        summary
    }
}
