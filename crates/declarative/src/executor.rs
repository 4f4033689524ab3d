//! Runner - executes a plan on one host, task by task

use crate::context::{ApplyContext, HostContext, ProgressCallback};
use crate::error::{Error, Result};
use crate::planner::Plan;
use crate::report::{Outcome, RunReport, TaskResult};
use crate::resource::ResourceExt;
use crate::retry::{LogCallback, RetryConfig, with_retry};
use crate::task::Task;
use crate::types::{ApplyResult, FailurePolicy};
use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Options for one run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Only determine what would change
    pub check: bool,
    /// Attach unified content diffs to results
    pub diff: bool,
    pub policy: FailurePolicy,
    /// Retry policy for transient apply errors
    pub retry: RetryConfig,
    /// Budget for each command a task issues
    pub timeout: Option<Duration>,
    /// Set to stop starting new tasks
    pub cancel: Option<Arc<AtomicBool>>,
}

impl RunOptions {
    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}

/// Plan `tasks` for the selected tags and execute them on one host.
///
/// Plan-time errors (invalid descriptors, cycles, unknown dependencies)
/// are returned before any task runs. Apply-time errors end up in the
/// report as `failed` results.
pub fn run<P: ProgressCallback + ?Sized>(
    tasks: &[Task],
    selected_tags: &BTreeSet<String>,
    host: HostContext,
    opts: &RunOptions,
    progress: &mut P,
) -> Result<RunReport> {
    let plan = Plan::build(tasks, selected_tags)?;
    Ok(execute(&plan, host, opts, progress))
}

/// Execute a plan in order on one host
pub fn execute<P: ProgressCallback + ?Sized>(
    plan: &Plan,
    host: HostContext,
    opts: &RunOptions,
    progress: &mut P,
) -> RunReport {
    let host_name = host.host().to_string();
    let started_at = Utc::now();
    let mut results = Vec::with_capacity(plan.total());

    // Tasks that failed, or that were skipped because something they depend on failed
    let mut blocked: BTreeSet<&str> = BTreeSet::new();
    let mut halted_by: Option<String> = None;

    log::info!(
        "[{host_name}] Running {} task(s){}",
        plan.len(),
        if opts.check { " in check mode" } else { "" }
    );
    progress.on_run_start(&host_name, plan.len());

    for task in plan.ordered() {
        let skip_reason = if opts.cancelled() {
            Some("run cancelled".to_string())
        } else if let Some(failed) = &halted_by {
            Some(format!("halted after failure of '{failed}'"))
        } else {
            task.depends_on
                .iter()
                .find(|d| blocked.contains(d.as_str()))
                .map(|d| format!("dependency '{d}' did not succeed"))
        };

        let result = if let Some(reason) = skip_reason {
            if !opts.cancelled() {
                blocked.insert(task.id.as_str());
            }
            skipped(task, reason)
        } else {
            progress.on_task_start(&host_name, &task.id, &task.resource.description());
            execute_task(task, host, opts)
        };

        if result.outcome.is_failed() {
            blocked.insert(task.id.as_str());
            if opts.policy == FailurePolicy::Halt {
                halted_by = Some(task.id.clone());
            }
        }

        log::info!(
            "[{host_name}] {}: {}",
            task.id,
            result.outcome.label(opts.check)
        );
        progress.on_task_complete(&host_name, &result);
        results.push(result);
    }

    for task in plan.unselected() {
        let result = skipped(task, "not selected by tags");
        progress.on_task_complete(&host_name, &result);
        results.push(result);
    }

    RunReport {
        host: host_name,
        check: opts.check,
        started_at,
        finished_at: Utc::now(),
        results,
    }
}

fn skipped(task: &Task, reason: impl Into<String>) -> TaskResult {
    TaskResult::skipped(
        &task.id,
        task.resource.resource_type(),
        task.resource.description(),
        reason,
    )
}

/// Evaluate the guard, then check or apply one task
fn execute_task(task: &Task, host: HostContext, opts: &RunOptions) -> TaskResult {
    let start = Instant::now();
    let mut result = skipped(task, "");

    if let Some(guard) = &task.guard {
        match guard.is_true(host.vars) {
            Ok(true) => {}
            Ok(false) => {
                return skipped(task, format!("condition '{}' is false", guard.source()));
            }
            Err(e) => {
                result.outcome = Outcome::failed(&Error::from(e));
                return result;
            }
        }
    }

    if task.resource.requires_sudo() && !task.requires_privilege {
        let err = Error::PermissionDenied {
            message: format!(
                "{} requires privilege; set `become = true` on task '{}'",
                task.resource.resource_type(),
                task.id
            ),
        };
        result.outcome = Outcome::failed(&err);
        return result;
    }

    let mut ctx = ApplyContext::new(host, task.requires_privilege, opts.timeout);
    ctx.check = opts.check;

    let label = format!("[{}] {}", host.host(), task.id);
    let callback = LogCallback { label: &label };
    let mut attempts = 0;

    let outcome = with_retry(&opts.retry, Some(&callback), || {
        attempts += 1;
        let diff = if opts.diff {
            task.resource.content_diff(&ctx)?
        } else {
            None
        };
        let change = if opts.check {
            if task.resource.needs_apply(&ctx)? {
                ApplyResult::Modified
            } else {
                ApplyResult::NoChange
            }
        } else {
            task.resource.apply(&ctx)?
        };
        Ok((change, diff))
    });

    result.attempts = attempts;
    result.duration = start.elapsed();
    match outcome {
        Ok((change, diff)) => {
            result.outcome = if change.is_change() {
                Outcome::Applied
            } else {
                Outcome::Unchanged
            };
            result.change = Some(change);
            result.diff = diff;
        }
        Err(e) => {
            log::debug!("{label} failed after {attempts} attempt(s): {e}");
            result.outcome = Outcome::failed(&e);
        }
    }
    result
}
