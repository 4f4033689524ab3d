//! `deckhand run` - converge the selected hosts

use anyhow::{Context as AnyhowContext, Result, bail};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::Context;
use crate::cli::{OutputFormat, RunArgs};
use crate::commands::Workspace;
use crate::engine::{self, RunSettings};
use crate::secrets::EnvSecrets;
use crate::ui::{self, TerminalProgress};
use declarative::{FailurePolicy, NoProgress, RetryConfig, RunOptions, RunReport};

/// Run the playbook; returns whether every task on every host succeeded
pub fn run(ctx: &Context, args: RunArgs) -> Result<bool> {
    let workspace = Workspace::load(&args.source)?;

    if args.list_tags {
        list_tags(&workspace);
        return Ok(true);
    }

    let tags: BTreeSet<String> = args.tags.iter().cloned().collect();
    warn_unknown_tags(&workspace, &tags);

    let hosts = workspace.inventory.select(&args.limit)?;
    if hosts.is_empty() {
        bail!("No hosts to run on");
    }

    let settings = RunSettings {
        tags,
        options: options(&args)?,
        forks: args.forks,
    };

    let plans = engine::prepare(
        &workspace.playbook,
        &workspace.inventory,
        &hosts,
        &workspace.sources,
        &workspace.renderer,
        &settings.tags,
        engine::connect,
    )?;

    if ctx.verbose > 0 && args.format == OutputFormat::Text {
        ui::kv("playbook", &workspace.playbook.path.display().to_string());
        let names: Vec<&str> = plans.iter().map(|p| p.name.as_str()).collect();
        ui::kv("hosts", &names.join(", "));
    }

    let secrets = EnvSecrets;
    let reports = match args.format {
        OutputFormat::Text => {
            let progress = TerminalProgress::new(args.check, ctx.quiet);
            let reports =
                engine::run_hosts(&plans, &workspace.renderer, &secrets, &settings, || progress)?;
            if !ctx.quiet {
                ui::print_summary(&reports);
            }
            reports
        }
        OutputFormat::Json => {
            let reports =
                engine::run_hosts(&plans, &workspace.renderer, &secrets, &settings, || NoProgress)?;
            let json =
                serde_json::to_string_pretty(&reports).context("Failed to serialize run reports")?;
            println!("{json}");
            reports
        }
    };

    report_failures(&reports);
    Ok(reports.iter().all(RunReport::is_success))
}

fn options(args: &RunArgs) -> Result<RunOptions> {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    ctrlc::set_handler(move || {
        if !flag.swap(true, Ordering::SeqCst) {
            ui::warn("Cancelling: running tasks finish, the rest are skipped");
        }
    })
    .context("Failed to install Ctrl-C handler")?;

    Ok(RunOptions {
        check: args.check,
        diff: args.diff,
        policy: if args.continue_on_error {
            FailurePolicy::Continue
        } else {
            FailurePolicy::Halt
        },
        retry: RetryConfig::with_retries(args.retries),
        timeout: args.timeout.map(Duration::from_secs),
        cancel: Some(cancel),
    })
}

fn list_tags(workspace: &Workspace) {
    let tags: BTreeSet<&str> = workspace
        .playbook
        .tasks
        .iter()
        .flat_map(|t| t.tags.iter().map(String::as_str))
        .collect();
    for tag in tags {
        println!("{tag}");
    }
}

fn warn_unknown_tags(workspace: &Workspace, tags: &BTreeSet<String>) {
    for tag in tags {
        if !workspace.playbook.tasks.iter().any(|t| t.tags.contains(tag)) {
            ui::warn(&format!("Tag '{tag}' is not used by any task"));
        }
    }
}

/// First failing task of each host, on stderr
fn report_failures(reports: &[RunReport]) {
    for report in reports {
        if let Some(failure) = report.first_failure()
            && let declarative::Outcome::Failed { error, .. } = &failure.outcome
        {
            ui::error(&format!(
                "{}: task '{}' failed: {error}",
                report.host, failure.task_id
            ));
        }
    }
}
