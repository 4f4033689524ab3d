use colored::Colorize;
use declarative::{Outcome, ProgressCallback, RunReport, TaskResult};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Print a unified diff, colored by line kind
pub fn diff(text: &str) {
    for line in text.lines() {
        let colored = if line.starts_with("+++") || line.starts_with("---") {
            line.bold()
        } else if line.starts_with('+') {
            line.green()
        } else if line.starts_with('-') {
            line.red()
        } else if line.starts_with("@@") {
            line.cyan()
        } else {
            line.normal()
        };
        println!("      {colored}");
    }
}

// ============================================================================
// Run Progress
// ============================================================================

/// Prints one line per finished task, prefixed with the host name.
///
/// Quiet mode prints only failures.
#[derive(Debug, Clone, Copy)]
pub struct TerminalProgress {
    pub check: bool,
    pub quiet: bool,
}

impl TerminalProgress {
    pub fn new(check: bool, quiet: bool) -> Self {
        Self { check, quiet }
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_run_start(&mut self, host: &str, count: usize) {
        if !self.quiet {
            let mode = if self.check { " (check mode)" } else { "" };
            info(&format!("{}: {count} task(s){mode}", host.bold()));
        }
    }

    fn on_task_start(&mut self, host: &str, task_id: &str, description: &str) {
        log::debug!("[{host}] {task_id}: {description}");
    }

    fn on_task_complete(&mut self, host: &str, result: &TaskResult) {
        if self.quiet && !result.outcome.is_failed() {
            return;
        }
        println!("{}", task_line(host, result, self.check));
        if let Some(text) = &result.diff {
            diff(text);
        }
    }
}

fn task_line(host: &str, result: &TaskResult, check: bool) -> String {
    let label = result.outcome.label(check);
    let (symbol, label, detail) = match &result.outcome {
        Outcome::Applied => ("✓".green(), label.yellow(), String::new()),
        Outcome::Unchanged => ("○".dimmed(), label.green(), String::new()),
        Outcome::Skipped { reason } => ("⊘".dimmed(), label.dimmed(), format!(" ({reason})")),
        Outcome::Failed { error, .. } => ("✗".red(), label.red().bold(), format!(": {error}")),
    };
    format!(
        "  {symbol} {} {:<28} {label}{}",
        format!("{host} |").dimmed(),
        result.task_id,
        detail.dimmed()
    )
}

/// Print the per-host totals of a run
pub fn print_summary(reports: &[RunReport]) {
    if reports.is_empty() {
        return;
    }
    let check = reports.iter().any(|r| r.check);
    header(if check { "Check summary" } else { "Summary" });

    for report in reports {
        let summary = report.summary();
        let applied = format!(
            "{} {}",
            summary.total_changes(),
            if check { "would change" } else { "applied" }
        );
        let failed = format!("{} failed", summary.failed);
        kv(
            &report.host,
            &format!(
                "{}, {} unchanged, {} skipped, {}",
                if summary.total_changes() > 0 { applied.yellow() } else { applied.normal() },
                summary.unchanged,
                summary.skipped,
                if summary.failed > 0 { failed.red().bold() } else { failed.normal() }
            ),
        );
    }

    println!();
    if reports.iter().all(RunReport::is_success) {
        success("All hosts converged");
    } else {
        warn("Run finished with failures");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn result(outcome: Outcome) -> TaskResult {
        TaskResult {
            task_id: "proxy".to_string(),
            resource_type: "templated_file".to_string(),
            description: "Render nginx.conf.j2 to /etc/nginx/sites-enabled/shop".to_string(),
            outcome,
            change: None,
            attempts: 1,
            duration: Duration::from_millis(12),
            diff: None,
        }
    }

    #[test]
    fn test_task_line_labels() {
        colored::control::set_override(false);

        let line = task_line("web1", &result(Outcome::Applied), true);
        assert!(line.contains("web1 | proxy"));
        assert!(line.ends_with("would change"));

        let line = task_line("web1", &result(Outcome::skipped("not selected by tags")), false);
        assert!(line.ends_with("skipped (not selected by tags)"));

        let failed = Outcome::Failed {
            error: "timeout error: writing /etc/nginx/sites-enabled/shop".to_string(),
            category: "timeout_error".to_string(),
        };
        let line = task_line("web1", &result(failed), false);
        assert!(line.contains("failed: timeout error"));
    }
}
