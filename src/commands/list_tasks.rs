//! `deckhand list-tasks` - show the planned task order

use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use std::collections::BTreeSet;

use crate::Context;
use crate::cli::ListTasksArgs;
use crate::commands::{load_playbook, load_templates};
use crate::config::VarSources;
use crate::engine::build_tasks;
use crate::schema::{HostSpec, Inventory};
use crate::ui;
use declarative::{Plan, Task, all_tags};

pub fn run(_ctx: &Context, args: ListTasksArgs) -> Result<()> {
    let playbook = load_playbook(args.playbook.as_deref())?;
    let renderer = load_templates(&playbook)?;

    // Descriptors are rendered with the playbook defaults only
    let sources = VarSources::load(&playbook, &[] as &[&str], &[])?;
    let vars = sources.for_host(&Inventory::default(), "localhost", &HostSpec::default());
    let tasks = build_tasks(&playbook, &renderer, &vars)?;

    let selected: BTreeSet<String> = args.tags.into_iter().collect();
    let plan = Plan::build(&tasks, &selected).context("Playbook does not plan")?;

    ui::header(&playbook.name);
    for (i, task) in plan.ordered().enumerate() {
        println!("{}", task_line(i + 1, task));
    }
    let unselected: Vec<&Task> = plan.unselected().collect();
    if !unselected.is_empty() {
        println!();
        for task in unselected {
            ui::dim(&format!("{} (not selected)", task.id));
        }
    }

    let tags = all_tags(&tasks);
    if !tags.is_empty() {
        println!();
        ui::kv("tags", &tags.into_iter().collect::<Vec<_>>().join(", "));
    }
    Ok(())
}

fn task_line(position: usize, task: &Task) -> String {
    let mut line = format!(
        "{} {} {}",
        format!("{position:>3}.").blue().bold(),
        task.id.bold(),
        format!("[{}]", task.resource.resource_type()).dimmed()
    );
    if !task.tags.is_empty() {
        line.push_str(&format!(" tags: {}", join(&task.tags).cyan()));
    }
    if !task.depends_on.is_empty() {
        line.push_str(&format!(" after: {}", join(&task.depends_on)));
    }
    if task.requires_privilege {
        line.push_str(&format!(" {}", "become".yellow()));
    }
    if let Some(guard) = &task.guard {
        line.push_str(&format!(" when: {}", guard.source().dimmed()));
    }
    line
}

fn join(items: &BTreeSet<String>) -> String {
    items.iter().map(String::as_str).collect::<Vec<_>>().join(",")
}
