//! `deckhand render` - print a template as a host would receive it

use anyhow::{Context as AnyhowContext, Result, bail};
use std::io::{self, Write};

use crate::Context;
use crate::cli::RenderArgs;
use crate::commands::Workspace;

pub fn run(_ctx: &Context, args: RenderArgs) -> Result<()> {
    let workspace = Workspace::load(&args.source)?;
    let content = render(&workspace, &args.template, args.host.as_deref())?;
    io::stdout()
        .write_all(&content)
        .context("Failed to write rendered template")?;
    Ok(())
}

/// Render `template` with the variables of `host` (default: first host)
pub fn render(workspace: &Workspace, template: &str, host: Option<&str>) -> Result<Vec<u8>> {
    let inventory = &workspace.inventory;
    let (name, spec) = match host {
        Some(name) => match inventory.hosts.get_key_value(name) {
            Some((name, spec)) => (name.as_str(), spec),
            None => bail!("Host '{name}' is not in the inventory"),
        },
        None => match inventory.hosts.iter().next() {
            Some((name, spec)) => (name.as_str(), spec),
            None => bail!("The inventory has no hosts"),
        },
    };
    log::debug!("Rendering {template} for {name}");

    let vars = workspace.sources.for_host(inventory, name, spec);
    workspace
        .renderer
        .render(template, &vars)
        .with_context(|| format!("Could not render {template} for {name}"))
}
