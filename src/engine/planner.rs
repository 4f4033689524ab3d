//! Building a host's tasks from the playbook's `[[tasks]]` entries
//!
//! Descriptor fields are rendered against the host's variables before they
//! are parsed, so `dest = "/srv/{{ app_name }}"` is validated as the path
//! it expands to. A field that fails to render does not abort the plan: the
//! task gets a [`Deferred`] resource that fails when the task runs.

use crate::resource::{Deferred, Descriptor};
use crate::schema::{Playbook, TaskSpec};
use declarative::{BoxedResource, Error, Result, Task};
use std::path::Path;
use stencil::{Expr, Renderer, Vars};

/// Build every task of `playbook` for one host.
///
/// Fails on descriptors that do not parse and on guards that are not valid
/// expressions; both are plan-time errors.
pub fn build_tasks(playbook: &Playbook, renderer: &Renderer, vars: &Vars) -> Result<Vec<Task>> {
    let base_dir = playbook.path.parent().unwrap_or_else(|| Path::new("."));
    playbook
        .tasks
        .iter()
        .map(|spec| build_task(spec, base_dir, renderer, vars))
        .collect()
}

pub fn build_task(
    spec: &TaskSpec,
    base_dir: &Path,
    renderer: &Renderer,
    vars: &Vars,
) -> Result<Task> {
    let origin = format!("task '{}'", spec.id);

    let resource: BoxedResource = match render_table(&spec.fields, renderer, &origin, vars) {
        Ok(fields) => Descriptor::from_table(fields)
            .map_err(|problem| Error::InvalidDescriptor {
                task: spec.id.clone(),
                problems: vec![problem],
            })?
            .with_base_dir(base_dir)
            .into_resource(),
        Err(e) => {
            log::debug!("{origin}: descriptor did not render: {e}");
            Box::new(Deferred::new(&spec.id, spec.kind().unwrap_or_default(), e))
        }
    };

    let mut task = Task::new(&spec.id, resource)
        .tags(spec.tags.iter())
        .depends_on(spec.depends_on.iter())
        .privileged(spec.privileged);

    if let Some(when) = &spec.when {
        task = task.when(Expr::parse_at(when, &format!("{origin} when"), 1)?);
    }
    Ok(task)
}

/// Render every string in a descriptor table; `kind` is left alone
fn render_table(
    table: &toml::Table,
    renderer: &Renderer,
    origin: &str,
    vars: &Vars,
) -> stencil::Result<toml::Table> {
    table
        .iter()
        .map(|(key, value)| {
            let value = if key == "kind" {
                value.clone()
            } else {
                render_value(value, renderer, origin, vars)?
            };
            Ok((key.clone(), value))
        })
        .collect()
}

fn render_value(
    value: &toml::Value,
    renderer: &Renderer,
    origin: &str,
    vars: &Vars,
) -> stencil::Result<toml::Value> {
    Ok(match value {
        toml::Value::String(s) => toml::Value::String(renderer.render_str(s, origin, vars)?),
        toml::Value::Array(items) => toml::Value::Array(
            items
                .iter()
                .map(|item| render_value(item, renderer, origin, vars))
                .collect::<stencil::Result<_>>()?,
        ),
        toml::Value::Table(table) => toml::Value::Table(render_table(table, renderer, origin, vars)?),
        other => other.clone(),
    })
}
