pub mod list_tasks;
pub mod render;
pub mod run;

use crate::cli::SourceArgs;
use crate::config::VarSources;
use crate::paths;
use crate::schema::{Inventory, Playbook};
use anyhow::{Context as AnyhowContext, Result};
use std::path::Path;
use stencil::Renderer;

/// Everything a command reads before it touches a host
pub struct Workspace {
    pub playbook: Playbook,
    pub inventory: Inventory,
    pub renderer: Renderer,
    pub sources: VarSources,
}

impl Workspace {
    pub fn load(args: &SourceArgs) -> Result<Self> {
        let playbook = load_playbook(args.playbook.as_deref())?;
        let inventory = load_inventory(args.inventory.as_deref())?;
        let renderer = load_templates(&playbook)?;
        let sources = VarSources::load(&playbook, &args.vars_file, &args.extra_vars)?;
        Ok(Self {
            playbook,
            inventory,
            renderer,
            sources,
        })
    }
}

pub fn load_playbook(path: Option<&Path>) -> Result<Playbook> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => paths::default_playbook()?,
    };
    log::debug!("Loading playbook {}", path.display());
    Playbook::load(&path)
}

/// The given inventory, the default one, or the local machine
pub fn load_inventory(path: Option<&Path>) -> Result<Inventory> {
    match path.map(Path::to_path_buf).or_else(paths::default_inventory) {
        Some(path) => {
            log::debug!("Loading inventory {}", path.display());
            Inventory::load(&path)
        }
        None => {
            log::debug!("No inventory, targeting the local machine");
            Ok(Inventory::localhost())
        }
    }
}

/// Register every template of the playbook's templates directory
pub fn load_templates(playbook: &Playbook) -> Result<Renderer> {
    let mut renderer = Renderer::new();
    let dir = playbook.templates_dir();
    if dir.is_dir() {
        renderer
            .load_dir(&dir)
            .with_context(|| format!("Could not load templates from {}", dir.display()))?;
    }
    Ok(renderer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_workspace() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("templates")).unwrap();
        std::fs::write(dir.path().join("templates/motd.j2"), "Welcome to {{ host.name }}\n")
            .unwrap();
        std::fs::write(
            dir.path().join("deckhand.toml"),
            "name = \"web\"\n\n[vars]\napp_name = \"shop\"\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("hosts.toml"), "[hosts.web1]\naddress = \"10.0.0.5\"\n")
            .unwrap();

        let args = SourceArgs {
            playbook: Some(dir.path().join("deckhand.toml")),
            inventory: Some(dir.path().join("hosts.toml")),
            extra_vars: vec!["app_name=blog".to_string()],
            vars_file: Vec::new(),
        };
        let workspace = Workspace::load(&args).unwrap();

        assert!(workspace.renderer.contains("motd.j2"));
        assert!(workspace.inventory.hosts.contains_key("web1"));
        assert_eq!(
            workspace.sources.overrides.get("app_name"),
            Some(&stencil::Value::from("blog"))
        );
    }

    #[test]
    fn test_missing_playbook_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = load_playbook(Some(&dir.path().join("missing.toml"))).unwrap_err();
        assert!(err.to_string().contains("Could not read playbook"));
    }
}
