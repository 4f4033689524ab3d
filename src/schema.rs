//! Playbook and inventory file formats

use crate::resource::KINDS;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// ============================================================================
// Playbook
// ============================================================================

/// A deployment playbook: default variables and the tasks to converge
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Playbook {
    pub name: String,

    /// Templates directory, relative to the playbook file
    #[serde(default)]
    pub templates: Option<String>,

    /// Lowest-precedence variables
    #[serde(default)]
    pub vars: toml::Table,

    #[serde(default)]
    pub tasks: Vec<TaskSpec>,

    /// File the playbook was loaded from
    #[serde(skip)]
    pub path: PathBuf,
}

/// A `[[tasks]]` entry.
///
/// Everything except the task metadata stays in `fields`: the `kind` tag
/// and the kind-specific descriptor fields, which are rendered per host
/// before they are parsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: String,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Grant privilege (sudo) to the task
    #[serde(default, rename = "become")]
    pub privileged: bool,

    /// Guard expression; the task is skipped when it is false
    #[serde(default)]
    pub when: Option<String>,

    #[serde(flatten)]
    pub fields: toml::Table,
}

impl TaskSpec {
    /// Descriptor kind, if declared
    pub fn kind(&self) -> Option<&str> {
        self.fields.get("kind").and_then(toml::Value::as_str)
    }
}

impl Playbook {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read playbook: {}", path.display()))?;
        let mut playbook: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid playbook: {}", path.display()))?;
        playbook.path = path.to_path_buf();
        playbook.validate()?;
        Ok(playbook)
    }

    /// Check task metadata; descriptor fields are checked per host
    pub fn validate(&self) -> Result<()> {
        for task in &self.tasks {
            if task.id.trim().is_empty() {
                bail!("Task with an empty id in playbook '{}'", self.name);
            }
            match task.kind() {
                None => bail!("Task '{}' has no `kind`", task.id),
                Some(kind) if !KINDS.contains(&kind) => bail!(
                    "Task '{}' has unknown kind '{kind}' (expected one of: {})",
                    task.id,
                    KINDS.join(", ")
                ),
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Templates directory, resolved against the playbook location
    pub fn templates_dir(&self) -> PathBuf {
        crate::paths::relative_to(&self.path, self.templates.as_deref().unwrap_or("templates"))
    }

}

// ============================================================================
// Inventory
// ============================================================================

/// Target hosts and the groups they belong to
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Inventory {
    #[serde(default)]
    pub hosts: BTreeMap<String, HostSpec>,

    #[serde(default)]
    pub groups: BTreeMap<String, GroupSpec>,
}

/// How to reach a host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    #[default]
    Ssh,
    Local,
}

/// Connection parameters and variables of one host
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostSpec {
    /// Address to connect to (defaults to the host name)
    #[serde(default)]
    pub address: Option<String>,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,

    /// SSH private key; `~` and `$VARS` are expanded
    #[serde(default)]
    pub identity_file: Option<String>,

    #[serde(default)]
    pub connection: ConnectionKind,

    /// Groups in increasing precedence order
    #[serde(default)]
    pub groups: Vec<String>,

    #[serde(default)]
    pub vars: toml::Table,
}

/// Variables shared by the hosts of a group
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupSpec {
    #[serde(default)]
    pub vars: toml::Table,
}

impl Inventory {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read inventory: {}", path.display()))?;
        let inventory: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid inventory: {}", path.display()))?;
        inventory.validate()?;
        Ok(inventory)
    }

    /// Inventory with only the local machine
    pub fn localhost() -> Self {
        let mut hosts = BTreeMap::new();
        hosts.insert(
            "localhost".to_string(),
            HostSpec {
                connection: ConnectionKind::Local,
                ..Default::default()
            },
        );
        Self {
            hosts,
            groups: BTreeMap::new(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, host) in &self.hosts {
            if let Some(group) = host.groups.iter().find(|g| !self.groups.contains_key(*g)) {
                bail!("Host '{name}' belongs to undefined group '{group}'");
            }
        }
        Ok(())
    }

    /// Hosts selected by `--limit` (host or group names); all when empty
    pub fn select(&self, limit: &[String]) -> Result<Vec<(&str, &HostSpec)>> {
        if limit.is_empty() {
            return Ok(self.hosts.iter().map(|(n, h)| (n.as_str(), h)).collect());
        }

        for name in limit {
            if !self.hosts.contains_key(name) && !self.groups.contains_key(name) {
                bail!("--limit '{name}' matches no host or group in the inventory");
            }
        }

        Ok(self
            .hosts
            .iter()
            .filter(|(name, host)| {
                limit.contains(*name) || host.groups.iter().any(|g| limit.contains(g))
            })
            .map(|(n, h)| (n.as_str(), h))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAYBOOK: &str = r#"
name = "web"

[vars]
app_name = "shop"

[[tasks]]
id = "packages"
kind = "package_set"
packages = ["nginx", "git"]
tags = ["serverpkgs"]
become = true

[[tasks]]
id = "app-dir"
kind = "directory"
path = "/srv/{{ app_name }}"
depends_on = ["packages"]
when = "app_name is defined"
"#;

    const INVENTORY: &str = r#"
[groups.web]
vars = { domain = "shop.example" }

[hosts.web1]
address = "10.0.0.5"
user = "deploy"
groups = ["web"]

[hosts.db1]
address = "10.0.0.6"

[hosts.control]
connection = "local"
"#;

    #[test]
    fn test_parse_playbook() {
        let playbook: Playbook = toml::from_str(PLAYBOOK).unwrap();
        playbook.validate().unwrap();
        assert_eq!(playbook.tasks.len(), 2);

        let packages = &playbook.tasks[0];
        assert!(packages.privileged);
        assert_eq!(packages.kind(), Some("package_set"));
        assert!(packages.fields.contains_key("packages"));
        assert!(!packages.fields.contains_key("tags"));

        let dir = &playbook.tasks[1];
        assert_eq!(dir.depends_on, ["packages"]);
        assert_eq!(dir.when.as_deref(), Some("app_name is defined"));
    }

    #[test]
    fn test_task_without_kind_rejected() {
        let playbook: Playbook = toml::from_str("name = \"x\"\n[[tasks]]\nid = \"a\"\n").unwrap();
        assert!(playbook.validate().is_err());
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let playbook: Playbook =
            toml::from_str("name = \"x\"\n[[tasks]]\nid = \"a\"\nkind = \"symlink\"\n").unwrap();
        let err = playbook.validate().unwrap_err();
        assert!(err.to_string().contains("unknown kind 'symlink'"));
    }

    #[test]
    fn test_templates_dir_defaults_next_to_playbook() {
        let mut playbook: Playbook = toml::from_str(PLAYBOOK).unwrap();
        playbook.path = PathBuf::from("/srv/deploy/site.toml");
        assert_eq!(playbook.templates_dir(), PathBuf::from("/srv/deploy/templates"));
    }

    #[test]
    fn test_parse_inventory() {
        let inventory: Inventory = toml::from_str(INVENTORY).unwrap();
        inventory.validate().unwrap();
        assert_eq!(inventory.hosts.len(), 3);
        assert_eq!(inventory.hosts["control"].connection, ConnectionKind::Local);
        assert_eq!(inventory.hosts["web1"].connection, ConnectionKind::Ssh);
        assert!(inventory.groups["web"].vars.contains_key("domain"));
    }

    #[test]
    fn test_undefined_group_rejected() {
        let inventory: Inventory =
            toml::from_str("[hosts.a]\ngroups = [\"missing\"]\n").unwrap();
        assert!(inventory.validate().is_err());
    }

    #[test]
    fn test_select_by_host_and_group() {
        let inventory: Inventory = toml::from_str(INVENTORY).unwrap();
        let names = |limit: &[&str]| -> Vec<String> {
            let limit: Vec<String> = limit.iter().map(ToString::to_string).collect();
            inventory
                .select(&limit)
                .unwrap()
                .into_iter()
                .map(|(n, _)| n.to_string())
                .collect()
        };

        assert_eq!(names(&[]), ["control", "db1", "web1"]);
        assert_eq!(names(&["web"]), ["web1"]);
        assert_eq!(names(&["db1", "web"]), ["db1", "web1"]);
        assert!(inventory.select(&["nope".to_string()]).is_err());
    }
}
