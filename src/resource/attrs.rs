//! Owner, group and mode of a managed path

use super::validate;
use declarative::{ApplyContext, Result};
use hostkit::FileStat;

/// Desired metadata; `None` fields are left as they are on the host
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileAttrs {
    pub owner: Option<String>,
    pub group: Option<String>,
    pub mode: Option<u32>,
}

impl FileAttrs {
    pub fn new(owner: &Option<String>, group: &Option<String>, mode: &Option<String>) -> Self {
        Self {
            owner: owner.clone(),
            group: group.clone(),
            mode: mode.as_deref().and_then(validate::parse_mode),
        }
    }

    /// Add problems for the `owner`, `group` and `mode` fields
    pub fn validate(
        problems: &mut Vec<String>,
        owner: &Option<String>,
        group: &Option<String>,
        mode: &Option<String>,
    ) {
        validate::account(problems, "owner", owner.as_deref());
        validate::account(problems, "group", group.as_deref());
        validate::mode(problems, "mode", mode.as_deref());
    }

    /// The managed attributes as they are on the host
    pub fn observed(&self, stat: &FileStat) -> String {
        self.describe(
            Some(stat.owner.as_str()),
            Some(stat.group.as_str()),
            Some(stat.mode),
        )
    }

    /// The managed attributes as they should be
    pub fn desired(&self) -> String {
        self.describe(self.owner.as_deref(), self.group.as_deref(), self.mode)
    }

    fn describe(&self, owner: Option<&str>, group: Option<&str>, mode: Option<u32>) -> String {
        let mut parts = Vec::new();
        if self.owner.is_some() {
            parts.push(format!("owner={}", owner.unwrap_or("-")));
        }
        if self.group.is_some() {
            parts.push(format!("group={}", group.unwrap_or("-")));
        }
        if self.mode.is_some() {
            parts.push(format!("mode={}", mode.map_or_else(|| "-".to_string(), |m| format!("{m:04o}"))));
        }
        parts.join(" ")
    }

    /// Whether `stat` differs from the managed attributes
    pub fn differs(&self, stat: &FileStat) -> bool {
        self.observed(stat) != self.desired()
    }

    /// chown/chmod only the attributes that differ; returns whether anything changed
    pub fn apply(&self, ctx: &ApplyContext, path: &str, stat: &FileStat) -> Result<bool> {
        let owner = self.owner.as_deref().filter(|o| *o != stat.owner);
        let group = self.group.as_deref().filter(|g| *g != stat.group);
        let mut changed = false;

        let ownership = match (owner, group) {
            (Some(o), Some(g)) => Some(format!("{o}:{g}")),
            (Some(o), None) => Some(o.to_string()),
            (None, Some(g)) => Some(format!(":{g}")),
            (None, None) => None,
        };
        if let Some(ownership) = ownership {
            ctx.run(&ctx.command("chown").args([ownership.as_str(), "--", path]))?;
            changed = true;
        }

        if let Some(mode) = self.mode.filter(|m| *m != stat.mode) {
            ctx.run(&ctx.command("chmod").args([format!("{mode:04o}").as_str(), "--", path]))?;
            changed = true;
        }

        Ok(changed)
    }
}
