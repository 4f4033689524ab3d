//! Directory resource - a directory with managed ownership and mode

use super::attrs::FileAttrs;
use super::validate;
use declarative::{ApplyContext, ApplyResult, Error, Resource, ResourceState, Result};
use hostkit::FileKind;
use serde::Deserialize;

/// A directory on the host, created with parents when missing
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Directory {
    pub path: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
}

impl Directory {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            owner: None,
            group: None,
            mode: None,
        }
    }

    fn attrs(&self) -> FileAttrs {
        FileAttrs::new(&self.owner, &self.group, &self.mode)
    }
}

impl Resource for Directory {
    fn id(&self) -> String {
        self.path.clone()
    }

    fn description(&self) -> String {
        format!("Directory {}", self.path)
    }

    fn resource_type(&self) -> &'static str {
        "directory"
    }

    fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        validate::absolute_path(&mut problems, "path", &self.path);
        FileAttrs::validate(&mut problems, &self.owner, &self.group, &self.mode);
        problems
    }

    fn current_state(&self, ctx: &ApplyContext) -> Result<ResourceState> {
        Ok(match ctx.stat(&self.path)? {
            None => ResourceState::Absent,
            Some(stat) if stat.kind != FileKind::Directory => {
                ResourceState::present(format!("not a directory ({:?})", stat.kind))
            }
            Some(stat) => ResourceState::present(format!("dir {}", self.attrs().observed(&stat))),
        })
    }

    fn desired_state(&self, _ctx: &ApplyContext) -> Result<ResourceState> {
        Ok(ResourceState::present(format!("dir {}", self.attrs().desired())))
    }

    fn apply(&self, ctx: &ApplyContext) -> Result<ApplyResult> {
        let attrs = self.attrs();
        if let Some(stat) = ctx.stat(&self.path)? {
            if stat.kind != FileKind::Directory {
                return Err(Error::apply(format!(
                    "{} exists and is not a directory",
                    self.path
                )));
            }
            return Ok(if attrs.apply(ctx, &self.path, &stat)? {
                ApplyResult::Modified
            } else {
                ApplyResult::NoChange
            });
        }

        ctx.run(&ctx.command("mkdir").args(["-p", "--", self.path.as_str()]))?;
        let stat = ctx
            .stat(&self.path)?
            .ok_or_else(|| Error::apply(format!("mkdir did not create {}", self.path)))?;
        attrs.apply(ctx, &self.path, &stat)?;
        Ok(ApplyResult::Created)
    }
}
