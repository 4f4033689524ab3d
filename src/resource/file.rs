//! File resource - content plus ownership and mode
//!
//! Content is compared by BLAKE3 digest and only rewritten when it differs;
//! metadata is fixed attribute by attribute. The helpers at the bottom are
//! shared with every kind that ends in a file on the host.

use super::attrs::FileAttrs;
use super::validate;
use declarative::{
    ApplyContext, ApplyResult, Error, Resource, ResourceState, Result, unified_diff,
};
use hostkit::FileKind;
use serde::Deserialize;
use std::path::Path;

/// A file with inline `content` or content copied from a controller-side `source`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct File {
    pub path: String,
    #[serde(default)]
    pub content: Option<String>,
    /// Path on the controller, relative to the playbook
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
}

impl File {
    pub fn with_content(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: Some(content.into()),
            source: None,
            owner: None,
            group: None,
            mode: None,
        }
    }

    /// Resolve a relative `source` against `base`
    pub fn with_base_dir(mut self, base: &Path) -> Self {
        if let Some(source) = &self.source
            && Path::new(source).is_relative()
        {
            self.source = Some(base.join(source).to_string_lossy().into_owned());
        }
        self
    }

    fn attrs(&self) -> FileAttrs {
        FileAttrs::new(&self.owner, &self.group, &self.mode)
    }

    /// Desired content, read from the controller when given as `source`
    fn desired_content(&self) -> Result<Vec<u8>> {
        match (&self.content, &self.source) {
            (Some(content), _) => Ok(content.as_bytes().to_vec()),
            (None, Some(source)) => std::fs::read(source)
                .map_err(|e| Error::apply(format!("cannot read source {source}: {e}"))),
            (None, None) => Err(Error::apply("file has neither content nor source")),
        }
    }
}

impl Resource for File {
    fn id(&self) -> String {
        self.path.clone()
    }

    fn description(&self) -> String {
        match &self.source {
            Some(source) => format!("File {} from {source}", self.path),
            None => format!("File {}", self.path),
        }
    }

    fn resource_type(&self) -> &'static str {
        "file"
    }

    fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        validate::absolute_path(&mut problems, "path", &self.path);
        match (&self.content, &self.source) {
            (Some(_), Some(_)) => problems.push("content: conflicts with source".to_string()),
            (None, None) => problems.push("content: one of content or source is required".to_string()),
            (None, Some(source)) => {
                validate::required(&mut problems, "source", source);
            }
            (Some(_), None) => {}
        }
        FileAttrs::validate(&mut problems, &self.owner, &self.group, &self.mode);
        problems
    }

    fn current_state(&self, ctx: &ApplyContext) -> Result<ResourceState> {
        observe_file(ctx, &self.path, &self.attrs())
    }

    fn desired_state(&self, _ctx: &ApplyContext) -> Result<ResourceState> {
        Ok(desired_file(&self.desired_content()?, &self.attrs()))
    }

    fn apply(&self, ctx: &ApplyContext) -> Result<ApplyResult> {
        converge_file(ctx, &self.path, &self.desired_content()?, &self.attrs())
    }

    fn content_diff(&self, ctx: &ApplyContext) -> Result<Option<String>> {
        file_diff(ctx, &self.path, &self.desired_content()?)
    }
}

pub fn digest(content: &[u8]) -> String {
    blake3::hash(content).to_hex().to_string()
}

/// Content digest and managed metadata of the file at `path`
pub fn observe_file(ctx: &ApplyContext, path: &str, attrs: &FileAttrs) -> Result<ResourceState> {
    let Some(stat) = ctx.stat(path)? else {
        return Ok(ResourceState::Absent);
    };
    if stat.kind != FileKind::File {
        return Ok(ResourceState::present(format!("{:?}", stat.kind)));
    }
    let content = ctx.read_file(path)?.unwrap_or_default();
    Ok(ResourceState::present(format!(
        "blake3:{} {}",
        digest(&content),
        attrs.observed(&stat)
    )))
}

/// State [`observe_file`] reports once `content` and `attrs` are in place
pub fn desired_file(content: &[u8], attrs: &FileAttrs) -> ResourceState {
    ResourceState::present(format!("blake3:{} {}", digest(content), attrs.desired()))
}

/// Write `content` only when it differs, then fix metadata
pub fn converge_file(
    ctx: &ApplyContext,
    path: &str,
    content: &[u8],
    attrs: &FileAttrs,
) -> Result<ApplyResult> {
    let before = ctx.stat(path)?;
    if let Some(stat) = &before
        && stat.kind != FileKind::File
    {
        return Err(Error::apply(format!(
            "{path} exists and is not a regular file"
        )));
    }

    let current = match before {
        Some(_) => ctx.read_file(path)?,
        None => None,
    };
    let mut changed = false;
    if current.as_deref().map(digest) != Some(digest(content)) {
        log::debug!("[{}] writing {path} ({} bytes)", ctx.host.host(), content.len());
        ctx.write_file(path, content)?;
        changed = true;
    }

    let stat = ctx
        .stat(path)?
        .ok_or_else(|| Error::apply(format!("{path} is missing after write")))?;
    changed |= attrs.apply(ctx, path, &stat)?;

    Ok(match (changed, before.is_some()) {
        (false, _) => ApplyResult::NoChange,
        (true, existed) => ApplyResult::changed(existed),
    })
}

/// Unified diff between the file at `path` and `content`
pub fn file_diff(ctx: &ApplyContext, path: &str, content: &[u8]) -> Result<Option<String>> {
    let current = match ctx.stat(path)? {
        Some(stat) if stat.kind == FileKind::File => ctx.read_file(path)?,
        _ => None,
    };
    Ok(unified_diff(path, current.as_deref(), content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::tests::Harness;
    use tempfile::TempDir;

    #[test]
    fn test_create_then_unchanged() {
        let harness = Harness::new();
        harness.host.add_dir("/etc");
        let file = File {
            mode: Some("0600".into()),
            ..File::with_content("/etc/motd", "welcome\n")
        };

        assert_eq!(harness.apply_twice(&file, true), ApplyResult::Created);
        assert_eq!(harness.host.content("/etc/motd").unwrap(), b"welcome\n");
        assert_eq!(harness.host.entry("/etc/motd").unwrap().mode, 0o600);
    }

    #[test]
    fn test_changed_content_is_rewritten() {
        let harness = Harness::new();
        harness.host.add_file("/etc/motd", "old\n");
        let file = File::with_content("/etc/motd", "new\n");

        let ctx = harness.ctx(false);
        assert!(file.needs_apply(&ctx).unwrap());
        let diff = file.content_diff(&ctx).unwrap().unwrap();
        assert!(diff.contains("-old"));
        assert!(diff.contains("+new"));

        assert_eq!(harness.apply_twice(&file, false), ApplyResult::Modified);
    }

    #[test]
    fn test_same_content_only_fixes_owner() {
        let harness = Harness::new();
        harness.host.add_file("/etc/motd", "same\n");
        let file = File {
            owner: Some("deploy".into()),
            ..File::with_content("/etc/motd", "same\n")
        };

        assert_eq!(harness.apply_twice(&file, true), ApplyResult::Modified);
        assert_eq!(harness.host.entry("/etc/motd").unwrap().owner, "deploy");
    }

    #[test]
    fn test_source_resolved_against_base_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("files")).unwrap();
        std::fs::write(dir.path().join("files/robots.txt"), "User-agent: *\n").unwrap();

        let file = File {
            content: None,
            source: Some("files/robots.txt".into()),
            ..File::with_content("/srv/www/robots.txt", "")
        }
        .with_base_dir(dir.path());

        let harness = Harness::new();
        harness.host.add_dir("/srv/www");
        assert_eq!(harness.apply_twice(&file, false), ApplyResult::Created);
        assert_eq!(
            harness.host.content("/srv/www/robots.txt").unwrap(),
            b"User-agent: *\n"
        );
    }

    #[test]
    fn test_missing_parent_is_apply_error() {
        let harness = Harness::new();
        let file = File::with_content("/opt/app/config", "x");
        let err = file.apply(&harness.ctx(false)).unwrap_err();
        assert_eq!(err.category(), declarative::ErrorCategory::Apply);
    }

    #[test]
    fn test_validate_content_xor_source() {
        let both = File {
            source: Some("motd".into()),
            ..File::with_content("/etc/motd", "x")
        };
        assert_eq!(both.validate(), ["content: conflicts with source"]);

        let neither = File {
            content: None,
            ..File::with_content("/etc/motd", "")
        };
        assert_eq!(neither.validate().len(), 1);
    }
}
