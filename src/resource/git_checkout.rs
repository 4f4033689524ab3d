//! Git checkout resource - a working tree pinned to a branch, tag or commit

use super::validate;
use declarative::{ApplyContext, ApplyResult, Error, Resource, ResourceState, Result};
use hostkit::CommandSpec;
use serde::Deserialize;

fn default_version() -> String {
    "HEAD".to_string()
}

/// A clone of `repo` at `dest`, checked out at `version`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GitCheckout {
    pub repo: String,
    pub dest: String,
    /// Branch, tag, full commit id, or `HEAD` for the remote default branch
    #[serde(default = "default_version")]
    pub version: String,
    /// Also check out submodules, recursively
    #[serde(default)]
    pub recursive: bool,
}

/// git with credential prompts disabled
fn git(ctx: &ApplyContext) -> CommandSpec {
    ctx.command("git").env("GIT_TERMINAL_PROMPT", "0")
}

fn is_commit_id(version: &str) -> bool {
    version.len() == 40 && version.chars().all(|c| c.is_ascii_hexdigit())
}

/// Pick the commit `version` names from `git ls-remote` output.
///
/// Branches win over tags; an annotated tag resolves to the commit it
/// points at (the peeled `^{}` entry).
pub fn resolve_ref(listing: &str, version: &str) -> Option<String> {
    let refs: Vec<(&str, &str)> = listing
        .lines()
        .filter_map(|line| line.split_once('\t'))
        .map(|(sha, name)| (sha.trim(), name.trim()))
        .collect();
    let lookup = |name: &str| {
        refs.iter()
            .find(|(_, r)| *r == name)
            .map(|(sha, _)| (*sha).to_string())
    };

    if version == "HEAD" {
        return lookup("HEAD");
    }
    lookup(&format!("refs/heads/{version}"))
        .or_else(|| lookup(&format!("refs/tags/{version}^{{}}")))
        .or_else(|| lookup(&format!("refs/tags/{version}")))
        .or_else(|| lookup(version))
}

impl GitCheckout {
    pub fn new(repo: impl Into<String>, dest: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            dest: dest.into(),
            version: default_version(),
            recursive: false,
        }
    }

    fn in_tree(&self, ctx: &ApplyContext) -> CommandSpec {
        git(ctx).args(["-C", self.dest.as_str()])
    }

    /// Commit checked out at `dest`, if it holds a repository
    fn local_revision(&self, ctx: &ApplyContext) -> Result<Option<String>> {
        if ctx.stat(&format!("{}/.git", self.dest))?.is_none() {
            return Ok(None);
        }
        let output = ctx.exec(&self.in_tree(ctx).args(["rev-parse", "HEAD"]))?;
        Ok(output
            .success()
            .then(|| output.stdout_str().trim().to_string())
            .filter(|sha| !sha.is_empty()))
    }

    /// Whether every submodule is initialised and at its recorded commit.
    ///
    /// `git submodule status` marks uninitialised entries with `-`, entries
    /// at another commit with `+` and conflicted ones with `U`.
    fn submodules_in_sync(&self, ctx: &ApplyContext) -> Result<bool> {
        if !self.recursive {
            return Ok(true);
        }
        let status = ctx.run(&self.in_tree(ctx).args(["submodule", "status", "--recursive"]))?;
        Ok(status
            .stdout_str()
            .lines()
            .all(|line| !line.starts_with(['-', '+', 'U'])))
    }

    fn update_submodules(&self, ctx: &ApplyContext) -> Result<()> {
        ctx.run(&self.in_tree(ctx).args(["submodule", "update", "--init", "--recursive"]))?;
        if !self.submodules_in_sync(ctx)? {
            return Err(Error::apply(format!(
                "submodules in {} are not in sync after update",
                self.dest
            )));
        }
        Ok(())
    }

    /// Commit `version` currently points at on the remote
    fn remote_revision(&self, ctx: &ApplyContext) -> Result<String> {
        if is_commit_id(&self.version) {
            return Ok(self.version.to_lowercase());
        }
        let listing = ctx.run(&git(ctx).args(["ls-remote", self.repo.as_str()]))?;
        resolve_ref(&listing.stdout_str(), &self.version).ok_or_else(|| {
            Error::apply(format!("'{}' not found in {}", self.version, self.repo))
        })
    }
}

impl Resource for GitCheckout {
    fn id(&self) -> String {
        self.dest.clone()
    }

    fn description(&self) -> String {
        format!("Checkout {}@{} to {}", self.repo, self.version, self.dest)
    }

    fn resource_type(&self) -> &'static str {
        "git_checkout"
    }

    fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        validate::token(&mut problems, "repo", &self.repo);
        validate::absolute_path(&mut problems, "dest", &self.dest);
        validate::token(&mut problems, "version", &self.version);
        problems
    }

    fn current_state(&self, ctx: &ApplyContext) -> Result<ResourceState> {
        Ok(match self.local_revision(ctx)? {
            Some(sha) if !self.submodules_in_sync(ctx)? => {
                ResourceState::present(format!("{sha} (submodules out of sync)"))
            }
            Some(sha) => ResourceState::present(sha),
            None => ResourceState::Absent,
        })
    }

    fn desired_state(&self, ctx: &ApplyContext) -> Result<ResourceState> {
        Ok(ResourceState::present(self.remote_revision(ctx)?))
    }

    fn apply(&self, ctx: &ApplyContext) -> Result<ApplyResult> {
        let target = self.remote_revision(ctx)?;
        let local = self.local_revision(ctx)?;
        let host = ctx.host.host();
        if local.as_deref() == Some(target.as_str()) {
            if self.submodules_in_sync(ctx)? {
                return Ok(ApplyResult::NoChange);
            }
            log::info!("[{host}] updating submodules in {}", self.dest);
            self.update_submodules(ctx)?;
            return Ok(ApplyResult::Modified);
        }

        if local.is_none() {
            log::info!("[{host}] cloning {} into {}", self.repo, self.dest);
            ctx.run(&git(ctx).args([
                "clone",
                "--no-checkout",
                "--",
                self.repo.as_str(),
                self.dest.as_str(),
            ]))?;
        } else {
            log::info!("[{host}] fetching {} in {}", self.repo, self.dest);
            ctx.run(&self.in_tree(ctx).args(["fetch", "--tags", "origin"]))?;
        }

        ctx.run(&self.in_tree(ctx).args(["checkout", "--force", target.as_str()]))?;
        if self.recursive {
            self.update_submodules(ctx)?;
        }

        let checked_out = self.local_revision(ctx)?;
        if checked_out.as_deref() != Some(target.as_str()) {
            return Err(Error::apply(format!(
                "{} is at {} after checkout, expected {target}",
                self.dest,
                checked_out.as_deref().unwrap_or("nothing")
            )));
        }
        Ok(ApplyResult::changed(local.is_some()))
    }
}
