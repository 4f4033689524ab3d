//! Pip requirements resource - a virtualenv with a requirements file installed
//!
//! pip has no cheap "is this satisfied" query, so the digest of the
//! requirements file is stamped inside the virtualenv after a successful
//! install. An unchanged requirements file is then `unchanged`.

use super::file::digest;
use super::validate;
use declarative::{ApplyContext, ApplyResult, Error, Resource, ResourceState, Result};
use serde::Deserialize;

const STAMP: &str = ".deckhand-requirements";

fn default_python() -> String {
    "python3".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipRequirements {
    /// Requirements file on the host
    pub requirements: String,
    /// Virtualenv directory, created if missing
    pub virtualenv: String,
    /// Interpreter used to create the virtualenv
    #[serde(default = "default_python")]
    pub python: String,
}

impl PipRequirements {
    pub fn new(requirements: impl Into<String>, virtualenv: impl Into<String>) -> Self {
        Self {
            requirements: requirements.into(),
            virtualenv: virtualenv.into(),
            python: default_python(),
        }
    }

    fn venv_path(&self, rel: &str) -> String {
        format!("{}/{rel}", self.virtualenv.trim_end_matches('/'))
    }

    fn venv_exists(&self, ctx: &ApplyContext) -> Result<bool> {
        Ok(ctx.stat(&self.venv_path("bin/python"))?.is_some())
    }

    /// Digest of the requirements file, `None` if it does not exist yet
    fn requirements_digest(&self, ctx: &ApplyContext) -> Result<Option<String>> {
        Ok(ctx.read_file(&self.requirements)?.map(|content| digest(&content)))
    }

    fn stamp(&self, ctx: &ApplyContext) -> Result<Option<String>> {
        Ok(ctx
            .read_file(&self.venv_path(STAMP))?
            .map(|content| String::from_utf8_lossy(&content).trim().to_string()))
    }
}

impl Resource for PipRequirements {
    fn id(&self) -> String {
        self.virtualenv.clone()
    }

    fn description(&self) -> String {
        format!("Install {} into {}", self.requirements, self.virtualenv)
    }

    fn resource_type(&self) -> &'static str {
        "pip_requirements"
    }

    fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        validate::absolute_path(&mut problems, "requirements", &self.requirements);
        validate::absolute_path(&mut problems, "virtualenv", &self.virtualenv);
        validate::token(&mut problems, "python", &self.python);
        problems
    }

    fn current_state(&self, ctx: &ApplyContext) -> Result<ResourceState> {
        if !self.venv_exists(ctx)? {
            return Ok(ResourceState::Absent);
        }
        Ok(match self.stamp(ctx)? {
            Some(stamp) => ResourceState::present(format!("requirements blake3:{stamp}")),
            None => ResourceState::present("requirements not installed"),
        })
    }

    fn desired_state(&self, ctx: &ApplyContext) -> Result<ResourceState> {
        Ok(match self.requirements_digest(ctx)? {
            Some(digest) => ResourceState::present(format!("requirements blake3:{digest}")),
            // Created by an earlier task that has not run yet
            None => ResourceState::present(format!("{} (not yet present)", self.requirements)),
        })
    }

    fn apply(&self, ctx: &ApplyContext) -> Result<ApplyResult> {
        let digest = self.requirements_digest(ctx)?.ok_or_else(|| {
            Error::apply(format!("requirements file {} does not exist", self.requirements))
        })?;

        let existed = self.venv_exists(ctx)?;
        if existed && self.stamp(ctx)?.as_deref() == Some(digest.as_str()) {
            return Ok(ApplyResult::NoChange);
        }

        let host = ctx.host.host();
        if !existed {
            log::info!("[{host}] creating virtualenv {}", self.virtualenv);
            ctx.run(&ctx.command(&self.python).args(["-m", "venv", self.virtualenv.as_str()]))?;
        }

        log::info!("[{host}] installing {} into {}", self.requirements, self.virtualenv);
        ctx.run(
            &ctx.command(&self.venv_path("bin/pip"))
                .env("PIP_DISABLE_PIP_VERSION_CHECK", "1")
                .args(["install", "-q", "-r", self.requirements.as_str()]),
        )?;
        ctx.write_file(&self.venv_path(STAMP), format!("{digest}\n").as_bytes())?;

        Ok(ApplyResult::changed(existed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::tests::Harness;
    use hostkit::{CommandOutput, CommandSpec, MockFile, MockFs};

    fn harness() -> Harness {
        let harness = Harness::new();
        harness.host.add_file("/srv/shop/requirements.txt", "flask==3.0\ngunicorn==22.0\n");
        harness.host.on("python3 -m venv", |spec: &CommandSpec, fs: &mut MockFs| {
            let venv = &spec.args[2];
            fs.mkdir_p(&format!("{venv}/bin"));
            fs.insert(format!("{venv}/bin/python"), MockFile::file(""));
            CommandOutput::ok("")
        });
        harness.host.respond("/srv/venv/bin/pip install", CommandOutput::ok(""));
        harness
    }

    fn requirements() -> PipRequirements {
        PipRequirements::new("/srv/shop/requirements.txt", "/srv/venv")
    }

    fn pip_runs(harness: &Harness) -> usize {
        harness
            .host
            .log()
            .iter()
            .filter(|l| l.starts_with("/srv/venv/bin/pip"))
            .count()
    }

    #[test]
    fn test_create_venv_and_install_then_unchanged() {
        let harness = harness();
        assert_eq!(harness.apply_twice(&requirements(), false), ApplyResult::Created);
        assert_eq!(pip_runs(&harness), 0);
        assert!(harness.host.content("/srv/venv/.deckhand-requirements").is_some());
    }

    #[test]
    fn test_changed_requirements_reinstall() {
        let harness = harness();
        let ctx = harness.ctx(false);
        requirements().apply(&ctx).unwrap();
        harness.host.take_log();

        harness.host.add_file("/srv/shop/requirements.txt", "flask==3.1\ngunicorn==22.0\n");
        assert!(requirements().needs_apply(&ctx).unwrap());
        assert_eq!(requirements().apply(&ctx).unwrap(), ApplyResult::Modified);
        assert_eq!(pip_runs(&harness), 1);
        assert!(!harness.host.log().iter().any(|l| l.starts_with("python3")));
    }

    #[test]
    fn test_missing_requirements_file() {
        let harness = Harness::new();
        let ctx = harness.ctx(false);
        assert!(requirements().needs_apply(&ctx).unwrap());
        let err = requirements().apply(&ctx).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
