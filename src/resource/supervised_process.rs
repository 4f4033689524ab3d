//! Supervised process resource - a program run by supervisord
//!
//! The program stanza is written to `/etc/supervisor/conf.d/<name>.conf`.
//! supervisord only picks up a changed stanza after `reread` and `update`,
//! and `update` also (re)starts the program when `autostart` is set, so the
//! run state is checked only after the configuration is in place.
//!
//! The digest of the stanza supervisord last loaded is stamped next to it
//! (`.<name>.loaded`, outside the `*.conf` include pattern) once `update`
//! succeeds. A stanza written by a run whose `update` failed is therefore
//! loaded again on the next run.

use super::attrs::FileAttrs;
use super::file::{converge_file, digest};
use super::service::ServiceState;
use super::validate;
use declarative::{
    ApplyContext, ApplyResult, Error, Resource, ResourceState, Result, SudoRequirement,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;

pub const CONF_DIR: &str = "/etc/supervisor/conf.d";

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SupervisedProcess {
    /// supervisor program name
    pub name: String,
    pub command: String,
    /// Working directory
    #[serde(default)]
    pub directory: Option<String>,
    /// Account the program runs as
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default = "yes")]
    pub autostart: bool,
    #[serde(default = "yes")]
    pub autorestart: bool,
    #[serde(default)]
    pub state: ServiceState,
}

/// Escape `%`, which supervisor treats as string expansion
fn escape(value: &str) -> String {
    value.replace('%', "%%")
}

impl SupervisedProcess {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            directory: None,
            user: None,
            environment: BTreeMap::new(),
            autostart: true,
            autorestart: true,
            state: ServiceState::Started,
        }
    }

    pub fn conf_path(&self) -> String {
        format!("{CONF_DIR}/{}.conf", self.name)
    }

    fn stamp_path(&self) -> String {
        format!("{CONF_DIR}/.{}.loaded", self.name)
    }

    /// The `[program:<name>]` stanza; keys are emitted in a fixed order
    pub fn stanza(&self) -> String {
        let mut out = format!("[program:{}]\n", self.name);
        let _ = writeln!(out, "command={}", escape(&self.command));
        if let Some(directory) = &self.directory {
            let _ = writeln!(out, "directory={}", escape(directory));
        }
        if let Some(user) = &self.user {
            let _ = writeln!(out, "user={user}");
        }
        if !self.environment.is_empty() {
            let pairs: Vec<String> = self
                .environment
                .iter()
                .map(|(k, v)| format!("{k}=\"{}\"", escape(v).replace('"', "\\\"")))
                .collect();
            let _ = writeln!(out, "environment={}", pairs.join(","));
        }
        let _ = writeln!(out, "autostart={}", self.autostart);
        let _ = writeln!(out, "autorestart={}", self.autorestart);
        out
    }

    /// Run state reported by `supervisorctl status`; `None` if supervisord
    /// does not know the program
    fn status(&self, ctx: &ApplyContext) -> Result<Option<ServiceState>> {
        let output = ctx.exec(&ctx.command("supervisorctl").args(["status", self.name.as_str()]))?;
        Ok(parse_status(&output.stdout_str()))
    }

    fn conf_digest(&self, ctx: &ApplyContext) -> Result<Option<String>> {
        Ok(ctx.read_file(&self.conf_path())?.map(|c| digest(&c)))
    }

    /// Digest of the stanza supervisord last loaded
    fn loaded_digest(&self, ctx: &ApplyContext) -> Result<Option<String>> {
        Ok(ctx
            .read_file(&self.stamp_path())?
            .map(|content| String::from_utf8_lossy(&content).trim().to_string()))
    }

    fn supervisorctl(&self, ctx: &ApplyContext, verb: &str) -> Result<()> {
        ctx.run(&ctx.command("supervisorctl").args([verb, self.name.as_str()]))?;
        Ok(())
    }
}

/// Map a `supervisorctl status` line to a run state.
///
/// STARTING and BACKOFF count as started: supervisord is already bringing
/// the program up and rejects `start` for them.
fn parse_status(stdout: &str) -> Option<ServiceState> {
    match stdout.split_whitespace().nth(1).unwrap_or_default() {
        "" | "ERROR" => None,
        "RUNNING" | "STARTING" | "BACKOFF" => Some(ServiceState::Started),
        _ => Some(ServiceState::Stopped),
    }
}

impl Resource for SupervisedProcess {
    fn id(&self) -> String {
        self.name.clone()
    }

    fn description(&self) -> String {
        format!("Supervise {} ({})", self.name, self.state)
    }

    fn resource_type(&self) -> &'static str {
        "supervised_process"
    }

    fn sudo_requirement(&self) -> SudoRequirement {
        SudoRequirement::Required {
            reason: format!("writes {CONF_DIR} and drives supervisorctl"),
        }
    }

    fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        validate::program_name(&mut problems, "name", &self.name);
        validate::required(&mut problems, "command", &self.command);
        if self.command.contains('\n') {
            problems.push("command: must be a single line".to_string());
        }
        if let Some(directory) = &self.directory {
            validate::absolute_path(&mut problems, "directory", directory);
        }
        validate::account(&mut problems, "user", self.user.as_deref());
        for key in self.environment.keys() {
            validate::env_name(&mut problems, "environment", key);
        }
        problems
    }

    fn current_state(&self, ctx: &ApplyContext) -> Result<ResourceState> {
        let Some(conf) = self.conf_digest(ctx)? else {
            return Ok(ResourceState::Absent);
        };
        if self.loaded_digest(ctx)?.as_deref() != Some(conf.as_str()) {
            return Ok(ResourceState::present(format!("conf blake3:{conf} not loaded")));
        }
        let state = self
            .status(ctx)?
            .map_or_else(|| "unknown to supervisord".to_string(), |s| s.to_string());
        Ok(ResourceState::present(format!("conf blake3:{conf} {state}")))
    }

    fn desired_state(&self, _ctx: &ApplyContext) -> Result<ResourceState> {
        Ok(ResourceState::present(format!(
            "conf blake3:{} {}",
            digest(self.stanza().as_bytes()),
            self.state
        )))
    }

    fn apply(&self, ctx: &ApplyContext) -> Result<ApplyResult> {
        let stanza = self.stanza();
        let wanted = digest(stanza.as_bytes());
        let conf = self.conf_digest(ctx)?;
        let existed = conf.is_some();
        let mut changed = false;

        if conf.as_deref() != Some(wanted.as_str()) {
            ctx.require_privilege("writing supervisor configuration")?;
            converge_file(ctx, &self.conf_path(), stanza.as_bytes(), &FileAttrs::default())?;
            changed = true;
        }
        if self.loaded_digest(ctx)?.as_deref() != Some(wanted.as_str()) {
            ctx.require_privilege("loading supervisor configuration")?;
            log::info!("[{}] loading {} into supervisord", ctx.host.host(), self.conf_path());
            ctx.run(&ctx.command("supervisorctl").arg("reread"))?;
            self.supervisorctl(ctx, "update")?;
            ctx.write_file(&self.stamp_path(), format!("{wanted}\n").as_bytes())?;
            changed = true;
        }

        let current = self.status(ctx)?;
        if current.is_none() {
            return Err(Error::apply(format!(
                "supervisord does not know program '{}'",
                self.name
            )));
        }
        if current != Some(self.state) {
            ctx.require_privilege("supervisorctl")?;
            let verb = if self.state.is_running() { "start" } else { "stop" };
            log::info!("[{}] supervisorctl {verb} {}", ctx.host.host(), self.name);
            self.supervisorctl(ctx, verb)?;
            changed = true;

            let after = self.status(ctx)?;
            if after != Some(self.state) {
                return Err(Error::apply(format!(
                    "{} is {} after {verb}, expected {}",
                    self.name,
                    after.map_or_else(|| "unknown".to_string(), |s| s.to_string()),
                    self.state
                )));
            }
        }

        Ok(if changed {
            ApplyResult::changed(existed)
        } else {
            ApplyResult::NoChange
        })
    }
}
