//! Service resource - a systemd unit in a running state
//!
//! A transition may take two steps (enable, then start). The unit is
//! queried again afterwards, and the task fails unless the unit ended in the
//! desired state.

use super::validate;
use declarative::{
    ApplyContext, ApplyResult, Error, Resource, ResourceState, Result, SudoRequirement,
};
use serde::Deserialize;
use std::fmt;

/// Desired run state of a service or supervised program
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    #[default]
    Started,
    Stopped,
}

impl ServiceState {
    pub fn is_running(self) -> bool {
        self == Self::Started
    }

    pub fn from_running(running: bool) -> Self {
        if running { Self::Started } else { Self::Stopped }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Started => "started",
            Self::Stopped => "stopped",
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Service {
    /// Unit name, e.g. `nginx` or `nginx.service`
    pub name: String,
    #[serde(default)]
    pub state: ServiceState,
    /// Start at boot; left alone when unset
    #[serde(default)]
    pub enabled: Option<bool>,
}

/// What systemd reports for a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct UnitStatus {
    state: ServiceState,
    enabled: bool,
}

impl Service {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: ServiceState::Started,
            enabled: None,
        }
    }

    fn systemctl(&self, ctx: &ApplyContext, verb: &str) -> Result<String> {
        let output = ctx.exec(&ctx.command("systemctl").args([verb, self.name.as_str()]))?;
        Ok(output.stdout_str().trim().to_string())
    }

    fn status(&self, ctx: &ApplyContext) -> Result<UnitStatus> {
        let active = self.systemctl(ctx, "is-active")?;
        let enabled = match self.enabled {
            Some(_) => self.systemctl(ctx, "is-enabled")?,
            None => String::new(),
        };
        Ok(UnitStatus {
            state: ServiceState::from_running(active == "active"),
            enabled: matches!(enabled.as_str(), "enabled" | "enabled-runtime" | "static"),
        })
    }

    fn describe(&self, status: UnitStatus) -> String {
        match self.enabled {
            Some(_) => format!("{} enabled={}", status.state, status.enabled),
            None => status.state.to_string(),
        }
    }

    fn desired(&self) -> UnitStatus {
        UnitStatus {
            state: self.state,
            enabled: self.enabled.unwrap_or(false),
        }
    }
}

impl Resource for Service {
    fn id(&self) -> String {
        self.name.clone()
    }

    fn description(&self) -> String {
        format!("Service {} {}", self.name, self.state)
    }

    fn resource_type(&self) -> &'static str {
        "service"
    }

    fn sudo_requirement(&self) -> SudoRequirement {
        SudoRequirement::Required {
            reason: format!("systemctl controls {}", self.name),
        }
    }

    fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        validate::unit_name(&mut problems, "name", &self.name);
        problems
    }

    fn current_state(&self, ctx: &ApplyContext) -> Result<ResourceState> {
        Ok(ResourceState::present(self.describe(self.status(ctx)?)))
    }

    fn desired_state(&self, _ctx: &ApplyContext) -> Result<ResourceState> {
        Ok(ResourceState::present(self.describe(self.desired())))
    }

    fn apply(&self, ctx: &ApplyContext) -> Result<ApplyResult> {
        let before = self.status(ctx)?;
        let desired = self.desired();
        let fix_enabled = self.enabled.is_some() && before.enabled != desired.enabled;
        let fix_state = before.state != desired.state;
        if !fix_enabled && !fix_state {
            return Ok(ApplyResult::NoChange);
        }
        ctx.require_privilege("systemctl")?;

        if fix_enabled {
            let verb = if desired.enabled { "enable" } else { "disable" };
            ctx.run(&ctx.command("systemctl").args([verb, self.name.as_str()]))?;
        }
        if fix_state {
            let verb = if desired.state.is_running() { "start" } else { "stop" };
            log::info!("[{}] systemctl {verb} {}", ctx.host.host(), self.name);
            ctx.run(&ctx.command("systemctl").args([verb, self.name.as_str()]))?;
        }

        let after = self.status(ctx)?;
        if self.describe(after) != self.describe(desired) {
            return Err(Error::apply(format!(
                "{} is {} after transition, expected {}",
                self.name,
                self.describe(after),
                self.describe(desired)
            )));
        }
        Ok(ApplyResult::Modified)
    }
}
