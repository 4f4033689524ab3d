//! Package set resource - Debian packages installed with apt

use super::validate;
use declarative::{
    ApplyContext, ApplyResult, Error, Resource, ResourceState, Result, SudoRequirement,
};
use serde::Deserialize;
use std::collections::BTreeSet;

const QUERY_FORMAT: &str = r"--showformat=${Package}\t${db:Status-Abbrev}\n";

/// A set of packages that must be installed
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageSet {
    pub packages: Vec<String>,
    /// Run `apt-get update` before installing anything
    #[serde(default)]
    pub update_cache: bool,
}

impl PackageSet {
    pub fn new<I, S>(packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            packages: packages.into_iter().map(Into::into).collect(),
            update_cache: false,
        }
    }

    fn wanted(&self) -> BTreeSet<&str> {
        self.packages.iter().map(String::as_str).collect()
    }

    /// Packages from the set that are not fully installed
    fn missing(&self, ctx: &ApplyContext) -> Result<Vec<String>> {
        let wanted = self.wanted();
        let output = ctx.exec(
            &ctx.command("dpkg-query")
                .args(["-W", QUERY_FORMAT])
                .args(wanted.iter().copied()),
        )?;
        // 1 means some packages are unknown to dpkg, which is expected
        if !matches!(output.status, Some(0 | 1)) {
            return Err(Error::apply(format!(
                "dpkg-query failed: {}",
                output.stderr_str().trim()
            )));
        }

        let stdout = output.stdout_str();
        let installed: BTreeSet<&str> = stdout
            .lines()
            .filter_map(|line| line.split_once('\t'))
            .filter(|(_, status)| status.starts_with("ii"))
            .map(|(name, _)| name)
            .collect();

        Ok(wanted
            .into_iter()
            .filter(|p| !installed.contains(p))
            .map(str::to_string)
            .collect())
    }

    fn installed_state(&self) -> ResourceState {
        let names: Vec<&str> = self.wanted().into_iter().collect();
        ResourceState::present(format!("installed: {}", names.join(" ")))
    }
}

impl Resource for PackageSet {
    fn id(&self) -> String {
        self.wanted().into_iter().collect::<Vec<_>>().join(",")
    }

    fn description(&self) -> String {
        format!("Install packages: {}", self.packages.join(", "))
    }

    fn resource_type(&self) -> &'static str {
        "package_set"
    }

    fn sudo_requirement(&self) -> SudoRequirement {
        SudoRequirement::Required {
            reason: "apt-get install runs as root".to_string(),
        }
    }

    fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.packages.is_empty() {
            problems.push("packages: must list at least one package".to_string());
        }
        for package in &self.packages {
            validate::package_name(&mut problems, "packages", package);
        }
        problems
    }

    fn current_state(&self, ctx: &ApplyContext) -> Result<ResourceState> {
        let missing = self.missing(ctx)?;
        if missing.is_empty() {
            Ok(self.installed_state())
        } else {
            Ok(ResourceState::present(format!("missing: {}", missing.join(" "))))
        }
    }

    fn desired_state(&self, _ctx: &ApplyContext) -> Result<ResourceState> {
        Ok(self.installed_state())
    }

    fn apply(&self, ctx: &ApplyContext) -> Result<ApplyResult> {
        let missing = self.missing(ctx)?;
        if missing.is_empty() {
            return Ok(ApplyResult::NoChange);
        }
        ctx.require_privilege("apt-get install")?;

        if self.update_cache {
            ctx.run(&ctx.command("apt-get").args(["update", "-q"]))?;
        }
        log::info!("[{}] installing {}", ctx.host.host(), missing.join(" "));
        ctx.run(
            &ctx.command("apt-get")
                .env("DEBIAN_FRONTEND", "noninteractive")
                .args(["install", "-y", "-q", "--no-install-recommends"])
                .args(missing),
        )?;

        Ok(ApplyResult::Modified)
    }
}
