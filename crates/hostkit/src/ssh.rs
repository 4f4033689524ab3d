//! Connection over the system `ssh` client
//!
//! Session setup (keys, agents, known hosts) is left to the user's SSH
//! configuration. Connections run in batch mode so a missing key fails
//! fast instead of prompting.

use crate::command::{CommandOutput, CommandSpec};
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::process;
use std::path::PathBuf;
use std::time::Duration;

/// Exit status the ssh client uses for its own failures
const SSH_ERROR_STATUS: i32 = 255;

/// Parameters for reaching a host over SSH
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshConfig {
    /// Inventory name, used in logs and reports
    pub name: String,
    /// Hostname or IP address to connect to
    pub address: String,
    pub user: Option<String>,
    pub port: Option<u16>,
    pub identity_file: Option<PathBuf>,
    pub connect_timeout: Duration,
    /// Prefix privileged commands with `sudo -n` (false when logging in as root)
    pub use_sudo: bool,
}

impl SshConfig {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            user: None,
            port: None,
            identity_file: None,
            connect_timeout: Duration::from_secs(10),
            use_sudo: true,
        }
    }
}

/// Runs commands on a remote host through `ssh`
#[derive(Debug, Clone)]
pub struct SshConnection {
    config: SshConfig,
}

impl SshConnection {
    pub fn new(config: SshConfig) -> Self {
        let use_sudo = config.use_sudo && config.user.as_deref() != Some("root");
        Self {
            config: SshConfig { use_sudo, ..config },
        }
    }

    pub fn config(&self) -> &SshConfig {
        &self.config
    }

    /// Local argument vector that runs `remote` on the host
    fn ssh_argv(&self, remote: &str) -> Vec<String> {
        let mut argv = vec![
            "ssh".to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.config.connect_timeout.as_secs().max(1)),
        ];
        if let Some(port) = self.config.port {
            argv.push("-p".to_string());
            argv.push(port.to_string());
        }
        if let Some(identity) = &self.config.identity_file {
            argv.push("-i".to_string());
            argv.push(identity.display().to_string());
        }
        argv.push(match &self.config.user {
            Some(user) => format!("{user}@{}", self.config.address),
            None => self.config.address.clone(),
        });
        argv.push("--".to_string());
        argv.push(remote.to_string());
        argv
    }
}

impl Connection for SshConnection {
    fn host(&self) -> &str {
        &self.config.name
    }

    fn exec(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        log::trace!("[{}] ssh {spec}", self.config.name);
        let remote = spec.shell_line(self.config.use_sudo);
        let input = spec.input();
        let output = process::run(
            &self.ssh_argv(&remote),
            None,
            input.as_deref(),
            spec.timeout,
        )
        .map_err(|e| match e {
            Error::Timeout { timeout, .. } => Error::Timeout {
                operation: format!("{spec} on {}", self.config.name),
                timeout,
            },
            other => other,
        })?;

        if output.status == Some(SSH_ERROR_STATUS) {
            return Err(Error::Connection {
                host: self.config.name.clone(),
                message: output.stderr_str().trim().to_string(),
            });
        }
        Ok(output)
    }
}
