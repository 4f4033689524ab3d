//! Apply context and provider traits
//!
//! A resource never reaches for the host, the variables or the secret store
//! on its own: everything comes in through [`ApplyContext`], which also
//! applies the task's privilege grant and timeout to every command.

use crate::error::{Error, Result};
use crate::report::TaskResult;
use hostkit::{CommandOutput, CommandSpec, Connection, FileStat};
use std::collections::BTreeMap;
use std::time::Duration;
use stencil::{Renderer, Vars};

/// Resolves secret references (e.g. `env:DB_PASSWORD`) at apply time
pub trait SecretStore: Send + Sync {
    /// Resolve `reference` to the secret value
    fn resolve(&self, reference: &str) -> Result<String>;
}

/// Store that refuses every reference
pub struct NoSecrets;

impl SecretStore for NoSecrets {
    fn resolve(&self, reference: &str) -> Result<String> {
        Err(Error::apply(format!(
            "cannot resolve secret '{reference}': no secret store configured"
        )))
    }
}

/// Fixed set of secrets, keyed by reference
#[derive(Debug, Clone, Default)]
pub struct StaticSecrets(pub BTreeMap<String, String>);

impl SecretStore for StaticSecrets {
    fn resolve(&self, reference: &str) -> Result<String> {
        self.0
            .get(reference)
            .cloned()
            .ok_or_else(|| Error::apply(format!("unknown secret '{reference}'")))
    }
}

/// Progress callback for run operations
///
/// Implement this trait to receive progress updates during a run.
pub trait ProgressCallback: Send {
    /// Called once before the first task of a host
    fn on_run_start(&mut self, host: &str, count: usize);

    /// Called when the runner starts working on a task
    fn on_task_start(&mut self, host: &str, task_id: &str, description: &str);

    /// Called with the final result of every task, including skipped ones
    fn on_task_complete(&mut self, host: &str, result: &TaskResult);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_run_start(&mut self, _host: &str, _count: usize) {}
    fn on_task_start(&mut self, _host: &str, _task_id: &str, _description: &str) {}
    fn on_task_complete(&mut self, _host: &str, _result: &TaskResult) {}
}

/// Everything a run needs to know about one target host
#[derive(Clone, Copy)]
pub struct HostContext<'a> {
    pub conn: &'a dyn Connection,
    /// Fully layered variable context for this host
    pub vars: &'a Vars,
    pub renderer: &'a Renderer,
    pub secrets: &'a dyn SecretStore,
}

impl<'a> HostContext<'a> {
    pub fn new(
        conn: &'a dyn Connection,
        vars: &'a Vars,
        renderer: &'a Renderer,
        secrets: &'a dyn SecretStore,
    ) -> Self {
        Self {
            conn,
            vars,
            renderer,
            secrets,
        }
    }

    pub fn host(&self) -> &str {
        self.conn.host()
    }
}

/// Context passed to resource state queries and apply operations
pub struct ApplyContext<'a> {
    /// Only determine whether a change would be made
    pub check: bool,
    /// Task was granted privilege (commands run through sudo)
    pub privileged: bool,
    /// Budget for each command issued on behalf of the task
    pub timeout: Option<Duration>,
    pub host: HostContext<'a>,
}

impl<'a> ApplyContext<'a> {
    /// Create a new apply context
    pub fn new(host: HostContext<'a>, privileged: bool, timeout: Option<Duration>) -> Self {
        Self {
            check: false,
            privileged,
            timeout,
            host,
        }
    }

    pub fn conn(&self) -> &'a dyn Connection {
        self.host.conn
    }

    pub fn vars(&self) -> &'a Vars {
        self.host.vars
    }

    /// A command carrying the task's privilege and timeout
    pub fn command(&self, program: &str) -> CommandSpec {
        CommandSpec::new(program)
            .privileged(self.privileged)
            .timeout(self.timeout)
    }

    /// Run a command, failing unless it exits successfully
    pub fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        Ok(self.host.conn.run(spec)?)
    }

    /// Run a command and return its output whatever the exit status
    pub fn exec(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        log::trace!("[{}] $ {spec}", self.host.host());
        Ok(self.host.conn.exec(spec)?)
    }

    pub fn read_file(&self, path: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.host.conn.read_file(path, self.privileged)?)
    }

    pub fn write_file(&self, path: &str, content: &[u8]) -> Result<()> {
        Ok(self.host.conn.write_file(path, content, self.privileged)?)
    }

    pub fn stat(&self, path: &str) -> Result<Option<FileStat>> {
        Ok(self.host.conn.stat(path, self.privileged)?)
    }

    /// Render a registered template against the host's variables
    pub fn render(&self, template_id: &str) -> Result<Vec<u8>> {
        Ok(self.host.renderer.render(template_id, self.host.vars)?)
    }

    /// Resolve a secret reference
    pub fn secret(&self, reference: &str) -> Result<String> {
        self.host.secrets.resolve(reference)
    }

    /// Fail with `PermissionDenied` unless the task was granted privilege
    pub fn require_privilege(&self, operation: &str) -> Result<()> {
        if self.privileged {
            Ok(())
        } else {
            Err(Error::PermissionDenied {
                message: format!("{operation} requires privilege; set `become = true` on the task"),
            })
        }
    }
}
