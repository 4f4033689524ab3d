//! Connection to the machine deckhand itself runs on

use crate::command::{CommandOutput, CommandSpec};
use crate::connection::{Connection, FileStat, shell_read_file, shell_stat, shell_write_file};
use crate::error::{Error, Result};
use crate::process;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

/// Runs commands as local processes.
///
/// Unprivileged file access uses the filesystem directly; privileged access
/// goes through `sudo -n` like any other command.
#[derive(Debug, Clone)]
pub struct LocalConnection {
    name: String,
    use_sudo: bool,
}

impl LocalConnection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            use_sudo: true,
        }
    }

    /// Run privileged commands directly (the process already runs as root)
    pub fn without_sudo(mut self) -> Self {
        self.use_sudo = false;
        self
    }
}

impl Default for LocalConnection {
    fn default() -> Self {
        Self::new("localhost")
    }
}

impl Connection for LocalConnection {
    fn host(&self) -> &str {
        &self.name
    }

    fn exec(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        log::trace!("[{}] exec {spec}", self.name);
        let input = spec.input();
        process::run(
            &spec.argv(self.use_sudo),
            spec.cwd.as_deref(),
            input.as_deref(),
            spec.timeout,
        )
    }

    fn read_file(&self, path: &str, privileged: bool) -> Result<Option<Vec<u8>>> {
        if privileged {
            return shell_read_file(self, path, privileged);
        }
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::io(format!("read {path}"), &e)),
        }
    }

    fn write_file(&self, path: &str, content: &[u8], privileged: bool) -> Result<()> {
        if privileged {
            return shell_write_file(self, path, content, privileged);
        }

        let target = Path::new(path);
        let dir = target
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| Error::io(format!("create temporary file in {}", dir.display()), &e))?;
        tmp.write_all(content)
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| Error::io(format!("write {path}"), &e))?;

        if let Ok(existing) = fs::metadata(target) {
            fs::set_permissions(tmp.path(), existing.permissions())
                .map_err(|e| Error::io(format!("copy permissions of {path}"), &e))?;
        }

        tmp.persist(target)
            .map_err(|e| Error::io(format!("rename into {path}"), &e.error))?;
        log::debug!("[{}] wrote {path} ({} bytes)", self.name, content.len());
        Ok(())
    }

    fn stat(&self, path: &str, privileged: bool) -> Result<Option<FileStat>> {
        shell_stat(self, path, privileged)
    }
}
