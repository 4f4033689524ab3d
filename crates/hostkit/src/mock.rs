//! In-memory host for tests.
//!
//! [`MockConnection`] keeps a small filesystem in memory and answers
//! commands with scripted handlers, so resource logic can be exercised
//! without touching a real machine:
//!
//! ```
//! use hostkit::{CommandOutput, CommandSpec, Connection, MockConnection};
//!
//! let host = MockConnection::new("web1");
//! host.respond("systemctl is-active nginx", CommandOutput::ok("active\n"));
//! host.add_dir("/srv");
//!
//! let out = host.run(&CommandSpec::new("systemctl").args(["is-active", "nginx"])).unwrap();
//! assert_eq!(out.stdout_str(), "active\n");
//!
//! host.run(&CommandSpec::new("mkdir").args(["-p", "/srv/app"])).unwrap();
//! assert!(host.stat("/srv/app", false).unwrap().is_some());
//! ```
//!
//! `mkdir`, `chmod`, `chown` and `true` are understood natively; anything
//! else needs a handler registered with [`MockConnection::on`] or
//! [`MockConnection::respond`]. Unhandled commands exit 127.

use crate::command::{CommandOutput, CommandSpec};
use crate::connection::{Connection, FileKind, FileStat};
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One entry of the in-memory filesystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockFile {
    pub kind: FileKind,
    pub content: Vec<u8>,
    pub owner: String,
    pub group: String,
    pub mode: u32,
}

impl MockFile {
    /// A root-owned regular file with mode 0644
    pub fn file(content: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: FileKind::File,
            content: content.into(),
            owner: "root".to_string(),
            group: "root".to_string(),
            mode: 0o644,
        }
    }

    /// A root-owned directory with mode 0755
    pub fn dir() -> Self {
        Self {
            kind: FileKind::Directory,
            content: Vec::new(),
            owner: "root".to_string(),
            group: "root".to_string(),
            mode: 0o755,
        }
    }
}

/// The in-memory filesystem, handed to command handlers
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    entries: BTreeMap<String, MockFile>,
}

impl MockFs {
    pub fn get(&self, path: &str) -> Option<&MockFile> {
        self.entries.get(path)
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut MockFile> {
        self.entries.get_mut(path)
    }

    pub fn insert(&mut self, path: impl Into<String>, entry: MockFile) {
        self.entries.insert(path.into(), entry);
    }

    pub fn remove(&mut self, path: &str) -> Option<MockFile> {
        self.entries.remove(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        path == "/" || self.entries.contains_key(path)
    }

    /// Create `path` and any missing parents as directories
    pub fn mkdir_p(&mut self, path: &str) {
        let mut current = String::new();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current.push('/');
            current.push_str(part);
            self.entries
                .entry(current.clone())
                .or_insert_with(MockFile::dir);
        }
    }

    fn parent_exists(&self, path: &str) -> bool {
        match path.rfind('/') {
            Some(0) | None => true,
            Some(i) => self
                .entries
                .get(&path[..i])
                .is_some_and(|e| e.kind == FileKind::Directory),
        }
    }
}

type Handler = Arc<dyn Fn(&CommandSpec, &mut MockFs) -> CommandOutput + Send + Sync>;

#[derive(Default)]
struct MockState {
    fs: MockFs,
    handlers: Vec<(String, Handler)>,
    log: Vec<String>,
    unreachable: u32,
}

/// In-memory [`Connection`] with scripted command handlers.
///
/// Clones share state, so a test can keep a handle while the code under
/// test owns another.
#[derive(Clone)]
pub struct MockConnection {
    name: String,
    state: Arc<Mutex<MockState>>,
}

impl std::fmt::Debug for MockConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockConnection")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl MockConnection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a root-owned file (parent directories are created)
    pub fn add_file(&self, path: &str, content: impl Into<Vec<u8>>) {
        self.set_entry(path, MockFile::file(content));
    }

    /// Add a root-owned directory (parents are created)
    pub fn add_dir(&self, path: &str) {
        self.state().fs.mkdir_p(path);
    }

    /// Insert an entry as-is (parent directories are created)
    pub fn set_entry(&self, path: &str, entry: MockFile) {
        let mut state = self.state();
        if let Some(i) = path.rfind('/')
            && i > 0
        {
            state.fs.mkdir_p(&path[..i]);
        }
        state.fs.insert(path, entry);
    }

    /// Current entry at `path`
    pub fn entry(&self, path: &str) -> Option<MockFile> {
        self.state().fs.get(path).cloned()
    }

    /// Current content of the file at `path`
    pub fn content(&self, path: &str) -> Option<Vec<u8>> {
        self.entry(path).map(|e| e.content)
    }

    /// Handle commands whose command line starts with `prefix`.
    ///
    /// Later registrations take precedence over earlier ones.
    pub fn on<F>(&self, prefix: impl Into<String>, handler: F)
    where
        F: Fn(&CommandSpec, &mut MockFs) -> CommandOutput + Send + Sync + 'static,
    {
        self.state().handlers.push((prefix.into(), Arc::new(handler)));
    }

    /// Answer commands starting with `prefix` with a fixed output
    pub fn respond(&self, prefix: impl Into<String>, output: CommandOutput) {
        self.on(prefix, move |_, _| output.clone());
    }

    /// Fail the next `times` operations with a connection error
    pub fn fail_connections(&self, times: u32) {
        self.state().unreachable = times;
    }

    /// Commands run and files written so far, in order
    pub fn log(&self) -> Vec<String> {
        self.state().log.clone()
    }

    /// Return the log and clear it
    pub fn take_log(&self) -> Vec<String> {
        std::mem::take(&mut self.state().log)
    }

    fn check_reachable(&self, state: &mut MockState) -> Result<()> {
        if state.unreachable > 0 {
            state.unreachable -= 1;
            return Err(Error::Connection {
                host: self.name.clone(),
                message: "connection refused (mock)".to_string(),
            });
        }
        Ok(())
    }
}

fn builtin(spec: &CommandSpec, fs: &mut MockFs) -> CommandOutput {
    let operands: Vec<&str> = spec
        .args
        .iter()
        .map(String::as_str)
        .filter(|a| !a.starts_with('-'))
        .collect();

    match spec.program.as_str() {
        "true" => CommandOutput::ok(""),
        "mkdir" => {
            for path in operands {
                fs.mkdir_p(path);
            }
            CommandOutput::ok("")
        }
        "chmod" => {
            let [mode, paths @ ..] = operands.as_slice() else {
                return CommandOutput::failed(1, "chmod: missing operand");
            };
            let Ok(mode) = u32::from_str_radix(mode, 8) else {
                return CommandOutput::failed(1, format!("chmod: invalid mode: '{mode}'"));
            };
            for path in paths {
                match fs.get_mut(path) {
                    Some(entry) => entry.mode = mode,
                    None => return missing("chmod", path),
                }
            }
            CommandOutput::ok("")
        }
        "chown" => {
            let [owner_group, paths @ ..] = operands.as_slice() else {
                return CommandOutput::failed(1, "chown: missing operand");
            };
            let (owner, group) = match owner_group.split_once(':') {
                Some((o, g)) => (o, g),
                None => (*owner_group, ""),
            };
            for path in paths {
                let Some(entry) = fs.get_mut(path) else {
                    return missing("chown", path);
                };
                if !owner.is_empty() {
                    entry.owner = owner.to_string();
                }
                if !group.is_empty() {
                    entry.group = group.to_string();
                }
            }
            CommandOutput::ok("")
        }
        _ => CommandOutput::failed(127, format!("{}: command not found", spec.program)),
    }
}

fn missing(tool: &str, path: &str) -> CommandOutput {
    CommandOutput::failed(
        1,
        format!("{tool}: cannot access '{path}': No such file or directory"),
    )
}

impl Connection for MockConnection {
    fn host(&self) -> &str {
        &self.name
    }

    fn exec(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let mut state = self.state();
        self.check_reachable(&mut state)?;

        let line = spec.command_line();
        state.log.push(line.clone());

        let handler = state
            .handlers
            .iter()
            .rev()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map(|(_, h)| Arc::clone(h));

        Ok(match handler {
            Some(handler) => handler(spec, &mut state.fs),
            None => builtin(spec, &mut state.fs),
        })
    }

    fn read_file(&self, path: &str, _privileged: bool) -> Result<Option<Vec<u8>>> {
        let mut state = self.state();
        self.check_reachable(&mut state)?;
        match state.fs.get(path) {
            Some(entry) if entry.kind == FileKind::Directory => Err(Error::CommandFailed {
                command: format!("cat -- {path}"),
                status: Some(1),
                stderr: format!("cat: {path}: Is a directory"),
            }),
            Some(entry) => Ok(Some(entry.content.clone())),
            None => Ok(None),
        }
    }

    fn write_file(&self, path: &str, content: &[u8], _privileged: bool) -> Result<()> {
        let mut state = self.state();
        self.check_reachable(&mut state)?;
        if !state.fs.parent_exists(path) {
            return Err(Error::CommandFailed {
                command: format!("write {path}"),
                status: Some(1),
                stderr: format!("{path}: No such file or directory"),
            });
        }
        state.log.push(format!("write {path}"));
        match state.fs.get_mut(path) {
            Some(entry) => entry.content = content.to_vec(),
            None => state.fs.insert(path, MockFile::file(content)),
        }
        Ok(())
    }

    fn stat(&self, path: &str, _privileged: bool) -> Result<Option<FileStat>> {
        let mut state = self.state();
        self.check_reachable(&mut state)?;
        if path == "/" {
            let root = MockFile::dir();
            return Ok(Some(FileStat {
                kind: root.kind,
                owner: root.owner,
                group: root.group,
                mode: root.mode,
            }));
        }
        Ok(state.fs.get(path).map(|entry| FileStat {
            kind: entry.kind,
            owner: entry.owner.clone(),
            group: entry.group.clone(),
            mode: entry.mode,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_mkdir_chmod_chown() {
        let host = MockConnection::new("h");
        host.run(&CommandSpec::new("mkdir").args(["-p", "/srv/app/logs"]))
            .unwrap();
        host.run(&CommandSpec::new("chown").args(["www-data:adm", "/srv/app"]))
            .unwrap();
        host.run(&CommandSpec::new("chmod").args(["0750", "/srv/app"]))
            .unwrap();

        let stat = host.stat("/srv/app", false).unwrap().unwrap();
        assert_eq!(stat.kind, FileKind::Directory);
        assert_eq!(stat.owner, "www-data");
        assert_eq!(stat.group, "adm");
        assert_eq!(stat.mode, 0o750);
        assert!(host.entry("/srv/app/logs").is_some());
    }

    #[test]
    fn test_handlers_latest_wins() {
        let host = MockConnection::new("h");
        host.respond("git rev-parse", CommandOutput::ok("aaa\n"));
        host.respond("git rev-parse", CommandOutput::ok("bbb\n"));
        let out = host
            .exec(&CommandSpec::new("git").args(["rev-parse", "HEAD"]))
            .unwrap();
        assert_eq!(out.stdout_str(), "bbb\n");
    }

    #[test]
    fn test_handler_can_mutate_fs() {
        let host = MockConnection::new("h");
        host.on("touch", |spec, fs| {
            fs.insert(spec.args[0].clone(), MockFile::file(""));
            CommandOutput::ok("")
        });
        host.run(&CommandSpec::new("touch").arg("/marker")).unwrap();
        assert!(host.entry("/marker").is_some());
    }

    #[test]
    fn test_unhandled_command_fails() {
        let host = MockConnection::new("h");
        let err = host.run(&CommandSpec::new("frobnicate")).unwrap_err();
        assert!(matches!(err, Error::CommandFailed { status: Some(127), .. }));
    }

    #[test]
    fn test_write_requires_parent_and_is_logged() {
        let host = MockConnection::new("h");
        assert!(host.write_file("/etc/app/x.conf", b"x", true).is_err());
        host.add_dir("/etc/app");
        host.write_file("/etc/app/x.conf", b"x", true).unwrap();
        assert_eq!(host.content("/etc/app/x.conf").unwrap(), b"x");
        assert_eq!(host.take_log(), vec!["write /etc/app/x.conf"]);
        assert!(host.log().is_empty());
    }

    #[test]
    fn test_fail_connections() {
        let host = MockConnection::new("h");
        host.fail_connections(1);
        let err = host.exec(&CommandSpec::new("true")).unwrap_err();
        assert!(err.is_retryable());
        assert!(host.exec(&CommandSpec::new("true")).is_ok());
    }

    #[test]
    fn test_clones_share_state() {
        let host = MockConnection::new("h");
        let other = host.clone();
        other.add_file("/etc/motd", "hi");
        assert_eq!(host.content("/etc/motd").unwrap(), b"hi");
    }
}
