//! The [`Connection`] trait and shell-based file primitives

use crate::command::{CommandOutput, CommandSpec};
use crate::error::{Error, Result};

/// Kind of filesystem entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Directory,
    Symlink,
    Other,
}

/// Metadata of a path on the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub kind: FileKind,
    pub owner: String,
    pub group: String,
    /// Permission bits, e.g. `0o644`
    pub mode: u32,
}

impl FileStat {
    /// Parse a line produced by `stat -c '%F|%U|%G|%a'`
    pub fn parse(line: &str) -> Option<Self> {
        let mut fields = line.trim().split('|');
        let kind = match fields.next()? {
            "regular file" | "regular empty file" => FileKind::File,
            "directory" => FileKind::Directory,
            "symbolic link" => FileKind::Symlink,
            _ => FileKind::Other,
        };
        let owner = fields.next()?.to_string();
        let group = fields.next()?.to_string();
        let mode = u32::from_str_radix(fields.next()?, 8).ok()?;
        Some(Self {
            kind,
            owner,
            group,
            mode,
        })
    }
}

/// Access to one target host.
///
/// Implementations only need [`Connection::host`] and [`Connection::exec`];
/// file primitives default to shell commands run through `exec`, which works
/// for any POSIX host. Implementations may override them with native access.
pub trait Connection: Send + Sync {
    /// Host name as given in the inventory
    fn host(&self) -> &str;

    /// Run a command and capture its output, whatever its exit status.
    ///
    /// Errors only when the command could not be run at all (host
    /// unreachable, timeout, spawn failure).
    fn exec(&self, spec: &CommandSpec) -> Result<CommandOutput>;

    /// Run a command and fail unless it exits successfully
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        log::debug!("[{}] $ {spec}", self.host());
        let output = self.exec(spec)?;
        if output.success() {
            Ok(output)
        } else {
            Err(Error::from_command(
                spec.to_string(),
                output.status,
                &output.stderr_str(),
            ))
        }
    }

    /// Read a whole file; `None` if it does not exist
    fn read_file(&self, path: &str, privileged: bool) -> Result<Option<Vec<u8>>> {
        shell_read_file(self, path, privileged)
    }

    /// Replace a file's content atomically (temporary file, then rename)
    fn write_file(&self, path: &str, content: &[u8], privileged: bool) -> Result<()> {
        shell_write_file(self, path, content, privileged)
    }

    /// Metadata of a path; `None` if it does not exist
    fn stat(&self, path: &str, privileged: bool) -> Result<Option<FileStat>> {
        shell_stat(self, path, privileged)
    }
}

fn is_missing(output: &CommandOutput) -> bool {
    output.stderr_str().contains("No such file or directory")
}

/// Read a file with `cat`
pub fn shell_read_file<C: Connection + ?Sized>(
    conn: &C,
    path: &str,
    privileged: bool,
) -> Result<Option<Vec<u8>>> {
    let spec = CommandSpec::new("cat")
        .args(["--", path])
        .privileged(privileged);
    log::trace!("[{}] read {path}", conn.host());
    let output = conn.exec(&spec)?;
    if output.success() {
        Ok(Some(output.stdout))
    } else if is_missing(&output) {
        Ok(None)
    } else {
        Err(Error::from_command(
            spec.to_string(),
            output.status,
            &output.stderr_str(),
        ))
    }
}

/// Write a file by streaming it to a sibling temporary path and renaming it
/// over the destination. An existing file's owner and mode carry over.
pub fn shell_write_file<C: Connection + ?Sized>(
    conn: &C,
    path: &str,
    content: &[u8],
    privileged: bool,
) -> Result<()> {
    const SCRIPT: &str = r#"set -e
tmp="$1.deckhand-tmp"
trap 'rm -f -- "$tmp"' EXIT
cat > "$tmp"
if [ -e "$1" ]; then
  chown --reference="$1" -- "$tmp" 2>/dev/null || true
  chmod --reference="$1" -- "$tmp" 2>/dev/null || true
fi
mv -f -- "$tmp" "$1"
trap - EXIT"#;

    let spec = CommandSpec::new("sh")
        .args(["-c", SCRIPT, "sh", path])
        .stdin(content)
        .privileged(privileged);
    log::debug!("[{}] write {path} ({} bytes)", conn.host(), content.len());
    conn.run(&spec).map(|_| ())
}

/// Stat a path with GNU `stat`
pub fn shell_stat<C: Connection + ?Sized>(
    conn: &C,
    path: &str,
    privileged: bool,
) -> Result<Option<FileStat>> {
    let spec = CommandSpec::new("stat")
        .args(["-c", "%F|%U|%G|%a", "--", path])
        .privileged(privileged);
    let output = conn.exec(&spec)?;
    if output.success() {
        let line = output.stdout_str();
        FileStat::parse(&line).map(Some).ok_or_else(|| Error::CommandFailed {
            command: spec.to_string(),
            status: output.status,
            stderr: format!("unexpected stat output: {}", line.trim()),
        })
    } else if is_missing(&output) {
        Ok(None)
    } else {
        Err(Error::from_command(
            spec.to_string(),
            output.status,
            &output.stderr_str(),
        ))
    }
}
