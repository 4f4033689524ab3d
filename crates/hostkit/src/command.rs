//! Command descriptions and their captured output

use std::fmt;
use std::time::Duration;

/// A command to run on a host.
///
/// Built with a small builder API:
///
/// ```
/// use hostkit::CommandSpec;
/// use std::time::Duration;
///
/// let spec = CommandSpec::new("apt-get")
///     .args(["install", "-y", "nginx"])
///     .env("DEBIAN_FRONTEND", "noninteractive")
///     .privileged(true)
///     .timeout(Some(Duration::from_secs(600)));
///
/// assert_eq!(
///     spec.argv(true),
///     ["sudo", "-n", "env", "DEBIAN_FRONTEND=noninteractive", "apt-get", "install", "-y", "nginx"]
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Environment for the command; values are never logged
    pub env: Vec<(String, String)>,
    /// Environment delivered on stdin, one value per line, so the values
    /// never appear in an argument vector or the process table
    pub secret_env: Vec<(String, String)>,
    pub stdin: Option<Vec<u8>>,
    /// Working directory on the host
    pub cwd: Option<String>,
    /// Run through `sudo -n`
    pub privileged: bool,
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Pass a secret through the environment without putting it on the
    /// command line; the value must be a single line
    pub fn secret_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.secret_env.push((key.into(), value.into()));
        self
    }

    pub fn stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn cwd(mut self, dir: impl Into<String>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn privileged(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Full argument vector, including the `sudo -n` and `env` prefixes.
    ///
    /// `use_sudo` is false when the session already runs as root.
    pub fn argv(&self, use_sudo: bool) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + self.env.len() + 4);
        if self.privileged && use_sudo {
            argv.push("sudo".to_string());
            argv.push("-n".to_string());
        }
        if !self.env.is_empty() {
            argv.push("env".to_string());
            argv.extend(self.env.iter().map(|(k, v)| format!("{k}={v}")));
        }
        if !self.secret_env.is_empty() {
            argv.push("sh".to_string());
            argv.push("-c".to_string());
            argv.push(self.secret_prelude());
        }
        argv.push(self.program.clone());
        argv.extend(self.args.iter().cloned());
        argv
    }

    /// `sh -c` script that reads each secret from stdin, exports it and
    /// execs the program (`$0`) with its arguments
    fn secret_prelude(&self) -> String {
        let names: Vec<&str> = self.secret_env.iter().map(|(k, _)| k.as_str()).collect();
        let reads: String = names
            .iter()
            .map(|name| format!("IFS= read -r {name} && "))
            .collect();
        format!("{reads}export {} && exec \"$0\" \"$@\"", names.join(" "))
    }

    /// Bytes to feed the command: secret values first, then `stdin`
    pub fn input(&self) -> Option<Vec<u8>> {
        if self.secret_env.is_empty() {
            return self.stdin.clone();
        }
        let mut input = Vec::new();
        for (_, value) in &self.secret_env {
            input.extend_from_slice(value.as_bytes());
            input.push(b'\n');
        }
        if let Some(stdin) = &self.stdin {
            input.extend_from_slice(stdin);
        }
        Some(input)
    }

    /// The command as a single POSIX shell line (for remote execution)
    pub fn shell_line(&self, use_sudo: bool) -> String {
        let command = self
            .argv(use_sudo)
            .iter()
            .map(|a| shell_quote(a))
            .collect::<Vec<_>>()
            .join(" ");
        match &self.cwd {
            Some(dir) => format!("cd {} && {command}", shell_quote(dir)),
            None => command,
        }
    }

    /// Program and arguments joined by spaces, without quoting or environment
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Printable form with environment values masked
impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.privileged {
            f.write_str("sudo ")?;
        }
        for (key, _) in self.env.iter().chain(&self.secret_env) {
            write!(f, "{key}=*** ")?;
        }
        f.write_str(&shell_quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", shell_quote(arg))?;
        }
        Ok(())
    }
}

/// Quote a word for a POSIX shell; plain words are left as-is
pub fn shell_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,@%+^".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Captured output of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` if the process was killed by a signal
    pub status: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            stderr: Vec::new(),
        }
    }

    /// Failed output with the given exit code and stderr
    pub fn failed(status: i32, stderr: impl Into<Vec<u8>>) -> Self {
        Self {
            status: Some(status),
            stdout: Vec::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}
