//! Error types for host operations.
//!
//! Errors are categorized so callers can tell transient failures (an
//! unreachable host, a command that ran out of time) from failures that
//! will happen again on every attempt.

use std::time::Duration;
use thiserror::Error;

/// Categories of host errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Host could not be reached (transient, retryable)
    Connection,
    /// Operation exceeded its time budget (transient, retryable)
    Timeout,
    /// Missing privileges on the host
    Permission,
    /// A command ran and reported failure
    Command,
    /// Local IO failure
    Io,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection | Self::Timeout)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Connection => "Host unreachable",
            Self::Timeout => "Operation timed out",
            Self::Permission => "Permission denied",
            Self::Command => "Command failed",
            Self::Io => "IO error",
        }
    }
}

/// Errors that can occur while talking to a host.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Transport-level failure reaching the host
    #[error("cannot reach {host}: {message}")]
    Connection {
        /// Host name as given in the inventory
        host: String,
        /// Transport error message
        message: String,
    },

    /// Operation did not complete within its timeout
    #[error("{operation} timed out after {}s", .timeout.as_secs())]
    Timeout {
        /// Command line or operation label
        operation: String,
        /// Budget that was exceeded
        timeout: Duration,
    },

    /// Operation needs privileges the session does not have
    #[error("permission denied: {message}")]
    PermissionDenied {
        /// Details about what was denied
        message: String,
    },

    /// Command exited unsuccessfully
    #[error("command failed ({}): {command}{}", status_text(.status), stderr_suffix(.stderr))]
    CommandFailed {
        /// Command line, with environment values masked
        command: String,
        /// Exit code, if the process exited normally
        status: Option<i32>,
        /// Standard error output
        stderr: String,
    },

    /// Local IO failure
    #[error("{operation}: {message}")]
    Io {
        /// What was being attempted
        operation: String,
        /// Underlying IO error message
        message: String,
    },
}

fn status_text(status: &Option<i32>) -> String {
    status.map_or_else(|| "killed by signal".to_string(), |code| format!("exit {code}"))
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

impl Error {
    /// Get the error category for retry logic.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Connection { .. } => ErrorCategory::Connection,
            Error::Timeout { .. } => ErrorCategory::Timeout,
            Error::PermissionDenied { .. } => ErrorCategory::Permission,
            Error::CommandFailed { .. } => ErrorCategory::Command,
            Error::Io { .. } => ErrorCategory::Io,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Create an error from a failed command's output.
    ///
    /// Analyzes stderr so that sudo and filesystem permission failures are
    /// reported as [`Error::PermissionDenied`].
    pub fn from_command(command: String, status: Option<i32>, stderr: &str) -> Self {
        let stderr = stderr.trim();
        let lower = stderr.to_lowercase();

        if lower.contains("a password is required")
            || lower.contains("a terminal is required")
            || lower.contains("is not in the sudoers file")
            || lower.contains("permission denied")
            || lower.contains("operation not permitted")
            || lower.contains("are you root?")
        {
            return Error::PermissionDenied {
                message: format!("{command}: {stderr}"),
            };
        }

        Error::CommandFailed {
            command,
            status,
            stderr: stderr.to_string(),
        }
    }

    pub(crate) fn io(operation: impl Into<String>, err: &std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            return Error::PermissionDenied {
                message: format!("{}: {err}", operation.into()),
            };
        }
        Error::Io {
            operation: operation.into(),
            message: err.to_string(),
        }
    }
}

/// Result type for host operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category_retryable() {
        assert!(ErrorCategory::Connection.is_retryable());
        assert!(ErrorCategory::Timeout.is_retryable());
        assert!(!ErrorCategory::Permission.is_retryable());
        assert!(!ErrorCategory::Command.is_retryable());
    }

    #[test]
    fn test_from_command_sudo_password() {
        let err = Error::from_command(
            "sudo -n apt-get install -y nginx".into(),
            Some(1),
            "sudo: a password is required\n",
        );
        assert_eq!(err.category(), ErrorCategory::Permission);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_from_command_generic_failure() {
        let err = Error::from_command("git fetch".into(), Some(128), "fatal: bad object\n");
        assert_eq!(
            err.to_string(),
            "command failed (exit 128): git fetch: fatal: bad object"
        );
    }

    #[test]
    fn test_timeout_display() {
        let err = Error::Timeout {
            operation: "git clone".into(),
            timeout: Duration::from_secs(30),
        };
        assert_eq!(err.to_string(), "git clone timed out after 30s");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_io_permission_maps_to_permission_denied() {
        let io = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        assert_eq!(
            Error::io("write /etc/x", &io).category(),
            ErrorCategory::Permission
        );
    }
}
