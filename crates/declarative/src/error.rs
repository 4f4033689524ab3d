//! Error taxonomy for planning and applying tasks.
//!
//! Errors fall in two groups. Plan-time errors (invalid descriptors,
//! dependency problems) abort a run before anything touches a host.
//! Apply-time errors are recorded against the failing task and the
//! runner's failure policy decides what happens to the rest.

use std::time::Duration;
use thiserror::Error;

/// Categories of errors for retry logic and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Descriptor fields missing or malformed
    Descriptor,
    /// Template or guard failed to parse or evaluate
    Template,
    /// Operation needs privileges the task was not granted
    Permission,
    /// Host unreachable (transient, retryable)
    Connection,
    /// Operation exceeded its timeout (transient, retryable)
    Timeout,
    /// The host rejected a change
    Apply,
    /// Task graph is not runnable
    Plan,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection | Self::Timeout)
    }

    /// Short label used in reports
    pub fn label(&self) -> &'static str {
        match self {
            Self::Descriptor => "invalid_descriptor",
            Self::Template => "template_error",
            Self::Permission => "permission_denied",
            Self::Connection => "connection_error",
            Self::Timeout => "timeout_error",
            Self::Apply => "apply_error",
            Self::Plan => "plan_error",
        }
    }
}

/// Errors raised while planning or applying tasks.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// A resource descriptor failed structural validation
    #[error("invalid task '{task}': {}", .problems.join("; "))]
    InvalidDescriptor {
        /// Task id
        task: String,
        /// Every problem found, in field order
        problems: Vec<String>,
    },

    /// Template or guard expression failed
    #[error("template error: {0}")]
    Template(#[from] stencil::Error),

    /// Privileged operation attempted without privilege
    #[error("permission denied: {message}")]
    PermissionDenied {
        /// What was denied and why
        message: String,
    },

    /// Host could not be reached
    #[error("connection error: cannot reach {host}: {message}")]
    Connection {
        /// Host name
        host: String,
        /// Transport error message
        message: String,
    },

    /// Operation exceeded its timeout
    #[error("timeout: {operation} did not finish within {}s", .timeout.as_secs())]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// Budget that was exceeded
        timeout: Duration,
    },

    /// OS-level failure while applying a change
    #[error("apply error: {message}")]
    Apply {
        /// Underlying failure message
        message: String,
    },

    /// Selected tasks depend on each other in a loop
    #[error("dependency cycle: {}", .cycle.join(" -> "))]
    CyclicDependency {
        /// Task ids along the cycle; the first id is repeated at the end
        cycle: Vec<String>,
    },

    /// A task depends on a task id that does not exist
    #[error("task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency {
        /// Task declaring the dependency
        task: String,
        /// Missing task id
        dependency: String,
    },

    /// Two tasks share an id
    #[error("duplicate task id '{0}'")]
    DuplicateTask(String),
}

impl Error {
    /// Get the error category for retry logic.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidDescriptor { .. } => ErrorCategory::Descriptor,
            Error::Template(_) => ErrorCategory::Template,
            Error::PermissionDenied { .. } => ErrorCategory::Permission,
            Error::Connection { .. } => ErrorCategory::Connection,
            Error::Timeout { .. } => ErrorCategory::Timeout,
            Error::Apply { .. } => ErrorCategory::Apply,
            Error::CyclicDependency { .. }
            | Error::UnknownDependency { .. }
            | Error::DuplicateTask(_) => ErrorCategory::Plan,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Shorthand for [`Error::Apply`]
    pub fn apply(message: impl Into<String>) -> Self {
        Error::Apply {
            message: message.into(),
        }
    }
}

impl From<hostkit::Error> for Error {
    fn from(err: hostkit::Error) -> Self {
        match err {
            hostkit::Error::Connection { host, message } => Error::Connection { host, message },
            hostkit::Error::Timeout { operation, timeout } => Error::Timeout { operation, timeout },
            hostkit::Error::PermissionDenied { message } => Error::PermissionDenied { message },
            other @ (hostkit::Error::CommandFailed { .. } | hostkit::Error::Io { .. }) => {
                Error::apply(other.to_string())
            }
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
