//! Error types for template rendering and expression evaluation.
//!
//! Every error carries the origin (template id, or the label given to a
//! standalone expression) and the 1-indexed line it was raised on, so a
//! failing task can point straight at the offending construct.

use minijinja::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading, parsing or rendering templates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A referenced variable is not present in the context
    #[error("{origin}:{line}: undefined variable '{name}'")]
    Undefined {
        /// Template id or expression label
        origin: String,
        /// Line of the construct that referenced the variable
        line: usize,
        /// Dotted path of the missing variable
        name: String,
    },

    /// Malformed template or expression
    #[error("{origin}:{line}: {message}")]
    Syntax {
        /// Template id or expression label
        origin: String,
        /// Line where the problem was detected
        line: usize,
        /// Description of the problem
        message: String,
    },

    /// A well-formed construct was applied to a value of the wrong shape
    #[error("{origin}:{line}: {message}")]
    Type {
        /// Template id or expression label
        origin: String,
        /// Line of the construct
        line: usize,
        /// Description of the mismatch
        message: String,
    },

    /// No template registered under the requested id
    #[error("template not found: {0}")]
    NotFound(String),

    /// Template file could not be read
    #[error("failed to read template {path}: {message}")]
    Io {
        /// Path of the template file
        path: PathBuf,
        /// Underlying IO error message
        message: String,
    },
}

impl Error {
    /// Origin (template id or expression label) the error refers to, if any.
    pub fn origin(&self) -> Option<&str> {
        match self {
            Self::Undefined { origin, .. }
            | Self::Syntax { origin, .. }
            | Self::Type { origin, .. } => Some(origin),
            Self::NotFound(id) => Some(id),
            Self::Io { .. } => None,
        }
    }

    /// Translate an engine error raised for `origin`.
    ///
    /// `line` is where the source starts in its origin; engine line numbers
    /// are relative to it. `missing` names the undefined variable when the
    /// caller could work it out.
    pub(crate) fn from_engine(
        err: &minijinja::Error,
        origin: &str,
        line: usize,
        missing: Option<String>,
    ) -> Self {
        let origin = origin.to_string();
        let line = line + err.line().unwrap_or(1).saturating_sub(1);
        let message = err
            .detail()
            .map_or_else(|| err.kind().to_string(), |d| format!("{}: {d}", err.kind()));

        match err.kind() {
            ErrorKind::UndefinedError => Self::Undefined {
                origin,
                line,
                name: missing.unwrap_or_else(|| "?".to_string()),
            },
            ErrorKind::SyntaxError
            | ErrorKind::UnknownFilter
            | ErrorKind::UnknownTest
            | ErrorKind::UnknownFunction => Self::Syntax {
                origin,
                line,
                message,
            },
            ErrorKind::TemplateNotFound => Self::NotFound(err.name().unwrap_or(&origin).to_string()),
            _ => Self::Type {
                origin,
                line,
                message,
            },
        }
    }
}

/// Result type for template operations.
pub type Result<T> = std::result::Result<T, Error>;
