//! Secret references: `env:NAME` and `file:PATH`
//!
//! Playbooks hold references, never secret values. A reference is resolved
//! on the controller only when the task that needs it applies.

use declarative::{Error, SecretStore};

/// Resolves references from the controller's environment and files
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSecrets;

impl SecretStore for EnvSecrets {
    fn resolve(&self, reference: &str) -> declarative::Result<String> {
        match reference.split_once(':') {
            Some(("env", name)) => std::env::var(name).map_err(|_| {
                Error::apply(format!("secret '{reference}': environment variable {name} is not set"))
            }),
            Some(("file", path)) => {
                let path = crate::paths::expand(path);
                let content = std::fs::read_to_string(&path).map_err(|e| {
                    Error::apply(format!("secret '{reference}': cannot read {}: {e}", path.display()))
                })?;
                Ok(content.trim_end_matches(['\r', '\n']).to_string())
            }
            // The value may be a pasted secret, so it is not echoed
            _ => Err(Error::apply(
                "invalid secret reference: expected env:NAME or file:PATH",
            )),
        }
    }
}

/// Whether `reference` has the shape of a secret reference
pub fn is_reference(reference: &str) -> bool {
    match reference.split_once(':') {
        Some(("env", name)) => {
            !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        Some(("file", path)) => !path.is_empty(),
        _ => false,
    }
}
