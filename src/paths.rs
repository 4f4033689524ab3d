//! Path resolution for deckhand
//!
//! # Environment Variables
//!
//! - `DECKHAND_CONFIG_DIR` - Override config directory (e.g., `~/infra/deckhand`)
//!
//! # Default files
//!
//! A playbook is looked up as `./deckhand.toml`, then
//! `<config_dir>/playbook.toml`. An inventory is looked up as
//! `./inventory.toml`, then `<config_dir>/inventory.toml`; without one,
//! the run targets the local machine.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "DECKHAND_CONFIG_DIR";

/// Get the deckhand config directory path
///
/// Priority:
/// 1. `DECKHAND_CONFIG_DIR` env var
/// 2. `XDG_CONFIG_HOME/deckhand`
/// 3. `~/.config/deckhand`
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!("Using config dir from {ENV_CONFIG_DIR}: {}", path.display());
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join("deckhand");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("deckhand"))
}

/// Playbook to use when `--playbook` is not given
pub fn default_playbook() -> Result<PathBuf> {
    let local = PathBuf::from("deckhand.toml");
    if local.exists() {
        return Ok(local);
    }
    Ok(config_dir()?.join("playbook.toml"))
}

/// Inventory to use when `--inventory` is not given, if one exists
pub fn default_inventory() -> Option<PathBuf> {
    let local = PathBuf::from("inventory.toml");
    if local.exists() {
        return Some(local);
    }
    config_dir()
        .ok()
        .map(|dir| dir.join("inventory.toml"))
        .filter(|path| path.exists())
}

/// Resolve `path` relative to the directory containing `base_file`
pub fn relative_to(base_file: &Path, path: &str) -> PathBuf {
    let expanded = expand(path);
    if expanded.is_absolute() {
        return expanded;
    }
    base_file
        .parent()
        .map_or_else(|| expanded.clone(), |dir| dir.join(&expanded))
}

/// Expand ~ and environment variables in a path string.
///
/// Unknown variables leave the string unchanged.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}
