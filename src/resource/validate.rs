//! Structural checks shared by the descriptor kinds
//!
//! Each check appends a `field: problem` line, so a descriptor reports
//! every problem at once. Nothing here touches the host or the network.

use regex::Regex;

const PACKAGE_NAME: &str = r"^[a-z0-9][a-z0-9+.\-]+$";
const ACCOUNT_NAME: &str = r"^[A-Za-z_][A-Za-z0-9_.\-]*\$?$";
const MODE: &str = r"^0?[0-7]{3,4}$";
const UNIT_NAME: &str = r"^[A-Za-z0-9@._:\-]+$";
const PROGRAM_NAME: &str = r"^[A-Za-z0-9_.\-]+$";
const ENV_NAME: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";

fn matches(pattern: &str, text: &str) -> bool {
    Regex::new(pattern).is_ok_and(|re| re.is_match(text))
}

pub fn required(problems: &mut Vec<String>, field: &str, value: &str) -> bool {
    if value.trim().is_empty() {
        problems.push(format!("{field}: must not be empty"));
        return false;
    }
    true
}

/// Non-empty absolute path without `..` components
pub fn absolute_path(problems: &mut Vec<String>, field: &str, path: &str) {
    if !required(problems, field, path) {
        return;
    }
    if !path.starts_with('/') {
        problems.push(format!("{field}: must be an absolute path, got '{path}'"));
    } else if path.split('/').any(|part| part == "..") {
        problems.push(format!("{field}: must not contain '..'"));
    }
}

/// Octal permission string such as `"0644"` or `"755"`
pub fn mode(problems: &mut Vec<String>, field: &str, mode: Option<&str>) {
    if let Some(mode) = mode
        && !matches(MODE, mode)
    {
        problems.push(format!("{field}: '{mode}' is not an octal mode like \"0644\""));
    }
}

/// User or group name
pub fn account(problems: &mut Vec<String>, field: &str, name: Option<&str>) {
    if let Some(name) = name
        && !matches(ACCOUNT_NAME, name)
    {
        problems.push(format!("{field}: '{name}' is not a valid user or group name"));
    }
}

/// Debian package name
pub fn package_name(problems: &mut Vec<String>, field: &str, name: &str) {
    if !matches(PACKAGE_NAME, name) {
        problems.push(format!("{field}: '{name}' is not a valid package name"));
    }
}

/// systemd unit name
pub fn unit_name(problems: &mut Vec<String>, field: &str, name: &str) {
    if required(problems, field, name) && !matches(UNIT_NAME, name) {
        problems.push(format!("{field}: '{name}' is not a valid unit name"));
    }
}

/// supervisor program name
pub fn program_name(problems: &mut Vec<String>, field: &str, name: &str) {
    if required(problems, field, name) && !matches(PROGRAM_NAME, name) {
        problems.push(format!("{field}: '{name}' may only contain letters, digits, '.', '_' and '-'"));
    }
}

/// Environment variable name
pub fn env_name(problems: &mut Vec<String>, field: &str, name: &str) {
    if !matches(ENV_NAME, name) {
        problems.push(format!("{field}: '{name}' is not a valid environment variable name"));
    }
}

/// A single token: no whitespace, not empty
pub fn token(problems: &mut Vec<String>, field: &str, value: &str) {
    if required(problems, field, value) && value.chars().any(char::is_whitespace) {
        problems.push(format!("{field}: must not contain whitespace"));
    }
}

/// `env:NAME` or `file:PATH`
pub fn secret_ref(problems: &mut Vec<String>, field: &str, reference: Option<&str>) {
    if let Some(reference) = reference
        && !crate::secrets::is_reference(reference)
    {
        problems.push(format!(
            "{field}: must be a secret reference (env:NAME or file:PATH)"
        ));
    }
}

/// Parse an octal mode string
pub fn parse_mode(mode: &str) -> Option<u32> {
    u32::from_str_radix(mode, 8).ok()
}
