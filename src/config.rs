//! Variable layering: playbook, vars files, inventory and overrides

use crate::schema::{HostSpec, Inventory, Playbook};
use anyhow::{Context, Result, bail};
use std::collections::BTreeMap;
use std::path::Path;
use stencil::{Value, Vars};

/// Convert a TOML value into a template value
pub fn value_from_toml(value: &toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::Str(s.clone()),
        toml::Value::Integer(i) => Value::Int(*i),
        toml::Value::Float(f) => Value::Float(*f),
        toml::Value::Boolean(b) => Value::Bool(*b),
        toml::Value::Datetime(dt) => Value::Str(dt.to_string()),
        toml::Value::Array(items) => Value::List(items.iter().map(value_from_toml).collect()),
        toml::Value::Table(table) => Value::Map(
            table
                .iter()
                .map(|(k, v)| (k.clone(), value_from_toml(v)))
                .collect(),
        ),
    }
}

/// Convert a TOML table into a variable layer
pub fn vars_from_table(table: &toml::Table) -> Vars {
    table
        .iter()
        .map(|(k, v)| (k.clone(), value_from_toml(v)))
        .collect()
}

/// Load a `--vars-file` (a TOML table of variables)
pub fn load_vars_file(path: &Path) -> Result<Vars> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Could not read vars file: {}", path.display()))?;
    let table: toml::Table = toml::from_str(&content)
        .with_context(|| format!("Invalid vars file: {}", path.display()))?;
    Ok(vars_from_table(&table))
}

/// Parse a `-e key=value` override.
///
/// The value is read as a TOML literal (`port=8080`, `debug=true`,
/// `domains=["a.org","b.org"]`); anything that is not valid TOML is kept
/// as a plain string.
pub fn parse_extra_var(arg: &str) -> Result<(String, Value)> {
    let Some((key, raw)) = arg.split_once('=') else {
        bail!("Invalid extra var '{arg}': expected key=value");
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("Invalid extra var '{arg}': empty key");
    }

    let value = toml::from_str::<toml::Table>(&format!("v = {raw}"))
        .ok()
        .and_then(|t| t.get("v").map(value_from_toml))
        .unwrap_or_else(|| Value::Str(raw.to_string()));
    Ok((key.to_string(), value))
}

/// Variable sources shared by every host of a run
#[derive(Debug, Clone, Default)]
pub struct VarSources {
    /// Playbook `[vars]`
    pub defaults: Vars,
    /// `--vars-file` layers, in the order given
    pub files: Vec<Vars>,
    /// `-e` overrides
    pub overrides: Vars,
}

impl VarSources {
    /// Collect the run-wide layers from the playbook and the command line
    pub fn load(playbook: &Playbook, vars_files: &[impl AsRef<Path>], extra: &[String]) -> Result<Self> {
        let files = vars_files
            .iter()
            .map(|p| load_vars_file(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        let mut overrides = Vars::new();
        for arg in extra {
            let (key, value) = parse_extra_var(arg)?;
            overrides.insert(key, value);
        }
        Ok(Self {
            defaults: vars_from_table(&playbook.vars),
            files,
            overrides,
        })
    }

    /// The full variable context for one host.
    ///
    /// Later layers replace whole top-level keys of earlier ones:
    /// defaults < vars files < group vars < host vars < host facts < overrides.
    pub fn for_host(&self, inventory: &Inventory, name: &str, host: &HostSpec) -> Vars {
        let mut vars = self.defaults.clone();
        for file in &self.files {
            vars.overlay(file);
        }
        for group in &host.groups {
            if let Some(spec) = inventory.groups.get(group) {
                vars.overlay(&vars_from_table(&spec.vars));
            }
        }
        vars.overlay(&vars_from_table(&host.vars));
        vars.insert("host", host_facts(name, host));
        vars.overlay(&self.overrides);
        vars
    }
}

/// `host.name`, `host.address` and `host.user`
fn host_facts(name: &str, host: &HostSpec) -> Value {
    let user = host
        .user
        .clone()
        .or_else(|| std::env::var("USER").ok())
        .unwrap_or_else(|| "root".to_string());
    let mut facts = BTreeMap::new();
    facts.insert("name".to_string(), Value::from(name));
    facts.insert(
        "address".to_string(),
        Value::from(host.address.clone().unwrap_or_else(|| name.to_string())),
    );
    facts.insert("user".to_string(), Value::from(user));
    Value::Map(facts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn inventory() -> Inventory {
        toml::from_str(
            r#"
[groups.web]
vars = { port = 80, tier = "web" }

[groups.canary]
vars = { port = 8080 }

[hosts.web1]
address = "10.0.0.5"
user = "deploy"
groups = ["web", "canary"]
vars = { tier = "edge" }
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_parse_extra_var_literals() {
        assert_eq!(parse_extra_var("port=8080").unwrap().1, Value::Int(8080));
        assert_eq!(parse_extra_var("debug=true").unwrap().1, Value::Bool(true));
        assert_eq!(
            parse_extra_var("domains=[\"a.org\", \"b.org\"]").unwrap().1,
            Value::List(vec![Value::from("a.org"), Value::from("b.org")])
        );
        assert_eq!(
            parse_extra_var("name=shop").unwrap(),
            ("name".to_string(), Value::from("shop"))
        );
        assert_eq!(parse_extra_var("url=http://x/?a=b").unwrap().1, Value::from("http://x/?a=b"));
    }

    #[test]
    fn test_parse_extra_var_errors() {
        assert!(parse_extra_var("novalue").is_err());
        assert!(parse_extra_var("=x").is_err());
    }

    #[test]
    fn test_layering_precedence() {
        let inventory = inventory();
        let mut defaults = Vars::new();
        defaults.insert("port", 22_i64);
        defaults.insert("app", "shop");
        defaults.insert("tier", "none");
        let mut file = Vars::new();
        file.insert("app", "shop-staging");
        let mut overrides = Vars::new();
        overrides.insert("app", "shop-cli");

        let sources = VarSources {
            defaults,
            files: vec![file],
            overrides,
        };
        let vars = sources.for_host(&inventory, "web1", &inventory.hosts["web1"]);

        // canary comes after web in the host's group list
        assert_eq!(vars.get("port"), Some(&Value::Int(8080)));
        assert_eq!(vars.get("tier"), Some(&Value::from("edge")));
        assert_eq!(vars.get("app"), Some(&Value::from("shop-cli")));
        assert_eq!(vars.lookup("host.address"), Some(&Value::from("10.0.0.5")));
        assert_eq!(vars.lookup("host.user"), Some(&Value::from("deploy")));
        assert_eq!(vars.lookup("host.name"), Some(&Value::from("web1")));
    }

    #[test]
    fn test_load_vars_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("staging.toml");
        std::fs::write(&path, "domains = [\"a.org\"]\n[db]\nhost = \"db1\"\n").unwrap();

        let vars = load_vars_file(&path).unwrap();
        assert_eq!(vars.lookup("db.host"), Some(&Value::from("db1")));
        assert!(load_vars_file(&dir.path().join("missing.toml")).is_err());
    }
}
