//! Running a playbook on inventory hosts
//!
//! Every selected host is prepared first: variables layered, tasks built
//! and the plan checked. Runs start only once all hosts planned cleanly, so
//! a plan-time error on one host leaves every host untouched. Each host then
//! runs its tasks strictly in order; hosts run in parallel, up to `forks`
//! at a time, and share nothing mutable.

use super::planner::build_tasks;
use crate::config::VarSources;
use crate::paths;
use crate::schema::{ConnectionKind, HostSpec, Inventory, Playbook};
use anyhow::{Context, Result};
use declarative::{HostContext, Plan, ProgressCallback, RunOptions, RunReport, SecretStore, Task};
use hostkit::{Connection, LocalConnection, SshConfig, SshConnection};
use rayon::prelude::*;
use std::collections::BTreeSet;
use stencil::{Renderer, Vars};

/// Settings shared by the runs on every host
#[derive(Debug, Clone, Default)]
pub struct RunSettings {
    /// Selected tags; empty selects every task
    pub tags: BTreeSet<String>,
    pub options: RunOptions,
    /// Maximum number of hosts running at once
    pub forks: usize,
}

/// A host with its variables, tasks and connection, ready to run
pub struct HostPlan {
    pub name: String,
    pub vars: Vars,
    pub tasks: Vec<Task>,
    conn: Box<dyn Connection>,
}

impl std::fmt::Debug for HostPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostPlan")
            .field("name", &self.name)
            .field("tasks", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

/// Connection to a host as the inventory describes it
pub fn connect(name: &str, spec: &HostSpec) -> Box<dyn Connection> {
    match spec.connection {
        ConnectionKind::Local => Box::new(LocalConnection::new(name)),
        ConnectionKind::Ssh => {
            let mut config = SshConfig::new(name, spec.address.as_deref().unwrap_or(name));
            config.user = spec.user.clone();
            config.port = spec.port;
            config.identity_file = spec.identity_file.as_deref().map(paths::expand);
            Box::new(SshConnection::new(config))
        }
    }
}

/// Build and check the tasks of every host.
///
/// `connector` opens the connection for a host; nothing is sent over it
/// until the run starts.
pub fn prepare<C>(
    playbook: &Playbook,
    inventory: &Inventory,
    hosts: &[(&str, &HostSpec)],
    sources: &VarSources,
    renderer: &Renderer,
    tags: &BTreeSet<String>,
    connector: C,
) -> Result<Vec<HostPlan>>
where
    C: Fn(&str, &HostSpec) -> Box<dyn Connection>,
{
    hosts
        .iter()
        .map(|&(name, spec)| {
            let vars = sources.for_host(inventory, name, spec);
            let tasks = build_tasks(playbook, renderer, &vars)
                .with_context(|| format!("Cannot plan host '{name}'"))?;
            let plan =
                Plan::build(&tasks, tags).with_context(|| format!("Cannot plan host '{name}'"))?;
            log::debug!("[{name}] {} of {} task(s) selected", plan.len(), plan.total());

            Ok(HostPlan {
                name: name.to_string(),
                vars,
                tasks,
                conn: connector(name, spec),
            })
        })
        .collect()
}

/// Run every prepared host and return the reports in host order.
///
/// `progress` creates the progress callback of each host run.
pub fn run_hosts<P, F>(
    hosts: &[HostPlan],
    renderer: &Renderer,
    secrets: &dyn SecretStore,
    settings: &RunSettings,
    progress: F,
) -> Result<Vec<RunReport>>
where
    P: ProgressCallback,
    F: Fn() -> P + Sync,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(settings.forks.clamp(1, hosts.len().max(1)))
        .build()
        .context("Failed to create host thread pool")?;

    log::info!(
        "Running on {} host(s), {} at a time",
        hosts.len(),
        settings.forks.max(1)
    );

    pool.install(|| {
        hosts
            .par_iter()
            .map(|plan| {
                let host = HostContext::new(plan.conn.as_ref(), &plan.vars, renderer, secrets);
                let mut progress = progress();
                declarative::run(&plan.tasks, &settings.tags, host, &settings.options, &mut progress)
                    .with_context(|| format!("Run on host '{}' failed", plan.name))
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{NoProgress, NoSecrets, Outcome};
    use hostkit::{CommandOutput, MockConnection};
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    const PLAYBOOK: &str = r#"
name = "web"

[vars]
app_name = "shop"
server_name = "shop.example.org"

[[tasks]]
id = "packages"
kind = "package_set"
packages = ["nginx", "git"]
tags = ["serverpkgs"]
become = true

[[tasks]]
id = "app-dir"
kind = "directory"
path = "/srv/{{ app_name }}"
depends_on = ["packages"]

[[tasks]]
id = "proxy"
kind = "templated_file"
template = "nginx.conf.j2"
dest = "/etc/nginx/sites-enabled/{{ app_name }}"
tags = ["nginx"]
depends_on = ["app-dir"]
become = true
"#;

    const INVENTORY: &str = r#"
[groups.web]
vars = { server_name = "www.example.org" }

[hosts.web1]
address = "10.0.0.5"
groups = ["web"]

[hosts.web2]
address = "10.0.0.6"
"#;

    /// Hosts with the packages installed and the app directory in place
    struct Fleet {
        hosts: BTreeMap<String, MockConnection>,
    }

    impl Fleet {
        fn new(names: &[&str]) -> Self {
            let hosts = names
                .iter()
                .map(|&name| {
                    let host = MockConnection::new(name);
                    host.respond("dpkg-query", CommandOutput::ok("nginx\tii \ngit\tii \n"));
                    host.add_dir("/srv/shop");
                    host.add_dir("/etc/nginx/sites-enabled");
                    (name.to_string(), host)
                })
                .collect();
            Self { hosts }
        }

        fn connector(&self) -> impl Fn(&str, &HostSpec) -> Box<dyn Connection> + '_ {
            move |name, _| Box::new(self.hosts[name].clone()) as Box<dyn Connection>
        }
    }

    fn renderer() -> Renderer {
        let mut renderer = Renderer::new();
        renderer.add("nginx.conf.j2", "server {\n    server_name {{ server_name }};\n}\n");
        renderer
    }

    fn playbook() -> Playbook {
        let mut playbook: Playbook = toml::from_str(PLAYBOOK).unwrap();
        playbook.path = "/deploy/deckhand.toml".into();
        playbook
    }

    fn run(
        fleet: &Fleet,
        inventory: &Inventory,
        tags: &[&str],
        options: RunOptions,
    ) -> Vec<RunReport> {
        let playbook = playbook();
        let renderer = renderer();
        let sources = VarSources::load(&playbook, &[] as &[&str], &[]).unwrap();
        let settings = RunSettings {
            tags: tags.iter().map(|t| (*t).to_string()).collect(),
            options,
            forks: 2,
        };
        let hosts = inventory.select(&[]).unwrap();
        let plans = prepare(
            &playbook,
            inventory,
            &hosts,
            &sources,
            &renderer,
            &settings.tags,
            fleet.connector(),
        )
        .unwrap();
        run_hosts(&plans, &renderer, &NoSecrets, &settings, || NoProgress).unwrap()
    }

    fn outcomes(report: &RunReport) -> Vec<&'static str> {
        report
            .results
            .iter()
            .map(|r| r.outcome.label(report.check))
            .collect()
    }

    #[test]
    fn test_converged_host_only_renders_proxy_config() {
        let fleet = Fleet::new(&["localhost"]);
        let inventory = Inventory::localhost();

        let reports = run(&fleet, &inventory, &[], RunOptions::default());
        assert_eq!(outcomes(&reports[0]), ["unchanged", "unchanged", "applied"]);
        assert_eq!(
            fleet.hosts["localhost"]
                .content("/etc/nginx/sites-enabled/shop")
                .unwrap(),
            b"server {\n    server_name shop.example.org;\n}\n"
        );

        let reports = run(&fleet, &inventory, &[], RunOptions::default());
        assert_eq!(outcomes(&reports[0]), ["unchanged", "unchanged", "unchanged"]);
    }

    #[test]
    fn test_check_mode_writes_nothing() {
        let fleet = Fleet::new(&["localhost"]);
        let options = RunOptions {
            check: true,
            ..RunOptions::default()
        };

        let reports = run(&fleet, &Inventory::localhost(), &[], options);
        assert_eq!(outcomes(&reports[0]), ["unchanged", "unchanged", "would change"]);
        assert!(fleet.hosts["localhost"].content("/etc/nginx/sites-enabled/shop").is_none());
    }

    #[test]
    fn test_tag_selection_skips_unselected() {
        let fleet = Fleet::new(&["localhost"]);
        let reports = run(&fleet, &Inventory::localhost(), &["serverpkgs"], RunOptions::default());

        let report = &reports[0];
        assert_eq!(report.results[0].task_id, "packages");
        assert_eq!(report.results[0].outcome, Outcome::Unchanged);
        assert!(
            report.results[1..]
                .iter()
                .all(|r| r.outcome == Outcome::skipped("not selected by tags"))
        );
    }

    #[test]
    fn test_hosts_get_their_own_variables() {
        let fleet = Fleet::new(&["web1", "web2"]);
        let inventory: Inventory = toml::from_str(INVENTORY).unwrap();

        let reports = run(&fleet, &inventory, &["nginx"], RunOptions::default());
        assert_eq!(
            reports.iter().map(|r| r.host.as_str()).collect::<Vec<_>>(),
            ["web1", "web2"]
        );
        assert!(reports.iter().all(RunReport::is_success));

        let config = |host: &str| {
            String::from_utf8(fleet.hosts[host].content("/etc/nginx/sites-enabled/shop").unwrap())
                .unwrap()
        };
        assert!(config("web1").contains("server_name www.example.org;"));
        assert!(config("web2").contains("server_name shop.example.org;"));
    }

    #[test]
    fn test_plan_error_on_one_host_touches_no_host() {
        let fleet = Fleet::new(&["web1", "web2"]);
        let inventory: Inventory = toml::from_str(
            r#"
[hosts.web1]

[hosts.web2]
vars = { app_name = "../shop" }
"#,
        )
        .unwrap();
        let playbook = playbook();
        let sources = VarSources::load(&playbook, &[] as &[&str], &[]).unwrap();
        let hosts = inventory.select(&[]).unwrap();

        let err = prepare(
            &playbook,
            &inventory,
            &hosts,
            &sources,
            &renderer(),
            &BTreeSet::new(),
            fleet.connector(),
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("web2"));
        assert!(fleet.hosts.values().all(|h| h.log().is_empty()));
    }

    #[test]
    fn test_progress_is_per_host() {
        struct Seen<'a>(&'a Mutex<Vec<String>>);

        impl ProgressCallback for Seen<'_> {
            fn on_run_start(&mut self, host: &str, _count: usize) {
                self.0.lock().unwrap().push(host.to_string());
            }
            fn on_task_start(&mut self, _host: &str, _task_id: &str, _description: &str) {}
            fn on_task_complete(&mut self, _host: &str, _result: &declarative::TaskResult) {}
        }

        let fleet = Fleet::new(&["web1", "web2"]);
        let inventory: Inventory = toml::from_str(INVENTORY).unwrap();
        let playbook = playbook();
        let renderer = renderer();
        let sources = VarSources::load(&playbook, &[] as &[&str], &[]).unwrap();
        let settings = RunSettings {
            forks: 4,
            ..RunSettings::default()
        };
        let hosts = inventory.select(&[]).unwrap();
        let plans = prepare(
            &playbook,
            &inventory,
            &hosts,
            &sources,
            &renderer,
            &settings.tags,
            fleet.connector(),
        )
        .unwrap();

        let seen = Mutex::new(Vec::new());
        run_hosts(&plans, &renderer, &NoSecrets, &settings, || Seen(&seen)).unwrap();
        let mut seen = seen.into_inner().unwrap();
        seen.sort();
        assert_eq!(seen, ["web1", "web2"]);
    }

    #[test]
    fn test_connect_kinds() {
        let local = connect(
            "localhost",
            &HostSpec {
                connection: ConnectionKind::Local,
                ..HostSpec::default()
            },
        );
        assert_eq!(local.host(), "localhost");

        let remote = connect("web1", &HostSpec::default());
        assert_eq!(remote.host(), "web1");
    }
}
