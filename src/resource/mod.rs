//! The resource kinds a playbook can declare
//!
//! A task's descriptor is parsed into one of the kinds below and handed to
//! the engine as a [`declarative::Resource`]. Each kind:
//! - validates its fields without touching the host
//! - queries the host fresh on every state check
//! - applies only the difference between current and desired state

use declarative::BoxedResource;
use serde::Deserialize;
use std::path::Path;

pub mod attrs;
pub mod deferred;
pub mod directory;
pub mod file;
pub mod git_checkout;
pub mod package_set;
pub mod pip_requirements;
pub mod remote_fetch;
pub mod service;
pub mod supervised_process;
pub mod templated_file;
pub mod validate;

pub use deferred::Deferred;
pub use directory::Directory;
pub use file::File;
pub use git_checkout::GitCheckout;
pub use package_set::PackageSet;
pub use pip_requirements::PipRequirements;
pub use remote_fetch::RemoteFetch;
pub use service::{Service, ServiceState};
pub use supervised_process::SupervisedProcess;
pub use templated_file::TemplatedFile;

/// A parsed task descriptor, tagged by `kind`
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Descriptor {
    PackageSet(PackageSet),
    Directory(Directory),
    File(File),
    TemplatedFile(TemplatedFile),
    GitCheckout(GitCheckout),
    PipRequirements(PipRequirements),
    Service(Service),
    SupervisedProcess(SupervisedProcess),
    RemoteFetch(RemoteFetch),
}

/// Every accepted `kind` value
pub const KINDS: &[&str] = &[
    "package_set",
    "directory",
    "file",
    "templated_file",
    "git_checkout",
    "pip_requirements",
    "service",
    "supervised_process",
    "remote_fetch",
];

impl Descriptor {
    /// Parse descriptor fields (including `kind`) from a TOML table
    pub fn from_table(table: toml::Table) -> Result<Self, String> {
        toml::Value::Table(table)
            .try_into()
            .map_err(|e: toml::de::Error| e.message().trim().to_string())
    }

    /// Resolve controller-side paths against the playbook directory
    pub fn with_base_dir(self, base: &Path) -> Self {
        match self {
            Self::File(file) => Self::File(file.with_base_dir(base)),
            other => other,
        }
    }

    pub fn into_resource(self) -> BoxedResource {
        match self {
            Self::PackageSet(r) => Box::new(r),
            Self::Directory(r) => Box::new(r),
            Self::File(r) => Box::new(r),
            Self::TemplatedFile(r) => Box::new(r),
            Self::GitCheckout(r) => Box::new(r),
            Self::PipRequirements(r) => Box::new(r),
            Self::Service(r) => Box::new(r),
            Self::SupervisedProcess(r) => Box::new(r),
            Self::RemoteFetch(r) => Box::new(r),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use declarative::{ApplyContext, ApplyResult, HostContext, NoSecrets, Resource, SecretStore};
    use hostkit::MockConnection;
    use stencil::{Renderer, Vars};

    fn table(source: &str) -> toml::Table {
        toml::from_str(source).unwrap()
    }

    /// Owns everything an [`ApplyContext`] borrows, for resource tests
    pub(crate) struct Harness {
        pub host: MockConnection,
        pub vars: Vars,
        pub renderer: Renderer,
        pub secrets: Box<dyn SecretStore>,
    }

    impl Harness {
        pub(crate) fn new() -> Self {
            Self {
                host: MockConnection::new("web1"),
                vars: Vars::new(),
                renderer: Renderer::new(),
                secrets: Box::new(NoSecrets),
            }
        }

        pub(crate) fn ctx(&self, privileged: bool) -> ApplyContext<'_> {
            let host = HostContext::new(&self.host, &self.vars, &self.renderer, self.secrets.as_ref());
            ApplyContext::new(host, privileged, None)
        }

        /// Apply twice and return both results; the second must be a no-op
        pub(crate) fn apply_twice(&self, resource: &dyn Resource, privileged: bool) -> ApplyResult {
            let ctx = self.ctx(privileged);
            let first = resource.apply(&ctx).unwrap();
            self.host.take_log();
            assert!(!resource.needs_apply(&ctx).unwrap(), "still needs apply after {first:?}");
            self.host.take_log();
            let second = resource.apply(&ctx).unwrap();
            assert_eq!(second, ApplyResult::NoChange);
            assert!(
                self.host.log().iter().all(|line| !line.starts_with("write ")),
                "second apply wrote files: {:?}",
                self.host.log()
            );
            first
        }
    }

    #[test]
    fn test_parse_each_kind() {
        let sources = [
            "kind = \"package_set\"\npackages = [\"nginx\"]",
            "kind = \"directory\"\npath = \"/srv/app\"",
            "kind = \"file\"\npath = \"/etc/motd\"\ncontent = \"hi\"",
            "kind = \"templated_file\"\ntemplate = \"nginx.conf\"\ndest = \"/etc/nginx/nginx.conf\"",
            "kind = \"git_checkout\"\nrepo = \"https://example.com/app.git\"\ndest = \"/srv/app\"",
            "kind = \"pip_requirements\"\nrequirements = \"/srv/app/requirements.txt\"\nvirtualenv = \"/srv/venv\"",
            "kind = \"service\"\nname = \"nginx\"",
            "kind = \"supervised_process\"\nname = \"app\"\ncommand = \"/srv/venv/bin/gunicorn app:app\"",
            "kind = \"remote_fetch\"\nurl = \"s3://bucket/key\"\ndest = \"/srv/data\"",
        ];
        for (source, kind) in sources.iter().zip(KINDS) {
            let descriptor = Descriptor::from_table(table(source)).unwrap();
            assert_eq!(descriptor.into_resource().resource_type(), *kind);
        }
    }

    #[test]
    fn test_unknown_field_and_kind_rejected() {
        let err = Descriptor::from_table(table("kind = \"directory\"\npath = \"/x\"\nmod = \"0755\""))
            .unwrap_err();
        assert!(err.contains("mod"), "{err}");

        assert!(Descriptor::from_table(table("kind = \"cron\"")).is_err());
        assert!(Descriptor::from_table(table("kind = \"file\"")).is_err());
    }
}
