//! # Declarative
//!
//! Dependency-ordered, idempotent convergence of hosts to a desired state.
//!
//! ## Core Concepts
//!
//! - **Resource**: something on a host with a current and a desired state
//! - **Task**: a resource plus id, tags, dependencies, privilege and guard
//! - **Plan**: the tasks selected by tag, in dependency order
//! - **Runner**: executes a plan on one host under a failure policy
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{HostContext, NoProgress, NoSecrets, RunOptions, Task, run};
//! use hostkit::LocalConnection;
//! use stencil::{Renderer, Vars};
//!
//! let conn = LocalConnection::default();
//! let vars = Vars::new();
//! let renderer = Renderer::new();
//! let host = HostContext::new(&conn, &vars, &renderer, &NoSecrets);
//!
//! let tasks = vec![Task::new("motd", Box::new(my_resource)).tags(["base"])];
//! let report = run(&tasks, &Default::default(), host, &RunOptions::default(), &mut NoProgress)?;
//! assert!(report.is_success());
//! ```
//!
//! ## Provider Traits
//!
//! Host access, secrets and progress reporting are injected:
//!
//! - [`hostkit::Connection`]: runs commands and moves files on the host
//! - [`SecretStore`]: resolves secret references at apply time
//! - [`ProgressCallback`]: receives per-task progress
//!
//! so resources can be exercised against `hostkit::MockConnection` in tests.

pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod planner;
pub mod report;
pub mod resource;
pub mod retry;
pub mod task;
pub mod types;

pub use context::{
    ApplyContext, HostContext, NoProgress, NoSecrets, ProgressCallback, SecretStore, StaticSecrets,
};
pub use diff::unified_diff;
pub use error::{Error, ErrorCategory, Result};
pub use executor::{RunOptions, execute, run};
pub use planner::{Plan, all_tags};
pub use report::{Outcome, RunReport, TaskResult};
pub use resource::{BoxedResource, Resource, ResourceExt};
pub use retry::{RetryCallback, RetryConfig, with_retry};
pub use task::Task;
pub use types::{ApplyResult, ExecuteSummary, FailurePolicy, ResourceState, SudoRequirement};
