//! Execution engine for deckhand
//!
//! The engine turns a playbook into runs:
//! 1. Planning - Render descriptors per host and build its tasks
//! 2. Executing - Run each host's plan, hosts in parallel

pub mod executor;
pub mod planner;

pub use executor::{HostPlan, RunSettings, connect, prepare, run_hosts};
pub use planner::build_tasks;
