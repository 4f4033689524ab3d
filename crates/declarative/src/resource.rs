//! Resource trait for declarative state management
//!
//! A Resource represents something on a host that can be in a certain
//! state, and can be changed to reach a desired state.

use crate::context::ApplyContext;
use crate::error::Result;
use crate::types::{ApplyResult, ResourceState, SudoRequirement};
use std::fmt;

/// Core trait for declarative resources
///
/// Every resource kind implements this trait, which provides:
/// - Identity (id, description, type)
/// - Structural validation
/// - State detection (current vs desired), queried fresh on every call
/// - State convergence (apply)
/// - Privilege requirements
///
/// `apply` must be idempotent: when the host already matches the desired
/// state it returns [`ApplyResult::NoChange`] without side effects.
pub trait Resource: Send + Sync + fmt::Debug {
    /// Identifier of the managed object (a path, a package list, a unit name)
    fn id(&self) -> String;

    /// Human-readable description of what this resource does
    fn description(&self) -> String;

    /// Resource type category, e.g. "package_set" or "templated_file"
    fn resource_type(&self) -> &'static str;

    /// Whether this resource requires elevated privileges
    fn sudo_requirement(&self) -> SudoRequirement {
        SudoRequirement::None
    }

    /// Structural problems with the descriptor's fields.
    ///
    /// Must not touch the network or the filesystem. An empty list means
    /// the descriptor is valid.
    fn validate(&self) -> Vec<String> {
        Vec::new()
    }

    /// Detect the current state of this resource on the host
    fn current_state(&self, ctx: &ApplyContext) -> Result<ResourceState>;

    /// The state this resource should be in
    fn desired_state(&self, ctx: &ApplyContext) -> Result<ResourceState>;

    /// Check if the resource needs changes to reach desired state
    ///
    /// Default implementation compares current and desired states.
    fn needs_apply(&self, ctx: &ApplyContext) -> Result<bool> {
        let current = self.current_state(ctx)?;
        let desired = self.desired_state(ctx)?;
        Ok(current != desired)
    }

    /// Apply the minimal change to reach the desired state
    fn apply(&self, ctx: &ApplyContext) -> Result<ApplyResult>;

    /// Unified diff of the content a change would write, if the kind has
    /// file content and it differs
    fn content_diff(&self, _ctx: &ApplyContext) -> Result<Option<String>> {
        Ok(None)
    }
}

/// A boxed resource for type-erased storage
pub type BoxedResource = Box<dyn Resource>;

/// Extension trait for working with boxed resources
pub trait ResourceExt {
    /// Check if the resource requires sudo based on its requirement
    fn requires_sudo(&self) -> bool;
}

impl<R: Resource + ?Sized> ResourceExt for R {
    fn requires_sudo(&self) -> bool {
        matches!(self.sudo_requirement(), SudoRequirement::Required { .. })
    }
}
