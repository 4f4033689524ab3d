//! Stand-in for a task whose descriptor could not be rendered

use declarative::{ApplyContext, ApplyResult, Error, Resource, ResourceState, Result};

/// A descriptor whose string fields failed to render for this host.
///
/// The task still takes its place in the plan, so its guard can skip it and
/// its dependents are blocked; only applying it fails.
#[derive(Debug, Clone)]
pub struct Deferred {
    pub task_id: String,
    pub kind: String,
    pub error: stencil::Error,
}

impl Deferred {
    pub fn new(task_id: impl Into<String>, kind: impl Into<String>, error: stencil::Error) -> Self {
        Self {
            task_id: task_id.into(),
            kind: kind.into(),
            error,
        }
    }

    fn fail<T>(&self) -> Result<T> {
        Err(Error::Template(self.error.clone()))
    }
}

impl Resource for Deferred {
    fn id(&self) -> String {
        self.task_id.clone()
    }

    fn description(&self) -> String {
        format!("{} (unrendered)", self.kind)
    }

    fn resource_type(&self) -> &'static str {
        "deferred"
    }

    fn current_state(&self, _ctx: &ApplyContext) -> Result<ResourceState> {
        self.fail()
    }

    fn desired_state(&self, _ctx: &ApplyContext) -> Result<ResourceState> {
        self.fail()
    }

    fn apply(&self, _ctx: &ApplyContext) -> Result<ApplyResult> {
        self.fail()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::tests::Harness;
    use declarative::ErrorCategory;

    #[test]
    fn test_apply_reports_template_error() {
        let harness = Harness::new();
        let error = stencil::Error::Undefined {
            origin: "task 'app-dir'".into(),
            line: 1,
            name: "app_name".into(),
        };
        let deferred = Deferred::new("app-dir", "directory", error);

        let err = deferred.apply(&harness.ctx(false)).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Template);
        assert!(err.to_string().contains("app_name"));
        assert!(deferred.needs_apply(&harness.ctx(false)).is_err());
        assert!(harness.host.log().is_empty());
    }
}
