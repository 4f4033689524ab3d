//! Tasks: a resource plus the metadata the planner needs

use crate::resource::BoxedResource;
use std::collections::BTreeSet;
use std::fmt;
use stencil::Expr;

/// One unit of work in a playbook.
pub struct Task {
    pub id: String,
    pub resource: BoxedResource,
    pub tags: BTreeSet<String>,
    /// Ids of tasks that must run before this one
    pub depends_on: BTreeSet<String>,
    /// Task may run privileged operations (through sudo)
    pub requires_privilege: bool,
    /// Task is skipped when this evaluates falsy
    pub guard: Option<Expr>,
}

impl Task {
    pub fn new(id: impl Into<String>, resource: BoxedResource) -> Self {
        Self {
            id: id.into(),
            resource,
            tags: BTreeSet::new(),
            depends_on: BTreeSet::new(),
            requires_privilege: false,
            guard: None,
        }
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn depends_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn privileged(mut self, privileged: bool) -> Self {
        self.requires_privilege = privileged;
        self
    }

    pub fn when(mut self, guard: Expr) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Whether any of the task's tags is in `selected`
    pub fn matches_tags(&self, selected: &BTreeSet<String>) -> bool {
        !self.tags.is_disjoint(selected)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("resource", &self.resource)
            .field("tags", &self.tags)
            .field("depends_on", &self.depends_on)
            .field("requires_privilege", &self.requires_privilege)
            .field("guard", &self.guard.as_ref().map(Expr::source))
            .finish()
    }
}
