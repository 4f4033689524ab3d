//! Execution planner - selects tasks by tag and orders them by dependency

use crate::error::{Error, Result};
use crate::task::Task;
use std::collections::{BTreeMap, BTreeSet};

/// Tasks selected for a run, in execution order.
///
/// Produced by [`Plan::build`]; the order respects every `depends_on` edge
/// and breaks ties by declaration order, so it is the same on every run.
#[derive(Debug)]
pub struct Plan<'a> {
    tasks: &'a [Task],
    order: Vec<usize>,
    unselected: Vec<usize>,
}

impl<'a> Plan<'a> {
    /// Validate the task set, select by tags and order topologically.
    ///
    /// An empty `selected_tags` selects every task. Otherwise a task is
    /// selected when one of its tags is selected, or when a selected task
    /// depends on it (transitively).
    ///
    /// Fails before anything runs on duplicate ids, unknown dependencies,
    /// invalid descriptors, or a dependency cycle among the selected tasks.
    pub fn build(tasks: &'a [Task], selected_tags: &BTreeSet<String>) -> Result<Self> {
        let index = index_tasks(tasks)?;

        for task in tasks {
            let problems = task.resource.validate();
            if !problems.is_empty() {
                return Err(Error::InvalidDescriptor {
                    task: task.id.clone(),
                    problems,
                });
            }
        }

        let selected = select(tasks, &index, selected_tags);
        let order = topological_order(tasks, &index, &selected)?;
        let unselected = (0..tasks.len()).filter(|i| !selected.contains(i)).collect();

        log::debug!(
            "Planned {} of {} task(s): {}",
            order.len(),
            tasks.len(),
            order
                .iter()
                .map(|&i| tasks[i].id.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(Self {
            tasks,
            order,
            unselected,
        })
    }

    /// Selected tasks in execution order
    pub fn ordered(&self) -> impl Iterator<Item = &'a Task> + '_ {
        self.order.iter().map(|&i| &self.tasks[i])
    }

    /// Tasks left out by tag selection, in declaration order
    pub fn unselected(&self) -> impl Iterator<Item = &'a Task> + '_ {
        self.unselected.iter().map(|&i| &self.tasks[i])
    }

    /// Number of selected tasks
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Total number of tasks, selected or not
    pub fn total(&self) -> usize {
        self.tasks.len()
    }
}

/// Every tag used by `tasks`, sorted
pub fn all_tags(tasks: &[Task]) -> BTreeSet<String> {
    tasks.iter().flat_map(|t| t.tags.iter().cloned()).collect()
}

fn index_tasks(tasks: &[Task]) -> Result<BTreeMap<&str, usize>> {
    let mut index = BTreeMap::new();
    for (i, task) in tasks.iter().enumerate() {
        if index.insert(task.id.as_str(), i).is_some() {
            return Err(Error::DuplicateTask(task.id.clone()));
        }
    }
    for task in tasks {
        if let Some(missing) = task.depends_on.iter().find(|d| !index.contains_key(d.as_str())) {
            return Err(Error::UnknownDependency {
                task: task.id.clone(),
                dependency: missing.clone(),
            });
        }
    }
    Ok(index)
}

fn select(
    tasks: &[Task],
    index: &BTreeMap<&str, usize>,
    selected_tags: &BTreeSet<String>,
) -> BTreeSet<usize> {
    if selected_tags.is_empty() {
        return (0..tasks.len()).collect();
    }

    let mut selected = BTreeSet::new();
    let mut stack: Vec<usize> = tasks
        .iter()
        .enumerate()
        .filter(|(_, t)| t.matches_tags(selected_tags))
        .map(|(i, _)| i)
        .collect();

    while let Some(i) = stack.pop() {
        if selected.insert(i) {
            stack.extend(tasks[i].depends_on.iter().map(|d| index[d.as_str()]));
        }
    }
    selected
}

/// Kahn's algorithm; the ready set is ordered by declaration index
fn topological_order(
    tasks: &[Task],
    index: &BTreeMap<&str, usize>,
    selected: &BTreeSet<usize>,
) -> Result<Vec<usize>> {
    let mut pending: BTreeMap<usize, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<usize, Vec<usize>> = BTreeMap::new();

    for &i in selected {
        let deps: Vec<usize> = tasks[i]
            .depends_on
            .iter()
            .map(|d| index[d.as_str()])
            .filter(|d| selected.contains(d))
            .collect();
        pending.insert(i, deps.len());
        for d in deps {
            dependents.entry(d).or_default().push(i);
        }
    }

    let mut ready: BTreeSet<usize> = pending
        .iter()
        .filter(|&(_, &n)| n == 0)
        .map(|(&i, _)| i)
        .collect();
    let mut order = Vec::with_capacity(selected.len());

    while let Some(i) = ready.pop_first() {
        order.push(i);
        for &dependent in dependents.get(&i).map(Vec::as_slice).unwrap_or_default() {
            if let Some(n) = pending.get_mut(&dependent) {
                *n -= 1;
                if *n == 0 {
                    ready.insert(dependent);
                }
            }
        }
    }

    if order.len() < selected.len() {
        let placed: BTreeSet<usize> = order.iter().copied().collect();
        let remaining: BTreeSet<usize> = selected.difference(&placed).copied().collect();
        return Err(Error::CyclicDependency {
            cycle: find_cycle(tasks, index, &remaining),
        });
    }
    Ok(order)
}

/// Walk dependency edges among `remaining` until a task repeats.
///
/// Every task left over by Kahn's algorithm has a dependency that is also
/// left over, so the walk always closes a loop.
fn find_cycle(
    tasks: &[Task],
    index: &BTreeMap<&str, usize>,
    remaining: &BTreeSet<usize>,
) -> Vec<String> {
    let Some(&start) = remaining.first() else {
        return Vec::new();
    };
    let mut path = vec![start];
    let mut current = start;

    loop {
        let next = tasks[current]
            .depends_on
            .iter()
            .map(|d| index[d.as_str()])
            .find(|d| remaining.contains(d));
        let Some(next) = next else {
            break;
        };
        if let Some(pos) = path.iter().position(|&p| p == next) {
            let mut cycle: Vec<String> = path[pos..].iter().map(|&i| tasks[i].id.clone()).collect();
            // Report in execution direction: dependency before dependent
            cycle.reverse();
            cycle.push(cycle[0].clone());
            return cycle;
        }
        path.push(next);
        current = next;
    }

    path.iter().map(|&i| tasks[i].id.clone()).collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::context::ApplyContext;
    use crate::resource::Resource;
    use crate::types::{ApplyResult, ResourceState};

    /// Resource with no host interaction, for planner and runner tests
    #[derive(Debug)]
    pub(crate) struct Noop {
        pub problems: Vec<String>,
    }

    impl Resource for Noop {
        fn id(&self) -> String {
            "noop".into()
        }
        fn description(&self) -> String {
            "Do nothing".into()
        }
        fn resource_type(&self) -> &'static str {
            "noop"
        }
        fn validate(&self) -> Vec<String> {
            self.problems.clone()
        }
        fn current_state(&self, _ctx: &ApplyContext) -> Result<ResourceState> {
            Ok(ResourceState::present("noop"))
        }
        fn desired_state(&self, _ctx: &ApplyContext) -> Result<ResourceState> {
            Ok(ResourceState::present("noop"))
        }
        fn apply(&self, _ctx: &ApplyContext) -> Result<ApplyResult> {
            Ok(ApplyResult::NoChange)
        }
    }

    pub(crate) fn task(id: &str, tags: &[&str], deps: &[&str]) -> Task {
        Task::new(id, Box::new(Noop { problems: vec![] }))
            .tags(tags.iter().copied())
            .depends_on(deps.iter().copied())
    }

    fn tags(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(ToString::to_string).collect()
    }

    fn ids(plan: &Plan) -> Vec<String> {
        plan.ordered().map(|t| t.id.clone()).collect()
    }

    #[test]
    fn test_order_respects_dependencies() {
        let tasks = vec![
            task("proxy-config", &["nginx"], &["app-dir"]),
            task("packages", &["serverpkgs"], &[]),
            task("app-dir", &[], &["packages"]),
        ];
        let plan = Plan::build(&tasks, &BTreeSet::new()).unwrap();
        assert_eq!(ids(&plan), ["packages", "app-dir", "proxy-config"]);
    }

    #[test]
    fn test_ties_broken_by_declaration_order() {
        let tasks = vec![
            task("c", &[], &[]),
            task("a", &[], &[]),
            task("b", &[], &["c"]),
        ];
        let plan = Plan::build(&tasks, &BTreeSet::new()).unwrap();
        assert_eq!(ids(&plan), ["c", "a", "b"]);
    }

    #[test]
    fn test_tag_selection_includes_transitive_dependencies() {
        let tasks = vec![
            task("packages", &["serverpkgs"], &[]),
            task("app-dir", &[], &["packages"]),
            task("proxy-config", &["nginx"], &["app-dir"]),
            task("venv", &["python"], &[]),
        ];
        let plan = Plan::build(&tasks, &tags(&["nginx"])).unwrap();
        assert_eq!(ids(&plan), ["packages", "app-dir", "proxy-config"]);
        assert_eq!(
            plan.unselected().map(|t| t.id.as_str()).collect::<Vec<_>>(),
            ["venv"]
        );
    }

    #[test]
    fn test_cycle_detected() {
        let tasks = vec![
            task("a", &[], &["c"]),
            task("b", &[], &["a"]),
            task("c", &[], &["b"]),
            task("free", &[], &[]),
        ];
        let err = Plan::build(&tasks, &BTreeSet::new()).unwrap_err();
        let Error::CyclicDependency { cycle } = err else {
            panic!("expected a dependency cycle");
        };
        assert_eq!(cycle.first(), cycle.last());
        assert_eq!(cycle.len(), 4);
    }

    #[test]
    fn test_cycle_outside_selection_is_ignored() {
        let tasks = vec![
            task("a", &["x"], &["b"]),
            task("b", &["x"], &["a"]),
            task("c", &["web"], &[]),
        ];
        let plan = Plan::build(&tasks, &tags(&["web"])).unwrap();
        assert_eq!(ids(&plan), ["c"]);
    }

    #[test]
    fn test_unknown_dependency_and_duplicates() {
        let tasks = vec![task("a", &[], &["ghost"])];
        assert!(matches!(
            Plan::build(&tasks, &BTreeSet::new()).unwrap_err(),
            Error::UnknownDependency { .. }
        ));

        let tasks = vec![task("a", &[], &[]), task("a", &[], &[])];
        assert!(matches!(
            Plan::build(&tasks, &BTreeSet::new()).unwrap_err(),
            Error::DuplicateTask(_)
        ));
    }

    #[test]
    fn test_invalid_descriptor_aborts_planning() {
        let tasks = vec![Task::new(
            "bad",
            Box::new(Noop {
                problems: vec!["dest: required".into()],
            }),
        )];
        let err = Plan::build(&tasks, &BTreeSet::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidDescriptor { ref task, .. } if task == "bad"));
    }

    #[test]
    fn test_all_tags() {
        let tasks = vec![task("a", &["nginx", "web"], &[]), task("b", &["app"], &[])];
        assert_eq!(all_tags(&tasks), tags(&["app", "nginx", "web"]));
    }
}
