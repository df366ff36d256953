//! Task tree construction and hierarchy validation.
//!
//! Tasks are stored flat with parent back-references. The tree is derived on
//! read from an id index plus a parent -> children index, so no task ever
//! holds a pointer to another.
//!
//! [`build_task_tree`] is lenient: a task whose parent is not in the input is
//! treated as a root, and tasks caught in a parent cycle are left out of the
//! forest. Callers that need strict checks run [`validate_hierarchy`] first.

use crate::error::{StructuralError, StructuralErrorKind};
use crate::types::{Task, TaskTree, TemplateTask};
use std::collections::{HashMap, HashSet};

/// Access to the hierarchy fields shared by template and live tasks.
pub trait Hierarchical {
    fn id(&self) -> &str;
    fn parent_task_id(&self) -> Option<&str>;
    fn milestone_id(&self) -> Option<&str>;
    fn sort_order(&self) -> i32;
    fn level(&self) -> u32;
    fn set_level(&mut self, level: u32);
}

macro_rules! impl_hierarchical {
    ($ty:ty) => {
        impl Hierarchical for $ty {
            fn id(&self) -> &str {
                &self.id
            }
            fn parent_task_id(&self) -> Option<&str> {
                self.parent_task_id.as_deref()
            }
            fn milestone_id(&self) -> Option<&str> {
                self.milestone_id.as_deref()
            }
            fn sort_order(&self) -> i32 {
                self.sort_order
            }
            fn level(&self) -> u32 {
                self.level
            }
            fn set_level(&mut self, level: u32) {
                self.level = level;
            }
        }
    };
}

impl_hierarchical!(TemplateTask);
impl_hierarchical!(Task);

/// Where a task sits relative to the roots of the forest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ancestry {
    Rooted { root: usize, depth: u32 },
    OnCycle,
    BelowCycle,
}

#[derive(Clone, Copy)]
enum Visit {
    New,
    Open,
    Done(Ancestry),
}

/// Id and child indexes over a flat task slice.
struct Index<'a, T> {
    tasks: &'a [T],
    by_id: HashMap<&'a str, usize>,
}

impl<'a, T: Hierarchical> Index<'a, T> {
    fn new(tasks: &'a [T]) -> Self {
        let mut by_id = HashMap::with_capacity(tasks.len());
        for (i, task) in tasks.iter().enumerate() {
            // First occurrence wins on duplicate ids
            by_id.entry(task.id()).or_insert(i);
        }
        Self { tasks, by_id }
    }

    fn parent_of(&self, i: usize) -> Option<usize> {
        self.tasks[i]
            .parent_task_id()
            .and_then(|pid| self.by_id.get(pid).copied())
    }

    /// Order key for siblings: sort order, then id.
    fn sibling_key(&self, i: usize) -> (i32, &str) {
        (self.tasks[i].sort_order(), self.tasks[i].id())
    }

    fn sort_siblings(&self, ids: &mut [usize]) {
        ids.sort_by(|a, b| self.sibling_key(*a).cmp(&self.sibling_key(*b)));
    }

    /// Resolve every task's root and depth by walking parent chains once.
    fn ancestry(&self) -> Vec<Ancestry> {
        let n = self.tasks.len();
        let mut state = vec![Visit::New; n];
        let mut path: Vec<usize> = Vec::new();

        for start in 0..n {
            if !matches!(state[start], Visit::New) {
                continue;
            }
            path.clear();
            let mut cur = start;

            let base = loop {
                match state[cur] {
                    Visit::New => match self.parent_of(cur) {
                        Some(parent) => {
                            state[cur] = Visit::Open;
                            path.push(cur);
                            cur = parent;
                        }
                        None => {
                            let rooted = Ancestry::Rooted {
                                root: cur,
                                depth: 0,
                            };
                            state[cur] = Visit::Done(rooted);
                            break rooted;
                        }
                    },
                    Visit::Open => {
                        let pos = path.iter().position(|&i| i == cur).unwrap_or(0);
                        for &member in &path[pos..] {
                            state[member] = Visit::Done(Ancestry::OnCycle);
                        }
                        path.truncate(pos);
                        break Ancestry::BelowCycle;
                    }
                    Visit::Done(found) => break found,
                }
            };

            let mut above = base;
            for &i in path.iter().rev() {
                above = match above {
                    Ancestry::Rooted { root, depth } => Ancestry::Rooted {
                        root,
                        depth: depth + 1,
                    },
                    Ancestry::OnCycle | Ancestry::BelowCycle => Ancestry::BelowCycle,
                };
                state[i] = Visit::Done(above);
            }
        }

        state
            .into_iter()
            .map(|v| match v {
                Visit::Done(a) => a,
                _ => Ancestry::BelowCycle,
            })
            .collect()
    }
}

/// Build a forest from a flat task list.
///
/// Roots and siblings are ordered by `sort_order`, then id, so any permutation
/// of the same input yields the same forest. Depth and section are recomputed
/// from the parent chain; stored `level` values are not trusted.
pub fn build_task_tree<T: Hierarchical + Clone>(tasks: &[T]) -> Vec<TaskTree<T>> {
    let index = Index::new(tasks);
    let mut children: HashMap<usize, Vec<usize>> = HashMap::new();
    let mut roots: Vec<usize> = Vec::new();

    for (i, task) in tasks.iter().enumerate() {
        if index.by_id.get(task.id()) != Some(&i) {
            continue;
        }
        match index.parent_of(i) {
            Some(parent) => children.entry(parent).or_default().push(i),
            None => roots.push(i),
        }
    }

    for siblings in children.values_mut() {
        index.sort_siblings(siblings);
    }
    index.sort_siblings(&mut roots);

    roots
        .into_iter()
        .map(|root| {
            let section = tasks[root].milestone_id().map(String::from);
            build_node(tasks, &children, root, 0, &section)
        })
        .collect()
}

fn build_node<T: Hierarchical + Clone>(
    tasks: &[T],
    children: &HashMap<usize, Vec<usize>>,
    i: usize,
    depth: u32,
    section: &Option<String>,
) -> TaskTree<T> {
    let kids = children
        .get(&i)
        .map(|ids| {
            ids.iter()
                .map(|&child| build_node(tasks, children, child, depth + 1, section))
                .collect()
        })
        .unwrap_or_default();

    TaskTree {
        task: tasks[i].clone(),
        depth,
        section_id: section.clone(),
        children: kids,
    }
}

/// Ids of every task in the forest, parents before children, siblings in order.
pub fn preorder_ids<T: Hierarchical>(forest: &[TaskTree<T>]) -> Vec<String> {
    let mut ids = Vec::new();
    for root in forest {
        root.walk(&mut |node| ids.push(node.task.id().to_string()));
    }
    ids
}

/// Strict hierarchy checks over a task set.
///
/// Reports duplicate ids, missing parents, parent cycles, roots without a
/// (known) milestone, and descendants whose stored milestone disagrees with
/// their root's. A duplicated id is reported once; its other occurrences are
/// not checked further.
pub fn validate_hierarchy<T: Hierarchical>(
    tasks: &[T],
    milestone_ids: &HashSet<&str>,
) -> Vec<StructuralError> {
    let index = Index::new(tasks);
    let ancestry = index.ancestry();
    let mut errors = Vec::new();

    let mut counts: HashMap<&str, usize> = HashMap::with_capacity(tasks.len());
    for task in tasks {
        *counts.entry(task.id()).or_default() += 1;
    }
    for (id, &count) in &counts {
        if count > 1 {
            errors.push(StructuralError::new(
                id,
                StructuralErrorKind::DuplicateTaskId { count },
            ));
        }
    }

    for (i, task) in tasks.iter().enumerate() {
        if index.by_id.get(task.id()) != Some(&i) {
            continue;
        }
        if let Some(parent_id) = task.parent_task_id()
            && !index.by_id.contains_key(parent_id)
        {
            errors.push(StructuralError::new(
                task.id(),
                StructuralErrorKind::MissingParent {
                    parent_id: parent_id.to_string(),
                },
            ));
            continue;
        }

        match ancestry[i] {
            Ancestry::OnCycle => {
                errors.push(StructuralError::new(
                    task.id(),
                    StructuralErrorKind::ParentCycle,
                ));
            }
            Ancestry::BelowCycle => {}
            Ancestry::Rooted { root, .. } if root == i => match task.milestone_id() {
                None => errors.push(StructuralError::new(
                    task.id(),
                    StructuralErrorKind::RootWithoutMilestone,
                )),
                Some(m) if !milestone_ids.contains(m) => errors.push(StructuralError::new(
                    task.id(),
                    StructuralErrorKind::UnknownMilestone {
                        milestone_id: m.to_string(),
                    },
                )),
                Some(_) => {}
            },
            Ancestry::Rooted { root, .. } => {
                if let (Some(expected), Some(found)) =
                    (tasks[root].milestone_id(), task.milestone_id())
                    && expected != found
                {
                    errors.push(StructuralError::new(
                        task.id(),
                        StructuralErrorKind::MilestoneMismatch {
                            expected: expected.to_string(),
                            found: found.to_string(),
                        },
                    ));
                }
            }
        }
    }

    errors.sort_by(|a, b| a.task_id.cmp(&b.task_id));
    errors
}

/// Recompute `level` from the parent chain and return the ids whose stored
/// level had drifted. Tasks with an unresolvable parent count as roots;
/// tasks in or below a parent cycle are left untouched.
pub fn normalize_levels<T: Hierarchical>(tasks: &mut [T]) -> Vec<String> {
    let depths: Vec<Option<u32>> = {
        let index = Index::new(tasks);
        index
            .ancestry()
            .into_iter()
            .map(|a| match a {
                Ancestry::Rooted { depth, .. } => Some(depth),
                _ => None,
            })
            .collect()
    };

    let mut drifted = Vec::new();
    for (task, depth) in tasks.iter_mut().zip(depths) {
        if let Some(depth) = depth
            && task.level() != depth
        {
            drifted.push(task.id().to_string());
            task.set_level(depth);
        }
    }
    drifted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Schedule;

    fn task(id: &str, parent: Option<&str>, milestone: Option<&str>, order: i32) -> TemplateTask {
        TemplateTask {
            id: id.to_string(),
            title: id.to_uppercase(),
            description: None,
            level: 0,
            parent_task_id: parent.map(String::from),
            milestone_id: milestone.map(String::from),
            sort_order: order,
            schedule: Schedule::None,
            assigned_to_roles: vec![],
        }
    }

    fn shape(forest: &[TaskTree<TemplateTask>]) -> Vec<(String, u32, Vec<String>)> {
        let mut out = Vec::new();
        for root in forest {
            root.walk(&mut |node| {
                out.push((
                    node.task.id.clone(),
                    node.depth,
                    node.children.iter().map(|c| c.task.id.clone()).collect(),
                ))
            });
        }
        out
    }

    #[test]
    fn test_build_nests_children_in_sort_order() {
        let tasks = vec![
            task("b", Some("root"), Some("m1"), 2),
            task("root", None, Some("m1"), 0),
            task("a", Some("root"), Some("m1"), 1),
            task("a1", Some("a"), None, 0),
        ];

        let forest = build_task_tree(&tasks);
        assert_eq!(forest.len(), 1);
        assert_eq!(
            shape(&forest),
            vec![
                ("root".into(), 0, vec!["a".into(), "b".into()]),
                ("a".into(), 1, vec!["a1".into()]),
                ("a1".into(), 2, vec![]),
                ("b".into(), 1, vec![]),
            ]
        );
        // Section is inherited from the root even when not stored
        assert_eq!(forest[0].children[0].children[0].section_id.as_deref(), Some("m1"));
    }

    #[test]
    fn test_build_is_order_independent() {
        let tasks = vec![
            task("r1", None, Some("m1"), 0),
            task("r2", None, Some("m2"), 0),
            task("c1", Some("r1"), None, 0),
            task("c2", Some("r1"), None, 0),
            task("g1", Some("c2"), None, 5),
        ];
        let mut reversed = tasks.clone();
        reversed.reverse();

        assert_eq!(shape(&build_task_tree(&tasks)), shape(&build_task_tree(&reversed)));
    }

    #[test]
    fn test_unresolved_parent_becomes_root() {
        let tasks = vec![
            task("orphan", Some("not-loaded"), Some("m1"), 0),
            task("root", None, Some("m1"), 1),
        ];

        let forest = build_task_tree(&tasks);
        let roots: Vec<&str> = forest.iter().map(|t| t.task.id.as_str()).collect();
        assert_eq!(roots, vec!["orphan", "root"]);
    }

    #[test]
    fn test_parent_cycle_left_out_of_forest() {
        let tasks = vec![
            task("x", Some("y"), None, 0),
            task("y", Some("x"), None, 0),
            task("ok", None, Some("m1"), 0),
        ];

        let forest = build_task_tree(&tasks);
        assert_eq!(preorder_ids(&forest), vec!["ok".to_string()]);
    }

    #[test]
    fn test_validate_reports_each_problem() {
        let milestones: HashSet<&str> = ["m1", "m2"].into_iter().collect();
        let tasks = vec![
            task("root", None, Some("m1"), 0),
            task("lost", Some("ghost"), Some("m1"), 0),
            task("loop", Some("loop"), Some("m1"), 0),
            task("bare", None, None, 0),
            task("odd", None, Some("m9"), 0),
            task("drift", Some("root"), Some("m2"), 0),
            task("fine", Some("root"), Some("m1"), 1),
        ];

        let errors = validate_hierarchy(&tasks, &milestones);
        let kinds: Vec<(&str, &StructuralErrorKind)> =
            errors.iter().map(|e| (e.task_id.as_str(), &e.kind)).collect();

        assert_eq!(
            kinds,
            vec![
                ("bare", &StructuralErrorKind::RootWithoutMilestone),
                (
                    "drift",
                    &StructuralErrorKind::MilestoneMismatch {
                        expected: "m1".into(),
                        found: "m2".into()
                    }
                ),
                ("loop", &StructuralErrorKind::ParentCycle),
                (
                    "lost",
                    &StructuralErrorKind::MissingParent {
                        parent_id: "ghost".into()
                    }
                ),
                (
                    "odd",
                    &StructuralErrorKind::UnknownMilestone {
                        milestone_id: "m9".into()
                    }
                ),
            ]
        );
    }

    #[test]
    fn test_validate_flags_every_cycle_member_once() {
        let milestones: HashSet<&str> = HashSet::new();
        let tasks = vec![
            task("a", Some("c"), None, 0),
            task("b", Some("a"), None, 0),
            task("c", Some("b"), None, 0),
            task("under", Some("a"), None, 0),
        ];

        let errors = validate_hierarchy(&tasks, &milestones);
        let ids: Vec<&str> = errors.iter().map(|e| e.task_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_validate_reports_duplicate_ids_once() {
        let milestones: HashSet<&str> = ["m1"].into_iter().collect();
        let tasks = vec![
            task("a", None, Some("m1"), 0),
            task("a", None, Some("m1"), 1),
            task("kid", Some("a"), None, 0),
        ];

        let errors = validate_hierarchy(&tasks, &milestones);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].task_id, "a");
        assert_eq!(errors[0].kind, StructuralErrorKind::DuplicateTaskId { count: 2 });
        assert_eq!(errors[0].code(), crate::error::ErrorCode::DuplicateTaskId);
    }

    #[test]
    fn test_normalize_levels_repairs_drift() {
        let mut tasks = vec![
            task("root", None, Some("m1"), 0),
            task("child", Some("root"), None, 0),
            task("grandchild", Some("child"), None, 0),
        ];
        tasks[1].level = 1;
        tasks[2].level = 7;

        let drifted = normalize_levels(&mut tasks);
        assert_eq!(drifted, vec!["grandchild".to_string()]);
        assert_eq!(tasks[2].level, 2);
    }
}
