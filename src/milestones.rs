//! Milestones: ordered sections of root tasks.
//!
//! Progress and live due dates are computed on demand from the current task
//! set and never cached.

use crate::tree::{build_task_tree, Hierarchical};
use crate::types::{Milestone, Task, TaskTree, TemplateMilestone};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Shared ordering fields of template and live milestones.
pub trait Section {
    fn id(&self) -> &str;
    fn sort_order(&self) -> i32;
}

impl Section for TemplateMilestone {
    fn id(&self) -> &str {
        &self.id
    }
    fn sort_order(&self) -> i32 {
        self.sort_order
    }
}

impl Section for Milestone {
    fn id(&self) -> &str {
        &self.id
    }
    fn sort_order(&self) -> i32 {
        self.sort_order
    }
}

/// Milestones ordered by `sort_order`, ties broken by id.
pub fn ordered<M: Section>(milestones: &[M]) -> Vec<&M> {
    let mut sorted: Vec<&M> = milestones.iter().collect();
    sorted.sort_by(|a, b| (a.sort_order(), a.id()).cmp(&(b.sort_order(), b.id())));
    sorted
}

/// Milestone ids that occur more than once, sorted.
pub fn duplicate_milestone_ids<M: Section>(milestones: &[M]) -> Vec<String> {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    for m in milestones {
        *seen.entry(m.id()).or_default() += 1;
    }
    let mut dups: Vec<String> = seen
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(id, _)| id.to_string())
        .collect();
    dups.sort();
    dups
}

/// A milestone with the root trees that belong to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionTree<M, T> {
    pub milestone: M,
    pub roots: Vec<TaskTree<T>>,
}

/// Group a forest into ordered milestone sections.
///
/// Roots whose milestone is unknown are returned separately so they are not
/// silently dropped.
pub fn into_sections<M: Section + Clone, T>(
    milestones: &[M],
    forest: Vec<TaskTree<T>>,
) -> (Vec<SectionTree<M, T>>, Vec<TaskTree<T>>) {
    let mut sections: Vec<SectionTree<M, T>> = ordered(milestones)
        .into_iter()
        .map(|m| SectionTree {
            milestone: m.clone(),
            roots: Vec::new(),
        })
        .collect();
    let position: HashMap<String, usize> = sections
        .iter()
        .enumerate()
        .map(|(i, s)| (s.milestone.id().to_string(), i))
        .collect();

    let mut unsectioned = Vec::new();
    for root in forest {
        match root.section_id.as_ref().and_then(|id| position.get(id)) {
            Some(&i) => sections[i].roots.push(root),
            None => unsectioned.push(root),
        }
    }

    (sections, unsectioned)
}

/// Completion of one milestone over all of its descendant tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    /// Whole-number percentage, rounded down. An empty milestone is 0.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        ((self.completed * 100) / self.total) as u8
    }
}

/// Progress of every milestone, keyed by milestone id.
///
/// Tasks count towards the milestone of their root, so descendants are
/// included even though they do not store the milestone themselves.
pub fn progress_by_milestone(tasks: &[Task]) -> HashMap<String, Progress> {
    let mut progress: HashMap<String, Progress> = HashMap::new();
    for root in build_task_tree(tasks) {
        let Some(section) = root.section_id.clone() else {
            continue;
        };
        let entry = progress.entry(section).or_insert(Progress {
            completed: 0,
            total: 0,
        });
        root.walk(&mut |node| {
            entry.total += 1;
            if node.task.is_completed() {
                entry.completed += 1;
            }
        });
    }
    progress
}

/// Progress of a single milestone.
pub fn milestone_progress(milestone_id: &str, tasks: &[Task]) -> Progress {
    progress_by_milestone(tasks)
        .remove(milestone_id)
        .unwrap_or(Progress {
            completed: 0,
            total: 0,
        })
}

/// A live milestone is due when its latest task is due.
pub fn milestone_due_dates(tasks: &[Task]) -> HashMap<String, NaiveDate> {
    let mut due: HashMap<String, NaiveDate> = HashMap::new();
    for root in build_task_tree(tasks) {
        let Some(section) = root.section_id.as_deref() else {
            continue;
        };
        root.walk(&mut |node| {
            if let Some(date) = node.task.due_date {
                due.entry(section.to_string())
                    .and_modify(|d| *d = (*d).max(date))
                    .or_insert(date);
            }
        });
    }
    due
}

/// Rewrite each milestone's `due_date` from its tasks.
pub fn refresh_due_dates(milestones: &mut [Milestone], tasks: &[Task]) {
    let due = milestone_due_dates(tasks);
    for milestone in milestones.iter_mut() {
        milestone.due_date = due.get(milestone.id.as_str()).copied();
    }
}

/// Number of tasks under each milestone, including descendants.
pub fn task_counts<T: Hierarchical + Clone>(tasks: &[T]) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for root in build_task_tree(tasks) {
        if let Some(section) = root.section_id.clone() {
            *counts.entry(section).or_insert(0) += root.size();
        }
    }
    counts
}
