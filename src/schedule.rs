//! Due-date propagation from a project's reference date.
//!
//! Offset tasks resolve to `reference_date + days_from_meeting`. Dependent
//! tasks resolve from the date of the task they depend on, after it. Each
//! task depends on at most one other, so the depends-on graph is a functional
//! graph: following the chain from any task either ends at a resolvable task,
//! at a missing target, or loops back into a cycle. Walking chains with
//! three-colour marking gives a topological resolution order and finds every
//! cycle in one linear pass.
//!
//! Propagation is a pure function of its inputs and can be re-run on every
//! read or whenever the reference date changes.

use crate::error::{DateRangeError, DependencyCycleError, DependencyGap, UnresolvedDependencyWarning};
use crate::tree::Hierarchical;
use crate::types::{DependencyPolicy, Schedule, Task, TaskStatus, TemplateTask};
use chrono::{DateTime, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

/// Access to the scheduling fields of a task.
pub trait Scheduled: Hierarchical {
    fn schedule(&self) -> &Schedule;

    /// Calendar date the task was completed on, if it is completed.
    ///
    /// Live tasks use the UTC day of `completed_at`; dates carry no timezone
    /// anywhere else either.
    fn completed_on(&self) -> Option<NaiveDate> {
        None
    }
}

impl Scheduled for TemplateTask {
    fn schedule(&self) -> &Schedule {
        &self.schedule
    }
}

impl Scheduled for Task {
    fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    fn completed_on(&self) -> Option<NaiveDate> {
        if self.status != TaskStatus::Completed {
            return None;
        }
        self.completed_at
            .and_then(DateTime::from_timestamp_millis)
            .map(|dt| dt.date_naive())
    }
}

/// A typed depends-on edge: `task_id` takes its date from `depends_on`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub task_id: String,
    pub depends_on: String,
    pub policy: DependencyPolicy,
}

/// Extract the depends-on edges carried by the tasks' schedules.
pub fn dependency_edges<T: Scheduled>(tasks: &[T]) -> Vec<DependencyEdge> {
    tasks
        .iter()
        .filter_map(|task| match task.schedule() {
            Schedule::Dependent {
                depends_on_task_id,
                policy,
            } => Some(DependencyEdge {
                task_id: task.id().to_string(),
                depends_on: depends_on_task_id.clone(),
                policy: *policy,
            }),
            _ => None,
        })
        .collect()
}

/// Date status of a task after propagation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateState {
    /// Resolved from the reference date.
    Independent,
    /// Resolved from the task it depends on.
    Dependent,
    /// Neither offset nor dependency: deliberately dateless.
    NoDueDate,
    /// Could not be resolved (cycle, missing or undated target).
    Unresolved,
}

/// Dates and diagnostics for a task set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateResolution {
    pub dates: HashMap<String, NaiveDate>,
    pub states: HashMap<String, DateState>,
    pub errors: Vec<DependencyCycleError>,
    pub dangling: Vec<UnresolvedDependencyWarning>,
    pub out_of_range: Vec<DateRangeError>,
}

impl DateResolution {
    pub fn state_of(&self, task_id: &str) -> Option<DateState> {
        self.states.get(task_id).copied()
    }
}

/// Result of propagating dates over live tasks.
#[derive(Debug, Clone, PartialEq)]
pub struct Propagation {
    /// The input tasks with `due_date` recomputed. Unresolved and dateless
    /// tasks carry no due date.
    pub tasks: Vec<Task>,
    pub states: HashMap<String, DateState>,
    pub errors: Vec<DependencyCycleError>,
    pub dangling: Vec<UnresolvedDependencyWarning>,
    pub out_of_range: Vec<DateRangeError>,
}

impl Propagation {
    /// Tasks that received a due date.
    pub fn resolved(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|t| t.due_date.is_some())
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.dangling.is_empty() && self.out_of_range.is_empty()
    }
}

/// Internal per-task state during the walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    New,
    Visiting,
    Dated(NaiveDate, DateState),
    Dateless,
    /// On dependency cycle number `n`.
    Cycle(usize),
    /// Depends (transitively) on cycle number `n`.
    BelowCycle(usize),
    /// Target missing, undated, or itself unresolved.
    Blocked,
    /// The computed date does not fit in `NaiveDate`.
    OutOfRange,
}

enum Rule<'a> {
    Offset(i32),
    After(&'a DependencyEdge, usize),
    Dangling(&'a DependencyEdge),
    Dateless,
}

fn shift(date: NaiveDate, days: i32) -> Option<NaiveDate> {
    date.checked_add_signed(Duration::days(i64::from(days)))
}

fn gap(edge: &DependencyEdge, reason: DependencyGap) -> UnresolvedDependencyWarning {
    warn!(
        task_id = %edge.task_id,
        depends_on = %edge.depends_on,
        %reason,
        "Dependency yields no date; task left without a date"
    );
    UnresolvedDependencyWarning {
        task_id: edge.task_id.clone(),
        depends_on: edge.depends_on.clone(),
        reason,
    }
}

/// Resolve dates for any scheduled task set.
///
/// Offset tasks are independent. A task without an offset that has an edge in
/// `edges` is dependent (the first edge wins if several name it). Everything
/// else is dateless.
pub fn resolve_dates<T: Scheduled>(
    tasks: &[T],
    reference_date: NaiveDate,
    edges: &[DependencyEdge],
) -> DateResolution {
    let mut by_id: HashMap<&str, usize> = HashMap::with_capacity(tasks.len());
    for (i, task) in tasks.iter().enumerate() {
        by_id.entry(task.id()).or_insert(i);
    }

    let mut edge_of: HashMap<&str, &DependencyEdge> = HashMap::new();
    for edge in edges {
        edge_of.entry(edge.task_id.as_str()).or_insert(edge);
    }

    let rules: Vec<Rule> = tasks
        .iter()
        .map(|task| {
            if let Some(days) = task.schedule().days_from_meeting() {
                return Rule::Offset(days);
            }
            match edge_of.get(task.id()).copied() {
                Some(edge) => match by_id.get(edge.depends_on.as_str()) {
                    Some(&target) => Rule::After(edge, target),
                    None => Rule::Dangling(edge),
                },
                None => Rule::Dateless,
            }
        })
        .collect();

    let mut slots = vec![Slot::New; tasks.len()];
    let mut cycles: Vec<Vec<usize>> = Vec::new();
    let mut dangling = Vec::new();
    let mut path: Vec<usize> = Vec::new();

    for start in 0..tasks.len() {
        if slots[start] != Slot::New {
            continue;
        }
        path.clear();
        let mut cur = start;

        loop {
            match slots[cur] {
                Slot::Visiting => {
                    let pos = path.iter().position(|&i| i == cur).unwrap_or(0);
                    let n = cycles.len();
                    cycles.push(path[pos..].to_vec());
                    for &member in &path[pos..] {
                        slots[member] = Slot::Cycle(n);
                    }
                    path.truncate(pos);
                    break;
                }
                Slot::New => match &rules[cur] {
                    Rule::Offset(days) => {
                        slots[cur] = match shift(reference_date, *days) {
                            Some(date) => Slot::Dated(date, DateState::Independent),
                            None => Slot::OutOfRange,
                        };
                        break;
                    }
                    Rule::Dateless => {
                        slots[cur] = Slot::Dateless;
                        break;
                    }
                    Rule::Dangling(edge) => {
                        dangling.push(gap(edge, DependencyGap::MissingTarget));
                        slots[cur] = Slot::Blocked;
                        break;
                    }
                    Rule::After(_, target) => {
                        slots[cur] = Slot::Visiting;
                        path.push(cur);
                        cur = *target;
                    }
                },
                _ => break,
            }
        }

        // Resolve the chain back towards its start; each target is final now.
        for &i in path.iter().rev() {
            let Rule::After(edge, target) = &rules[i] else {
                continue;
            };
            let completed = tasks[*target].completed_on();
            slots[i] = match slots[*target] {
                Slot::Cycle(n) | Slot::BelowCycle(n) => Slot::BelowCycle(n),
                Slot::Dated(due, _) => derive(edge.policy, Some(due), completed),
                Slot::Dateless => match derive(edge.policy, None, completed) {
                    Slot::Blocked => {
                        dangling.push(gap(edge, DependencyGap::UndatedTarget));
                        Slot::Blocked
                    }
                    slot => slot,
                },
                _ => {
                    dangling.push(gap(edge, DependencyGap::UnresolvedTarget));
                    Slot::Blocked
                }
            };
        }
    }

    let mut resolution = DateResolution {
        dangling,
        ..Default::default()
    };

    let mut affected: Vec<BTreeSet<String>> = vec![BTreeSet::new(); cycles.len()];
    for (i, task) in tasks.iter().enumerate() {
        let id = task.id().to_string();
        let state = match slots[i] {
            Slot::Dated(date, state) => {
                resolution.dates.insert(id.clone(), date);
                state
            }
            Slot::Dateless => DateState::NoDueDate,
            Slot::BelowCycle(n) => {
                affected[n].insert(id.clone());
                DateState::Unresolved
            }
            Slot::OutOfRange => {
                warn!(task_id = %id, "Due date out of range; task left without a date");
                resolution.out_of_range.push(DateRangeError { task_id: id.clone() });
                DateState::Unresolved
            }
            _ => DateState::Unresolved,
        };
        resolution.states.insert(id, state);
    }

    for (members, affected) in cycles.into_iter().zip(affected) {
        let mut cycle: Vec<String> = members
            .iter()
            .map(|&i| tasks[i].id().to_string())
            .collect();
        // Start each cycle at its smallest id so output is order-independent
        if let Some(min_pos) = cycle
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.cmp(b.1))
            .map(|(pos, _)| pos)
        {
            cycle.rotate_left(min_pos);
        }
        warn!(cycle = %cycle.join(" -> "), "Dependency cycle; affected tasks left unresolved");
        resolution.errors.push(DependencyCycleError {
            cycle,
            affected: affected.into_iter().collect(),
        });
    }
    resolution.errors.sort_by(|a, b| a.cycle.cmp(&b.cycle));
    resolution
        .dangling
        .sort_by(|a, b| a.task_id.cmp(&b.task_id));
    resolution
        .out_of_range
        .sort_by(|a, b| a.task_id.cmp(&b.task_id));

    debug!(
        tasks = tasks.len(),
        dated = resolution.dates.len(),
        cycles = resolution.errors.len(),
        dangling = resolution.dangling.len(),
        out_of_range = resolution.out_of_range.len(),
        "Resolved task dates"
    );

    resolution
}

/// Date for a dependent task given its target's due and completion dates.
/// `Blocked` when there is no base date, `OutOfRange` when the shift
/// overflows.
fn derive(
    policy: DependencyPolicy,
    target_due: Option<NaiveDate>,
    target_completed: Option<NaiveDate>,
) -> Slot {
    let base = match policy {
        DependencyPolicy::SameDate | DependencyPolicy::DaysAfter { .. } => target_due,
        DependencyPolicy::AfterCompletion { .. } => target_completed.or(target_due),
    };
    match base.map(|date| shift(date, policy.days())) {
        Some(Some(date)) => Slot::Dated(date, DateState::Dependent),
        Some(None) => Slot::OutOfRange,
        None => Slot::Blocked,
    }
}

/// Recompute `due_date` for every live task from `reference_date`.
///
/// Tasks on or below a dependency cycle, tasks whose dependency yields no
/// date, and tasks whose date overflows the calendar are left without a date
/// and reported; the rest of the set still resolves.
pub fn propagate_dates(
    tasks: &[Task],
    reference_date: NaiveDate,
    edges: &[DependencyEdge],
) -> Propagation {
    let resolution = resolve_dates(tasks, reference_date, edges);

    let tasks = tasks
        .iter()
        .map(|task| {
            let mut task = task.clone();
            task.due_date = resolution.dates.get(&task.id).copied();
            task
        })
        .collect();

    Propagation {
        tasks,
        states: resolution.states,
        errors: resolution.errors,
        dangling: resolution.dangling,
        out_of_range: resolution.out_of_range,
    }
}

/// Dependency cycles among tasks' own schedules, independent of any date.
pub fn find_dependency_cycles<T: Scheduled>(tasks: &[T]) -> Vec<DependencyCycleError> {
    resolve_dates(tasks, NaiveDate::default(), &dependency_edges(tasks)).errors
}
