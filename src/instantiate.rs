//! Template instantiation: turn an offset/role template into a live project.
//!
//! # Instantiation Flow
//!
//! 1. Validate milestone ids and the template hierarchy (structural errors
//!    block instantiation)
//! 2. Reject dependency cycles
//! 3. Order creation so parents precede children and dependency targets
//!    precede their dependents. Independent and dateless tasks go first
//!    wherever the hierarchy allows, dependents after them.
//! 4. Mint fresh ids in that order, remapping parent and dependency references
//! 5. Resolve roles against one roster snapshot
//! 6. Propagate dates once over the complete live task set. Dates that
//!    overflow the calendar fail the instantiation; dependencies that yield
//!    no date become warnings.
//!
//! The template itself is only read.

use crate::config::IdsConfig;
use crate::error::{
    DependencyGap, InstantiationError, StructuralError, StructuralErrorKind,
    UnresolvedDependencyWarning, Warning,
};
use crate::milestones::{duplicate_milestone_ids, ordered, refresh_due_dates};
use crate::roles::{resolve_roles, RosterSnapshot};
use crate::schedule::{dependency_edges, find_dependency_cycles, propagate_dates};
use crate::tree::{build_task_tree, preorder_ids, validate_hierarchy};
use crate::types::{
    Milestone, Project, Schedule, Task, TaskStatus, TemplateDefinition, TemplateTask,
};
use chrono::NaiveDate;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use tracing::{debug, info, warn};

/// Source of fresh identifiers for live records.
pub trait IdSource {
    fn next_id(&mut self) -> String;

    /// Mark an id as taken elsewhere so it is never handed out.
    fn reserve(&mut self, _id: &str) {}
}

/// Human-readable petname ids, unique within this source and against every
/// reserved id.
pub struct PetnameIds {
    config: IdsConfig,
    used: HashSet<String>,
}

impl PetnameIds {
    pub fn new(config: IdsConfig) -> Self {
        Self {
            config,
            used: HashSet::new(),
        }
    }

    fn generate(&self) -> String {
        use petname::{Generator, Petnames};

        let base = Petnames::medium()
            .generate_one(self.config.task_id_words, "-")
            .unwrap_or_else(|| format!("task-{}", chrono::Utc::now().timestamp_millis()));

        self.config.id_case.convert(&base)
    }
}

impl IdSource for PetnameIds {
    fn reserve(&mut self, id: &str) {
        self.used.insert(id.to_string());
    }

    fn next_id(&mut self) -> String {
        let mut id = self.generate();
        let mut attempts = 0;
        // Collisions are rare; fall back to a numeric suffix if words run out
        while self.used.contains(&id) {
            attempts += 1;
            id = if attempts > 100 {
                format!("{}-{}", self.generate(), self.used.len())
            } else {
                self.generate()
            };
        }
        self.used.insert(id.clone());
        id
    }
}

/// Predictable ids (`prefix-1`, `prefix-2`, ...).
pub struct SequentialIds {
    prefix: String,
    next: u64,
}

impl SequentialIds {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            next: 1,
        }
    }
}

impl IdSource for SequentialIds {
    fn next_id(&mut self) -> String {
        let id = format!("{}-{}", self.prefix, self.next);
        self.next += 1;
        id
    }
}

/// Options for controlling template instantiation.
#[derive(Debug, Clone, Default)]
pub struct InstantiateOptions {
    /// Project name. Defaults to "<template name> <reference date>".
    pub project_name: Option<String>,

    /// Optional prefix to add to task titles for disambiguation.
    pub title_prefix: Option<String>,
}

impl InstantiateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the project name (builder pattern).
    pub fn with_name(mut self, name: &str) -> Self {
        self.project_name = Some(name.to_string());
        self
    }

    /// Set a title prefix (builder pattern).
    pub fn with_title_prefix(mut self, prefix: &str) -> Self {
        self.title_prefix = Some(prefix.to_string());
        self
    }
}

/// A freshly built project plus the bookkeeping of how it was built.
#[derive(Debug, Clone)]
pub struct Instantiation {
    pub project: Project,
    /// Template task id -> live task id.
    pub id_map: HashMap<String, String>,
    /// Template milestone id -> live milestone id.
    pub milestone_map: HashMap<String, String>,
    /// Template task ids in the order they were created.
    pub creation_order: Vec<String>,
    /// How many tasks were created before the first dependent task.
    pub independent_count: usize,
    pub warnings: Vec<Warning>,
}

/// Order template tasks for creation.
///
/// Parents come before children and dependency targets before dependents.
/// Among ready tasks, non-dependent ones are taken first, then hierarchy
/// pre-order. Tasks that cannot be ordered are reported as
/// `CreationOrderConflict`.
pub fn creation_order(tasks: &[TemplateTask]) -> Result<Vec<usize>, Vec<StructuralError>> {
    let mut by_id: HashMap<&str, usize> = HashMap::with_capacity(tasks.len());
    for (i, task) in tasks.iter().enumerate() {
        by_id.entry(task.id.as_str()).or_insert(i);
    }

    let rank: HashMap<String, usize> = preorder_ids(&build_task_tree(tasks))
        .into_iter()
        .enumerate()
        .map(|(rank, id)| (id, rank))
        .collect();
    let key = |i: usize| {
        (
            tasks[i].schedule.is_dependent(),
            rank.get(&tasks[i].id).copied().unwrap_or(usize::MAX),
            i,
        )
    };

    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); tasks.len()];
    let mut blockers = vec![0usize; tasks.len()];
    for (i, task) in tasks.iter().enumerate() {
        let prerequisites = [
            task.parent_task_id.as_deref(),
            task.schedule.depends_on(),
        ];
        for pre in prerequisites.into_iter().flatten() {
            if let Some(&p) = by_id.get(pre)
                && p != i
            {
                successors[p].push(i);
                blockers[i] += 1;
            }
        }
    }

    let mut ready: BinaryHeap<Reverse<(bool, usize, usize)>> = (0..tasks.len())
        .filter(|&i| blockers[i] == 0)
        .map(|i| Reverse(key(i)))
        .collect();
    let mut order = Vec::with_capacity(tasks.len());

    while let Some(Reverse((_, _, i))) = ready.pop() {
        order.push(i);
        for &next in &successors[i] {
            blockers[next] -= 1;
            if blockers[next] == 0 {
                ready.push(Reverse(key(next)));
            }
        }
    }

    if order.len() == tasks.len() {
        return Ok(order);
    }

    let placed: HashSet<usize> = order.into_iter().collect();
    let mut conflicts: Vec<StructuralError> = (0..tasks.len())
        .filter(|i| !placed.contains(i))
        .map(|i| StructuralError::new(&tasks[i].id, StructuralErrorKind::CreationOrderConflict))
        .collect();
    conflicts.sort_by(|a, b| a.task_id.cmp(&b.task_id));
    Err(conflicts)
}

/// Instantiate `template` into a new project anchored at `reference_date`.
///
/// Either the complete project is returned or nothing is; persistence of the
/// result is the caller's job and should be one transaction.
pub fn instantiate_template(
    template: &TemplateDefinition,
    reference_date: NaiveDate,
    roster: &RosterSnapshot,
    ids: &mut impl IdSource,
    options: &InstantiateOptions,
    now_ms: i64,
) -> Result<Instantiation, InstantiationError> {
    let tasks = &template.tasks;
    if tasks.is_empty() {
        return Err(InstantiationError::EmptyTemplate(template.template.id.clone()));
    }

    let duplicates = duplicate_milestone_ids(&template.milestones);
    if !duplicates.is_empty() {
        return Err(InstantiationError::DuplicateMilestones(duplicates));
    }

    let milestone_ids: HashSet<&str> = template.milestones.iter().map(|m| m.id.as_str()).collect();
    let structural = validate_hierarchy(tasks, &milestone_ids);
    if !structural.is_empty() {
        return Err(InstantiationError::Structural(structural));
    }

    let cycles = find_dependency_cycles(tasks);
    if !cycles.is_empty() {
        return Err(InstantiationError::DependencyCycle(cycles));
    }

    let order = creation_order(tasks).map_err(InstantiationError::Structural)?;
    let independent_count = order
        .iter()
        .position(|&i| tasks[i].schedule.is_dependent())
        .unwrap_or(order.len());
    debug!(
        template = %template.template.id,
        independent = independent_count,
        dependent = order.len() - independent_count,
        "Creation order resolved"
    );

    let project_id = ids.next_id();
    let mut warnings = Vec::new();

    let mut milestone_map = HashMap::new();
    let mut milestones: Vec<Milestone> = Vec::with_capacity(template.milestones.len());
    for m in ordered(&template.milestones) {
        let id = ids.next_id();
        milestone_map.insert(m.id.clone(), id.clone());
        milestones.push(Milestone {
            id,
            project_id: project_id.clone(),
            title: m.title.clone(),
            description: m.description.clone(),
            due_date: None,
            sort_order: m.sort_order,
        });
    }

    let template_ids: HashSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
    let mut id_map: HashMap<String, String> = HashMap::with_capacity(tasks.len());
    let mut depth: HashMap<String, u32> = HashMap::with_capacity(tasks.len());
    let mut live: Vec<Task> = Vec::with_capacity(tasks.len());

    for &i in &order {
        let source = &tasks[i];
        let id = ids.next_id();

        let parent_task_id = source
            .parent_task_id
            .as_ref()
            .and_then(|p| id_map.get(p))
            .cloned();
        let level = parent_task_id
            .as_ref()
            .and_then(|p| depth.get(p))
            .map(|d| d + 1)
            .unwrap_or(0);

        let schedule = match source.schedule.depends_on() {
            Some(target) if !template_ids.contains(target) => {
                warn!(
                    task_id = %source.id,
                    depends_on = %target,
                    "Template dependency points outside the template; task created without a date"
                );
                warnings.push(Warning::UnresolvedDependency(UnresolvedDependencyWarning {
                    task_id: id.clone(),
                    depends_on: target.to_string(),
                    reason: DependencyGap::MissingTarget,
                }));
                Schedule::None
            }
            _ => source.schedule.remapped(&id_map),
        };

        let resolution = resolve_roles(&source.assigned_to_roles, roster);
        for warning in resolution.warnings(&id) {
            warn!(task_id = %id, role = %warning.role, "No active person for role; task left unassigned");
            warnings.push(Warning::UnassignedRole(warning));
        }

        let title = match &options.title_prefix {
            Some(prefix) => format!("{}: {}", prefix, source.title),
            None => source.title.clone(),
        };

        depth.insert(id.clone(), level);
        id_map.insert(source.id.clone(), id.clone());
        live.push(Task {
            id,
            project_id: project_id.clone(),
            title,
            description: source.description.clone(),
            level,
            parent_task_id,
            milestone_id: source
                .milestone_id
                .as_ref()
                .and_then(|m| milestone_map.get(m))
                .cloned(),
            sort_order: source.sort_order,
            schedule,
            assigned_to: resolution.assigned_to,
            due_date: None,
            status: TaskStatus::Todo,
            completed_at: None,
        });
    }

    // Dates are a final pass over the complete set
    let propagation = propagate_dates(&live, reference_date, &dependency_edges(&live));
    if !propagation.errors.is_empty() {
        return Err(InstantiationError::DependencyCycle(propagation.errors));
    }
    if !propagation.out_of_range.is_empty() {
        return Err(InstantiationError::DateOutOfRange(propagation.out_of_range));
    }
    warnings.extend(
        propagation
            .dangling
            .into_iter()
            .map(Warning::UnresolvedDependency),
    );
    let live = propagation.tasks;
    refresh_due_dates(&mut milestones, &live);

    let project = Project {
        id: project_id,
        template_id: template.template.id.clone(),
        name: options
            .project_name
            .clone()
            .unwrap_or_else(|| format!("{} {}", template.template.name, reference_date)),
        reference_date,
        milestones,
        tasks: live,
        created_at: now_ms,
        updated_at: now_ms,
    };

    info!(
        template = %project.template_id,
        project = %project.id,
        tasks = project.tasks.len(),
        warnings = warnings.len(),
        "Template instantiated"
    );

    Ok(Instantiation {
        project,
        id_map,
        milestone_map,
        creation_order: order.iter().map(|&i| tasks[i].id.clone()).collect(),
        independent_count,
        warnings,
    })
}
