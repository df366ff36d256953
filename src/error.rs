//! Structured error and warning types for the planning engine.

use crate::roles::Role;
use serde::Serialize;
use thiserror::Error;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Structural errors
    MissingParent,
    ParentCycle,
    RootWithoutMilestone,
    UnknownMilestone,
    MilestoneMismatch,
    CreationOrderConflict,
    DuplicateTaskId,
    DuplicateMilestoneId,

    // Scheduling errors
    DependencyCycle,
    DateOutOfRange,

    // Lifecycle errors
    EmptyTemplate,
    TemplateLocked,
    TemplateNotFound,
    ProjectNotFound,
    TaskNotFound,

    // Internal errors
    DatabaseError,
}

/// What is wrong with a task's place in the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StructuralErrorKind {
    #[error("parent task {parent_id} does not exist")]
    MissingParent { parent_id: String },
    #[error("task is its own ancestor")]
    ParentCycle,
    #[error("root task has no milestone")]
    RootWithoutMilestone,
    #[error("milestone {milestone_id} does not exist")]
    UnknownMilestone { milestone_id: String },
    #[error("task names milestone {found} but its root belongs to {expected}")]
    MilestoneMismatch { expected: String, found: String },
    #[error("hierarchy and dependency order conflict")]
    CreationOrderConflict,
    #[error("task id is used {count} times")]
    DuplicateTaskId { count: usize },
}

/// A hierarchy problem, reported with the offending task id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("task {task_id}: {kind}")]
pub struct StructuralError {
    pub task_id: String,
    #[serde(flatten)]
    pub kind: StructuralErrorKind,
}

impl StructuralError {
    pub fn new(task_id: &str, kind: StructuralErrorKind) -> Self {
        Self {
            task_id: task_id.to_string(),
            kind,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self.kind {
            StructuralErrorKind::MissingParent { .. } => ErrorCode::MissingParent,
            StructuralErrorKind::ParentCycle => ErrorCode::ParentCycle,
            StructuralErrorKind::RootWithoutMilestone => ErrorCode::RootWithoutMilestone,
            StructuralErrorKind::UnknownMilestone { .. } => ErrorCode::UnknownMilestone,
            StructuralErrorKind::MilestoneMismatch { .. } => ErrorCode::MilestoneMismatch,
            StructuralErrorKind::CreationOrderConflict => ErrorCode::CreationOrderConflict,
            StructuralErrorKind::DuplicateTaskId { .. } => ErrorCode::DuplicateTaskId,
        }
    }
}

/// A cycle in the depends-on graph.
///
/// `cycle` holds the tasks on the cycle; `affected` holds tasks outside it
/// whose dates hang off the cycle and therefore stay unresolved too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("dependency cycle through {}", .cycle.join(" -> "))]
pub struct DependencyCycleError {
    pub cycle: Vec<String>,
    pub affected: Vec<String>,
}

/// A role on a task that matched no active person. Not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedRoleWarning {
    pub task_id: String,
    pub role: Role,
}

/// A computed date that `NaiveDate` cannot represent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("task {task_id}: due date falls outside the supported calendar")]
pub struct DateRangeError {
    pub task_id: String,
}

/// Why a dependent task got no date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyGap {
    /// The target is not part of the task set.
    MissingTarget,
    /// The target is deliberately dateless.
    UndatedTarget,
    /// The target itself could not be dated.
    UnresolvedTarget,
}

impl std::fmt::Display for DependencyGap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DependencyGap::MissingTarget => write!(f, "target not found"),
            DependencyGap::UndatedTarget => write!(f, "target has no date"),
            DependencyGap::UnresolvedTarget => write!(f, "target is unresolved"),
        }
    }
}

/// A dependency that yields no date. Not an error; the task is left without
/// a date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedDependencyWarning {
    pub task_id: String,
    pub depends_on: String,
    pub reason: DependencyGap,
}

/// Non-blocking conditions surfaced alongside a created project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    UnassignedRole(UnresolvedRoleWarning),
    UnresolvedDependency(UnresolvedDependencyWarning),
}

/// Failure to turn a template into a project. No partial project survives.
#[derive(Debug, Error)]
pub enum InstantiationError {
    #[error("template {0} has no tasks")]
    EmptyTemplate(String),

    #[error("duplicate milestone id(s): {}", .0.join(", "))]
    DuplicateMilestones(Vec<String>),

    #[error("template has {} structural error(s): {}", .0.len(), join_errors(.0))]
    Structural(Vec<StructuralError>),

    #[error("template has {} dependency cycle(s): {}", .0.len(), join_errors(.0))]
    DependencyCycle(Vec<DependencyCycleError>),

    #[error("{} due date(s) out of range: {}", .0.len(), join_errors(.0))]
    DateOutOfRange(Vec<DateRangeError>),

    #[error(transparent)]
    Persistence(#[from] anyhow::Error),
}

impl InstantiationError {
    pub fn code(&self) -> ErrorCode {
        match self {
            InstantiationError::EmptyTemplate(_) => ErrorCode::EmptyTemplate,
            InstantiationError::DuplicateMilestones(_) => ErrorCode::DuplicateMilestoneId,
            InstantiationError::Structural(errors) => errors
                .first()
                .map(StructuralError::code)
                .unwrap_or(ErrorCode::MissingParent),
            InstantiationError::DependencyCycle(_) => ErrorCode::DependencyCycle,
            InstantiationError::DateOutOfRange(_) => ErrorCode::DateOutOfRange,
            InstantiationError::Persistence(_) => ErrorCode::DatabaseError,
        }
    }
}

/// Lifecycle errors from the persistence layer that callers match on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("template not found: {0}")]
    TemplateNotFound(String),
    #[error("project not found: {0}")]
    ProjectNotFound(String),
    #[error("task not found: {0}")]
    TaskNotFound(String),
    #[error("template {template_id} has {projects} project(s) and can no longer be edited")]
    TemplateLocked { template_id: String, projects: i64 },
}

impl StoreError {
    pub fn code(&self) -> ErrorCode {
        match self {
            StoreError::TemplateNotFound(_) => ErrorCode::TemplateNotFound,
            StoreError::ProjectNotFound(_) => ErrorCode::ProjectNotFound,
            StoreError::TaskNotFound(_) => ErrorCode::TaskNotFound,
            StoreError::TemplateLocked { .. } => ErrorCode::TemplateLocked,
        }
    }
}

fn join_errors<E: std::fmt::Display>(errors: &[E]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
