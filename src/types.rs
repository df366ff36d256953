//! Core types for templates, live projects and the roster.

use crate::roles::Role;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Identifier of a roster person.
pub type PersonId = String;

/// Status of a live task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "todo" => Some(TaskStatus::Todo),
            "in_progress" => Some(TaskStatus::InProgress),
            "completed" => Some(TaskStatus::Completed),
            "cancelled" => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }
}

/// How a dependent task's date derives from the task it depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DependencyPolicy {
    /// Same due date as the referenced task.
    #[default]
    SameDate,
    /// `days` after the referenced task's due date (negative means before).
    DaysAfter { days: i32 },
    /// `days` after the referenced task was completed, or after its due date
    /// while it is still open.
    AfterCompletion { days: i32 },
}

impl DependencyPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyPolicy::SameDate => "same_date",
            DependencyPolicy::DaysAfter { .. } => "days_after",
            DependencyPolicy::AfterCompletion { .. } => "after_completion",
        }
    }

    /// Day delta carried by the policy (0 for `SameDate`).
    pub fn days(&self) -> i32 {
        match self {
            DependencyPolicy::SameDate => 0,
            DependencyPolicy::DaysAfter { days } | DependencyPolicy::AfterCompletion { days } => {
                *days
            }
        }
    }

    /// Rebuild a policy from its stored name and delta.
    pub fn from_parts(name: &str, days: i32) -> Option<Self> {
        match name {
            "same_date" => Some(DependencyPolicy::SameDate),
            "days_after" => Some(DependencyPolicy::DaysAfter { days }),
            "after_completion" => Some(DependencyPolicy::AfterCompletion { days }),
            _ => None,
        }
    }
}

/// Where a task's due date comes from.
///
/// A task is either offset from the reference date, derived from another
/// task, or has no date at all.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    #[default]
    None,
    Offset {
        days_from_meeting: i32,
    },
    Dependent {
        depends_on_task_id: String,
        #[serde(default)]
        policy: DependencyPolicy,
    },
}

impl Schedule {
    pub fn offset(days_from_meeting: i32) -> Self {
        Schedule::Offset { days_from_meeting }
    }

    pub fn same_date_as(task_id: &str) -> Self {
        Schedule::Dependent {
            depends_on_task_id: task_id.to_string(),
            policy: DependencyPolicy::SameDate,
        }
    }

    pub fn days_after(task_id: &str, days: i32) -> Self {
        Schedule::Dependent {
            depends_on_task_id: task_id.to_string(),
            policy: DependencyPolicy::DaysAfter { days },
        }
    }

    pub fn depends_on(&self) -> Option<&str> {
        match self {
            Schedule::Dependent {
                depends_on_task_id, ..
            } => Some(depends_on_task_id),
            _ => None,
        }
    }

    pub fn days_from_meeting(&self) -> Option<i32> {
        match self {
            Schedule::Offset { days_from_meeting } => Some(*days_from_meeting),
            _ => None,
        }
    }

    pub fn is_dependent(&self) -> bool {
        matches!(self, Schedule::Dependent { .. })
    }

    /// Rebuild a schedule from flat storage columns.
    /// Returns `None` when both an offset and a dependency are present.
    pub fn from_columns(
        days_from_meeting: Option<i32>,
        depends_on_task_id: Option<String>,
        policy: Option<&str>,
        policy_days: i32,
    ) -> Option<Self> {
        match (days_from_meeting, depends_on_task_id) {
            (Some(_), Some(_)) => None,
            (Some(days), None) => Some(Schedule::offset(days)),
            (None, Some(target)) => {
                let policy = DependencyPolicy::from_parts(policy.unwrap_or("same_date"), policy_days)?;
                Some(Schedule::Dependent {
                    depends_on_task_id: target,
                    policy,
                })
            }
            (None, None) => Some(Schedule::None),
        }
    }

    /// Rewrite the dependency target through an id mapping.
    /// Targets missing from the map are kept as-is.
    pub fn remapped(&self, id_map: &std::collections::HashMap<String, String>) -> Self {
        match self {
            Schedule::Dependent {
                depends_on_task_id,
                policy,
            } => Schedule::Dependent {
                depends_on_task_id: id_map
                    .get(depends_on_task_id)
                    .cloned()
                    .unwrap_or_else(|| depends_on_task_id.clone()),
                policy: *policy,
            },
            other => other.clone(),
        }
    }
}

/// A task inside a template: offsets and role tags, never dates or people.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateTask {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Stored depth. Not authoritative; see `tree::normalize_levels`.
    #[serde(default)]
    pub level: u32,
    #[serde(default)]
    pub parent_task_id: Option<String>,
    #[serde(default)]
    pub milestone_id: Option<String>,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default)]
    pub schedule: Schedule,
    #[serde(default)]
    pub assigned_to_roles: Vec<Role>,
}

/// A task in a live project: concrete dates and people.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub description: Option<String>,
    pub level: u32,
    pub parent_task_id: Option<String>,
    pub milestone_id: Option<String>,
    pub sort_order: i32,
    /// Kept on the live task so the project can be rescheduled.
    pub schedule: Schedule,
    pub assigned_to: Vec<PersonId>,
    pub due_date: Option<NaiveDate>,
    pub status: TaskStatus,
    /// Completion timestamp (ms). Present iff `status` is `Completed`.
    pub completed_at: Option<i64>,
}

impl Task {
    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    /// Move to `status`, keeping `completed_at` consistent.
    pub fn set_status(&mut self, status: TaskStatus, now_ms: i64) {
        if status == TaskStatus::Completed {
            if self.status != TaskStatus::Completed || self.completed_at.is_none() {
                self.completed_at = Some(now_ms);
            }
        } else {
            self.completed_at = None;
        }
        self.status = status;
    }
}

/// An ordered section of a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateMilestone {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sort_order: i32,
}

/// An ordered section of a live project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub sort_order: i32,
}

/// Template header. Milestones and tasks reference it by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectTemplate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// A complete template: header plus its milestones and flat task list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateDefinition {
    #[serde(flatten)]
    pub template: ProjectTemplate,
    #[serde(default)]
    pub milestones: Vec<TemplateMilestone>,
    #[serde(default)]
    pub tasks: Vec<TemplateTask>,
}

/// A live project bound to one reference date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub template_id: String,
    pub name: String,
    pub reference_date: NaiveDate,
    pub milestones: Vec<Milestone>,
    pub tasks: Vec<Task>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A roster entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: PersonId,
    pub name: String,
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// A task with its children for tree operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskTree<T> {
    #[serde(flatten)]
    pub task: T,
    /// Depth recomputed from the parent chain (roots are 0).
    pub depth: u32,
    /// Milestone inherited from the root of this branch.
    pub section_id: Option<String>,
    pub children: Vec<TaskTree<T>>,
}

impl<T> TaskTree<T> {
    /// Number of nodes in this subtree, including the root.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(TaskTree::size).sum::<usize>()
    }

    /// Visit every node in pre-order.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a TaskTree<T>)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_schedule_from_columns_rejects_both() {
        assert!(Schedule::from_columns(Some(3), Some("a".into()), None, 0).is_none());
        assert_eq!(
            Schedule::from_columns(None, None, None, 0),
            Some(Schedule::None)
        );
        assert_eq!(
            Schedule::from_columns(None, Some("a".into()), Some("days_after"), 2),
            Some(Schedule::days_after("a", 2))
        );
    }

    #[test]
    fn test_schedule_remapped_keeps_unknown_targets() {
        let mut map = HashMap::new();
        map.insert("tpl-a".to_string(), "live-a".to_string());

        assert_eq!(
            Schedule::same_date_as("tpl-a").remapped(&map),
            Schedule::same_date_as("live-a")
        );
        assert_eq!(
            Schedule::same_date_as("elsewhere").remapped(&map),
            Schedule::same_date_as("elsewhere")
        );
        assert_eq!(Schedule::offset(-3).remapped(&map), Schedule::offset(-3));
    }

    #[test]
    fn test_set_status_tracks_completion() {
        let mut task = Task {
            id: "t".into(),
            project_id: "p".into(),
            title: "T".into(),
            description: None,
            level: 0,
            parent_task_id: None,
            milestone_id: None,
            sort_order: 0,
            schedule: Schedule::None,
            assigned_to: vec![],
            due_date: None,
            status: TaskStatus::Todo,
            completed_at: None,
        };

        task.set_status(TaskStatus::Completed, 100);
        assert_eq!(task.completed_at, Some(100));

        // Re-completing keeps the original timestamp
        task.set_status(TaskStatus::Completed, 200);
        assert_eq!(task.completed_at, Some(100));

        task.set_status(TaskStatus::InProgress, 300);
        assert!(task.completed_at.is_none());
    }

    #[test]
    fn test_schedule_serde_shape() {
        let json = serde_json::to_value(Schedule::offset(-80)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"kind": "offset", "days_from_meeting": -80})
        );

        let parsed: Schedule = serde_json::from_value(serde_json::json!({
            "kind": "dependent",
            "depends_on_task_id": "a"
        }))
        .unwrap();
        assert_eq!(parsed, Schedule::same_date_as("a"));
    }
}
