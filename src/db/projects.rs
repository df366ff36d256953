//! Live project persistence: instantiation, rescheduling and status.

use super::roster::read_people;
use super::templates::{read_template, schedule_columns, schedule_from_row};
use super::{Database, now_ms};
use crate::error::{InstantiationError, StoreError};
use crate::instantiate::{IdSource, InstantiateOptions, Instantiation};
use crate::milestones::{Progress, ordered, progress_by_milestone, refresh_due_dates};
use crate::roles::RosterSnapshot;
use crate::schedule::{dependency_edges, propagate_dates};
use crate::types::{Milestone, Project, Task, TaskStatus};
use anyhow::{Result, anyhow};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// A project without its milestones and tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub id: String,
    pub template_id: String,
    pub name: String,
    pub reference_date: NaiveDate,
    pub task_count: i64,
}

fn parse_task_row(row: &Row) -> rusqlite::Result<Task> {
    let status: String = row.get("status")?;
    let status = TaskStatus::from_str(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("unknown task status: {}", status).into(),
        )
    })?;

    Ok(Task {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        level: row.get("level")?,
        parent_task_id: row.get("parent_task_id")?,
        milestone_id: row.get("milestone_id")?,
        sort_order: row.get("sort_order")?,
        schedule: schedule_from_row(row)?,
        assigned_to: Vec::new(),
        due_date: row.get("due_date")?,
        status,
        completed_at: row.get("completed_at")?,
    })
}

fn parse_milestone_row(row: &Row) -> rusqlite::Result<Milestone> {
    Ok(Milestone {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        due_date: row.get("due_date")?,
        sort_order: row.get("sort_order")?,
    })
}

/// Read a complete project. Tasks come back in creation order.
fn read_project(conn: &Connection, project_id: &str) -> Result<Option<Project>> {
    let header = conn
        .query_row(
            "SELECT id, template_id, name, reference_date, created_at, updated_at
             FROM projects WHERE id = ?1",
            params![project_id],
            |row| {
                Ok(Project {
                    id: row.get(0)?,
                    template_id: row.get(1)?,
                    name: row.get(2)?,
                    reference_date: row.get(3)?,
                    milestones: Vec::new(),
                    tasks: Vec::new(),
                    created_at: row.get(4)?,
                    updated_at: row.get(5)?,
                })
            },
        )
        .optional()?;

    let Some(mut project) = header else {
        return Ok(None);
    };

    let mut stmt = conn.prepare("SELECT * FROM milestones WHERE project_id = ?1 ORDER BY sort_order, id")?;
    project.milestones = stmt
        .query_map(params![project_id], parse_milestone_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stmt = conn.prepare(
        "SELECT a.task_id, a.person_id FROM task_assignees a
         JOIN tasks t ON t.id = a.task_id
         WHERE t.project_id = ?1 ORDER BY a.task_id, a.position",
    )?;
    let mut assignees: HashMap<String, Vec<String>> = HashMap::new();
    let rows = stmt.query_map(params![project_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (task_id, person_id) = row?;
        assignees.entry(task_id).or_default().push(person_id);
    }

    let mut stmt = conn.prepare("SELECT * FROM tasks WHERE project_id = ?1 ORDER BY rowid")?;
    project.tasks = stmt
        .query_map(params![project_id], parse_task_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    for task in &mut project.tasks {
        task.assigned_to = assignees.remove(&task.id).unwrap_or_default();
    }

    Ok(Some(project))
}

fn insert_project(conn: &Connection, project: &Project) -> Result<()> {
    conn.execute(
        "INSERT INTO projects (id, template_id, name, reference_date, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            project.id,
            project.template_id,
            project.name,
            project.reference_date,
            project.created_at,
            project.updated_at
        ],
    )?;

    for m in &project.milestones {
        conn.execute(
            "INSERT INTO milestones (id, project_id, title, description, due_date, sort_order)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![m.id, m.project_id, m.title, m.description, m.due_date, m.sort_order],
        )?;
    }

    // Task order is creation order: parents and targets first
    for task in &project.tasks {
        let (offset, depends_on, policy, policy_days) = schedule_columns(&task.schedule);
        conn.execute(
            "INSERT INTO tasks (
                id, project_id, title, description, level, parent_task_id, milestone_id, sort_order,
                days_from_meeting, depends_on_task_id, dependency_policy, policy_days,
                due_date, status, completed_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                task.id,
                task.project_id,
                task.title,
                task.description,
                task.level,
                task.parent_task_id,
                task.milestone_id,
                task.sort_order,
                offset,
                depends_on,
                policy,
                policy_days,
                task.due_date,
                task.status.as_str(),
                task.completed_at
            ],
        )?;
        for (position, person_id) in task.assigned_to.iter().enumerate() {
            conn.execute(
                "INSERT INTO task_assignees (task_id, person_id, position) VALUES (?1, ?2, ?3)",
                params![task.id, person_id, position as i64],
            )?;
        }
    }

    Ok(())
}

/// Hand every id already stored to `ids` so a new project cannot collide.
fn reserve_existing_ids(conn: &Connection, ids: &mut impl IdSource) -> Result<usize> {
    let mut stmt = conn.prepare(
        "SELECT id FROM projects UNION ALL SELECT id FROM milestones UNION ALL SELECT id FROM tasks",
    )?;
    let mut rows = stmt.query([])?;
    let mut count = 0;
    while let Some(row) = rows.next()? {
        let id: String = row.get(0)?;
        ids.reserve(&id);
        count += 1;
    }
    Ok(count)
}

/// Re-propagate dates and write back every due date that changed.
/// Returns the number of tasks whose date moved.
fn write_dates(conn: &Connection, project: &mut Project) -> Result<usize> {
    let propagation = propagate_dates(
        &project.tasks,
        project.reference_date,
        &dependency_edges(&project.tasks),
    );
    if !propagation.errors.is_empty() {
        return Err(InstantiationError::DependencyCycle(propagation.errors).into());
    }
    if !propagation.out_of_range.is_empty() {
        return Err(InstantiationError::DateOutOfRange(propagation.out_of_range).into());
    }

    let mut moved = 0;
    for (old, new) in project.tasks.iter().zip(&propagation.tasks) {
        if old.due_date != new.due_date {
            conn.execute(
                "UPDATE tasks SET due_date = ?1 WHERE id = ?2",
                params![new.due_date, new.id],
            )?;
            moved += 1;
        }
    }
    project.tasks = propagation.tasks;

    refresh_due_dates(&mut project.milestones, &project.tasks);
    for m in &project.milestones {
        conn.execute(
            "UPDATE milestones SET due_date = ?1 WHERE id = ?2",
            params![m.due_date, m.id],
        )?;
    }

    Ok(moved)
}

impl Database {
    /// Create a project from a stored template.
    ///
    /// The template and roster are read and the project is written in one
    /// transaction, so either the whole project exists afterwards or none of it.
    /// Ids already in the database are reserved with `ids` first.
    pub fn instantiate_template(
        &self,
        template_id: &str,
        reference_date: NaiveDate,
        ids: &mut impl IdSource,
        options: &InstantiateOptions,
    ) -> Result<Instantiation> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let template = read_template(&tx, template_id)?
                .ok_or_else(|| StoreError::TemplateNotFound(template_id.to_string()))?;
            let roster = RosterSnapshot::new(&read_people(&tx)?);
            let reserved = reserve_existing_ids(&tx, ids)?;
            debug!(
                template = %template_id,
                active_people = roster.active_count(),
                reserved_ids = reserved,
                "Roster snapshot taken"
            );

            let result = crate::instantiate::instantiate_template(
                &template,
                reference_date,
                &roster,
                ids,
                options,
                now_ms(),
            )?;

            insert_project(&tx, &result.project)?;
            tx.commit()?;
            Ok(result)
        })
    }

    /// Get a project with its milestones and tasks.
    pub fn get_project(&self, project_id: &str) -> Result<Option<Project>> {
        self.with_conn(|conn| read_project(conn, project_id))
    }

    /// List projects, most recent first.
    pub fn list_projects(&self) -> Result<Vec<ProjectSummary>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT p.id, p.template_id, p.name, p.reference_date,
                        (SELECT COUNT(*) FROM tasks t WHERE t.project_id = p.id)
                 FROM projects p ORDER BY p.created_at DESC, p.id",
            )?;
            let projects = stmt
                .query_map([], |row| {
                    Ok(ProjectSummary {
                        id: row.get(0)?,
                        template_id: row.get(1)?,
                        name: row.get(2)?,
                        reference_date: row.get(3)?,
                        task_count: row.get(4)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(projects)
        })
    }

    /// Move a project to a new reference date and recompute every due date.
    ///
    /// Runs as one immediate transaction; readers never see a half-moved
    /// project.
    pub fn reschedule_project(&self, project_id: &str, reference_date: NaiveDate) -> Result<Project> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let mut project = read_project(&tx, project_id)?
                .ok_or_else(|| StoreError::ProjectNotFound(project_id.to_string()))?;
            let previous = project.reference_date;
            project.reference_date = reference_date;
            project.updated_at = now_ms();

            let moved = write_dates(&tx, &mut project)?;
            tx.execute(
                "UPDATE projects SET reference_date = ?1, updated_at = ?2 WHERE id = ?3",
                params![project.reference_date, project.updated_at, project.id],
            )?;
            tx.commit()?;

            info!(
                project = %project_id,
                from = %previous,
                to = %reference_date,
                moved,
                "Project rescheduled"
            );
            Ok(project)
        })
    }

    /// Change a task's status.
    ///
    /// `completed_at` is set on completion and cleared otherwise. Dates are
    /// re-propagated because completion-based dependents follow the actual
    /// completion day.
    pub fn set_task_status(&self, task_id: &str, status: TaskStatus) -> Result<Task> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let project_id: String = tx
                .query_row(
                    "SELECT project_id FROM tasks WHERE id = ?1",
                    params![task_id],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or_else(|| StoreError::TaskNotFound(task_id.to_string()))?;
            let mut project = read_project(&tx, &project_id)?
                .ok_or_else(|| StoreError::ProjectNotFound(project_id.clone()))?;

            let now = now_ms();
            let task = project
                .tasks
                .iter_mut()
                .find(|t| t.id == task_id)
                .ok_or_else(|| anyhow!("task {} missing from project {}", task_id, project_id))?;
            task.set_status(status, now);
            tx.execute(
                "UPDATE tasks SET status = ?1, completed_at = ?2 WHERE id = ?3",
                params![task.status.as_str(), task.completed_at, task.id],
            )?;

            let moved = write_dates(&tx, &mut project)?;
            tx.execute(
                "UPDATE projects SET updated_at = ?1 WHERE id = ?2",
                params![now, project_id],
            )?;
            tx.commit()?;

            debug!(task = %task_id, status = status.as_str(), moved, "Task status changed");
            project
                .tasks
                .into_iter()
                .find(|t| t.id == task_id)
                .ok_or_else(|| anyhow!("task {} missing after update", task_id))
        })
    }

    /// Completion per milestone, in milestone order.
    pub fn project_progress(&self, project_id: &str) -> Result<Vec<(Milestone, Progress)>> {
        let project = self
            .get_project(project_id)?
            .ok_or_else(|| StoreError::ProjectNotFound(project_id.to_string()))?;
        let progress = progress_by_milestone(&project.tasks);

        Ok(ordered(&project.milestones)
            .into_iter()
            .map(|m| {
                let p = progress.get(&m.id).copied().unwrap_or(Progress {
                    completed: 0,
                    total: 0,
                });
                (m.clone(), p)
            })
            .collect())
    }

    /// Delete a project and everything in it. Returns false if it did not exist.
    pub fn delete_project(&self, project_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM projects WHERE id = ?1", params![project_id])?;
            Ok(deleted > 0)
        })
    }
}
