//! Template storage.
//!
//! A template can be replaced freely until the first project is created from
//! it. After that it is locked: live projects keep their own copies of the
//! schedule, but a changed template would no longer describe them.

use super::{Database, now_ms};
use crate::error::StoreError;
use crate::roles::Role;
use crate::tree::normalize_levels;
use crate::types::{ProjectTemplate, Schedule, TemplateDefinition, TemplateMilestone, TemplateTask};
use anyhow::{Result, anyhow};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::HashMap;
use tracing::{debug, info};

/// Split a schedule into its storage columns.
pub(crate) fn schedule_columns(schedule: &Schedule) -> (Option<i32>, Option<&str>, Option<&'static str>, i32) {
    match schedule {
        Schedule::None => (None, None, None, 0),
        Schedule::Offset { days_from_meeting } => (Some(*days_from_meeting), None, None, 0),
        Schedule::Dependent {
            depends_on_task_id,
            policy,
        } => (
            None,
            Some(depends_on_task_id.as_str()),
            Some(policy.as_str()),
            policy.days(),
        ),
    }
}

/// Rebuild a schedule from the row's storage columns.
pub(crate) fn schedule_from_row(row: &Row) -> rusqlite::Result<Schedule> {
    let days_from_meeting: Option<i32> = row.get("days_from_meeting")?;
    let depends_on: Option<String> = row.get("depends_on_task_id")?;
    let policy: Option<String> = row.get("dependency_policy")?;
    let policy_days: i32 = row.get("policy_days")?;

    Schedule::from_columns(days_from_meeting, depends_on, policy.as_deref(), policy_days).ok_or_else(
        || {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                "invalid schedule columns".into(),
            )
        },
    )
}

/// Number of projects created from a template.
pub(crate) fn project_count(conn: &Connection, template_id: &str) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM projects WHERE template_id = ?1",
        params![template_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

fn parse_template_task_row(row: &Row) -> rusqlite::Result<TemplateTask> {
    Ok(TemplateTask {
        id: row.get("id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        level: row.get("level")?,
        parent_task_id: row.get("parent_task_id")?,
        milestone_id: row.get("milestone_id")?,
        sort_order: row.get("sort_order")?,
        schedule: schedule_from_row(row)?,
        assigned_to_roles: Vec::new(),
    })
}

/// Read a complete template definition.
pub(crate) fn read_template(conn: &Connection, template_id: &str) -> Result<Option<TemplateDefinition>> {
    let header = conn
        .query_row(
            "SELECT id, name, description FROM templates WHERE id = ?1",
            params![template_id],
            |row| {
                Ok(ProjectTemplate {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                })
            },
        )
        .optional()?;

    let Some(template) = header else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT id, title, description, sort_order FROM template_milestones
         WHERE template_id = ?1 ORDER BY sort_order, id",
    )?;
    let milestones = stmt
        .query_map(params![template_id], |row| {
            Ok(TemplateMilestone {
                id: row.get(0)?,
                title: row.get(1)?,
                description: row.get(2)?,
                sort_order: row.get(3)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stmt = conn.prepare(
        "SELECT task_id, role FROM template_task_roles
         WHERE template_id = ?1 ORDER BY task_id, position",
    )?;
    let mut roles: HashMap<String, Vec<Role>> = HashMap::new();
    let rows = stmt.query_map(params![template_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (task_id, role) = row?;
        let role = Role::from_str(&role).ok_or_else(|| anyhow!("Unknown role in database: {}", role))?;
        roles.entry(task_id).or_default().push(role);
    }

    let mut stmt = conn.prepare(
        "SELECT * FROM template_tasks WHERE template_id = ?1 ORDER BY rowid",
    )?;
    let mut tasks = stmt
        .query_map(params![template_id], parse_template_task_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    for task in &mut tasks {
        task.assigned_to_roles = roles.remove(&task.id).unwrap_or_default();
    }

    Ok(Some(TemplateDefinition {
        template,
        milestones,
        tasks,
    }))
}

impl Database {
    /// Create or replace a template.
    ///
    /// Fails with `StoreError::TemplateLocked` once a project has been
    /// created from the template. Stored levels are normalized to the
    /// hierarchy depth.
    pub fn save_template(&self, definition: &TemplateDefinition) -> Result<()> {
        let template_id = definition.template.id.as_str();
        let mut tasks = definition.tasks.clone();
        let drifted = normalize_levels(&mut tasks);
        if !drifted.is_empty() {
            debug!(template = %template_id, tasks = ?drifted, "Normalized stored task levels");
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let projects = project_count(&tx, template_id)?;
            if projects > 0 {
                return Err(StoreError::TemplateLocked {
                    template_id: template_id.to_string(),
                    projects,
                }
                .into());
            }

            let now = now_ms();
            tx.execute(
                "INSERT INTO templates (id, name, description, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    description = excluded.description,
                    updated_at = excluded.updated_at",
                params![
                    template_id,
                    definition.template.name,
                    definition.template.description,
                    now
                ],
            )?;

            tx.execute("DELETE FROM template_milestones WHERE template_id = ?1", params![template_id])?;
            tx.execute("DELETE FROM template_tasks WHERE template_id = ?1", params![template_id])?;

            for m in &definition.milestones {
                tx.execute(
                    "INSERT INTO template_milestones (template_id, id, title, description, sort_order)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![template_id, m.id, m.title, m.description, m.sort_order],
                )?;
            }

            for task in &tasks {
                let (offset, depends_on, policy, policy_days) = schedule_columns(&task.schedule);
                tx.execute(
                    "INSERT INTO template_tasks (
                        template_id, id, title, description, level, parent_task_id, milestone_id,
                        sort_order, days_from_meeting, depends_on_task_id, dependency_policy, policy_days
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                    params![
                        template_id,
                        task.id,
                        task.title,
                        task.description,
                        task.level,
                        task.parent_task_id,
                        task.milestone_id,
                        task.sort_order,
                        offset,
                        depends_on,
                        policy,
                        policy_days
                    ],
                )?;
                for (position, role) in task.assigned_to_roles.iter().enumerate() {
                    tx.execute(
                        "INSERT OR IGNORE INTO template_task_roles (template_id, task_id, role, position)
                         VALUES (?1, ?2, ?3, ?4)",
                        params![template_id, task.id, role.as_str(), position as i64],
                    )?;
                }
            }

            tx.commit()?;
            info!(
                template = %template_id,
                milestones = definition.milestones.len(),
                tasks = tasks.len(),
                "Template saved"
            );
            Ok(())
        })
    }

    /// Get a template with its milestones and tasks.
    pub fn get_template(&self, template_id: &str) -> Result<Option<TemplateDefinition>> {
        self.with_conn(|conn| read_template(conn, template_id))
    }

    /// List stored template headers, ordered by id.
    pub fn list_stored_templates(&self) -> Result<Vec<ProjectTemplate>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, name, description FROM templates ORDER BY id")?;
            let templates = stmt
                .query_map([], |row| {
                    Ok(ProjectTemplate {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        description: row.get(2)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(templates)
        })
    }

    /// Whether projects exist for the template, which makes it read-only.
    pub fn is_template_locked(&self, template_id: &str) -> Result<bool> {
        self.with_conn(|conn| Ok(project_count(conn, template_id)? > 0))
    }

    /// Delete a template that has no projects.
    pub fn delete_template(&self, template_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let projects = project_count(&tx, template_id)?;
            if projects > 0 {
                return Err(StoreError::TemplateLocked {
                    template_id: template_id.to_string(),
                    projects,
                }
                .into());
            }
            let deleted = tx.execute("DELETE FROM templates WHERE id = ?1", params![template_id])?;
            if deleted == 0 {
                return Err(StoreError::TemplateNotFound(template_id.to_string()).into());
            }
            tx.commit()?;
            Ok(())
        })
    }
}
