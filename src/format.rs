//! Output formatting utilities for markdown and JSON.

use crate::error::Warning;
use crate::milestones::{into_sections, ordered, progress_by_milestone, Progress};
use crate::template::TemplateMetadata;
use crate::tree::build_task_tree;
use crate::types::{Person, Project, Schedule, Task, TaskStatus, TaskTree, TemplateDefinition, TemplateTask};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    #[default]
    Markdown,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(OutputFormat::Json),
            "markdown" | "md" => Some(OutputFormat::Markdown),
            _ => None,
        }
    }
}

fn status_box(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Todo => "[ ]",
        TaskStatus::InProgress => "[~]",
        TaskStatus::Completed => "[x]",
        TaskStatus::Cancelled => "[-]",
    }
}

fn describe_schedule(schedule: &Schedule) -> String {
    match schedule {
        Schedule::None => "no date".to_string(),
        Schedule::Offset { days_from_meeting } => match days_from_meeting {
            0 => "meeting day".to_string(),
            d if *d < 0 => format!("{} days before meeting", -d),
            d => format!("{} days after meeting", d),
        },
        Schedule::Dependent {
            depends_on_task_id,
            policy,
        } => match policy.days() {
            0 => format!("{} of `{}`", policy.as_str().replace('_', " "), depends_on_task_id),
            days => format!(
                "{} `{}` ({:+} days)",
                policy.as_str().replace('_', " "),
                depends_on_task_id,
                days
            ),
        },
    }
}

fn push_template_node(md: &mut String, node: &TaskTree<TemplateTask>) {
    let task = &node.task;
    let indent = "  ".repeat(node.depth as usize);
    md.push_str(&format!(
        "{}- {} `{}` ({})",
        indent,
        task.title,
        task.id,
        describe_schedule(&task.schedule)
    ));
    if !task.assigned_to_roles.is_empty() {
        let roles: Vec<&str> = task.assigned_to_roles.iter().map(|r| r.as_str()).collect();
        md.push_str(&format!(" [{}]", roles.join(", ")));
    }
    md.push('\n');
    for child in &node.children {
        push_template_node(md, child);
    }
}

/// Format a template as a milestone-sectioned outline.
pub fn format_template_markdown(definition: &TemplateDefinition) -> String {
    let mut md = String::new();
    md.push_str(&format!("# Template: {}\n", definition.template.name));
    md.push_str(&format!("- **id**: `{}`\n", definition.template.id));
    if let Some(ref desc) = definition.template.description {
        md.push_str(&format!("- **description**: {}\n", desc));
    }
    md.push('\n');

    let (sections, unsectioned) =
        into_sections(&definition.milestones, build_task_tree(&definition.tasks));
    for section in sections {
        md.push_str(&format!("## {}\n\n", section.milestone.title));
        for root in &section.roots {
            push_template_node(&mut md, root);
        }
        md.push('\n');
    }
    if !unsectioned.is_empty() {
        md.push_str("## (no milestone)\n\n");
        for root in &unsectioned {
            push_template_node(&mut md, root);
        }
        md.push('\n');
    }

    md
}

fn push_task_node(md: &mut String, node: &TaskTree<Task>) {
    let task = &node.task;
    let indent = "  ".repeat(node.depth as usize);
    let due = task
        .due_date
        .map(|d| format!(" due {}", d))
        .unwrap_or_default();
    let people = if task.assigned_to.is_empty() {
        String::new()
    } else {
        format!(
            " {}",
            task.assigned_to
                .iter()
                .map(|p| format!("@{}", p))
                .collect::<Vec<_>>()
                .join(" ")
        )
    };
    md.push_str(&format!(
        "{}- {} {} `{}`{}{}\n",
        indent,
        status_box(task.status),
        task.title,
        task.id,
        due,
        people
    ));
    for child in &node.children {
        push_task_node(md, child);
    }
}

/// Format a live project with its milestones and task trees.
pub fn format_project_markdown(project: &Project) -> String {
    let mut md = String::new();
    md.push_str(&format!("# Project: {}\n", project.name));
    md.push_str(&format!("- **id**: `{}`\n", project.id));
    md.push_str(&format!("- **template**: `{}`\n", project.template_id));
    md.push_str(&format!("- **meeting**: {}\n\n", project.reference_date));

    let progress = progress_by_milestone(&project.tasks);
    let (sections, unsectioned) =
        into_sections(&project.milestones, build_task_tree(&project.tasks));
    for section in sections {
        let m = &section.milestone;
        let p = progress.get(&m.id).copied().unwrap_or(Progress {
            completed: 0,
            total: 0,
        });
        md.push_str(&format!("## {} ({}%)", m.title, p.percent()));
        if let Some(due) = m.due_date {
            md.push_str(&format!(" due {}", due));
        }
        md.push_str("\n\n");
        for root in &section.roots {
            push_task_node(&mut md, root);
        }
        md.push('\n');
    }
    if !unsectioned.is_empty() {
        md.push_str("## (no milestone)\n\n");
        for root in &unsectioned {
            push_task_node(&mut md, root);
        }
        md.push('\n');
    }

    md
}

/// Format per-milestone progress as a table.
pub fn format_progress_markdown(project: &Project) -> String {
    let progress = progress_by_milestone(&project.tasks);
    let mut md = String::new();
    md.push_str(&format!("# Progress: {}\n\n", project.name));
    md.push_str("| Milestone | Done | Total | % | Due |\n");
    md.push_str("|---|---|---|---|---|\n");
    for m in ordered(&project.milestones) {
        let p = progress.get(&m.id).copied().unwrap_or(Progress {
            completed: 0,
            total: 0,
        });
        md.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            m.title,
            p.completed,
            p.total,
            p.percent(),
            m.due_date.map(|d| d.to_string()).unwrap_or_else(|| "-".into())
        ));
    }
    md
}

/// Format warnings as a bullet list. Empty input gives an empty string.
pub fn format_warnings_markdown(warnings: &[Warning]) -> String {
    if warnings.is_empty() {
        return String::new();
    }
    let mut md = format!("## Warnings ({})\n\n", warnings.len());
    for warning in warnings {
        match warning {
            Warning::UnassignedRole(w) => md.push_str(&format!(
                "- `{}`: no active person with role {}\n",
                w.task_id, w.role
            )),
            Warning::UnresolvedDependency(w) => md.push_str(&format!(
                "- `{}`: no date from `{}` ({})\n",
                w.task_id, w.depends_on, w.reason
            )),
        }
    }
    md
}

/// Format template summaries as markdown.
pub fn format_templates_markdown(templates: &[TemplateMetadata]) -> String {
    let mut md = format!("# Templates ({})\n\n", templates.len());
    for t in templates {
        let flag = if t.valid { "" } else { " (invalid)" };
        md.push_str(&format!(
            "- **{}** `{}`: {} tasks in {} milestones, depth {}{}\n",
            t.name, t.id, t.task_count, t.milestone_count, t.max_depth, flag
        ));
    }
    md
}

/// Format the roster as markdown.
pub fn format_roster_markdown(people: &[Person]) -> String {
    let mut md = format!("# Roster ({})\n\n", people.len());
    for person in people {
        let roles: Vec<&str> = person.roles.iter().map(|r| r.as_str()).collect();
        let inactive = if person.active { "" } else { " (inactive)" };
        md.push_str(&format!(
            "- {} `{}`: {}{}\n",
            person.name,
            person.id,
            roles.join(", "),
            inactive
        ));
    }
    md
}

/// Convert markdown to JSON value for uniform response handling.
pub fn markdown_to_json(md: String) -> Value {
    serde_json::json!({
        "format": "markdown",
        "content": md
    })
}
