//! meeting-planner CLI
//!
//! Imports meeting-anchored templates, keeps a roster, and turns templates
//! into dated, assigned projects.

use anyhow::{Result, bail};
use clap::Parser;
use meeting_planner::cli::project::ProjectCommand;
use meeting_planner::cli::roster::RosterCommand;
use meeting_planner::cli::template::TemplateCommand;
use meeting_planner::cli::{Cli, Command, TaskCommand};
use meeting_planner::config::{Config, ConfigLoader};
use meeting_planner::db::Database;
use meeting_planner::error::{ErrorCode, InstantiationError, StoreError};
use meeting_planner::format::{
    OutputFormat, format_progress_markdown, format_project_markdown, format_roster_markdown,
    format_template_markdown, format_templates_markdown, format_warnings_markdown,
};
use meeting_planner::instantiate::PetnameIds;
use meeting_planner::logging::{self, LogTarget};
use meeting_planner::milestones::duplicate_milestone_ids;
use meeting_planner::schedule::find_dependency_cycles;
use meeting_planner::template::{analyze_template, list_templates, load_template};
use meeting_planner::tree::validate_hierarchy;
use meeting_planner::types::Person;
use serde::Serialize;
use serde_json::json;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

fn main() {
    if let Err(err) = run() {
        match error_code(&err) {
            Some(code) => {
                let code = serde_json::to_value(code).unwrap_or_default();
                eprintln!("Error [{}]: {:#}", code.as_str().unwrap_or("UNKNOWN"), err);
            }
            None => eprintln!("Error: {:#}", err),
        }
        std::process::exit(1);
    }
}

fn error_code(err: &anyhow::Error) -> Option<ErrorCode> {
    if let Some(e) = err.downcast_ref::<InstantiationError>() {
        return Some(e.code());
    }
    err.downcast_ref::<StoreError>().map(StoreError::code)
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration using the loader with tier merging
    // If explicit config path given, set it as env var for ConfigLoader to pick up
    if let Some(config_path) = &cli.config {
        // SAFETY: single-threaded at startup, before anything reads the environment
        unsafe {
            std::env::set_var("MEETING_PLANNER_CONFIG_PATH", config_path);
        }
    }
    let mut loader = ConfigLoader::load()?;

    logging::init(
        &LogTarget::parse(&cli.log),
        &loader.config().logging.level,
        cli.verbose,
    )?;
    for (tier, path) in loader.sources() {
        debug!(tier = %tier, path = ?path, "Config source");
    }

    // Override config from CLI arguments
    let config = loader.config_mut();
    if let Some(db_path) = &cli.database {
        config.database.path = db_path.into();
    }
    if let Some(dir) = &cli.templates_dir {
        config.templates.dir = dir.into();
    }
    if let Some(format) = cli.format {
        config.output.format = format.into();
    }
    let config = loader.into_config();

    match cli.command {
        Command::Template(cmd) => run_template(&config, cmd),
        Command::Roster(cmd) => run_roster(&config, cmd),
        Command::Project(cmd) => run_project(&config, cmd),
        Command::Task(cmd) => run_task(&config, cmd),
    }
}

fn open_database(config: &Config) -> Result<Database> {
    config.ensure_db_dir()?;
    debug!(path = ?config.database.path, "Opening database");
    Database::open(&config.database.path)
}

/// Print either the JSON value or the markdown rendering.
fn emit<T: Serialize>(format: OutputFormat, value: &T, markdown: impl FnOnce() -> String) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Markdown => print!("{}", markdown()),
    }
    Ok(())
}

fn run_template(config: &Config, cmd: TemplateCommand) -> Result<()> {
    let format = config.output.format;
    match cmd {
        TemplateCommand::Import { file, force } => {
            let definition = load_template(&file)?;
            let metadata = analyze_template(&definition, file.to_str())?;
            if !metadata.valid && !force {
                bail!(
                    "Template {} has structural errors; run 'template validate' or pass --force",
                    metadata.id
                );
            }
            let db = open_database(config)?;
            db.save_template(&definition)?;
            emit(format, &metadata, || {
                format!(
                    "Imported template `{}` ({} tasks, {} milestones)\n",
                    metadata.id, metadata.task_count, metadata.milestone_count
                )
            })
        }
        TemplateCommand::Validate { file } => {
            let definition = load_template(&file)?;
            let milestone_ids: HashSet<&str> =
                definition.milestones.iter().map(|m| m.id.as_str()).collect();
            let duplicate_milestones = duplicate_milestone_ids(&definition.milestones);
            let structural = validate_hierarchy(&definition.tasks, &milestone_ids);
            let cycles = find_dependency_cycles(&definition.tasks);
            let valid = duplicate_milestones.is_empty() && structural.is_empty() && cycles.is_empty();

            let report = json!({
                "template": &definition.template.id,
                "valid": valid,
                "duplicate_milestones": &duplicate_milestones,
                "structural_errors": &structural,
                "dependency_cycles": &cycles,
            });
            emit(format, &report, || {
                let mut md = format!("# Validate: {}\n\n", definition.template.id);
                if valid {
                    md.push_str("No problems found.\n");
                }
                for id in &duplicate_milestones {
                    md.push_str(&format!("- milestone id `{}` is used more than once\n", id));
                }
                for e in &structural {
                    md.push_str(&format!("- {}\n", e));
                }
                for c in &cycles {
                    md.push_str(&format!("- {} (also blocks: {})\n", c, c.affected.join(", ")));
                }
                md
            })?;
            if !valid {
                bail!("Template {} is invalid", definition.template.id);
            }
            Ok(())
        }
        TemplateCommand::List { stored } => {
            if stored {
                let db = open_database(config)?;
                let templates = db.list_stored_templates()?;
                emit(format, &templates, || {
                    let mut md = format!("# Stored templates ({})\n\n", templates.len());
                    for t in &templates {
                        md.push_str(&format!("- **{}** `{}`\n", t.name, t.id));
                    }
                    md
                })
            } else {
                let templates = list_templates(&config.templates.dir)?;
                emit(format, &templates, || format_templates_markdown(&templates))
            }
        }
        TemplateCommand::Show { template_id } => {
            let db = open_database(config)?;
            let definition = db
                .get_template(&template_id)?
                .ok_or_else(|| StoreError::TemplateNotFound(template_id.clone()))?;
            emit(format, &definition, || format_template_markdown(&definition))
        }
    }
}

/// Read a list of people from JSON or YAML.
fn load_people(path: &Path) -> Result<Vec<Person>> {
    let content = std::fs::read_to_string(path)?;
    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext == "yaml" || ext == "yml");
    let people = if is_yaml {
        serde_yaml::from_str(&content)?
    } else {
        serde_json::from_str(&content)?
    };
    Ok(people)
}

fn run_roster(config: &Config, cmd: RosterCommand) -> Result<()> {
    let format = config.output.format;
    let db = open_database(config)?;
    match cmd {
        RosterCommand::Import { file } => {
            let people = load_people(&file)?;
            for person in &people {
                db.upsert_person(person)?;
            }
            info!(count = people.len(), "Roster imported");
            let result = json!({ "imported": people.len() });
            emit(format, &result, || format!("Imported {} people\n", people.len()))
        }
        RosterCommand::List => {
            let people = db.list_people()?;
            emit(format, &people, || format_roster_markdown(&people))
        }
        RosterCommand::Deactivate { person_id } => set_active(&db, format, &person_id, false),
        RosterCommand::Activate { person_id } => set_active(&db, format, &person_id, true),
    }
}

fn set_active(db: &Database, format: OutputFormat, person_id: &str, active: bool) -> Result<()> {
    if !db.set_person_active(person_id, active)? {
        bail!("Person not found: {}", person_id);
    }
    let verb = if active { "Activated" } else { "Deactivated" };
    emit(format, &json!({ "id": person_id, "active": active }), || {
        format!("{} `{}`\n", verb, person_id)
    })
}

fn run_project(config: &Config, cmd: ProjectCommand) -> Result<()> {
    let format = config.output.format;
    let db = open_database(config)?;
    match cmd {
        ProjectCommand::Create(args) => {
            let mut ids = PetnameIds::new(config.ids.clone());
            let result = db.instantiate_template(&args.template_id, args.date, &mut ids, &args.options())?;
            let output = json!({
                "project": &result.project,
                "warnings": &result.warnings,
            });
            emit(format, &output, || {
                let mut md = format_project_markdown(&result.project);
                md.push_str(&format_warnings_markdown(&result.warnings));
                md
            })
        }
        ProjectCommand::Show { project_id } => {
            let project = db
                .get_project(&project_id)?
                .ok_or_else(|| StoreError::ProjectNotFound(project_id.clone()))?;
            emit(format, &project, || format_project_markdown(&project))
        }
        ProjectCommand::List => {
            let projects = db.list_projects()?;
            emit(format, &projects, || {
                let mut md = format!("# Projects ({})\n\n", projects.len());
                for p in &projects {
                    md.push_str(&format!(
                        "- **{}** `{}`: meeting {}, {} tasks (template `{}`)\n",
                        p.name, p.id, p.reference_date, p.task_count, p.template_id
                    ));
                }
                md
            })
        }
        ProjectCommand::Reschedule { project_id, date } => {
            let project = db.reschedule_project(&project_id, date)?;
            emit(format, &project, || format_project_markdown(&project))
        }
        ProjectCommand::Progress { project_id } => {
            let progress = db.project_progress(&project_id)?;
            let project = db
                .get_project(&project_id)?
                .ok_or_else(|| StoreError::ProjectNotFound(project_id.clone()))?;
            let rows: Vec<_> = progress
                .iter()
                .map(|(m, p)| {
                    json!({
                        "milestone_id": m.id,
                        "title": m.title,
                        "due_date": m.due_date,
                        "completed": p.completed,
                        "total": p.total,
                        "percent": p.percent(),
                    })
                })
                .collect();
            emit(format, &rows, || format_progress_markdown(&project))
        }
        ProjectCommand::Delete { project_id } => {
            if !db.delete_project(&project_id)? {
                return Err(StoreError::ProjectNotFound(project_id).into());
            }
            emit(format, &json!({ "deleted": &project_id }), || {
                format!("Deleted project `{}`\n", project_id)
            })
        }
    }
}

fn run_task(config: &Config, cmd: TaskCommand) -> Result<()> {
    let format = config.output.format;
    let db = open_database(config)?;
    match cmd {
        TaskCommand::Status { task_id, status } => {
            let task = db.set_task_status(&task_id, status)?;
            emit(format, &task, || {
                let due = task
                    .due_date
                    .map(|d| format!(", due {}", d))
                    .unwrap_or_default();
                format!("`{}` is now {}{}\n", task.id, task.status.as_str(), due)
            })
        }
    }
}
