//! CLI command definitions for meeting-planner
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.

pub mod project;
pub mod roster;
pub mod template;

use crate::format::OutputFormat;
use crate::types::TaskStatus;
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use project::ProjectCommand;
use roster::RosterCommand;
use template::TemplateCommand;

/// Output format selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Json,
    Markdown,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Json => OutputFormat::Json,
            FormatArg::Markdown => OutputFormat::Markdown,
        }
    }
}

/// Meeting-anchored project templates and live project scheduling
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Path to database file (overrides config)
    #[arg(short, long, global = true)]
    pub database: Option<String>,

    /// Template directory (overrides config)
    #[arg(long, global = true)]
    pub templates_dir: Option<String>,

    /// Output format (overrides config)
    #[arg(short, long, value_enum, global = true)]
    pub format: Option<FormatArg>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Import, validate and inspect templates
    #[command(subcommand)]
    Template(TemplateCommand),

    /// Manage the roster of people and their roles
    #[command(subcommand)]
    Roster(RosterCommand),

    /// Create and manage live projects
    #[command(subcommand)]
    Project(ProjectCommand),

    /// Update a task in a live project
    #[command(subcommand)]
    Task(TaskCommand),
}

/// Task subcommands
#[derive(Subcommand, Debug)]
pub enum TaskCommand {
    /// Set a task's status (todo, in_progress, completed, cancelled)
    Status {
        /// Task id
        task_id: String,

        #[arg(value_parser = parse_status)]
        status: TaskStatus,
    },
}

/// Parse a `YYYY-MM-DD` date argument.
pub fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("invalid date '{}': {}", s, e))
}

/// Parse a task status argument.
pub fn parse_status(s: &str) -> Result<TaskStatus, String> {
    TaskStatus::from_str(&s.replace('-', "_")).ok_or_else(|| {
        format!(
            "invalid status '{}' (expected todo, in_progress, completed or cancelled)",
            s
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("2025-10-01"), Ok(NaiveDate::from_ymd_opt(2025, 10, 1).unwrap()));
        assert!(parse_date("10/01/2025").is_err());
    }

    #[test]
    fn test_parse_status_accepts_dashes() {
        assert_eq!(parse_status("in-progress"), Ok(TaskStatus::InProgress));
        assert_eq!(parse_status("completed"), Ok(TaskStatus::Completed));
        assert!(parse_status("done").is_err());
    }

    #[test]
    fn test_parse_project_create() {
        let cli = Cli::parse_from([
            "meeting-planner",
            "--format",
            "json",
            "project",
            "create",
            "annual-review",
            "--date",
            "2025-10-01",
            "--name",
            "Smith review",
        ]);
        assert_eq!(cli.format, Some(FormatArg::Json));
        match cli.command {
            Command::Project(ProjectCommand::Create(args)) => {
                assert_eq!(args.template_id, "annual-review");
                assert_eq!(args.date, NaiveDate::from_ymd_opt(2025, 10, 1).unwrap());
                assert_eq!(args.name.as_deref(), Some("Smith review"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
