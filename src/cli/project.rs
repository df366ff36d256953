//! Project subcommands

use super::parse_date;
use crate::instantiate::InstantiateOptions;
use chrono::NaiveDate;
use clap::{Args, Subcommand};

#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    /// Create a project from a stored template
    Create(CreateArgs),

    /// Show a project with its milestones and tasks
    Show {
        project_id: String,
    },

    /// List projects
    List,

    /// Move the meeting date and recompute every due date
    Reschedule {
        project_id: String,

        /// New meeting date (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        date: NaiveDate,
    },

    /// Show completion per milestone
    Progress {
        project_id: String,
    },

    /// Delete a project and all of its tasks
    Delete {
        project_id: String,
    },
}

/// Arguments for `project create`
#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Stored template id
    pub template_id: String,

    /// Meeting date the template offsets are measured from (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub date: NaiveDate,

    /// Project name (default: "<template name> <date>")
    #[arg(long)]
    pub name: Option<String>,

    /// Prefix added to every task title
    #[arg(long)]
    pub title_prefix: Option<String>,
}

impl CreateArgs {
    pub fn options(&self) -> InstantiateOptions {
        let mut options = InstantiateOptions::new();
        if let Some(ref name) = self.name {
            options = options.with_name(name);
        }
        if let Some(ref prefix) = self.title_prefix {
            options = options.with_title_prefix(prefix);
        }
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_options() {
        let args = CreateArgs {
            template_id: "annual-review".into(),
            date: NaiveDate::from_ymd_opt(2025, 10, 1).unwrap(),
            name: None,
            title_prefix: Some("Smith".into()),
        };
        let options = args.options();
        assert_eq!(options.project_name, None);
        assert_eq!(options.title_prefix.as_deref(), Some("Smith"));
    }
}
