//! Roster subcommands

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand, Debug)]
pub enum RosterCommand {
    /// Import people from a JSON or YAML list, upserting by id
    Import {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// List everyone on the roster
    List,

    /// Mark a person inactive so new projects no longer assign them
    Deactivate {
        person_id: String,
    },

    /// Mark a person active again
    Activate {
        person_id: String,
    },
}
