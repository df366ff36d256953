//! Template subcommands
//!
//! Templates are authored as JSON or YAML files and imported into the
//! database before projects can be created from them.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand, Debug)]
pub enum TemplateCommand {
    /// Import a template file, replacing a stored template with the same id
    ///
    /// Fails if projects were already created from that template.
    Import {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Import even if the template has structural errors
        #[arg(long)]
        force: bool,
    },

    /// Check a template file for structural errors and dependency cycles
    Validate {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// List templates in the template directory, or stored ones with --stored
    List {
        #[arg(long)]
        stored: bool,
    },

    /// Show a stored template as a milestone outline
    Show {
        template_id: String,
    },
}
