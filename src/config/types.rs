//! Configuration types and structures.

use crate::format::OutputFormat;
use anyhow::Result;
use heck::{ToKebabCase, ToLowerCamelCase, ToSnakeCase, ToUpperCamelCase};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Letter case applied to generated ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdCase {
    /// `brave-red-fox` (default)
    #[default]
    Kebab,
    /// `brave_red_fox`
    Snake,
    /// `braveRedFox`
    Camel,
    /// `BraveRedFox`
    Pascal,
}

impl IdCase {
    pub fn convert(&self, id: &str) -> String {
        match self {
            IdCase::Kebab => id.to_kebab_case(),
            IdCase::Snake => id.to_snake_case(),
            IdCase::Camel => id.to_lower_camel_case(),
            IdCase::Pascal => id.to_upper_camel_case(),
        }
    }
}

/// How ids for projects, milestones and tasks are minted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdsConfig {
    /// Number of petname words per id (default: 3).
    #[serde(default = "default_task_id_words")]
    pub task_id_words: u8,

    #[serde(default)]
    pub id_case: IdCase,
}

impl Default for IdsConfig {
    fn default() -> Self {
        Self {
            task_id_words: default_task_id_words(),
            id_case: IdCase::default(),
        }
    }
}

fn default_task_id_words() -> u8 {
    3
}

/// Database location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".meeting-planner/planner.db")
}

/// Where template files are discovered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplatesConfig {
    #[serde(default = "default_templates_dir")]
    pub dir: PathBuf,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            dir: default_templates_dir(),
        }
    }
}

fn default_templates_dir() -> PathBuf {
    PathBuf::from("templates")
}

/// Logging defaults. The `--log` and `--verbose` flags win over these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `meeting_planner=debug`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Output settings for CLI commands.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Default output format (json or markdown).
    #[serde(default)]
    pub format: OutputFormat,
}

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub ids: IdsConfig,

    #[serde(default)]
    pub templates: TemplatesConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from a single YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Ensure the database directory exists.
    pub fn ensure_db_dir(&self) -> Result<()> {
        if let Some(parent) = self.database.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.database.path, PathBuf::from(".meeting-planner/planner.db"));
        assert_eq!(config.ids.task_id_words, 3);
        assert_eq!(config.output.format, OutputFormat::Markdown);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config: Config = serde_yaml::from_str("ids:\n  id_case: snake\n").unwrap();
        assert_eq!(config.ids.id_case, IdCase::Snake);
        assert_eq!(config.ids.task_id_words, 3);
        assert_eq!(config.templates.dir, PathBuf::from("templates"));
    }

    #[test]
    fn test_id_case_conversion() {
        assert_eq!(IdCase::Kebab.convert("brave-red-fox"), "brave-red-fox");
        assert_eq!(IdCase::Snake.convert("brave-red-fox"), "brave_red_fox");
        assert_eq!(IdCase::Camel.convert("brave-red-fox"), "braveRedFox");
        assert_eq!(IdCase::Pascal.convert("brave-red-fox"), "BraveRedFox");
    }
}
