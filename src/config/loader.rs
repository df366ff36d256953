//! Configuration loader with tier-based merging.
//!
//! Loads configuration from multiple tiers and merges them field-by-field.

use super::merge::deep_merge_all;
use super::types::Config;
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Configuration tier priority (lowest to highest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigTier {
    /// Built-in defaults (lowest priority)
    Defaults = 0,
    /// Project-level config ($CWD/meeting-planner/)
    Project = 1,
    /// User-level config (~/.meeting-planner/)
    User = 2,
    /// Environment variables (highest priority)
    Environment = 3,
}

impl std::fmt::Display for ConfigTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigTier::Defaults => write!(f, "defaults"),
            ConfigTier::Project => write!(f, "project"),
            ConfigTier::User => write!(f, "user"),
            ConfigTier::Environment => write!(f, "environment"),
        }
    }
}

/// Paths for each configuration tier.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    /// Project-level config directory
    pub project_dir: Option<PathBuf>,
    /// User-level config directory
    pub user_dir: Option<PathBuf>,
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self::discover()
    }
}

impl ConfigPaths {
    /// Discover configuration paths from environment and defaults.
    pub fn discover() -> Self {
        // User dir: MEETING_PLANNER_USER_DIR or ~/.meeting-planner
        let user_dir = std::env::var("MEETING_PLANNER_USER_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|h| h.join(".meeting-planner")));

        // Project dir: MEETING_PLANNER_PROJECT_DIR or $CWD/meeting-planner
        let project_dir = std::env::var("MEETING_PLANNER_PROJECT_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| Some(PathBuf::from("meeting-planner")));

        Self {
            project_dir,
            user_dir,
        }
    }

    /// Create paths with explicit directories.
    pub fn with_dirs(project_dir: Option<PathBuf>, user_dir: Option<PathBuf>) -> Self {
        Self {
            project_dir,
            user_dir,
        }
    }
}

/// Configuration loader that handles tier-based merging.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Paths for each tier
    pub paths: ConfigPaths,
    config: Config,
    /// Config files that contributed, lowest tier first
    sources: Vec<(ConfigTier, PathBuf)>,
}

impl ConfigLoader {
    /// Load configuration from all tiers with proper merging.
    pub fn load() -> Result<Self> {
        Self::load_with_paths(ConfigPaths::discover())
    }

    /// Load configuration with explicit paths.
    pub fn load_with_paths(paths: ConfigPaths) -> Result<Self> {
        // Explicit config path overrides the file tiers
        if let Ok(explicit_path) = std::env::var("MEETING_PLANNER_CONFIG_PATH") {
            let path = PathBuf::from(&explicit_path);
            let mut config = Config::load(&path)
                .with_context(|| format!("Failed to load config file: {:?}", path))?;
            Self::apply_env_overrides(&mut config);
            return Ok(Self {
                paths,
                config,
                sources: vec![(ConfigTier::Environment, path)],
            });
        }

        let mut configs: Vec<Value> = Vec::new();
        let mut sources = Vec::new();

        if let Ok(default_json) = serde_json::to_value(Config::default()) {
            configs.push(default_json);
        }

        let tiers = [
            (ConfigTier::Project, paths.project_dir.as_deref()),
            (ConfigTier::User, paths.user_dir.as_deref()),
        ];
        for (tier, dir) in tiers {
            let Some(dir) = dir else { continue };
            if let Some(value) = Self::read_tier(dir) {
                debug!(tier = %tier, dir = ?dir, "Loaded config tier");
                configs.push(value);
                sources.push((tier, dir.join("config.yaml")));
            }
        }

        let merged = deep_merge_all(configs);
        let mut config: Config = serde_json::from_value(merged)?;

        Self::apply_env_overrides(&mut config);

        Ok(Self {
            paths,
            config,
            sources,
        })
    }

    /// Read `config.yaml` from a tier directory. Unreadable files are skipped.
    fn read_tier(dir: &Path) -> Option<Value> {
        let config_file = dir.join("config.yaml");
        if !config_file.exists() {
            return None;
        }
        let content = match std::fs::read_to_string(&config_file) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = ?config_file, error = %e, "Failed to read config file");
                return None;
            }
        };
        match serde_yaml::from_str::<Value>(&content) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(path = ?config_file, error = %e, "Ignoring malformed config file");
                None
            }
        }
    }

    /// Apply environment variable overrides to config.
    fn apply_env_overrides(config: &mut Config) {
        if let Ok(db_path) = std::env::var("MEETING_PLANNER_DB_PATH") {
            config.database.path = PathBuf::from(db_path);
        }

        if let Ok(templates_dir) = std::env::var("MEETING_PLANNER_TEMPLATES_DIR") {
            config.templates.dir = PathBuf::from(templates_dir);
        }

        if let Ok(level) = std::env::var("MEETING_PLANNER_LOG_LEVEL") {
            config.logging.level = level;
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Mutable access for CLI overrides.
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn into_config(self) -> Config {
        self.config
    }

    /// Config files that contributed to the merged result.
    pub fn sources(&self) -> &[(ConfigTier, PathBuf)] {
        &self.sources
    }
}
