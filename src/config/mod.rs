//! Layered configuration.
//!
//! Configuration comes from four tiers, merged field-by-field:
//! 1. **Defaults** - `Config::default()`
//! 2. **Project** - `$CWD/meeting-planner/config.yaml`
//! 3. **User** - `~/.meeting-planner/config.yaml`
//! 4. **Environment** - the variables below
//!
//! ## Environment Variables
//! - `MEETING_PLANNER_CONFIG_PATH` - Explicit config file (replaces the file tiers)
//! - `MEETING_PLANNER_DB_PATH` - Database path
//! - `MEETING_PLANNER_TEMPLATES_DIR` - Template directory
//! - `MEETING_PLANNER_LOG_LEVEL` - Log filter directive
//! - `MEETING_PLANNER_USER_DIR` - User config dir (default: `~/.meeting-planner`)
//! - `MEETING_PLANNER_PROJECT_DIR` - Project config dir (default: `./meeting-planner`)

mod loader;
mod merge;
mod types;

pub use loader::{ConfigLoader, ConfigPaths, ConfigTier};
pub use merge::{deep_merge, deep_merge_all};
pub use types::*;
