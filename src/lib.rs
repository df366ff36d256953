//! Meeting Planner Library
//!
//! Templates describe the work around a client meeting as a tree of tasks
//! with day offsets and role tags. Instantiating a template against a meeting
//! date and a roster produces a live project with concrete due dates and
//! assignees.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod format;
pub mod instantiate;
pub mod logging;
pub mod milestones;
pub mod roles;
pub mod schedule;
pub mod template;
pub mod tree;
pub mod types;
