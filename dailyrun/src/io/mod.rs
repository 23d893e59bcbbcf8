//! I/O helpers for the orchestrator.

pub mod base_dir;
pub mod config;
pub mod git;
pub mod process;
pub mod run_log;
pub mod steps;
