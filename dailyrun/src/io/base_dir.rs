//! Resolution of the base directory every step runs in.
//!
//! The base directory is resolved once and handed to each child process as its
//! working directory; the orchestrator never changes its own cwd.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::debug;

/// Environment variable overriding the base directory (also read by the CLI).
pub const BASE_DIR_ENV: &str = "DAILYRUN_BASE_DIR";

/// Resolve the base directory.
///
/// An explicit directory wins; otherwise the directory holding the running
/// executable is used. The result is canonical and must be an existing
/// directory.
pub fn resolve_base_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    let candidate = match explicit {
        Some(dir) => dir.to_path_buf(),
        None => executable_dir()?,
    };
    let resolved = candidate
        .canonicalize()
        .with_context(|| format!("resolve base directory {}", candidate.display()))?;
    if !resolved.is_dir() {
        bail!("base directory {} is not a directory", resolved.display());
    }
    debug!(base_dir = %resolved.display(), "base directory resolved");
    Ok(resolved)
}

fn executable_dir() -> Result<PathBuf> {
    let exe = env::current_exe().context("locate running executable")?;
    let exe = exe
        .canonicalize()
        .with_context(|| format!("resolve executable path {}", exe.display()))?;
    exe.parent()
        .map(Path::to_path_buf)
        .with_context(|| format!("executable {} has no parent directory", exe.display()))
}
