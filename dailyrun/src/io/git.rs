//! Git adapter for the commit-or-skip stage.
//!
//! The orchestrator only needs four operations (status, stage all, commit,
//! push), so we keep a small, explicit wrapper around `git` subprocess calls
//! rather than linking a git library.

use std::fmt;
use std::path::PathBuf;
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

use crate::io::process::exit_code_of;

/// Parsed `git status --porcelain` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// 2-letter XY code, or "??" for untracked.
    pub code: String,
    /// Path for the changed file.
    pub path: String,
}

/// A git invocation that ran but exited unsuccessfully.
#[derive(Debug, Clone)]
pub struct GitCommandError {
    pub args: Vec<String>,
    /// Exit code, or `128 + signal` when git was killed.
    pub exit_code: i32,
    pub stderr: String,
}

impl fmt::Display for GitCommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "git {} failed (exit {})", self.args.join(" "), self.exit_code)?;
        if !self.stderr.is_empty() {
            write!(f, ": {}", self.stderr)?;
        }
        Ok(())
    }
}

impl std::error::Error for GitCommandError {}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// Get status entries (including untracked) in porcelain format.
    pub fn status_porcelain(&self) -> Result<Vec<StatusEntry>> {
        let out = self.run_capture(&["status", "--porcelain=v1", "-uall"])?;
        let mut entries = Vec::new();
        for line in out.lines() {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(parse_status_line(line)?);
        }
        Ok(entries)
    }

    /// Stage all changes (respects .gitignore).
    pub fn add_all(&self) -> Result<()> {
        self.run_checked(&["add", "-A"])?;
        Ok(())
    }

    /// True if there is anything staged for commit.
    pub fn has_staged_changes(&self) -> Result<bool> {
        let out = self.run_capture(&["diff", "--cached", "--name-only"])?;
        Ok(!out.trim().is_empty())
    }

    /// Commit staged changes with a message.
    ///
    /// If there are no staged changes, this returns Ok(false) and does nothing.
    #[instrument(skip_all)]
    pub fn commit_staged(&self, message: &str) -> Result<bool> {
        if !self.has_staged_changes()? {
            debug!("no staged changes, skipping commit");
            return Ok(false);
        }
        debug!("committing staged changes");
        self.run_checked(&["commit", "-m", message])?;
        Ok(true)
    }

    /// Push the current branch to its configured upstream.
    #[instrument(skip_all)]
    pub fn push(&self) -> Result<()> {
        debug!("pushing to upstream");
        self.run_checked(&["push"])?;
        Ok(())
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            return Err(GitCommandError {
                args: args.iter().map(|arg| arg.to_string()).collect(),
                exit_code: exit_code_of(output.status),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

fn parse_status_line(line: &str) -> Result<StatusEntry> {
    if let Some(path) = line.strip_prefix("?? ") {
        return Ok(StatusEntry {
            code: "??".to_string(),
            path: path.trim().to_string(),
        });
    }
    if line.len() < 4 {
        return Err(anyhow!("unexpected porcelain line: '{line}'"));
    }
    let code = line[..2].to_string();
    let mut path = line[3..].trim().to_string();
    if let Some((_, new)) = path.split_once("->") {
        path = new.trim().to_string();
    }
    Ok(StatusEntry { code, path })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_untracked_line() {
        let e = parse_status_line("?? data/papers/2025-01-02.json").expect("parse");
        assert_eq!(
            e,
            StatusEntry {
                code: "??".to_string(),
                path: "data/papers/2025-01-02.json".to_string()
            }
        );
    }

    #[test]
    fn parses_modified_and_deleted_lines() {
        let e = parse_status_line(" M data/index.json").expect("parse");
        assert_eq!(e.code, " M");
        assert_eq!(e.path, "data/index.json");

        let e = parse_status_line(" D data/papers/2025-01-01.json").expect("parse");
        assert_eq!(e.code, " D");
    }

    #[test]
    fn parses_rename_line_uses_new_path() {
        let e = parse_status_line("R  old.json -> new.json").expect("parse");
        assert_eq!(e.path, "new.json");
    }

    #[test]
    fn rejects_truncated_line() {
        assert!(parse_status_line("M").is_err());
    }

    #[test]
    fn command_error_mentions_args_and_code() {
        let err = GitCommandError {
            args: vec!["push".to_string()],
            exit_code: 128,
            stderr: "fatal: no upstream".to_string(),
        };
        assert_eq!(err.to_string(), "git push failed (exit 128): fatal: no upstream");
    }

    #[test]
    fn status_outside_repository_is_a_command_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = Git::new(temp.path())
            .status_porcelain()
            .expect_err("not a repository");
        let git_err = err
            .downcast_ref::<GitCommandError>()
            .expect("typed git error");
        assert_ne!(git_err.exit_code, 0);
    }
}
