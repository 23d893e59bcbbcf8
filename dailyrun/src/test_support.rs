//! Test-only helpers: scripted step runners and throwaway git repositories.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};
use tempfile::TempDir;

use crate::core::types::{StepKind, StepStatus};
use crate::io::steps::{StepRequest, StepRunner};

/// Scripted behaviour for one step: files to write, then a status to return.
#[derive(Debug, Clone)]
pub struct ScriptedStep {
    pub status: StepStatus,
    /// `(relative path, contents)` written under the request workdir.
    pub writes: Vec<(String, String)>,
}

impl ScriptedStep {
    pub fn succeeds() -> Self {
        Self {
            status: StepStatus::Succeeded,
            writes: Vec::new(),
        }
    }

    pub fn exits(exit_code: i32) -> Self {
        Self {
            status: StepStatus::Failed { exit_code },
            writes: Vec::new(),
        }
    }

    pub fn times_out() -> Self {
        Self {
            status: StepStatus::TimedOut,
            writes: Vec::new(),
        }
    }

    pub fn writes(path: &str, contents: &str) -> Self {
        Self::succeeds().and_writes(path, contents)
    }

    pub fn and_writes(mut self, path: &str, contents: &str) -> Self {
        self.writes.push((path.to_string(), contents.to_string()));
        self
    }
}

/// Step runner returning scripted statuses; unscripted steps succeed.
///
/// Records every invocation so tests can assert order and short-circuiting.
#[derive(Debug, Default)]
pub struct ScriptedStepRunner {
    script: HashMap<StepKind, ScriptedStep>,
    calls: RefCell<Vec<StepKind>>,
    workdirs: RefCell<Vec<PathBuf>>,
}

impl ScriptedStepRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: StepKind, step: ScriptedStep) -> Self {
        self.script.insert(kind, step);
        self
    }

    pub fn calls(&self) -> Vec<StepKind> {
        self.calls.borrow().clone()
    }

    pub fn workdirs(&self) -> Vec<PathBuf> {
        self.workdirs.borrow().clone()
    }
}

impl StepRunner for ScriptedStepRunner {
    fn run(&self, request: &StepRequest) -> Result<StepStatus> {
        self.calls.borrow_mut().push(request.kind);
        self.workdirs.borrow_mut().push(request.workdir.clone());
        let Some(step) = self.script.get(&request.kind) else {
            return Ok(StepStatus::Succeeded);
        };
        for (rel, contents) in &step.writes {
            let path = request.workdir.join(rel);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create {}", parent.display()))?;
            }
            fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        }
        Ok(step.status)
    }
}

/// A git working copy with one initial commit, tracking a bare `origin`.
///
/// Layout: `<temp>/work` (the base directory) and `<temp>/origin.git`.
pub struct TestRepo {
    _temp: TempDir,
    work: PathBuf,
    origin: PathBuf,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("tempdir")?;
        let root = temp
            .path()
            .canonicalize()
            .context("canonicalize tempdir")?;
        let work = root.join("work");
        let origin = root.join("origin.git");
        fs::create_dir_all(&work).context("create work dir")?;

        git(&root, &["init", "-q", "--bare", "origin.git"])?;
        git(&work, &["init", "-q"])?;
        git(&work, &["config", "user.name", "Dailyrun Test"])?;
        git(&work, &["config", "user.email", "dailyrun-test@local.invalid"])?;
        git(&work, &["config", "commit.gpgsign", "false"])?;
        fs::write(work.join("README.md"), "daily papers\n").context("write README")?;
        git(&work, &["add", "-A"])?;
        git(&work, &["commit", "-q", "-m", "chore: initial commit"])?;
        git(&work, &["remote", "add", "origin", "../origin.git"])?;
        git(&work, &["push", "-q", "-u", "origin", "HEAD"])?;

        Ok(Self {
            _temp: temp,
            work,
            origin,
        })
    }

    /// The working copy, used as the base directory.
    pub fn path(&self) -> &Path {
        &self.work
    }

    pub fn write_file(&self, rel: &str, contents: &str) -> Result<()> {
        let path = self.work.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))
    }

    /// Stage everything and commit/push it, outside of the orchestrator.
    pub fn commit_and_push(&self, message: &str) -> Result<()> {
        git(&self.work, &["add", "-A"])?;
        git(&self.work, &["commit", "-q", "-m", message])?;
        git(&self.work, &["push", "-q"])?;
        Ok(())
    }

    pub fn local_commit_count(&self) -> Result<usize> {
        count(&git(&self.work, &["rev-list", "--count", "HEAD"])?)
    }

    pub fn remote_commit_count(&self) -> Result<usize> {
        let git_dir = self.origin.to_string_lossy().into_owned();
        count(&git(
            &self.work,
            &["--git-dir", &git_dir, "rev-list", "--count", "--all"],
        )?)
    }

    pub fn last_commit_message(&self) -> Result<String> {
        Ok(git(&self.work, &["log", "-1", "--pretty=%B"])?.trim().to_string())
    }

    pub fn is_clean(&self) -> Result<bool> {
        Ok(git(&self.work, &["status", "--porcelain"])?.trim().is_empty())
    }

    pub fn remove_origin(&self) -> Result<()> {
        git(&self.work, &["remote", "remove", "origin"])?;
        Ok(())
    }
}

fn count(raw: &str) -> Result<usize> {
    raw.trim()
        .parse()
        .with_context(|| format!("parse commit count '{}'", raw.trim()))
}

fn git(dir: &Path, args: &[&str]) -> Result<String> {
    let out = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .with_context(|| format!("spawn git {}", args.join(" ")))?;
    if !out.status.success() {
        bail!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&out.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&out.stdout).to_string())
}
