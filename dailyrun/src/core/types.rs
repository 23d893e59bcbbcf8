//! Shared deterministic types for the run pipeline.
//!
//! These types define stable contracts between the orchestrator, the step
//! runners and the run log. They carry no I/O and serialize deterministically.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the three external steps, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Collect,
    Translate,
    Cleanup,
}

impl StepKind {
    /// Fixed execution order. Never reordered.
    pub const ALL: [StepKind; 3] = [StepKind::Collect, StepKind::Translate, StepKind::Cleanup];

    /// Stable lowercase name, used for log files and structured fields.
    pub fn as_str(self) -> &'static str {
        match self {
            StepKind::Collect => "collect",
            StepKind::Translate => "translate",
            StepKind::Cleanup => "cleanup",
        }
    }

    /// Human-readable description for progress notices.
    pub fn describe(self) -> &'static str {
        match self {
            StepKind::Collect => "Collecting daily papers",
            StepKind::Translate => "Translating papers",
            StepKind::Cleanup => "Cleaning up empty papers",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of running one external step to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    /// Process exited with a non-zero code, or could not be spawned
    /// (in which case the code is the shell's "not found" convention).
    Failed { exit_code: i32 },
    /// Process exceeded its configured timeout and was killed.
    TimedOut,
}

impl StepStatus {
    pub fn is_success(self) -> bool {
        matches!(self, StepStatus::Succeeded)
    }
}

/// Result of the final commit-or-skip stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommitOutcome {
    /// Changes were staged, committed with [`COMMIT_MESSAGE`] and pushed.
    Committed { changed_paths: usize },
    /// Working tree was clean; nothing staged, committed or pushed.
    NoChanges,
}

/// Commit message used for every automatic commit.
pub const COMMIT_MESSAGE: &str = "Auto update: daily papers, translations, cleanup";

/// Progress notices emitted at each stage boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    StepStarted(StepKind),
    StepFinished(StepKind),
    Committing { changed_paths: usize },
    Pushed,
    NoChanges,
    Done,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::StepStarted(step) => write!(f, "==> {}...", step.describe()),
            Notice::StepFinished(step) => write!(f, "==> {step} finished"),
            Notice::Committing { changed_paths } => {
                write!(f, "==> Committing {changed_paths} changed path(s)")
            }
            Notice::Pushed => f.write_str("==> Pushed to remote"),
            Notice::NoChanges => f.write_str("==> No changes to commit"),
            Notice::Done => f.write_str("==> Done"),
        }
    }
}
