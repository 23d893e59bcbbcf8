//! Run logging helpers for `<logs.dir>/<run-id>/`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::stage::Stage;
use crate::core::types::{CommitOutcome, StepKind, StepStatus};

/// Run id for a start time: compact UTC timestamp with milliseconds, e.g.
/// `20250102T020000.000Z`.
pub fn run_id_for(started_at: DateTime<Utc>) -> String {
    started_at.format("%Y%m%dT%H%M%S%.3fZ").to_string()
}

#[derive(Debug, Clone)]
pub struct RunLogPaths {
    pub dir: PathBuf,
    pub record_path: PathBuf,
}

impl RunLogPaths {
    pub fn new(logs_dir: &Path, run_id: &str) -> Self {
        let dir = logs_dir.join(run_id);
        Self {
            record_path: dir.join("run.json"),
            dir,
        }
    }

    pub fn step_log_path(&self, step: StepKind) -> PathBuf {
        self.dir.join(format!("{step}.log"))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub step: StepKind,
    #[serde(flatten)]
    pub status: StepStatus,
    pub duration_ms: u64,
}

/// Summary of one run, written to `run.json` on success and on failure.
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub run_id: String,
    pub base_dir: PathBuf,
    pub started_at: String,
    pub ended_at: Option<String>,
    /// `done` or `aborted` once the run has finished.
    pub final_stage: Stage,
    pub failed_stage: Option<Stage>,
    pub steps: Vec<StepRecord>,
    pub commit: Option<CommitOutcome>,
    pub steps_succeeded: usize,
    pub steps_total: usize,
    pub error: Option<String>,
}

impl RunRecord {
    pub fn new(run_id: &str, base_dir: &Path, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: run_id.to_string(),
            base_dir: base_dir.to_path_buf(),
            started_at: started_at.to_rfc3339(),
            ended_at: None,
            final_stage: Stage::Init,
            failed_stage: None,
            steps: Vec::new(),
            commit: None,
            steps_succeeded: 0,
            // Three external steps plus commit-or-skip.
            steps_total: StepKind::ALL.len() + 1,
            error: None,
        }
    }

    pub fn record_step(&mut self, step: StepKind, status: StepStatus, duration_ms: u64) {
        if status.is_success() {
            self.steps_succeeded += 1;
        }
        self.steps.push(StepRecord {
            step,
            status,
            duration_ms,
        });
    }

    pub fn record_commit(&mut self, commit: CommitOutcome) {
        self.steps_succeeded += 1;
        self.commit = Some(commit);
    }

    pub fn finish_done(&mut self, ended_at: DateTime<Utc>) {
        self.ended_at = Some(ended_at.to_rfc3339());
        self.final_stage = Stage::Done;
    }

    pub fn finish_aborted(&mut self, ended_at: DateTime<Utc>, stage: Stage, error: String) {
        self.ended_at = Some(ended_at.to_rfc3339());
        self.final_stage = Stage::Aborted;
        self.failed_stage = Some(stage);
        self.error = Some(error);
    }
}

pub fn write_run_record(paths: &RunLogPaths, record: &RunRecord) -> Result<()> {
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create run log dir {}", paths.dir.display()))?;
    let mut buf = serde_json::to_string_pretty(record).context("serialize run record")?;
    buf.push('\n');
    fs::write(&paths.record_path, buf)
        .with_context(|| format!("write {}", paths.record_path.display()))
}
