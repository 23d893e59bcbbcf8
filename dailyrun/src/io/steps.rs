//! Step runner abstraction for the three external pipeline steps.
//!
//! The [`StepRunner`] trait decouples orchestration from process spawning.
//! [`ProcessStepRunner`] runs the configured argv in the base directory; tests
//! use scripted runners that return predetermined statuses without spawning.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::core::types::{StepKind, StepStatus};
use crate::io::process::{CommandOutput, SpawnError, run_command_captured, run_command_inherited};

/// Parameters for one step invocation.
#[derive(Debug, Clone)]
pub struct StepRequest {
    pub kind: StepKind,
    /// Working directory for the child (the resolved base directory).
    pub workdir: PathBuf,
    /// argv; the first element is the program.
    pub command: Vec<String>,
    pub timeout: Option<Duration>,
    /// When `Some`, stdout/stderr are captured and written here instead of
    /// being inherited.
    pub log_path: Option<PathBuf>,
    pub output_limit_bytes: usize,
}

/// Abstraction over how a step is executed.
///
/// `Err` is reserved for orchestrator failures (e.g. the step log cannot be
/// written). A step that ran and failed is `Ok(StepStatus::Failed { .. })`.
pub trait StepRunner {
    fn run(&self, request: &StepRequest) -> Result<StepStatus>;
}

/// Runs steps as child processes.
pub struct ProcessStepRunner;

impl StepRunner for ProcessStepRunner {
    #[instrument(skip_all, fields(step = %request.kind))]
    fn run(&self, request: &StepRequest) -> Result<StepStatus> {
        let (program, args) = request
            .command
            .split_first()
            .ok_or_else(|| anyhow!("{} command is empty", request.kind))?;
        let program = resolve_program(&request.workdir, program);
        info!(program = %program.display(), ?args, "starting step");

        let mut cmd = Command::new(&program);
        cmd.args(args).current_dir(&request.workdir);

        let result = match &request.log_path {
            Some(_) => run_command_captured(cmd, request.timeout, request.output_limit_bytes),
            None => run_command_inherited(cmd, request.timeout),
        };

        let output = match result {
            Ok(output) => output,
            Err(err) => {
                let spawn_failure = err
                    .downcast_ref::<SpawnError>()
                    .map(|spawn| (spawn.exit_code(), spawn.to_string()));
                let Some((exit_code, message)) = spawn_failure else {
                    return Err(err).with_context(|| format!("run {} step", request.kind));
                };
                warn!(err = %message, "step could not be started");
                if let Some(path) = &request.log_path {
                    write_text(path, &format!("{message}\n"))?;
                }
                return Ok(StepStatus::Failed { exit_code });
            }
        };

        if let Some(path) = &request.log_path {
            write_step_log(path, request.kind, &output)?;
        }

        let status = status_of(&output);
        match status {
            StepStatus::Succeeded => debug!("step succeeded"),
            StepStatus::Failed { exit_code } => warn!(exit_code, "step failed"),
            StepStatus::TimedOut => warn!(
                timeout_secs = request.timeout.map(|t| t.as_secs()),
                "step timed out"
            ),
        }
        Ok(status)
    }
}

fn status_of(output: &CommandOutput) -> StepStatus {
    if output.timed_out {
        StepStatus::TimedOut
    } else if output.status.success() {
        StepStatus::Succeeded
    } else {
        StepStatus::Failed {
            exit_code: output.exit_code(),
        }
    }
}

/// Relative programs containing a path separator (`./collect.sh`,
/// `bin/collect`) resolve against the working directory; bare names go
/// through `PATH`.
fn resolve_program(workdir: &Path, program: &str) -> PathBuf {
    let path = Path::new(program);
    if path.is_relative() && path.components().count() > 1 {
        workdir.join(path)
    } else {
        path.to_path_buf()
    }
}

fn write_step_log(path: &Path, kind: StepKind, output: &CommandOutput) -> Result<()> {
    let label = kind.as_str();
    let mut buf = String::new();
    buf.push_str("=== stdout ===\n");
    buf.push_str(&String::from_utf8_lossy(&output.stdout));
    buf.push_str(&output.stdout_truncated_notice(label));
    buf.push_str("\n=== stderr ===\n");
    buf.push_str(&String::from_utf8_lossy(&output.stderr));
    buf.push_str(&output.stderr_truncated_notice(label));
    if output.timed_out {
        buf.push_str("\n[timed out]\n");
    }
    write_text(path, &buf)
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create step log dir {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write step log {}", path.display()))
}
