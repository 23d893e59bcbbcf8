//! Orchestration for a single `dailyrun` invocation.
//!
//! Runs collect, translate and cleanup in order from the base directory,
//! stops at the first failure, then commits and pushes if the working tree
//! changed.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::core::stage::Stage;
use crate::core::types::{COMMIT_MESSAGE, CommitOutcome, Notice, StepKind, StepStatus};
use crate::exit_codes;
use crate::io::config::RunConfig;
use crate::io::git::{Git, GitCommandError};
use crate::io::run_log::{RunLogPaths, RunRecord, run_id_for, write_run_record};
use crate::io::steps::{StepRequest, StepRunner};

/// A stage of the pipeline failed; the run aborted there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailedError {
    pub stage: Stage,
    /// Exit status the orchestrator must exit with.
    pub exit_code: i32,
    pub timed_out: bool,
}

impl fmt::Display for StepFailedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.timed_out {
            write!(f, "{} step timed out (exit {})", self.stage, self.exit_code)
        } else {
            write!(f, "{} step failed (exit {})", self.stage, self.exit_code)
        }
    }
}

impl std::error::Error for StepFailedError {}

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub run_id: String,
    pub steps_completed: Vec<StepKind>,
    pub commit: CommitOutcome,
    /// Directory holding `run.json` and step logs, when run logs are enabled.
    pub log_dir: Option<PathBuf>,
}

/// Exit code for a failed run: the failing step's own status when there is
/// one, [`exit_codes::FAILURE`] otherwise.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<StepFailedError>()
        .map(|failed| failed.exit_code)
        .unwrap_or(exit_codes::FAILURE)
}

/// Run the whole pipeline once.
///
/// `on_notice` receives progress notices in order. On failure no `Done`
/// notice is emitted and nothing completed so far is rolled back.
pub fn run_once<R: StepRunner, F: FnMut(&Notice)>(
    base_dir: &Path,
    cfg: &RunConfig,
    runner: &R,
    mut on_notice: F,
) -> Result<RunOutcome> {
    let started_at = Utc::now();
    let run_id = run_id_for(started_at);
    info!(run_id = %run_id, base_dir = %base_dir.display(), "starting run");

    let git = Git::new(base_dir);
    warn_if_dirty(&git);

    let log_paths = cfg
        .logs_dir(base_dir)
        .map(|dir| RunLogPaths::new(&dir, &run_id));
    let mut record = RunRecord::new(&run_id, base_dir, started_at);
    let mut stage = Stage::Init;

    let result = drive(
        &mut stage,
        &mut record,
        &StageContext {
            base_dir,
            cfg,
            git: &git,
            log_paths: log_paths.as_ref(),
        },
        runner,
        &mut on_notice,
    );

    match result {
        Ok(commit) => {
            record.finish_done(Utc::now());
            if let Some(paths) = &log_paths {
                write_run_record(paths, &record)?;
            }
            on_notice(&Notice::Done);
            info!(
                run_id = %run_id,
                steps_succeeded = record.steps_succeeded,
                steps_total = record.steps_total,
                "run complete"
            );
            Ok(RunOutcome {
                run_id,
                steps_completed: StepKind::ALL.to_vec(),
                commit,
                log_dir: log_paths.map(|paths| paths.dir),
            })
        }
        Err(err) => {
            warn!(
                run_id = %run_id,
                stage = %stage,
                steps_succeeded = record.steps_succeeded,
                steps_total = record.steps_total,
                "run aborted"
            );
            record.finish_aborted(Utc::now(), stage, format!("{err:#}"));
            if let Some(paths) = &log_paths
                && let Err(log_err) = write_run_record(paths, &record)
            {
                warn!(err = %log_err, "failed to write run record");
            }
            Err(err)
        }
    }
}

struct StageContext<'a> {
    base_dir: &'a Path,
    cfg: &'a RunConfig,
    git: &'a Git,
    log_paths: Option<&'a RunLogPaths>,
}

/// Walk the stage machine from `Init`, leaving `stage` at the failing stage
/// on error.
fn drive<R: StepRunner, F: FnMut(&Notice)>(
    stage: &mut Stage,
    record: &mut RunRecord,
    ctx: &StageContext<'_>,
    runner: &R,
    on_notice: &mut F,
) -> Result<CommitOutcome> {
    *stage = stage.next();
    while let Some(kind) = stage.step() {
        run_step(kind, record, ctx, runner, on_notice)?;
        *stage = stage.next();
    }

    debug_assert_eq!(*stage, Stage::CommitOrSkip);
    let commit = commit_or_skip(ctx.git, on_notice).map_err(|err| stage_error(*stage, err))?;
    record.record_commit(commit.clone());
    *stage = stage.next();
    Ok(commit)
}

fn run_step<R: StepRunner, F: FnMut(&Notice)>(
    kind: StepKind,
    record: &mut RunRecord,
    ctx: &StageContext<'_>,
    runner: &R,
    on_notice: &mut F,
) -> Result<()> {
    on_notice(&Notice::StepStarted(kind));
    let step_cfg = ctx.cfg.step(kind);
    let request = StepRequest {
        kind,
        workdir: ctx.base_dir.to_path_buf(),
        command: ctx.cfg.command(kind),
        timeout: step_cfg.timeout(),
        log_path: ctx.log_paths.map(|paths| paths.step_log_path(kind)),
        output_limit_bytes: ctx.cfg.logs.output_limit_bytes,
    };

    let started = Instant::now();
    let status = runner.run(&request)?;
    let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    record.record_step(kind, status, duration_ms);

    match status {
        StepStatus::Succeeded => {
            debug!(step = %kind, duration_ms, "step succeeded");
            on_notice(&Notice::StepFinished(kind));
            Ok(())
        }
        StepStatus::Failed { exit_code } => Err(StepFailedError {
            stage: Stage::from(kind),
            exit_code,
            timed_out: false,
        }
        .into()),
        StepStatus::TimedOut => Err(StepFailedError {
            stage: Stage::from(kind),
            exit_code: exit_codes::TIMED_OUT,
            timed_out: true,
        }
        .into()),
    }
}

/// Stage, commit and push if the working tree has any change.
fn commit_or_skip<F: FnMut(&Notice)>(git: &Git, on_notice: &mut F) -> Result<CommitOutcome> {
    let entries = git.status_porcelain().context("query working tree status")?;
    if entries.is_empty() {
        info!("working tree clean, nothing to commit");
        on_notice(&Notice::NoChanges);
        return Ok(CommitOutcome::NoChanges);
    }

    let changed_paths = entries.len();
    info!(changed_paths, "committing changes");
    on_notice(&Notice::Committing { changed_paths });
    git.add_all().context("stage changes")?;
    if !git.commit_staged(COMMIT_MESSAGE).context("commit changes")? {
        // Status saw entries that `add -A` did not stage (e.g. a file touched
        // then restored). Nothing to record, so take the no-changes path
        // instead of letting an empty `git commit` fail the run.
        warn!(changed_paths, "status reported changes but nothing was staged");
        on_notice(&Notice::NoChanges);
        return Ok(CommitOutcome::NoChanges);
    }
    git.push().context("push changes")?;
    on_notice(&Notice::Pushed);
    Ok(CommitOutcome::Committed { changed_paths })
}

/// Attach the failing stage to a git failure so its exit status propagates.
fn stage_error(stage: Stage, err: anyhow::Error) -> anyhow::Error {
    let Some(exit_code) = err
        .downcast_ref::<GitCommandError>()
        .map(|git_err| git_err.exit_code)
    else {
        return err;
    };
    err.context(StepFailedError {
        stage,
        exit_code,
        timed_out: false,
    })
}

/// Pre-existing changes get swept into the automatic commit; say so up front.
fn warn_if_dirty(git: &Git) {
    match git.status_porcelain() {
        Ok(entries) if entries.is_empty() => debug!("working tree clean before run"),
        Ok(entries) => warn!(
            changed_paths = entries.len(),
            "working tree has uncommitted changes; they will be included in the automatic commit"
        ),
        Err(err) => warn!(err = %format!("{err:#}"), "could not check working tree status"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedStep, ScriptedStepRunner, TestRepo};

    fn run(repo: &TestRepo, runner: &ScriptedStepRunner) -> (Result<RunOutcome>, Vec<Notice>) {
        let mut notices = Vec::new();
        let result = run_once(repo.path(), &RunConfig::default(), runner, |notice| {
            notices.push(notice.clone());
        });
        (result, notices)
    }

    #[test]
    fn notices_follow_stage_order_on_success() {
        let repo = TestRepo::new().expect("repo");
        let runner = ScriptedStepRunner::new()
            .with(StepKind::Cleanup, ScriptedStep::writes("data/index.json", "{}"));

        let (result, notices) = run(&repo, &runner);
        result.expect("run");
        assert_eq!(
            notices,
            vec![
                Notice::StepStarted(StepKind::Collect),
                Notice::StepFinished(StepKind::Collect),
                Notice::StepStarted(StepKind::Translate),
                Notice::StepFinished(StepKind::Translate),
                Notice::StepStarted(StepKind::Cleanup),
                Notice::StepFinished(StepKind::Cleanup),
                Notice::Committing { changed_paths: 1 },
                Notice::Pushed,
                Notice::Done,
            ]
        );
    }

    #[test]
    fn failure_emits_no_done_notice() {
        let repo = TestRepo::new().expect("repo");
        let runner = ScriptedStepRunner::new().with(StepKind::Translate, ScriptedStep::exits(2));

        let (result, notices) = run(&repo, &runner);
        let err = result.expect_err("translate fails");
        assert_eq!(exit_code_for(&err), 2);
        assert_eq!(notices.last(), Some(&Notice::StepStarted(StepKind::Translate)));
        assert!(!notices.contains(&Notice::Done));
    }

    #[test]
    fn timed_out_step_exits_with_timeout_code() {
        let repo = TestRepo::new().expect("repo");
        let runner = ScriptedStepRunner::new().with(StepKind::Collect, ScriptedStep::times_out());

        let (result, _) = run(&repo, &runner);
        let err = result.expect_err("collect times out");
        assert_eq!(exit_code_for(&err), exit_codes::TIMED_OUT);
        assert_eq!(err.to_string(), "collect step timed out (exit 124)");
        assert_eq!(runner.calls(), vec![StepKind::Collect]);
    }

    #[test]
    fn orchestrator_errors_map_to_generic_failure() {
        let err = anyhow::anyhow!("read config");
        assert_eq!(exit_code_for(&err), exit_codes::FAILURE);
    }

    #[test]
    fn git_failures_carry_the_commit_stage() {
        let git_err = GitCommandError {
            args: vec!["push".to_string()],
            exit_code: 128,
            stderr: String::new(),
        };
        let err = stage_error(Stage::CommitOrSkip, anyhow::Error::new(git_err).context("push"));
        let failed = err.downcast_ref::<StepFailedError>().expect("stage error");
        assert_eq!(failed.stage, Stage::CommitOrSkip);
        assert_eq!(exit_code_for(&err), 128);
    }
}
