//! Helpers for running child processes with optional timeouts and bounded output.

use std::fmt;
use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::exit_codes;

/// Captured child process output.
///
/// When stdio was inherited, `stdout`/`stderr` are empty and nothing is truncated.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    fn inherited(status: ExitStatus, timed_out: bool) -> Self {
        Self {
            status,
            stdout: Vec::new(),
            stderr: Vec::new(),
            stdout_truncated: 0,
            stderr_truncated: 0,
            timed_out,
        }
    }

    /// Exit code to propagate for this process, following shell conventions.
    pub fn exit_code(&self) -> i32 {
        if self.timed_out {
            return exit_codes::TIMED_OUT;
        }
        exit_code_of(self.status)
    }

    pub fn stdout_truncated_notice(&self, label: &str) -> String {
        if self.stdout_truncated > 0 {
            format!(
                "\n[{label} stdout truncated {} bytes]\n",
                self.stdout_truncated
            )
        } else {
            String::new()
        }
    }

    pub fn stderr_truncated_notice(&self, label: &str) -> String {
        if self.stderr_truncated > 0 {
            format!(
                "\n[{label} stderr truncated {} bytes]\n",
                self.stderr_truncated
            )
        } else {
            String::new()
        }
    }
}

/// The child process could not be started at all.
#[derive(Debug)]
pub struct SpawnError {
    pub program: String,
    pub source: io::Error,
}

impl SpawnError {
    /// Shell-style exit code: 127 when the program is missing, 126 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self.source.kind() {
            io::ErrorKind::NotFound => exit_codes::NOT_FOUND,
            _ => exit_codes::NOT_EXECUTABLE,
        }
    }
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "spawn {}: {}", self.program, self.source)
    }
}

impl std::error::Error for SpawnError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Map an exit status to a process exit code. Signals map to `128 + signal`.
pub fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    exit_codes::FAILURE
}

/// Run a command with stdio inherited from this process and wait for it.
///
/// With `timeout = None` this blocks until the child exits.
#[instrument(skip_all, fields(timeout_secs = timeout.map(|t| t.as_secs())))]
pub fn run_command_inherited(
    mut cmd: Command,
    timeout: Option<Duration>,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());

    let mut child = spawn(&mut cmd)?;
    let (status, timed_out) = wait(&mut child, timeout)?;

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput::inherited(status, timed_out))
}

/// Run a command and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory (bytes beyond this are discarded while still draining the pipe).
///
/// After a timeout the readers get [`TIMEOUT_DRAIN_GRACE`] to reach EOF. Descendants of the killed
/// child may still hold the pipes open; their readers are detached and the output read so far is
/// returned.
#[instrument(skip_all, fields(timeout_secs = timeout.map(|t| t.as_secs()), output_limit_bytes))]
pub fn run_command_captured(
    mut cmd: Command,
    timeout: Option<Duration>,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = spawn(&mut cmd)?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_reader = StreamReader::spawn(stdout, output_limit_bytes);
    let stderr_reader = StreamReader::spawn(stderr, output_limit_bytes);

    let (status, timed_out) = wait(&mut child, timeout)?;

    let (stdout, stderr) = if timed_out {
        let deadline = Instant::now() + TIMEOUT_DRAIN_GRACE;
        (stdout_reader.finish_by(deadline), stderr_reader.finish_by(deadline))
    } else {
        (stdout_reader.finish(), stderr_reader.finish())
    };
    let (stdout, stdout_truncated) = stdout.context("join stdout")?;
    let (stderr, stderr_truncated) = stderr.context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

fn spawn(cmd: &mut Command) -> Result<Child> {
    debug!("spawning child process");
    match cmd.spawn() {
        Ok(child) => Ok(child),
        Err(source) => {
            error!(err = %source, "failed to spawn command");
            Err(SpawnError {
                program: cmd.get_program().to_string_lossy().into_owned(),
                source,
            }
            .into())
        }
    }
}

/// Wait for the child, killing it if `timeout` elapses. Returns `(status, timed_out)`.
fn wait(child: &mut Child, timeout: Option<Duration>) -> Result<(ExitStatus, bool)> {
    let Some(timeout) = timeout else {
        let status = child.wait().context("wait for command")?;
        return Ok((status, false));
    };
    match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => Ok((status, false)),
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            child.kill().context("kill command")?;
            let status = child.wait().context("wait command after kill")?;
            Ok((status, true))
        }
    }
}

/// How long output readers may keep draining once a timed-out child was killed.
pub const TIMEOUT_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Bytes read from one stream so far, plus the count discarded beyond the limit.
#[derive(Debug, Default)]
struct Captured {
    buf: Vec<u8>,
    truncated: usize,
}

/// Background reader draining one child pipe into a shared buffer.
struct StreamReader {
    captured: Arc<Mutex<Captured>>,
    handle: thread::JoinHandle<Result<()>>,
}

impl StreamReader {
    fn spawn<R: Read + Send + 'static>(reader: R, limit: usize) -> Self {
        let captured = Arc::new(Mutex::new(Captured::default()));
        let sink = Arc::clone(&captured);
        let handle = thread::spawn(move || read_stream_limited(reader, limit, &sink));
        Self { captured, handle }
    }

    /// Wait for EOF and return `(bytes, truncated)`.
    fn finish(self) -> Result<(Vec<u8>, usize)> {
        match self.handle.join() {
            Ok(result) => result?,
            Err(_) => return Err(anyhow!("output reader thread panicked")),
        }
        Ok(take_captured(&self.captured))
    }

    /// Like [`StreamReader::finish`], but stop waiting at `deadline` and return
    /// whatever was read. The reader thread is left to exit on its own.
    fn finish_by(self, deadline: Instant) -> Result<(Vec<u8>, usize)> {
        while !self.handle.is_finished() {
            if Instant::now() >= deadline {
                warn!("output stream still open after timeout, keeping partial output");
                return Ok(take_captured(&self.captured));
            }
            thread::sleep(Duration::from_millis(10));
        }
        self.finish()
    }
}

fn take_captured(captured: &Mutex<Captured>) -> (Vec<u8>, usize) {
    let mut guard = captured.lock().unwrap_or_else(PoisonError::into_inner);
    let Captured { buf, truncated } = std::mem::take(&mut *guard);
    (buf, truncated)
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize, sink: &Mutex<Captured>) -> Result<()> {
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let mut captured = sink.lock().unwrap_or_else(PoisonError::into_inner);
        let remaining = limit.saturating_sub(captured.buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            captured.buf.extend_from_slice(&chunk[..keep]);
            captured.truncated += n.saturating_sub(keep);
        } else {
            captured.truncated += n;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn read_stream_limited_counts_truncated_bytes() {
        let input = vec![b'x'; 20_000];
        let sink = Mutex::new(Captured::default());
        read_stream_limited(&input[..], 100, &sink).expect("read");
        let (buf, truncated) = take_captured(&sink);
        assert_eq!(buf.len(), 100);
        assert_eq!(truncated, 19_900);
    }

    #[cfg(unix)]
    #[test]
    fn captured_run_collects_streams_and_exit_code() {
        let out = run_command_captured(sh("echo out; echo err >&2; exit 3"), None, 1_000)
            .expect("run");
        assert_eq!(String::from_utf8_lossy(&out.stdout), "out\n");
        assert_eq!(String::from_utf8_lossy(&out.stderr), "err\n");
        assert!(!out.timed_out);
        assert_eq!(out.exit_code(), 3);
    }

    #[cfg(unix)]
    #[test]
    fn captured_run_truncates_beyond_limit() {
        let out = run_command_captured(sh("printf 'abcdefghij'"), None, 4).expect("run");
        assert_eq!(out.stdout, b"abcd");
        assert_eq!(out.stdout_truncated, 6);
        assert!(out.stdout_truncated_notice("collect").contains("truncated 6 bytes"));
        assert!(out.stderr_truncated_notice("collect").is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn timeout_kills_child_and_reports_timed_out() {
        let out = run_command_inherited(sh("sleep 5"), Some(Duration::from_millis(200)))
            .expect("run");
        assert!(out.timed_out);
        assert_eq!(out.exit_code(), exit_codes::TIMED_OUT);
    }

    #[cfg(unix)]
    #[test]
    fn captured_timeout_returns_while_grandchild_holds_pipes() {
        // `sleep` outlives the killed shell and keeps stdout open.
        let started = Instant::now();
        let out = run_command_captured(
            sh("echo started; sleep 4; echo done"),
            Some(Duration::from_millis(200)),
            1_000,
        )
        .expect("run");
        assert!(out.timed_out);
        assert!(
            started.elapsed() < Duration::from_secs(3),
            "took {:?}",
            started.elapsed()
        );
        assert_eq!(String::from_utf8_lossy(&out.stdout), "started\n");
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let cmd = Command::new("dailyrun-test-no-such-program");
        let err = run_command_inherited(cmd, None).expect_err("spawn must fail");
        let spawn = err.downcast_ref::<SpawnError>().expect("typed spawn error");
        assert_eq!(spawn.exit_code(), exit_codes::NOT_FOUND);
        assert!(spawn.to_string().contains("dailyrun-test-no-such-program"));
    }
}
