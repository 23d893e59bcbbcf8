//! Orchestrator configuration stored in `<base-dir>/dailyrun.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::types::StepKind;

/// File name looked up in the base directory when `--config` is not given.
pub const CONFIG_FILE_NAME: &str = "dailyrun.toml";

/// Orchestrator configuration (TOML).
///
/// Every field has a default, so a missing file yields the stock pipeline:
/// the three Python scripts run from the base directory, stdio inherited.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunConfig {
    pub collect: StepConfig,
    pub translate: StepConfig,
    pub cleanup: StepConfig,
    pub logs: LogsConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StepConfig {
    /// argv of the step, e.g. `["python", "daily_paper_collector.py"]`. No shell.
    /// Unset means the stock script for the step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,

    /// Kill the step after this many seconds. Unset means wait forever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl StepConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LogsConfig {
    /// Directory for captured step output and `run.json`. Relative paths
    /// resolve against the base directory. Unset disables run logs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,

    /// Truncate captured stdout/stderr beyond this many bytes per stream.
    pub output_limit_bytes: usize,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            dir: None,
            output_limit_bytes: 1_000_000,
        }
    }
}

/// Stock argv for a step whose `command` is not configured.
fn default_command(kind: StepKind) -> Vec<String> {
    let script = match kind {
        StepKind::Collect => "daily_paper_collector.py",
        StepKind::Translate => "llm_process.py",
        StepKind::Cleanup => "cleanup_empty_papers.py",
    };
    vec!["python".to_string(), script.to_string()]
}

impl RunConfig {
    pub fn step(&self, kind: StepKind) -> &StepConfig {
        match kind {
            StepKind::Collect => &self.collect,
            StepKind::Translate => &self.translate,
            StepKind::Cleanup => &self.cleanup,
        }
    }

    /// argv for `kind`: the configured command, or the stock script.
    pub fn command(&self, kind: StepKind) -> Vec<String> {
        self.step(kind)
            .command
            .clone()
            .unwrap_or_else(|| default_command(kind))
    }

    pub fn validate(&self) -> Result<()> {
        for kind in StepKind::ALL {
            let command = self.command(kind);
            if command.first().is_none_or(|program| program.trim().is_empty()) {
                return Err(anyhow!("{kind}.command must be a non-empty array"));
            }
            if self.step(kind).timeout_secs == Some(0) {
                return Err(anyhow!("{kind}.timeout_secs must be > 0"));
            }
        }
        if self.logs.output_limit_bytes == 0 {
            return Err(anyhow!("logs.output_limit_bytes must be > 0"));
        }
        Ok(())
    }

    /// Absolute run-log directory, if run logs are enabled.
    pub fn logs_dir(&self, base_dir: &Path) -> Option<PathBuf> {
        self.logs.dir.as_ref().map(|dir| base_dir.join(dir))
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RunConfig::default()`.
pub fn load_config(path: &Path) -> Result<RunConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "config file missing, using defaults");
        let cfg = RunConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RunConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}
