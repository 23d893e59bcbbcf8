//! Run the daily paper pipeline once.
//!
//! Intended to be fired by an external scheduler with no arguments: collect,
//! translate, clean up, then commit and push whatever changed.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use dailyrun::exit_codes;
use dailyrun::io::base_dir::{BASE_DIR_ENV, resolve_base_dir};
use dailyrun::io::config::{CONFIG_FILE_NAME, load_config};
use dailyrun::io::steps::ProcessStepRunner;
use dailyrun::logging;
use dailyrun::run::{exit_code_for, run_once};

#[derive(Parser)]
#[command(
    name = "dailyrun",
    version,
    about = "Collect, translate and clean up daily papers, then commit and push the changes"
)]
struct Cli {
    /// Directory the steps run in [default: directory of this executable].
    #[arg(long, env = BASE_DIR_ENV, value_name = "DIR")]
    base_dir: Option<PathBuf>,

    /// Config file [default: <base-dir>/dailyrun.toml].
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

fn main() {
    logging::init();
    let code = match run(Cli::parse()) {
        Ok(()) => exit_codes::OK,
        Err(err) => {
            eprintln!("error: {err:#}");
            exit_code_for(&err)
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<()> {
    let base_dir = resolve_base_dir(cli.base_dir.as_deref())?;
    let config_path = cli
        .config
        .unwrap_or_else(|| base_dir.join(CONFIG_FILE_NAME));
    let cfg = load_config(&config_path)?;

    let outcome = run_once(&base_dir, &cfg, &ProcessStepRunner, |notice| {
        println!("{notice}");
    })?;
    if let Some(dir) = outcome.log_dir {
        println!("run log: {}", dir.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_without_arguments() {
        let cli = Cli::try_parse_from(["dailyrun"]).expect("parse");
        assert!(cli.config.is_none());
    }

    #[test]
    fn parses_base_dir_and_config() {
        let cli = Cli::parse_from([
            "dailyrun",
            "--base-dir",
            "/srv/papers",
            "--config",
            "/etc/dailyrun.toml",
        ]);
        assert_eq!(cli.base_dir, Some(PathBuf::from("/srv/papers")));
        assert_eq!(cli.config, Some(PathBuf::from("/etc/dailyrun.toml")));
    }

    #[test]
    fn rejects_positional_arguments() {
        assert!(Cli::try_parse_from(["dailyrun", "extra"]).is_err());
    }
}
