//! Diagnostic tracing for the orchestrator.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: diagnostics via `RUST_LOG`, output to stderr.
//!
//! - **Progress notices (`core::types::Notice`)**: product output on stdout.
//!   Always printed, unaffected by `RUST_LOG`.
//!
//! - **Run logs (`io/run_log`)**: captured step output under `logs.dir`, only
//!   when configured.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG` env var. Defaults to `info` if unset, since the binary
/// usually runs unattended from a scheduler and its log is the only record.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=dailyrun=debug dailyrun
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
