//! Run-once orchestrator for the daily paper pipeline.
//!
//! One invocation runs three external steps in a fixed order (collect,
//! translate, cleanup) from the base directory, aborts on the first failing
//! step, then commits and pushes any working-tree changes. The architecture
//! keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic types and the stage machine. No I/O.
//! - **[`io`]**: Side-effecting operations (config, git, process execution,
//!   run logs). Isolated behind small seams so tests can script them.
//!
//! [`run`] coordinates the two to implement the `dailyrun` binary.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod run;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
