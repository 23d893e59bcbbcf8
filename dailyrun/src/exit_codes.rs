//! Stable exit codes for the `dailyrun` binary.
//!
//! A failing step's own non-zero exit status is propagated unchanged; the
//! constants below cover the cases where no such status exists. A step killed
//! by signal `n` exits with `128 + n`.

/// Every step succeeded (including the "no changes to commit" path).
pub const OK: i32 = 0;
/// Orchestrator error with no step exit status (config, base dir, run log).
pub const FAILURE: i32 = 1;
/// A step exceeded its configured timeout and was killed.
pub const TIMED_OUT: i32 = 124;
/// A step's program exists but could not be executed.
pub const NOT_EXECUTABLE: i32 = 126;
/// A step's program could not be found.
pub const NOT_FOUND: i32 = 127;
