//! Exit codes that flow from a session back to the supervisor.
//!
//! Real child exit codes pass through unchanged. The negative values are
//! reserved for outcomes that never correspond to a child's own exit status.

/// The child (or the REPL) finished normally.
pub const SUCCESS: i32 = 0;

/// The child was terminated by a signal and reported no exit code.
pub const KILLED: i32 = -1;

/// The child exited before writing its readiness marker.
pub const STARTUP_FAILURE: i32 = -2;

/// The operator asked for a fresh console.
pub const RESTART_REQUESTED: i32 = -3;

/// Map a process exit status to a session exit code.
#[must_use]
pub fn from_status(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(KILLED)
}
