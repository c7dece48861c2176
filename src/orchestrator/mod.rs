//! Parent-side orchestration.
//!
//! Covers child process spawning, output pumping and synchronization, the
//! session lifecycle, and the restarting supervisor.

pub mod child_monitor;
pub mod local_dispatch;
pub mod output_pump;
pub mod restart_manager;
pub mod session;
pub mod spawner;
pub mod sync;
