//! Local IPC layer between the console and its child.
//!
//! The child publishes its command dispatcher on a named pipe (Windows) or
//! Unix domain socket (Linux/macOS) under a per-session endpoint name. The
//! parent opens one connection per call and exchanges JSON lines.

pub mod client;
pub mod endpoint;
pub mod protocol;
pub mod server;
