//! Child process spawner.
//!
//! Each session gets its own child process with piped stdio and
//! `kill_on_drop(true)`, started directly (no shell) with the private
//! `--server-endpoint` flag.

use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::{info, info_span};

use crate::config::HostConfig;
use crate::ipc::endpoint::EndpointName;
use crate::{AppError, Result};

/// Flag that switches the binary into channel-server mode.
pub const SERVER_ENDPOINT_FLAG: &str = "--server-endpoint";

/// Spawn the child for one session.
///
/// # Errors
///
/// Returns `AppError::Config` if the program cannot be resolved, or
/// `AppError::Startup` if it cannot be started.
pub fn spawn_child(config: &HostConfig, endpoint: &EndpointName) -> Result<Child> {
    let program = config.resolve_program()?;
    let span = info_span!("spawn_child", endpoint = %endpoint, program = %program.display());
    let _guard = span.enter();

    let mut cmd = Command::new(&program);
    cmd.args(&config.program_args)
        .arg(SERVER_ENDPOINT_FLAG)
        .arg(endpoint.as_str())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd.spawn().map_err(|err| {
        AppError::Startup(format!("failed to spawn '{}': {err}", program.display()))
    })?;

    info!(pid = child.id(), "child process spawned");
    Ok(child)
}
