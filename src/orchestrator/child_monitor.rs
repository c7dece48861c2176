//! Child exit monitor.
//!
//! Owns the [`Child`] handle for the lifetime of a session. When the child
//! exits, for whatever reason, the monitor closes the session's
//! [`OutputSync`] and publishes the exit code.

use std::sync::Arc;

use tokio::process::Child;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Instrument};

use crate::models::exit_code;
use crate::orchestrator::sync::OutputSync;

/// Spawn the monitor task.
///
/// Cancelling `kill` force-kills the child; the monitor still reports the
/// resulting exit. Dropping the returned handle detaches the task.
#[must_use]
pub fn monitor_exit(
    mut child: Child,
    sync: Arc<OutputSync>,
    exit_tx: watch::Sender<Option<i32>>,
    kill: CancellationToken,
) -> JoinHandle<()> {
    let span = tracing::info_span!("child_monitor", pid = child.id());
    tokio::spawn(
        async move {
            let status = tokio::select! {
                result = child.wait() => result,
                () = kill.cancelled() => {
                    info!("force-killing child process");
                    if let Err(err) = child.start_kill() {
                        warn!(%err, "failed to signal child process");
                    }
                    child.wait().await
                }
            };

            let code = match status {
                Ok(status) => exit_code::from_status(status),
                Err(err) => {
                    warn!(%err, "error waiting for child process");
                    exit_code::KILLED
                }
            };
            info!(code, "child process exited");

            sync.close();
            exit_tx.send_replace(Some(code));
        }
        .instrument(span),
    )
}
