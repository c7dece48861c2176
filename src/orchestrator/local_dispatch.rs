//! Parent-side adapter around the remote dispatcher.

use std::sync::Arc;

use tracing::debug;

use crate::console::{Console, Style};
use crate::engine::{CompiledUnit, ScopeRef, Value};
use crate::ipc::client::DispatcherClient;
use crate::ipc::protocol::RemoteFailure;
use crate::orchestrator::sync::OutputSync;
use crate::{AppError, Result};

/// Line shown when an execution was interrupted.
pub const INTERRUPT_NOTICE: &str = "KeyboardInterrupt";

/// Executes units remotely and keeps console output ordered.
///
/// Every call waits for the completion marker of its request, so all output
/// produced by the execution is on the console before the result is
/// returned. Failures are rendered to the console here; the caller only
/// sees the error value.
pub struct LocalDispatcher {
    client: DispatcherClient,
    sync: Arc<OutputSync>,
    console: Arc<dyn Console>,
}

impl LocalDispatcher {
    /// Create an adapter.
    #[must_use]
    pub fn new(client: DispatcherClient, sync: Arc<OutputSync>, console: Arc<dyn Console>) -> Self {
        Self {
            client,
            sync,
            console,
        }
    }

    /// Execute `unit` in the child and wait for its output to drain.
    ///
    /// # Errors
    ///
    /// Returns the remote failure after it has been rendered,
    /// `AppError::Unreachable` if the request could not be delivered, or
    /// `AppError::Transport` if the child went away.
    pub async fn execute(&self, unit: &CompiledUnit, scope: &ScopeRef) -> Result<Value> {
        let result = self.client.execute(unit, scope).await;
        // An undelivered request produces no completion marker.
        if !result.as_ref().is_err_and(AppError::is_undelivered) {
            self.sync.wait().await;
        }

        match result {
            Ok(value) => Ok(value),
            Err(err) => {
                self.render_failure(&err).await;
                Err(err)
            }
        }
    }

    async fn render_failure(&self, err: &AppError) {
        match err {
            AppError::Interrupted(_) => self.console.write_line(INTERRUPT_NOTICE, Style::Warning),
            AppError::Transport(_) | AppError::Unreachable(_) if self.sync.is_closed() => {
                debug!(%err, "suppressing transport failure: child has exited");
            }
            _ => match RemoteFailure::from_error(err) {
                Some(failure) => match self.client.format_failure(&failure).await {
                    Ok(text) => self.console.write_line(&text, Style::Error),
                    Err(secondary) => {
                        debug!(%secondary, "remote failure formatting unavailable");
                        self.console.write_line(failure.message(), Style::Error);
                    }
                },
                None => self.console.write_line(&err.to_string(), Style::Error),
            },
        }
    }
}
