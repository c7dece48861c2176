//! Child-side channel server.
//!
//! A process started with `--server-endpoint NAME` publishes a
//! [`CommandDispatcher`] under `NAME`, announces readiness with one
//! completion marker, and then serves requests until its stdin closes.

pub mod dispatcher;
pub mod output;

use std::future::Future;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::engine::{Engine, ScopeRef};
use crate::ipc::endpoint::EndpointName;
use crate::ipc::server::spawn_dispatch_server;
use crate::models::exit_code;
use crate::Result;

use self::dispatcher::CommandDispatcher;
use self::output::{CompletionSignal, StdioOutput};

/// Run the channel server on the process's own stdio.
///
/// Returns the code the process should exit with: `SUCCESS` once stdin
/// reaches EOF, or the code of a script-requested exit.
///
/// # Errors
///
/// Returns `AppError::Ipc` if the endpoint cannot be registered.
pub async fn start_server(
    endpoint: &EndpointName,
    engine: Arc<dyn Engine>,
    bound_scope: ScopeRef,
) -> Result<i32> {
    let output = Arc::new(StdioOutput::new());
    let dispatcher = Arc::new(CommandDispatcher::new(
        engine,
        Arc::clone(&output),
        bound_scope,
    ));
    serve(
        endpoint,
        dispatcher,
        output,
        stdin_closed(tokio::io::stdin()),
    )
    .await
}

/// Publish `dispatcher` on `endpoint` until `shutdown` resolves or a script
/// requests exit.
///
/// `readiness` receives exactly one completion marker once the endpoint is
/// registered.
///
/// # Errors
///
/// Returns `AppError::Ipc` if the endpoint cannot be registered.
pub async fn serve<F>(
    endpoint: &EndpointName,
    dispatcher: Arc<CommandDispatcher>,
    readiness: Arc<dyn CompletionSignal>,
    shutdown: F,
) -> Result<i32>
where
    F: Future<Output = ()>,
{
    let span = info_span!("channel_server", endpoint = %endpoint, pid = std::process::id());
    async move {
        let ct = CancellationToken::new();
        let server = spawn_dispatch_server(endpoint, Arc::clone(&dispatcher), ct.clone())?;
        let mut exit_rx = dispatcher.exit_requested();

        readiness.complete();
        info!("channel server ready");

        let code = tokio::select! {
            () = shutdown => {
                info!("stdin closed, shutting down");
                exit_code::SUCCESS
            }
            requested = exit_rx.wait_for(Option::is_some) => {
                let code = requested
                    .map_or(exit_code::SUCCESS, |code| (*code).unwrap_or(exit_code::SUCCESS));
                info!(code, "exiting on script request");
                code
            }
        };

        ct.cancel();
        if let Err(err) = server.await {
            warn!(%err, "dispatch server task failed");
        }
        Ok(code)
    }
    .instrument(span)
    .await
}

/// Resolve once `reader` reaches EOF (or fails).
pub async fn stdin_closed<R>(mut reader: R)
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0_u8; 1024];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => return,
            Ok(n) => debug!(bytes = n, "discarding unexpected stdin input"),
            Err(err) => {
                warn!(%err, "stdin read failed, treating as closed");
                return;
            }
        }
    }
}

/// Swallow Ctrl-C in this process.
///
/// The child shares the parent's terminal; only the parent reacts to an
/// interrupt, by forwarding an abort.
pub fn ignore_interrupts() {
    tokio::spawn(async {
        loop {
            match tokio::signal::ctrl_c().await {
                Ok(()) => debug!("ignoring interrupt in channel server"),
                Err(err) => {
                    warn!(%err, "cannot listen for interrupts");
                    return;
                }
            }
        }
    });
}
