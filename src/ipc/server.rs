//! Dispatch server published by the child process.
//!
//! Listens on the session's endpoint and serves line-delimited
//! [`DispatchRequest`]s. Every connection is handled on its own task so an
//! `abort` can be served while an `execute` on another connection is still
//! running.

use std::sync::Arc;

use interprocess::local_socket::{tokio::prelude::*, ListenerOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::engine::Value;
use crate::ipc::endpoint::EndpointName;
use crate::ipc::protocol::{DispatchRequest, DispatchResponse, RemoteFailure};
use crate::remote::dispatcher::CommandDispatcher;
use crate::{AppError, Result};

/// Bind `endpoint` and spawn the accept loop.
///
/// The loop ends when `ct` is cancelled; connections already accepted run
/// to completion on their own tasks.
///
/// # Errors
///
/// Returns `AppError::Ipc` if the name is invalid or already registered by
/// another process.
pub fn spawn_dispatch_server(
    endpoint: &EndpointName,
    dispatcher: Arc<CommandDispatcher>,
    ct: CancellationToken,
) -> Result<tokio::task::JoinHandle<()>> {
    let listener = ListenerOptions::new()
        .name(endpoint.socket_name()?)
        .create_tokio()
        .map_err(|err| {
            AppError::Ipc(format!(
                "failed to register endpoint '{endpoint}' (already registered?): {err}"
            ))
        })?;

    info!(endpoint = %endpoint, "dispatch server listening");

    let span = info_span!("dispatch_server", endpoint = %endpoint);
    let handle = tokio::spawn(
        async move {
            loop {
                tokio::select! {
                    () = ct.cancelled() => {
                        info!("dispatch server shutting down");
                        break;
                    }
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok(stream) => {
                                let dispatcher = Arc::clone(&dispatcher);
                                tokio::spawn(handle_connection(stream, dispatcher));
                            }
                            Err(err) => {
                                warn!(%err, "dispatch accept failed");
                            }
                        }
                    }
                }
            }
        }
        .instrument(span),
    );

    Ok(handle)
}

/// Serve requests from one client connection until EOF.
async fn handle_connection(
    stream: interprocess::local_socket::tokio::Stream,
    dispatcher: Arc<CommandDispatcher>,
) {
    let span = info_span!("dispatch_conn");
    async move {
        let (reader, mut writer) = stream.split();
        let mut buf_reader = BufReader::new(reader);
        let mut line = String::new();

        loop {
            line.clear();
            match buf_reader.read_line(&mut line).await {
                Ok(0) => break,
                Ok(_) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    let response = match serde_json::from_str::<DispatchRequest>(trimmed) {
                        Ok(request) => dispatch_request(request, &dispatcher).await,
                        Err(err) => DispatchResponse::failure(RemoteFailure::Protocol {
                            message: format!("invalid json: {err}"),
                        }),
                    };

                    let mut response_line = serde_json::to_string(&response).unwrap_or_else(|_| {
                        r#"{"ok":false,"error":{"kind":"protocol","message":"serialization failed"}}"#
                            .to_owned()
                    });
                    response_line.push('\n');

                    if let Err(err) = writer.write_all(response_line.as_bytes()).await {
                        warn!(%err, "failed to write dispatch response");
                        break;
                    }
                }
                Err(err) => {
                    warn!(%err, "dispatch read error");
                    break;
                }
            }
        }

        debug!("dispatch connection closed");
    }
    .instrument(span)
    .await;
}

/// Route a request to the dispatcher.
async fn dispatch_request(
    request: DispatchRequest,
    dispatcher: &Arc<CommandDispatcher>,
) -> DispatchResponse {
    match request {
        DispatchRequest::Ping => DispatchResponse::success(Value::String("pong".into())),
        DispatchRequest::Execute { unit, scope } => {
            match dispatcher.execute(unit, &scope).await {
                Ok(value) => DispatchResponse::success(value),
                Err(err) => DispatchResponse::failure(to_failure(&err)),
            }
        }
        DispatchRequest::Abort => DispatchResponse::success(Value::Bool(dispatcher.abort())),
        DispatchRequest::MemberNames { expr, scope } => {
            let names = dispatcher.member_names(&expr, &scope);
            DispatchResponse::success(Value::from(names))
        }
        DispatchRequest::FormatFailure { failure } => {
            DispatchResponse::success(Value::String(dispatcher.format_failure(&failure)))
        }
    }
}

fn to_failure(err: &AppError) -> RemoteFailure {
    RemoteFailure::from_error(err).unwrap_or_else(|| RemoteFailure::Script {
        message: err.to_string(),
    })
}
