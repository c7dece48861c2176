//! Client side of the dispatch protocol, used by the console.
//!
//! Each call opens a fresh connection, writes one request line and reads one
//! response line. Calls are therefore independent: an `abort` never queues
//! behind a running `execute`.

use interprocess::local_socket::tokio::{prelude::*, Stream};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::debug;

use crate::engine::{CompiledUnit, ScopeRef, Value};
use crate::ipc::endpoint::EndpointName;
use crate::ipc::protocol::{DispatchRequest, DispatchResponse, RemoteFailure};
use crate::{AppError, Result};

/// Handle to a child's dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherClient {
    endpoint: EndpointName,
}

impl DispatcherClient {
    /// Resolve the dispatcher at `endpoint` and check that it answers.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Unreachable` if nothing answers on the endpoint.
    pub async fn connect(endpoint: EndpointName) -> Result<Self> {
        let client = Self { endpoint };
        client.ping().await?;
        Ok(client)
    }

    /// Endpoint this client talks to.
    #[must_use]
    pub fn endpoint(&self) -> &EndpointName {
        &self.endpoint
    }

    /// Round-trip a liveness probe.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Unreachable` if the dispatcher cannot be reached.
    pub async fn ping(&self) -> Result<()> {
        self.call(&DispatchRequest::Ping).await.map(|_| ())
    }

    /// Execute `unit` against `scope` in the child and return its result.
    ///
    /// # Errors
    ///
    /// Returns the remote failure (`Interrupted`, `Script`, `Busy`),
    /// `AppError::Unreachable` if the request was never delivered, or
    /// `AppError::Transport` if the child went away mid-call.
    pub async fn execute(&self, unit: &CompiledUnit, scope: &ScopeRef) -> Result<Value> {
        self.call(&DispatchRequest::Execute {
            unit: unit.clone(),
            scope: scope.clone(),
        })
        .await
    }

    /// Ask the child to interrupt its current execution.
    ///
    /// Returns whether an execution was in flight.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Unreachable` if the dispatcher cannot be reached.
    pub async fn abort(&self) -> Result<bool> {
        let value = self.call(&DispatchRequest::Abort).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    /// Names completing `expr` in `scope`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Unreachable` or `AppError::Transport` if the
    /// dispatcher cannot be reached, or
    /// `AppError::Protocol` for a malformed reply.
    pub async fn member_names(&self, expr: &str, scope: &ScopeRef) -> Result<Vec<String>> {
        let value = self
            .call(&DispatchRequest::MemberNames {
                expr: expr.to_owned(),
                scope: scope.clone(),
            })
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Render `failure` with the child engine's formatting.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Unreachable` or `AppError::Transport` if the
    /// dispatcher cannot be reached, or
    /// `AppError::Protocol` for a malformed reply.
    pub async fn format_failure(&self, failure: &RemoteFailure) -> Result<String> {
        let value = self
            .call(&DispatchRequest::FormatFailure {
                failure: failure.clone(),
            })
            .await?;
        match value {
            Value::String(text) => Ok(text),
            other => Err(AppError::Protocol(format!(
                "format_failure returned non-string: {other}"
            ))),
        }
    }

    async fn call(&self, request: &DispatchRequest) -> Result<Value> {
        // Failures before the request is flushed are `Unreachable`: the
        // dispatcher never saw the request.
        let stream = Stream::connect(self.endpoint.socket_name()?)
            .await
            .map_err(|err| {
                AppError::Unreachable(format!("cannot reach '{}': {err}", self.endpoint))
            })?;
        let (reader, mut writer) = stream.split();

        let mut request_line = serde_json::to_string(request)?;
        request_line.push('\n');
        writer
            .write_all(request_line.as_bytes())
            .await
            .map_err(|err| AppError::Unreachable(format!("send failed: {err}")))?;
        writer
            .flush()
            .await
            .map_err(|err| AppError::Unreachable(format!("send failed: {err}")))?;

        let mut reader = BufReader::new(reader);
        let mut response_line = String::new();
        let read = reader
            .read_line(&mut response_line)
            .await
            .map_err(|err| AppError::Transport(format!("receive failed: {err}")))?;
        if read == 0 {
            return Err(AppError::Transport(
                "connection closed before a response arrived".into(),
            ));
        }

        debug!(endpoint = %self.endpoint, bytes = read, "dispatch response received");
        let response: DispatchResponse = serde_json::from_str(response_line.trim())?;
        response.into_result()
    }
}
