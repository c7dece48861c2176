//! Wire messages exchanged with a child's dispatcher.
//!
//! ## Protocol
//!
//! Request (one JSON object per line):
//! ```json
//! {"command": "ping"}
//! {"command": "execute", "unit": {"engine": "basic", "source": "...", "code": [...]}, "scope": "__main__"}
//! {"command": "abort"}
//! {"command": "member_names", "expr": "fo", "scope": "__main__"}
//! {"command": "format_failure", "failure": {"kind": "script", "message": "boom"}}
//! ```
//!
//! Response (one JSON object per line):
//! ```json
//! {"ok": true, "data": 42}
//! {"ok": false, "error": {"kind": "interrupted", "message": "execution interrupted by user"}}
//! ```

use serde::{Deserialize, Serialize};

use crate::engine::{CompiledUnit, ScopeRef, Value};
use crate::AppError;

/// Request sent from the console to the child dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum DispatchRequest {
    /// Liveness probe used when connecting.
    Ping,
    /// Run a compiled unit against a scope.
    Execute {
        /// Unit to run.
        unit: CompiledUnit,
        /// Target scope.
        #[serde(default)]
        scope: ScopeRef,
    },
    /// Cancel the in-flight execution, if any.
    Abort,
    /// List names completing `expr`.
    MemberNames {
        /// Partial expression.
        expr: String,
        /// Scope to search.
        #[serde(default)]
        scope: ScopeRef,
    },
    /// Render a failure with the engine's formatting.
    FormatFailure {
        /// Failure to render.
        failure: RemoteFailure,
    },
}

/// Failure reported by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemoteFailure {
    /// The execution was aborted on request.
    Interrupted {
        /// Human-readable detail.
        message: String,
    },
    /// The script raised an unhandled failure.
    Script {
        /// Failure message.
        message: String,
    },
    /// Another execution was already in flight.
    Busy {
        /// Human-readable detail.
        message: String,
    },
    /// The request could not be understood.
    Protocol {
        /// Human-readable detail.
        message: String,
    },
}

impl RemoteFailure {
    /// Failure message.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Interrupted { message }
            | Self::Script { message }
            | Self::Busy { message }
            | Self::Protocol { message } => message,
        }
    }

    /// Wire form of an application error, if it originated remotely.
    #[must_use]
    pub fn from_error(err: &AppError) -> Option<Self> {
        match err {
            AppError::Interrupted(message) => Some(Self::Interrupted {
                message: message.clone(),
            }),
            AppError::Script(message) => Some(Self::Script {
                message: message.clone(),
            }),
            AppError::Busy(message) => Some(Self::Busy {
                message: message.clone(),
            }),
            _ => None,
        }
    }
}

impl From<RemoteFailure> for AppError {
    fn from(failure: RemoteFailure) -> Self {
        match failure {
            RemoteFailure::Interrupted { message } => Self::Interrupted(message),
            RemoteFailure::Script { message } => Self::Script(message),
            RemoteFailure::Busy { message } => Self::Busy(message),
            RemoteFailure::Protocol { message } => Self::Protocol(message),
        }
    }
}

/// Response returned by the child dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchResponse {
    /// Whether the request succeeded.
    pub ok: bool,
    /// Payload on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Failure on error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RemoteFailure>,
}

impl DispatchResponse {
    /// Successful response carrying `data`.
    #[must_use]
    pub fn success(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    /// Failed response.
    #[must_use]
    pub fn failure(failure: RemoteFailure) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(failure),
        }
    }

    /// Convert into the payload or the typed failure.
    ///
    /// # Errors
    ///
    /// Returns the remote failure as an [`AppError`], or
    /// `AppError::Protocol` if a failed response carries no failure.
    pub fn into_result(self) -> crate::Result<Value> {
        if self.ok {
            return Ok(self.data.unwrap_or(Value::Null));
        }
        match self.error {
            Some(failure) => Err(failure.into()),
            None => Err(AppError::Protocol(
                "failed response without error detail".into(),
            )),
        }
    }
}
