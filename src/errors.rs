//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// File-system or I/O operation failure.
    Io(String),
    /// Endpoint registration or listener failure inside the child.
    Ipc(String),
    /// Malformed frame, oversized line, or undecodable message.
    Protocol(String),
    /// A request could not be delivered to the dispatcher.
    Unreachable(String),
    /// The dispatcher channel broke after a request was sent.
    Transport(String),
    /// The child process exited before announcing readiness.
    Startup(String),
    /// Execution was interrupted by a user-requested abort.
    Interrupted(String),
    /// Unhandled failure raised by the executed script.
    Script(String),
    /// The dispatcher rejected an overlapping execution.
    Busy(String),
    /// Source text could not be compiled.
    Compile(String),
    /// Supervisor thread lifecycle misuse or failure.
    Supervisor(String),
}

impl AppError {
    /// Whether this error is the expected result of a user interrupt.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted(_))
    }

    /// Whether the request never reached the other side.
    #[must_use]
    pub fn is_undelivered(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Ipc(msg) => write!(f, "ipc: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::Unreachable(msg) => write!(f, "unreachable: {msg}"),
            Self::Transport(msg) => write!(f, "transport: {msg}"),
            Self::Startup(msg) => write!(f, "startup: {msg}"),
            Self::Interrupted(msg) => write!(f, "interrupted: {msg}"),
            Self::Script(msg) => write!(f, "script: {msg}"),
            Self::Busy(msg) => write!(f, "busy: {msg}"),
            Self::Compile(msg) => write!(f, "compile: {msg}"),
            Self::Supervisor(msg) => write!(f, "supervisor: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(format!("invalid json: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
