//! Script engine boundary.
//!
//! The console never interprets source text itself. An [`Engine`] compiles
//! text into a serializable [`CompiledUnit`] on the parent side and executes
//! units against a [`Scope`] on the child side. Execution is cooperative:
//! engines call [`ExecContext::checkpoint`] at safe points so that an abort
//! request can unwind them.

pub mod basic;

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::Result;

/// Values produced by scripts and stored in scopes.
pub type Value = serde_json::Value;

/// Name of the scope a dispatcher is bound to at startup.
pub const DEFAULT_SCOPE: &str = "__main__";

/// Longest uninterrupted sleep slice between cancellation checks.
const SLEEP_SLICE: Duration = Duration::from_millis(10);

/// Mutable variable namespace a unit executes against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scope {
    vars: BTreeMap<String, Value>,
}

impl Scope {
    /// Create an empty scope.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a variable.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Bind or rebind a variable.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    /// Variable names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.vars.keys().map(String::as_str)
    }

    /// Number of bound variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether the scope has no variables.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// Reference to a named scope living in the child.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeRef(String);

impl ScopeRef {
    /// Reference a scope by name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Scope name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ScopeRef {
    fn default() -> Self {
        Self(DEFAULT_SCOPE.to_owned())
    }
}

impl Display for ScopeRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Engine-specific executable form of some source text.
///
/// Units cross the process boundary, so their payload is plain JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledUnit {
    /// Name of the engine that produced the unit.
    pub engine: String,
    /// Original source text, kept for diagnostics.
    pub source: String,
    /// Engine-defined code representation.
    pub code: Value,
}

/// Failure raised while executing a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    /// A cancellation request was observed at a safe point.
    Interrupted,
    /// The script failed.
    Failed(String),
    /// The script asked the hosting process to exit with a code.
    Exit(i32),
}

impl Display for ScriptError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Interrupted => f.write_str("execution interrupted"),
            Self::Failed(msg) => f.write_str(msg),
            Self::Exit(code) => write!(f, "exit requested with code {code}"),
        }
    }
}

impl std::error::Error for ScriptError {}

/// Destination of script output inside the child.
pub trait OutputSink: Send + Sync {
    /// Emit one line of regular output (no embedded newline).
    fn out_line(&self, line: &str);

    /// Emit one line of error output (no embedded newline).
    fn err_line(&self, line: &str);
}

/// Execution-time services handed to [`Engine::execute`].
#[derive(Clone)]
pub struct ExecContext {
    cancel: CancellationToken,
    output: Arc<dyn OutputSink>,
}

impl ExecContext {
    /// Create a context bound to a cancellation token and an output sink.
    #[must_use]
    pub fn new(cancel: CancellationToken, output: Arc<dyn OutputSink>) -> Self {
        Self { cancel, output }
    }

    /// Safe point: unwind if an abort has been requested.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError::Interrupted`] once the token is cancelled.
    pub fn checkpoint(&self) -> std::result::Result<(), ScriptError> {
        if self.cancel.is_cancelled() {
            Err(ScriptError::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Whether an abort has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Write text to standard output, one line per `\n`-separated part.
    pub fn print(&self, text: &str) {
        for line in text.split('\n') {
            self.output.out_line(line);
        }
    }

    /// Write text to standard error, one line per `\n`-separated part.
    pub fn eprint(&self, text: &str) {
        for line in text.split('\n') {
            self.output.err_line(line);
        }
    }

    /// Sleep for `duration`, waking early to honour cancellation.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError::Interrupted`] if cancelled while sleeping.
    pub fn sleep(&self, duration: Duration) -> std::result::Result<(), ScriptError> {
        let deadline = Instant::now() + duration;
        loop {
            self.checkpoint()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            std::thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}

/// Compiles and executes script source.
pub trait Engine: Send + Sync {
    /// Engine name recorded in every [`CompiledUnit`] it produces.
    fn name(&self) -> &str;

    /// Compile source text into a unit.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Compile`](crate::AppError::Compile) for invalid
    /// source.
    fn compile(&self, source: &str) -> Result<CompiledUnit>;

    /// Execute a unit against `scope` on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns a [`ScriptError`] when the script fails, is interrupted, or
    /// requests process exit.
    fn execute(
        &self,
        unit: &CompiledUnit,
        scope: &mut Scope,
        ctx: &ExecContext,
    ) -> std::result::Result<Value, ScriptError>;

    /// Names visible in `scope` that complete `expr`.
    fn member_names(&self, scope: &Scope, expr: &str) -> Vec<String>;

    /// Render an unhandled failure the way the engine reports errors.
    fn format_failure(&self, message: &str) -> String;
}
