//! Command dispatcher living in the child process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::engine::{
    CompiledUnit, Engine, ExecContext, OutputSink, Scope, ScopeRef, ScriptError, Value,
};
use crate::ipc::protocol::RemoteFailure;
use crate::remote::output::CompletionSignal;
use crate::{AppError, Result};

/// Message reported when an execution observed an abort request.
pub const INTERRUPTED_MESSAGE: &str = "execution interrupted by user";

/// Executes compiled units against the scopes bound in this process.
///
/// At most one execution runs at a time. The in-flight record exists exactly
/// while an execution is running and is cleared before the completion marker
/// for that execution is written.
pub struct CommandDispatcher {
    engine: Arc<dyn Engine>,
    sink: Arc<dyn OutputSink>,
    completion: Arc<dyn CompletionSignal>,
    scopes: Mutex<HashMap<ScopeRef, Scope>>,
    in_flight: Mutex<Option<CancellationToken>>,
    exit: watch::Sender<Option<i32>>,
}

impl CommandDispatcher {
    /// Create a dispatcher bound to `bound_scope`.
    ///
    /// `output` receives script output and the per-call completion markers.
    pub fn new<O>(engine: Arc<dyn Engine>, output: Arc<O>, bound_scope: ScopeRef) -> Self
    where
        O: OutputSink + CompletionSignal + 'static,
    {
        let mut scopes = HashMap::new();
        scopes.insert(bound_scope, Scope::new());
        let (exit, _) = watch::channel(None);
        Self {
            engine,
            sink: Arc::clone(&output) as Arc<dyn OutputSink>,
            completion: output,
            scopes: Mutex::new(scopes),
            in_flight: Mutex::new(None),
            exit,
        }
    }

    /// Execute `unit` against `scope`, then write one completion marker.
    ///
    /// The marker is written on success and on every failure path, so the
    /// caller's output wait always resolves. The one exception is a
    /// script-requested exit: the process is about to end and the caller is
    /// released by the exit itself.
    ///
    /// # Errors
    ///
    /// * `AppError::Busy` if another execution is in flight.
    /// * `AppError::Interrupted` if an abort was observed.
    /// * `AppError::Script` if the script failed.
    pub async fn execute(&self, unit: CompiledUnit, scope: &ScopeRef) -> Result<Value> {
        let span = info_span!("execute", scope = %scope, engine = %unit.engine);
        let outcome = self.run(unit, scope).instrument(span).await;

        match outcome {
            Outcome::Exit(code) => {
                info!(code, "script requested process exit");
                self.exit.send_replace(Some(code));
                Ok(Value::Null)
            }
            Outcome::Done(result) => {
                self.completion.complete();
                result
            }
        }
    }

    async fn run(&self, unit: CompiledUnit, scope_ref: &ScopeRef) -> Outcome {
        let Some(guard) = ExecutionGuard::acquire(&self.in_flight) else {
            warn!("execute rejected: another execution is in flight");
            return Outcome::Done(Err(AppError::Busy(
                "another execution is already running".into(),
            )));
        };
        let token = guard.token.clone();

        let mut scope = self.checkout(scope_ref);
        let engine = Arc::clone(&self.engine);
        let ctx = ExecContext::new(token.clone(), Arc::clone(&self.sink));
        let joined = tokio::task::spawn_blocking(move || {
            let result = engine.execute(&unit, &mut scope, &ctx);
            (scope, result)
        })
        .await;

        let result = match joined {
            Ok((scope, result)) => {
                self.checkin(scope_ref, scope);
                result
            }
            Err(err) => {
                warn!(%err, "execution worker failed");
                self.checkin(scope_ref, Scope::new());
                Err(ScriptError::Failed(format!("execution worker failed: {err}")))
            }
        };
        drop(guard);

        match result {
            Ok(value) => Outcome::Done(Ok(value)),
            // A cancelled execution reports an interrupt whatever the engine
            // turned it into.
            Err(_) if token.is_cancelled() => {
                info!("execution interrupted");
                Outcome::Done(Err(AppError::Interrupted(INTERRUPTED_MESSAGE.into())))
            }
            Err(ScriptError::Interrupted) => {
                Outcome::Done(Err(AppError::Interrupted(INTERRUPTED_MESSAGE.into())))
            }
            Err(ScriptError::Failed(message)) => {
                Outcome::Done(Err(AppError::Script(message_of(message))))
            }
            Err(ScriptError::Exit(code)) => Outcome::Exit(code),
        }
    }

    /// Request cancellation of the in-flight execution.
    ///
    /// Returns `false` without side effects when idle. Does not wait for the
    /// execution to unwind.
    pub fn abort(&self) -> bool {
        let slot = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some(token) => {
                info!("abort requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Names in `scope` completing `expr`.
    ///
    /// Empty while the scope is checked out by a running execution.
    #[must_use]
    pub fn member_names(&self, expr: &str, scope: &ScopeRef) -> Vec<String> {
        let scopes = self.scopes.lock().unwrap_or_else(PoisonError::into_inner);
        scopes
            .get(scope)
            .map(|scope| self.engine.member_names(scope, expr))
            .unwrap_or_default()
    }

    /// Render `failure` with the engine's formatting.
    #[must_use]
    pub fn format_failure(&self, failure: &RemoteFailure) -> String {
        self.engine.format_failure(failure.message())
    }

    /// Receiver resolving to `Some(code)` once a script asks to exit.
    #[must_use]
    pub fn exit_requested(&self) -> watch::Receiver<Option<i32>> {
        self.exit.subscribe()
    }

    /// Whether an execution is currently in flight.
    #[must_use]
    pub fn is_executing(&self) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn checkout(&self, scope: &ScopeRef) -> Scope {
        self.scopes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(scope)
            .unwrap_or_default()
    }

    fn checkin(&self, scope_ref: &ScopeRef, scope: Scope) {
        self.scopes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(scope_ref.clone(), scope);
    }
}

enum Outcome {
    Done(Result<Value>),
    Exit(i32),
}

fn message_of(message: String) -> String {
    if message.is_empty() {
        "script failed".to_owned()
    } else {
        message
    }
}

/// Holds the in-flight record; clears it on drop.
struct ExecutionGuard<'a> {
    slot: &'a Mutex<Option<CancellationToken>>,
    token: CancellationToken,
}

impl<'a> ExecutionGuard<'a> {
    fn acquire(slot: &'a Mutex<Option<CancellationToken>>) -> Option<Self> {
        let mut current = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if current.is_some() {
            return None;
        }
        let token = CancellationToken::new();
        *current = Some(token.clone());
        Some(Self { slot, token })
    }
}

impl Drop for ExecutionGuard<'_> {
    fn drop(&mut self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
