//! Read-eval-print loops driven by a session.
//!
//! The [`Repl`] trait decouples the session from how input is obtained and
//! compiled. A fresh REPL is created for every session through a
//! [`ReplFactory`]; it runs until it returns an exit code or the session
//! drops it (child exit, restart, terminate).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::console::{Console, Style};
use crate::engine::{Engine, ScopeRef, Value};
use crate::models::exit_code;
use crate::orchestrator::local_dispatch::LocalDispatcher;
use crate::AppError;

/// Services a REPL runs against.
pub struct ReplContext<'a> {
    /// Executes compiled units in the session's child.
    pub dispatcher: &'a LocalDispatcher,
    /// User-visible output.
    pub console: &'a Arc<dyn Console>,
    /// Prompt text.
    pub prompt: &'a str,
}

/// An interactive loop hosted by a session.
pub trait Repl: Send {
    /// Run until the loop decides to end; returns the session exit code.
    ///
    /// The future may be dropped at any await point when the session ends
    /// for another reason.
    fn run<'a>(
        &'a mut self,
        ctx: ReplContext<'a>,
    ) -> Pin<Box<dyn Future<Output = i32> + Send + 'a>>;
}

/// Creates one REPL per session.
pub type ReplFactory = Arc<dyn Fn() -> Box<dyn Repl> + Send + Sync>;

/// Input lines shared by every session's REPL.
///
/// Lines typed while the console restarts stay queued for the next session.
pub type SharedInput = Arc<Mutex<mpsc::Receiver<String>>>;

/// Line-at-a-time REPL: each input line is compiled and executed as a unit.
pub struct LineRepl {
    engine: Arc<dyn Engine>,
    input: SharedInput,
    scope: ScopeRef,
}

impl LineRepl {
    /// Create a REPL reading from `input` and compiling with `engine`.
    #[must_use]
    pub fn new(engine: Arc<dyn Engine>, input: SharedInput) -> Self {
        Self {
            engine,
            input,
            scope: ScopeRef::default(),
        }
    }

    /// Factory producing a [`LineRepl`] per session over the same input.
    #[must_use]
    pub fn factory(engine: Arc<dyn Engine>, input: SharedInput) -> ReplFactory {
        Arc::new(move || {
            Box::new(Self::new(Arc::clone(&engine), Arc::clone(&input))) as Box<dyn Repl>
        })
    }
}

impl Repl for LineRepl {
    fn run<'a>(
        &'a mut self,
        ctx: ReplContext<'a>,
    ) -> Pin<Box<dyn Future<Output = i32> + Send + 'a>> {
        Box::pin(async move {
            let mut input = self.input.lock().await;
            loop {
                ctx.console.write(ctx.prompt, Style::Prompt);
                let Some(line) = input.recv().await else {
                    debug!("input closed");
                    return exit_code::SUCCESS;
                };
                if line.trim().is_empty() {
                    continue;
                }

                let unit = match self.engine.compile(&line) {
                    Ok(unit) => unit,
                    Err(err) => {
                        ctx.console.write_line(&err.to_string(), Style::Error);
                        continue;
                    }
                };

                match ctx.dispatcher.execute(&unit, &self.scope).await {
                    Ok(Value::Null) => {}
                    Ok(value) => ctx.console.write_line(&value.to_string(), Style::Out),
                    Err(AppError::Transport(err)) => debug!(%err, "execution lost its channel"),
                    // Already rendered by the dispatcher.
                    Err(_) => {}
                }
            }
        })
    }
}
