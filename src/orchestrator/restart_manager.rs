//! Supervisor that keeps a console session alive.
//!
//! A dedicated thread creates sessions one after another: each runs to
//! completion, is disposed, and is replaced unless it ended normally (and
//! normal exit is configured to stop the console) or the manager is
//! terminating. Public operations act on whichever session is current and
//! are no-ops while none is.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{JoinHandle, ThreadId};

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn};

use crate::config::HostConfig;
use crate::console::Console;
use crate::models::exit_code;
use crate::orchestrator::session::Session;
use crate::repl::ReplFactory;
use crate::{AppError, Result};

/// Name of the supervisor thread.
pub const SUPERVISOR_THREAD: &str = "console-supervisor";

#[derive(Default)]
struct SupervisorState {
    current: Option<Arc<Session>>,
    terminating: bool,
}

struct Shared {
    config: Arc<HostConfig>,
    console: Arc<dyn Console>,
    repl_factory: ReplFactory,
    runtime: Handle,
    state: Mutex<SupervisorState>,
    wake: Condvar,
    stopped: CancellationToken,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SupervisorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current(&self) -> Option<Arc<Session>> {
        self.lock().current.clone()
    }
}

/// Restarting supervisor for console sessions.
pub struct RestartManager {
    shared: Arc<Shared>,
    started: AtomicBool,
    thread: Mutex<Option<JoinHandle<()>>>,
    thread_id: Mutex<Option<ThreadId>>,
}

impl RestartManager {
    /// Create a manager. Sessions run on `runtime`; nothing starts until
    /// [`start`](Self::start).
    #[must_use]
    pub fn new(
        config: Arc<HostConfig>,
        console: Arc<dyn Console>,
        repl_factory: ReplFactory,
        runtime: Handle,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                console,
                repl_factory,
                runtime,
                state: Mutex::new(SupervisorState::default()),
                wake: Condvar::new(),
                stopped: CancellationToken::new(),
            }),
            started: AtomicBool::new(false),
            thread: Mutex::new(None),
            thread_id: Mutex::new(None),
        }
    }

    /// Launch the supervisor thread.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Supervisor` if already started or the thread
    /// cannot be created.
    pub fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(AppError::Supervisor("restart manager already started".into()));
        }

        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name(SUPERVISOR_THREAD.to_owned())
            .spawn(move || supervise(&shared))
            .map_err(|err| AppError::Supervisor(format!("cannot start supervisor: {err}")))?;

        *self.thread_id.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle.thread().id());
        *self.thread.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        info!("restart manager started");
        Ok(())
    }

    /// Token cancelled once the supervisor loop has exited.
    #[must_use]
    pub fn stopped(&self) -> CancellationToken {
        self.shared.stopped.clone()
    }

    /// Process id of the current session's child, if one is running.
    #[must_use]
    pub fn child_pid(&self) -> Option<u32> {
        self.shared.current().and_then(|session| session.pid())
    }

    /// Interrupt the current session's running command, if any.
    ///
    /// Returns immediately; the abort is delivered on the runtime.
    pub fn break_execution(&self) {
        let Some(session) = self.shared.current() else {
            return;
        };
        self.shared.runtime.spawn(async move {
            session.abort_command().await;
        });
    }

    /// End the current session so that a fresh one replaces it.
    pub fn restart_console(&self) {
        if let Some(session) = self.shared.current() {
            info!(endpoint = %session.endpoint(), "console restart requested");
            session.terminate(exit_code::RESTART_REQUESTED);
        }
    }

    /// Completion candidates from the current session.
    ///
    /// Empty when idle, unreachable, or slower than the configured timeout.
    pub async fn get_member_names(&self, expr: &str) -> Vec<String> {
        let Some(session) = self.shared.current() else {
            return Vec::new();
        };
        let timeout = self.shared.config.member_names_timeout();
        tokio::time::timeout(timeout, session.member_names(expr))
            .await
            .unwrap_or_default()
    }

    /// Stop supervising: end the current session and wait for the
    /// supervisor thread to finish.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Supervisor` if called on the supervisor thread or
    /// the thread panicked.
    pub fn terminate(&self) -> Result<()> {
        let supervisor_id = *self.thread_id.lock().unwrap_or_else(PoisonError::into_inner);
        if supervisor_id == Some(std::thread::current().id()) {
            return Err(AppError::Supervisor(
                "terminate called from the supervisor thread".into(),
            ));
        }

        {
            let mut state = self.shared.lock();
            state.terminating = true;
            if let Some(ref session) = state.current {
                session.terminate(exit_code::SUCCESS);
            }
            self.shared.wake.notify_all();
        }
        info!("restart manager terminating");

        let handle = self.thread.lock().unwrap_or_else(PoisonError::into_inner).take();
        match handle {
            Some(handle) => handle
                .join()
                .map_err(|_| AppError::Supervisor("supervisor thread panicked".into())),
            None => {
                self.shared.stopped.cancel();
                Ok(())
            }
        }
    }
}

/// Supervisor loop; runs on [`SUPERVISOR_THREAD`].
fn supervise(shared: &Shared) {
    let _span = info_span!("supervisor").entered();
    let mut generation: u64 = 0;

    loop {
        let session = Arc::new(Session::new(
            Arc::clone(&shared.config),
            Arc::clone(&shared.console),
        ));
        {
            let mut state = shared.lock();
            if state.terminating {
                break;
            }
            state.current = Some(Arc::clone(&session));
        }
        generation += 1;
        info!(generation, endpoint = %session.endpoint(), "starting session");

        let mut repl = (shared.repl_factory)();
        let code = match shared.runtime.block_on(session.run(repl.as_mut())) {
            Ok(code) => code,
            Err(err) => {
                warn!(%err, "session failed to start");
                exit_code::STARTUP_FAILURE
            }
        };
        drop(repl);

        shared.lock().current = None;
        shared.runtime.block_on(session.dispose());

        if shared.config.exit_on_normal_exit && code == exit_code::SUCCESS {
            info!("session ended normally, stopping");
            break;
        }

        let state = shared.lock();
        let (state, _) = shared
            .wake
            .wait_timeout_while(state, shared.config.restart_delay(), |state| {
                !state.terminating
            })
            .unwrap_or_else(PoisonError::into_inner);
        if state.terminating {
            break;
        }
        drop(state);
        info!(code, "restarting console");
    }

    info!("supervisor stopped");
    shared.stopped.cancel();
}
