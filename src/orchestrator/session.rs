//! One child-process lifetime.
//!
//! A [`Session`] spawns the child, waits for its readiness marker, connects
//! to its dispatcher and runs a REPL until the REPL returns, the child exits
//! or [`Session::terminate`] is called. [`Session::dispose`] then tears the
//! child down: stdin is closed first, and the child is force-killed only if
//! it outlives the grace period.

use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use futures_util::future::join_all;
use tokio::process::ChildStdin;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::HostConfig;
use crate::console::Console;
use crate::engine::ScopeRef;
use crate::ipc::client::DispatcherClient;
use crate::ipc::endpoint::EndpointName;
use crate::models::exit_code;
use crate::models::session::{SessionRecord, SessionStatus};
use crate::orchestrator::child_monitor::monitor_exit;
use crate::orchestrator::local_dispatch::LocalDispatcher;
use crate::orchestrator::output_pump::{spawn_stderr_pump, spawn_stdout_pump};
use crate::orchestrator::spawner::spawn_child;
use crate::orchestrator::sync::OutputSync;
use crate::repl::{Repl, ReplContext};
use crate::{AppError, Result};

/// Upper bound on waiting for a force-killed child and its output pumps.
const KILL_SETTLE: Duration = Duration::from_secs(1);

/// A console session backed by one child process.
pub struct Session {
    endpoint: EndpointName,
    config: Arc<HostConfig>,
    console: Arc<dyn Console>,
    sync: Arc<OutputSync>,
    record: Mutex<SessionRecord>,
    shutdown: CancellationToken,
    requested_code: Mutex<Option<i32>>,
    kill: CancellationToken,
    stdin: Mutex<Option<ChildStdin>>,
    exit_tx: Mutex<Option<watch::Sender<Option<i32>>>>,
    exit_rx: watch::Receiver<Option<i32>>,
    client: OnceLock<DispatcherClient>,
    pumps: Mutex<Vec<JoinHandle<()>>>,
}

impl Session {
    /// Create a session with a fresh endpoint name. Nothing is spawned yet.
    #[must_use]
    pub fn new(config: Arc<HostConfig>, console: Arc<dyn Console>) -> Self {
        let endpoint = EndpointName::generate(&config.endpoint_prefix);
        let (exit_tx, exit_rx) = watch::channel(None);
        Self {
            record: Mutex::new(SessionRecord::new(endpoint.to_string())),
            endpoint,
            config,
            console,
            sync: Arc::new(OutputSync::new()),
            shutdown: CancellationToken::new(),
            requested_code: Mutex::new(None),
            kill: CancellationToken::new(),
            stdin: Mutex::new(None),
            exit_tx: Mutex::new(Some(exit_tx)),
            exit_rx,
            client: OnceLock::new(),
            pumps: Mutex::new(Vec::new()),
        }
    }

    /// Endpoint the child publishes its dispatcher on.
    #[must_use]
    pub fn endpoint(&self) -> &EndpointName {
        &self.endpoint
    }

    /// Current lifecycle status.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.lock_record().status
    }

    /// Child process id, once spawned.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.lock_record().pid
    }

    /// Child exit code, once observed.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        *self.exit_rx.borrow()
    }

    /// Run the session to completion and return its exit code.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Startup` if the child cannot be spawned, exits
    /// before signalling readiness, or its dispatcher cannot be reached.
    pub async fn run(&self, repl: &mut dyn Repl) -> Result<i32> {
        let span = info_span!("session", endpoint = %self.endpoint);
        async move {
            self.transition(SessionStatus::Starting);
            if self.shutdown.is_cancelled() {
                return Ok(self.requested_code());
            }

            if let Err(err) = self.start_child() {
                self.transition(SessionStatus::Crashed);
                return Err(err);
            }

            tokio::select! {
                () = self.sync.wait() => {}
                () = self.shutdown.cancelled() => return Ok(self.requested_code()),
            }
            if self.sync.is_closed() {
                self.transition(SessionStatus::Crashed);
                let code = self.exit_code().unwrap_or(exit_code::KILLED);
                return Err(AppError::Startup(format!(
                    "child exited with code {code} before signalling readiness"
                )));
            }
            self.transition(SessionStatus::Ready);
            info!(pid = self.pid(), "child ready");

            let client = match DispatcherClient::connect(self.endpoint.clone()).await {
                Ok(client) => client,
                Err(err) => {
                    self.transition(SessionStatus::Crashed);
                    return Err(AppError::Startup(format!("dispatcher unreachable: {err}")));
                }
            };
            let dispatcher = LocalDispatcher::new(
                client.clone(),
                Arc::clone(&self.sync),
                Arc::clone(&self.console),
            );
            let _ = self.client.set(client);
            self.transition(SessionStatus::Running);

            let ctx = ReplContext {
                dispatcher: &dispatcher,
                console: &self.console,
                prompt: &self.config.prompt,
            };
            let mut exit_rx = self.exit_rx.clone();
            let code = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => {
                    let code = self.requested_code();
                    info!(code, "session terminated on request");
                    self.transition(SessionStatus::Exited);
                    code
                }
                exited = exit_rx.wait_for(Option::is_some) => {
                    let code = exited
                        .map_or(exit_code::KILLED, |code| (*code).unwrap_or(exit_code::KILLED));
                    info!(code, "child exited while running");
                    self.transition(if code == exit_code::SUCCESS {
                        SessionStatus::Exited
                    } else {
                        SessionStatus::Crashed
                    });
                    code
                }
                code = repl.run(ctx) => {
                    info!(code, "repl finished");
                    self.transition(SessionStatus::Exited);
                    code
                }
            };
            Ok(code)
        }
        .instrument(span)
        .await
    }

    fn start_child(&self) -> Result<()> {
        let mut child = spawn_child(&self.config, &self.endpoint)?;
        let stdin = child.stdin.take();
        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(AppError::Startup("child stdio was not captured".into()));
        };

        self.lock_record().pid = child.id();
        *self.stdin.lock().unwrap_or_else(PoisonError::into_inner) = stdin;

        let mut pumps = self.pumps.lock().unwrap_or_else(PoisonError::into_inner);
        pumps.push(spawn_stdout_pump(
            stdout,
            Arc::clone(&self.console),
            Arc::clone(&self.sync),
        ));
        pumps.push(spawn_stderr_pump(stderr, Arc::clone(&self.console)));
        drop(pumps);

        let exit_tx = self
            .exit_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| AppError::Startup("session already started".into()))?;
        // The monitor owns the child; dropping its handle detaches it.
        drop(monitor_exit(
            child,
            Arc::clone(&self.sync),
            exit_tx,
            self.kill.clone(),
        ));
        Ok(())
    }

    /// Ask the session to end with `code`. Does not block; the first
    /// requested code wins. Effective in any state, including before the
    /// child is ready.
    pub fn terminate(&self, code: i32) {
        {
            let mut requested = self
                .requested_code
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            requested.get_or_insert(code);
        }
        info!(endpoint = %self.endpoint, code, "session termination requested");
        self.shutdown.cancel();
    }

    /// Interrupt the child's current execution.
    ///
    /// Returns `false` if nothing was running or the child is unreachable.
    pub async fn abort_command(&self) -> bool {
        let Some(client) = self.client.get() else {
            return false;
        };
        match client.abort().await {
            Ok(aborted) => {
                info!(endpoint = %self.endpoint, aborted, "abort forwarded");
                aborted
            }
            Err(err) => {
                debug!(%err, "abort not delivered");
                false
            }
        }
    }

    /// Completion candidates for `expr` in the default scope.
    ///
    /// Empty if the child is unreachable.
    pub async fn member_names(&self, expr: &str) -> Vec<String> {
        let Some(client) = self.client.get() else {
            return Vec::new();
        };
        match client.member_names(expr, &ScopeRef::default()).await {
            Ok(names) => names,
            Err(err) => {
                debug!(%err, "member names unavailable");
                Vec::new()
            }
        }
    }

    /// Tear the child down and mark the session disposed.
    ///
    /// Closes the child's stdin, waits up to the configured grace period for
    /// it to exit, force-kills it otherwise, and drains the output pumps.
    pub async fn dispose(&self) {
        let span = info_span!("dispose", endpoint = %self.endpoint);
        async move {
            // Never spawned: release the exit channel so waits end at once.
            drop(self.exit_tx.lock().unwrap_or_else(PoisonError::into_inner).take());
            drop(self.stdin.lock().unwrap_or_else(PoisonError::into_inner).take());

            let grace = self.config.shutdown_grace();
            let mut exit_rx = self.exit_rx.clone();
            if tokio::time::timeout(grace, exit_rx.wait_for(Option::is_some))
                .await
                .is_err()
            {
                warn!(
                    grace_ms = self.config.shutdown_grace_ms,
                    "child did not exit within grace period, forcing kill"
                );
                self.kill.cancel();
                let _ =
                    tokio::time::timeout(KILL_SETTLE, exit_rx.wait_for(Option::is_some)).await;
            }

            let pumps: Vec<_> = self
                .pumps
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .drain(..)
                .collect();
            match tokio::time::timeout(KILL_SETTLE, join_all(pumps)).await {
                Ok(results) => {
                    for err in results.into_iter().filter_map(std::result::Result::err) {
                        warn!(%err, "output pump failed");
                    }
                }
                Err(_) => debug!("output pipes still open after child exit"),
            }

            self.sync.close();
            let code = self.exit_code();
            {
                let mut record = self.lock_record();
                record.exit_code = code;
                record.transition(SessionStatus::Disposed);
            }
            info!(?code, "session disposed");
        }
        .instrument(span)
        .await;
    }

    fn requested_code(&self) -> i32 {
        self.requested_code
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .unwrap_or(exit_code::SUCCESS)
    }

    fn transition(&self, next: SessionStatus) {
        let mut record = self.lock_record();
        let from = record.status;
        if record.transition(next) {
            debug!(?from, to = ?next, "session status changed");
        } else {
            debug!(?from, to = ?next, "session status change ignored");
        }
    }

    fn lock_record(&self) -> std::sync::MutexGuard<'_, SessionRecord> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
