//! Shared helpers for integration tests that drive real child processes.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;

use console_host::config::HostConfig;
use console_host::console::{Console, Style};
use console_host::engine::basic::BasicEngine;
use console_host::engine::{Engine, ScopeRef, Value};
use console_host::repl::{Repl, ReplContext, ReplFactory};
use console_host::AppError;

/// Path of the binary under test.
pub const BIN: &str = env!("CARGO_BIN_EXE_console-host");

/// Configuration launching the binary under test with short delays.
pub fn test_config() -> HostConfig {
    HostConfig {
        program: Some(PathBuf::from(BIN)),
        shutdown_grace_ms: 2_000,
        restart_delay_ms: 10,
        member_names_timeout_ms: 1_000,
        endpoint_prefix: "console-host-test".into(),
        ..HostConfig::default()
    }
}

/// Console that records every write.
#[derive(Default)]
pub struct RecordingConsole {
    writes: Mutex<Vec<(Style, String)>>,
}

impl RecordingConsole {
    /// Completed lines written with `style`, newline stripped.
    pub fn lines(&self, style: Style) -> Vec<String> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, text)| *s == style && text.ends_with('\n'))
            .map(|(_, text)| text.trim_end_matches('\n').to_owned())
            .collect()
    }

    /// Whether any line with `style` contains `needle`.
    pub fn contains(&self, style: Style, needle: &str) -> bool {
        self.lines(style).iter().any(|line| line.contains(needle))
    }
}

impl Console for RecordingConsole {
    fn write(&self, text: &str, style: Style) {
        self.writes.lock().unwrap().push((style, text.to_owned()));
    }
}

/// What a [`ScriptedRepl`] does after running its scripts.
#[derive(Debug, Clone, Copy)]
pub enum Then {
    /// Return this exit code.
    Return(i32),
    /// Never return; the session must end for another reason.
    Wait,
}

/// Result of one scripted execution.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub result: Result<Value, AppError>,
    /// Number of `Out` lines on the console when the result came back.
    pub out_lines_seen: usize,
}

/// REPL that executes a fixed list of sources.
pub struct ScriptedRepl {
    scripts: Vec<String>,
    then: Then,
    console: Arc<RecordingConsole>,
    pub outcomes: Arc<Mutex<Vec<Outcome>>>,
    /// Notified once per script, just before it is sent.
    pub started: Arc<Notify>,
}

impl ScriptedRepl {
    pub fn new(scripts: &[&str], then: Then, console: Arc<RecordingConsole>) -> Self {
        Self {
            scripts: scripts.iter().map(|s| (*s).to_owned()).collect(),
            then,
            console,
            outcomes: Arc::new(Mutex::new(Vec::new())),
            started: Arc::new(Notify::new()),
        }
    }
}

impl Repl for ScriptedRepl {
    fn run<'a>(
        &'a mut self,
        ctx: ReplContext<'a>,
    ) -> Pin<Box<dyn Future<Output = i32> + Send + 'a>> {
        Box::pin(async move {
            let engine = BasicEngine::new();
            for source in &self.scripts {
                let unit = engine.compile(source).expect("test script compiles");
                self.started.notify_one();
                let result = ctx.dispatcher.execute(&unit, &ScopeRef::default()).await;
                let out_lines_seen = self.console.lines(Style::Out).len();
                self.outcomes.lock().unwrap().push(Outcome {
                    result,
                    out_lines_seen,
                });
            }
            match self.then {
                Then::Return(code) => code,
                Then::Wait => std::future::pending().await,
            }
        })
    }
}

/// Factory handing out one scripted REPL per session from a queue.
///
/// Once the queue is empty, further sessions get a REPL that returns
/// success immediately.
pub fn scripted_factory(
    plans: Vec<(Vec<&'static str>, Then)>,
    console: Arc<RecordingConsole>,
    created: Arc<Mutex<usize>>,
    started: Arc<Notify>,
) -> ReplFactory {
    let plans = Arc::new(Mutex::new(plans.into_iter()));
    Arc::new(move || {
        *created.lock().unwrap() += 1;
        let (scripts, then) = plans
            .lock()
            .unwrap()
            .next()
            .unwrap_or((Vec::new(), Then::Return(0)));
        let mut repl = ScriptedRepl::new(&scripts, then, Arc::clone(&console));
        repl.started = Arc::clone(&started);
        Box::new(repl) as Box<dyn Repl>
    })
}

/// Poll `check` until it holds or `timeout` elapses.
pub async fn eventually(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
