#![forbid(unsafe_code)]

//! `console-host` — interactive console running scripts in a restartable
//! child process.
//!
//! Without `--server-endpoint` the binary is the console: it reads input
//! lines, hands them to the supervised session, and turns Ctrl-C into an
//! interrupt of the running command. With `--server-endpoint NAME` it is the
//! child: it serves the dispatcher on `NAME` until its stdin closes.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::runtime::Runtime;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use console_host::console::{Console, StdConsole};
use console_host::engine::basic::BasicEngine;
use console_host::engine::{Engine, ScopeRef};
use console_host::ipc::endpoint::EndpointName;
use console_host::models::exit_code;
use console_host::orchestrator::restart_manager::RestartManager;
use console_host::remote;
use console_host::repl::LineRepl;
use console_host::{AppError, HostConfig, Result};

/// Input lines buffered between the terminal and the REPL.
const INPUT_BUFFER: usize = 64;

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "console-host", about = "Interactive script console", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Run as the channel server for the given endpoint.
    #[arg(long, hide = true)]
    server_endpoint: Option<String>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?;

    if let Some(ref name) = args.server_endpoint {
        let code = runtime.block_on(run_server(name));
        // Exit without dropping the runtime: a blocked stdin read or a
        // still-running script must not hold the process open.
        std::process::exit(code);
    }

    run_console(&args, &runtime)
}

async fn run_server(name: &str) -> i32 {
    remote::ignore_interrupts();
    let endpoint = match EndpointName::parse(name) {
        Ok(endpoint) => endpoint,
        Err(err) => {
            error!(%err, "invalid server endpoint");
            return exit_code::STARTUP_FAILURE;
        }
    };
    let engine: Arc<dyn Engine> = Arc::new(BasicEngine::new());
    match remote::start_server(&endpoint, engine, ScopeRef::default()).await {
        Ok(code) => code,
        Err(err) => {
            error!(%err, "channel server failed");
            exit_code::STARTUP_FAILURE
        }
    }
}

fn run_console(args: &Cli, runtime: &Runtime) -> Result<()> {
    let config = match args.config {
        Some(ref path) => HostConfig::load_from_path(path)?,
        None => HostConfig::default(),
    };
    let config = Arc::new(config);
    info!("configuration loaded");

    let (input_tx, input_rx) = mpsc::channel(INPUT_BUFFER);
    spawn_input_reader(input_tx)?;

    let engine: Arc<dyn Engine> = Arc::new(BasicEngine::new());
    let console: Arc<dyn Console> = Arc::new(StdConsole);
    let factory = LineRepl::factory(engine, Arc::new(Mutex::new(input_rx)));
    let manager = RestartManager::new(config, console, factory, runtime.handle().clone());
    manager.start()?;

    runtime.block_on(async {
        let stopped = manager.stopped();
        loop {
            tokio::select! {
                () = stopped.cancelled() => break,
                () = terminate_signal() => {
                    info!("termination signal received");
                    break;
                }
                result = tokio::signal::ctrl_c() => match result {
                    Ok(()) => manager.break_execution(),
                    Err(err) => {
                        warn!(%err, "ctrl-c handler failed, interrupts disabled");
                        stopped.cancelled().await;
                        break;
                    }
                },
            }
        }
    });

    manager.terminate()?;
    info!("console-host shut down");
    Ok(())
}

/// Forward terminal lines to the REPL input channel from a plain thread.
fn spawn_input_reader(tx: mpsc::Sender<String>) -> Result<()> {
    std::thread::Builder::new()
        .name("console-input".to_owned())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
        })
        .map(|_| ())
        .map_err(|err| AppError::Io(format!("cannot start input reader: {err}")))
}

/// Resolve on SIGTERM; never on platforms without it.
async fn terminate_signal() {
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    }

    #[cfg(not(unix))]
    std::future::pending::<()>().await;
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    // Logs share the terminal with user output, and in the child stdout is
    // the output channel, so everything goes to stderr.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
