#![forbid(unsafe_code)]

pub mod config;
pub mod console;
pub mod engine;
pub mod errors;
pub mod framing;
pub mod ipc;
pub mod models;
pub mod orchestrator;
pub mod remote;
pub mod repl;

pub use config::HostConfig;
pub use errors::{AppError, Result};
