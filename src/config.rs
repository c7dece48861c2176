//! Host configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

fn default_true() -> bool {
    true
}

fn default_shutdown_grace_ms() -> u64 {
    5_000
}

fn default_restart_delay_ms() -> u64 {
    250
}

fn default_member_names_timeout_ms() -> u64 {
    2_000
}

fn default_endpoint_prefix() -> String {
    "console-host".into()
}

fn default_prompt() -> String {
    ">>> ".into()
}

/// Host configuration parsed from an optional `console-host.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct HostConfig {
    /// Executable launched as the child. Defaults to the running binary.
    #[serde(default)]
    pub program: Option<PathBuf>,
    /// Extra arguments placed before the private endpoint flag.
    #[serde(default)]
    pub program_args: Vec<String>,
    /// Stop supervising once a session exits with the success code.
    #[serde(default = "default_true")]
    pub exit_on_normal_exit: bool,
    /// Time the child gets to exit after its stdin is closed.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
    /// Pause between a session ending and its replacement starting.
    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,
    /// Upper bound on an advisory member-name lookup.
    #[serde(default = "default_member_names_timeout_ms")]
    pub member_names_timeout_ms: u64,
    /// Prefix of every generated endpoint name.
    #[serde(default = "default_endpoint_prefix")]
    pub endpoint_prefix: String,
    /// Prompt written before each line is read.
    #[serde(default = "default_prompt")]
    pub prompt: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            program: None,
            program_args: Vec::new(),
            exit_on_normal_exit: default_true(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            restart_delay_ms: default_restart_delay_ms(),
            member_names_timeout_ms: default_member_names_timeout_ms(),
            endpoint_prefix: default_endpoint_prefix(),
            prompt: default_prompt(),
        }
    }
}

impl HostConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the child executable.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if no program is configured and the
    /// current executable cannot be determined.
    pub fn resolve_program(&self) -> Result<PathBuf> {
        match self.program {
            Some(ref program) => Ok(program.clone()),
            None => std::env::current_exe()
                .map_err(|err| AppError::Config(format!("cannot locate current exe: {err}"))),
        }
    }

    /// Grace period granted to the child between stdin close and force-kill.
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Delay before a replacement session is started.
    #[must_use]
    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    /// Bound on advisory member-name lookups.
    #[must_use]
    pub fn member_names_timeout(&self) -> Duration {
        Duration::from_millis(self.member_names_timeout_ms)
    }

    /// Validate value ranges.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` on the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.shutdown_grace_ms == 0 {
            return Err(AppError::Config(
                "shutdown_grace_ms must be greater than zero".into(),
            ));
        }

        if self.endpoint_prefix.is_empty() {
            return Err(AppError::Config("endpoint_prefix must not be empty".into()));
        }

        if !self
            .endpoint_prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(AppError::Config(format!(
                "endpoint_prefix '{}' may only contain ASCII letters, digits, '-' and '_'",
                self.endpoint_prefix
            )));
        }

        Ok(())
    }
}
