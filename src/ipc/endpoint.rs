//! Endpoint names addressing a child's dispatcher.

use std::fmt::{Display, Formatter};

use interprocess::local_socket::{GenericNamespaced, Name, ToNsName};
use uuid::Uuid;

use crate::{AppError, Result};

/// Longest accepted endpoint name; keeps Unix socket paths within limits.
const MAX_ENDPOINT_LEN: usize = 96;

/// Validated, session-unique endpoint name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointName(String);

impl EndpointName {
    /// Generate a fresh name `<prefix>-<random token>`.
    ///
    /// A new token per session keeps a previous session's leftover endpoint
    /// from ever being reused.
    #[must_use]
    pub fn generate(prefix: &str) -> Self {
        Self(format!("{prefix}-{}", Uuid::new_v4().simple()))
    }

    /// Validate a name received on the command line.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Ipc` if the name is empty, too long, or contains
    /// characters outside `[A-Za-z0-9_-]`.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() || raw.len() > MAX_ENDPOINT_LEN {
            return Err(AppError::Ipc(format!(
                "endpoint name must be 1..={MAX_ENDPOINT_LEN} bytes, got {}",
                raw.len()
            )));
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(AppError::Ipc(format!("invalid endpoint name '{raw}'")));
        }
        Ok(Self(raw.to_owned()))
    }

    /// Raw name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Namespaced local socket name for this endpoint.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Ipc` if the platform rejects the name.
    pub fn socket_name(&self) -> Result<Name<'_>> {
        self.0
            .as_str()
            .to_ns_name::<GenericNamespaced>()
            .map_err(|err| AppError::Ipc(format!("invalid ipc socket name '{}': {err}", self.0)))
    }
}

impl Display for EndpointName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
