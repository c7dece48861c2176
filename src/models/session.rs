//! Session record and lifecycle helpers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status for a supervised console session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Session constructed, child not spawned yet.
    NotStarted,
    /// Child spawned, waiting for the readiness marker.
    Starting,
    /// Readiness observed, dispatcher client not connected yet.
    Ready,
    /// REPL loop is driving the child.
    Running,
    /// Child exited with the success code.
    Exited,
    /// Child exited with any other code, or never became ready.
    Crashed,
    /// Child reaped and resources released.
    Disposed,
}

/// Bookkeeping for one child-process lifetime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SessionRecord {
    /// Endpoint the child publishes its dispatcher on.
    pub endpoint: String,
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// Child process identifier once spawned.
    pub pid: Option<u32>,
    /// Child exit code once observed.
    pub exit_code: Option<i32>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last status change.
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Construct a record in `NotStarted` for the given endpoint.
    #[must_use]
    pub fn new(endpoint: String) -> Self {
        let now = Utc::now();
        Self {
            endpoint,
            status: SessionStatus::NotStarted,
            pid: None,
            exit_code: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Determine whether a lifecycle transition is permitted.
    #[must_use]
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        matches!(
            (self.status, next),
            (SessionStatus::NotStarted, SessionStatus::Starting)
                | (SessionStatus::Starting, SessionStatus::Ready)
                | (SessionStatus::Ready, SessionStatus::Running)
                | (
                    SessionStatus::Starting | SessionStatus::Ready | SessionStatus::Running,
                    SessionStatus::Exited | SessionStatus::Crashed
                )
                | (
                    SessionStatus::NotStarted
                        | SessionStatus::Starting
                        | SessionStatus::Ready
                        | SessionStatus::Running
                        | SessionStatus::Exited
                        | SessionStatus::Crashed,
                    SessionStatus::Disposed
                )
        )
    }

    /// Apply a transition if permitted; returns whether it was applied.
    pub fn transition(&mut self, next: SessionStatus) -> bool {
        if !self.can_transition_to(next) {
            return false;
        }
        self.status = next;
        self.updated_at = Utc::now();
        true
    }
}
