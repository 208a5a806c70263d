//! Local view of the sessions this process started.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Lifecycle of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Registered locally, remote start not confirmed yet.
    Created,
    /// Command running remotely.
    Running,
    /// Command exited; the pane is kept for inspection.
    ExitedRemaining,
    /// Killed on request.
    Stopped,
}

impl SessionState {
    /// Whether the state machine allows moving to `next`.
    #[must_use]
    pub const fn can_become(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Running | Self::Stopped)
                | (Self::Running, Self::ExitedRemaining | Self::Stopped)
                | (Self::ExitedRemaining, Self::Stopped)
        )
    }
}

/// Registry entry for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    /// tmux session name on the target.
    pub remote_name: String,
    pub state: SessionState,
    /// Unix epoch seconds.
    pub created_at: i64,
}

impl SessionRecord {
    #[must_use]
    pub fn new(id: impl Into<String>, remote_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            remote_name: remote_name.into(),
            state: SessionState::Created,
            created_at: now(),
        }
    }

    /// Move to `next` if allowed. Returns whether the state changed.
    pub fn transition(&mut self, next: SessionState) -> bool {
        if self.state == next {
            return false;
        }
        if !self.state.can_become(next) {
            tracing::debug!(id = %self.id, from = ?self.state, to = ?next, "Ignoring invalid session transition");
            return false;
        }
        self.state = next;
        true
    }
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
