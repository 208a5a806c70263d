//! Remote operation context.

use std::{collections::BTreeMap, time::Duration};

use shlex::QuoteError;
use thiserror::Error;

use crate::quote;

/// Error rendering a remote script.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Cannot quote value: {0}")]
    Quote(#[from] QuoteError),
    #[error("Invalid environment variable name: {0:?}")]
    InvalidEnvName(String),
}

/// One remote command with its execution context.
///
/// Ephemeral: built per request, never touches connection state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteOperation {
    /// Shell command text, run as-is by the remote shell.
    pub command: String,

    /// Working directory override; the configured remote root otherwise.
    pub working_dir: Option<String>,

    /// Environment bindings exported before the command runs.
    pub env: BTreeMap<String, String>,

    /// Local deadline for the round trip.
    pub timeout: Option<Duration>,
}

impl RemoteOperation {
    /// Create an operation with just a command.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    /// Set the working directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Add an environment binding.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set a local deadline.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Render the full remote script, changing into `default_dir` unless
    /// a working directory override is set.
    ///
    /// # Errors
    /// Returns error if an environment name is not a valid identifier or a
    /// value contains a NUL byte.
    pub fn to_script(&self, default_dir: &str) -> Result<String, ScriptError> {
        let dir = self.working_dir.as_deref().unwrap_or(default_dir);
        let mut script = format!("cd {}", quote(dir)?);
        for (key, value) in &self.env {
            if !is_env_name(key) {
                return Err(ScriptError::InvalidEnvName(key.clone()));
            }
            script.push_str(&format!(" && export {key}={}", quote(value)?));
        }
        script.push_str(" && ");
        script.push_str(&self.command);
        Ok(script)
    }
}

/// Whether `name` is usable as a shell variable name.
#[must_use]
pub fn is_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}
