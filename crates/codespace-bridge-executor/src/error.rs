use codespace_bridge_core::{ScriptError, TransportError};
use thiserror::Error;

/// Executor error.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("old_str found {count} times in {path}, must be unique")]
    AmbiguousMatch { path: String, count: usize },
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{context} failed (exit {exit_code}): {stderr}")]
    RemoteCommand {
        context: &'static str,
        exit_code: i32,
        stderr: String,
    },
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Script(#[from] ScriptError),
}

impl From<shlex::QuoteError> for ExecutorError {
    fn from(e: shlex::QuoteError) -> Self {
        Self::Script(ScriptError::Quote(e))
    }
}
