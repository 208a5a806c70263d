use codespace_bridge_core::TransportError;
use thiserror::Error;

/// Forwarding error.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("Invalid environment variable name: {0:?}")]
    InvalidEnvName(String),
    #[error("Invalid environment assignment {0:?} (expected K=V)")]
    InvalidEnvPair(String),
    #[error("Descriptor has no command")]
    MissingCommand,
    #[error("Malformed document: {0}")]
    Malformed(String),
    #[error("Nothing to rewrite")]
    NothingToRewrite,
    #[error("Unsupported environment: {0}")]
    UnsupportedEnvironment(String),
    #[error("{context} failed (exit {exit_code}): {stderr}")]
    RemoteCommand {
        context: &'static str,
        exit_code: i32,
        stderr: String,
    },
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Cannot quote argument: {0}")]
    Quote(#[from] shlex::QuoteError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
