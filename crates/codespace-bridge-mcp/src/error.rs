use codespace_bridge_executor::ExecutorError;
use codespace_bridge_session::SessionError;
use thiserror::Error;

/// Error returned by a tool; always reported to the caller as a tool result
/// with `isError: true`.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Malformed request: {0}")]
    MalformedRequest(String),
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error(transparent)]
    Executor(#[from] ExecutorError),
    #[error(transparent)]
    Session(#[from] SessionError),
}
