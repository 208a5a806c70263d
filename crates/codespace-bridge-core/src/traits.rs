//! Core traits for reaching a remote target.

use std::{path::Path, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::CommandParts;

/// Captured result of one remote round trip.
///
/// A non-zero `exit_code` is data, not an error: callers decide what it means.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecOutput {
    /// Create a new output record.
    #[must_use]
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>, exit_code: i32) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    /// Whether the remote command exited with status 0.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Short failure description: stderr, else stdout, else the exit status.
    #[must_use]
    pub fn failure_detail(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        format!("command exited with {}", self.exit_code)
    }
}

/// Transport error.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Remote call timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),
    #[error("Handshake failed: {0}")]
    Handshake(String),
    #[error("SSH multiplexing not active")]
    NotMultiplexed,
    #[error("Socket forward failed: {0}")]
    Forward(String),
    #[error("Cannot quote argument: {0}")]
    Quote(#[from] shlex::QuoteError),
}

/// Something that can run a shell command on the remote target.
///
/// Implemented by the transport's `Connection`; tests substitute fakes.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Run a command and feed `stdin` to it, if given.
    async fn exec_with_stdin(
        &self,
        command: &str,
        stdin: Option<&[u8]>,
    ) -> Result<ExecOutput, TransportError>;

    /// Run a command.
    async fn exec(&self, command: &str) -> Result<ExecOutput, TransportError> {
        self.exec_with_stdin(command, None).await
    }

    /// Run a command, giving up locally once `timeout` elapses.
    ///
    /// The remote process is not guaranteed to stop.
    async fn exec_with_timeout(
        &self,
        command: &str,
        timeout: Duration,
    ) -> Result<ExecOutput, TransportError> {
        tokio::time::timeout(timeout, self.exec(command))
            .await
            .map_err(|_| TransportError::Timeout(timeout))?
    }
}

/// Something that can expose a socket on the target as a local socket.
#[async_trait]
pub trait SocketForwarder: Send + Sync {
    /// Make `remote` reachable at `local` until the channel closes.
    async fn forward_socket(&self, local: &Path, remote: &str) -> Result<(), TransportError>;
}

/// SSH connection parameters for a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionProfile {
    /// Host alias declared by the profile (`Host <alias>`).
    pub host_alias: String,
    /// Full SSH config text (proxy command, identity, etc).
    pub ssh_config: String,
}

/// Discovery collaborator: knows how to address a target.
#[async_trait]
pub trait TargetDiscovery: Send + Sync {
    /// Resolve SSH connection parameters for the target.
    async fn connection_profile(&self, target: &str) -> Result<ConnectionProfile, TransportError>;

    /// Whether the target currently accepts remote commands.
    async fn is_reachable(&self, target: &str) -> bool;

    /// Invocation prefix that runs a remote command without multiplexing.
    ///
    /// Remote words appended to it are joined with spaces and re-parsed by
    /// the remote login shell, as with plain `ssh host cmd...`.
    fn direct_invocation(&self, target: &str) -> CommandParts;
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct SlowShell {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RemoteShell for SlowShell {
        async fn exec_with_stdin(
            &self,
            command: &str,
            _stdin: Option<&[u8]>,
        ) -> Result<ExecOutput, TransportError> {
            self.calls.lock().unwrap().push(command.to_string());
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(ExecOutput::default())
        }
    }

    #[test]
    fn test_failure_detail_prefers_stderr() {
        let out = ExecOutput::new("out", " boom \n", 2);
        assert_eq!(out.failure_detail(), "boom");

        let out = ExecOutput::new("only stdout\n", "", 2);
        assert_eq!(out.failure_detail(), "only stdout");

        let out = ExecOutput::new("", "", 7);
        assert_eq!(out.failure_detail(), "command exited with 7");
        assert!(!out.success());
    }

    #[tokio::test]
    async fn test_exec_with_timeout_gives_up() {
        let shell = SlowShell {
            calls: Mutex::new(Vec::new()),
        };
        let err = tokio_test::assert_err!(
            shell
                .exec_with_timeout("sleep 100", Duration::from_millis(50))
                .await
        );
        assert!(matches!(err, TransportError::Timeout(_)));
        assert_eq!(shell.calls.lock().unwrap().as_slice(), ["sleep 100"]);
    }
}
