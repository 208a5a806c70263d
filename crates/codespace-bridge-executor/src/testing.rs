//! Shells for exercising the executor without a codespace.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use codespace_bridge_core::{BridgeConfig, ExecOutput, RemoteShell, TransportError};
use tempfile::TempDir;
use tokio::{io::AsyncWriteExt, process::Command};

use crate::RemoteExecutor;

/// Runs commands with the local `sh`.
pub struct LocalShell;

#[async_trait]
impl RemoteShell for LocalShell {
    async fn exec_with_stdin(
        &self,
        command: &str,
        stdin: Option<&[u8]>,
    ) -> Result<ExecOutput, TransportError> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        let mut pipe = child.stdin.take().unwrap();
        let data = stdin.unwrap_or_default().to_vec();
        let writer = tokio::spawn(async move {
            let _ = pipe.write_all(&data).await;
        });
        let output = child.wait_with_output().await?;
        writer.await.unwrap();
        Ok(ExecOutput::new(
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
            output.status.code().unwrap_or(-1),
        ))
    }
}

/// Executor over a fresh temp directory used as the remote root.
pub fn local_executor() -> (TempDir, RemoteExecutor<LocalShell>) {
    let dir = tempfile::tempdir().unwrap();
    let config = BridgeConfig::new("local").with_workdir(dir.path().to_string_lossy());
    (dir, RemoteExecutor::new(Arc::new(LocalShell), &config))
}

/// Replays canned outputs and records what it was asked to run.
pub struct ScriptedShell {
    pub calls: Mutex<Vec<(String, Option<Vec<u8>>)>>,
    replies: Mutex<Vec<ExecOutput>>,
}

impl ScriptedShell {
    pub fn new(replies: Vec<ExecOutput>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            replies: Mutex::new(replies),
        }
    }
}

#[async_trait]
impl RemoteShell for ScriptedShell {
    async fn exec_with_stdin(
        &self,
        command: &str,
        stdin: Option<&[u8]>,
    ) -> Result<ExecOutput, TransportError> {
        self.calls
            .lock()
            .unwrap()
            .push((command.to_string(), stdin.map(<[u8]>::to_vec)));
        let mut replies = self.replies.lock().unwrap();
        Ok(if replies.is_empty() {
            ExecOutput::default()
        } else {
            replies.remove(0)
        })
    }
}
