//! Local process spawning for the SSH client.

use std::process::{ExitStatus, Stdio};

use codespace_bridge_core::{ExecOutput, TransportError};
use tokio::{io::AsyncWriteExt, process::Command};

/// Run `program` to completion and capture its output.
///
/// Stdin is never inherited: the bridge's own stdin carries the tool
/// protocol, so a child that reads it would swallow requests.
pub(crate) async fn run(
    program: &str,
    args: &[String],
    stdin: Option<&[u8]>,
) -> Result<ExecOutput, TransportError> {
    let mut cmd = Command::new(program);
    // Dropping the future (caller deadline) must not leave the client behind.
    cmd.kill_on_drop(true)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

    let mut child = cmd.spawn().map_err(|source| TransportError::Spawn {
        program: program.to_string(),
        source,
    })?;

    let writer = match (child.stdin.take(), stdin) {
        (Some(mut pipe), Some(input)) => {
            let data = input.to_vec();
            Some(tokio::spawn(async move {
                pipe.write_all(&data).await?;
                pipe.shutdown().await
            }))
        }
        _ => None,
    };

    let output = child.wait_with_output().await?;

    if let Some(writer) = writer {
        match writer.await {
            Ok(Err(e)) if e.kind() != std::io::ErrorKind::BrokenPipe => {
                tracing::warn!(program, error = %e, "Failed to write stdin to child");
            }
            Err(e) => tracing::warn!(program, error = %e, "Stdin writer task failed"),
            _ => {}
        }
    }

    Ok(ExecOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        exit_code: output.status.code().unwrap_or(-1),
    })
}

/// Run `program` for its exit status only.
///
/// Stdout is discarded and stderr goes to our own stderr (the log stream).
/// Used for commands that fork a background process holding their pipes,
/// like `ssh -fN`.
pub(crate) async fn run_status(program: &str, args: &[String]) -> Result<ExitStatus, TransportError> {
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .status()
        .await
        .map_err(|source| TransportError::Spawn {
            program: program.to_string(),
            source,
        })
}
