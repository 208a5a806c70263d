//! Deployment of the exec helper onto the target.
//!
//! The helper is this binary itself, so it can only be deployed when the
//! local build is Linux on the same architecture as the target.

use std::path::Path;

use codespace_bridge_core::{RemoteShell, codec, quote};

use crate::ForwardError;

pub const HELPER_DIR: &str = "/tmp/codespace-bridge-bin";
pub const HELPER_PATH: &str = "/tmp/codespace-bridge-bin/codespace-bridge";

/// Normalize `uname -m` output to Rust's architecture names.
fn normalize_arch(machine: &str) -> Option<&'static str> {
    match machine.trim() {
        "x86_64" | "amd64" => Some("x86_64"),
        "aarch64" | "arm64" => Some("aarch64"),
        _ => None,
    }
}

/// Architecture of this build, if it can run on a Linux target at all.
fn local_arch() -> Option<&'static str> {
    (std::env::consts::OS == "linux")
        .then(|| normalize_arch(std::env::consts::ARCH))
        .flatten()
}

/// Make sure the helper at [`HELPER_PATH`] matches `local_binary`.
///
/// Uploads only when the remote copy is missing or differs in size.
/// Returns the remote helper path.
///
/// # Errors
/// Returns `UnsupportedEnvironment` if the local binary cannot run on the
/// target, in which case callers fall back to shell assembly.
pub async fn deploy_helper<S>(shell: &S, local_binary: &Path) -> Result<String, ForwardError>
where
    S: RemoteShell + ?Sized,
{
    let Some(local) = local_arch() else {
        return Err(ForwardError::UnsupportedEnvironment(format!(
            "local build is {}/{}",
            std::env::consts::OS,
            std::env::consts::ARCH
        )));
    };

    let uname = shell.exec("uname -m").await?;
    if !uname.success() {
        return Err(ForwardError::RemoteCommand {
            context: "uname",
            exit_code: uname.exit_code,
            stderr: uname.failure_detail(),
        });
    }
    let remote = normalize_arch(&uname.stdout);
    if remote != Some(local) {
        return Err(ForwardError::UnsupportedEnvironment(format!(
            "target architecture {:?} does not match local {local}",
            uname.stdout.trim()
        )));
    }

    let binary = tokio::fs::read(local_binary).await?;
    let path = quote(HELPER_PATH)?;

    let stat = shell.exec(&format!("stat -c %s {path} 2>/dev/null || echo 0")).await?;
    let remote_size = stat.stdout.trim().parse::<u64>().unwrap_or(0);
    if remote_size == binary.len() as u64 {
        tracing::debug!(size = remote_size, "Helper already deployed");
        return Ok(HELPER_PATH.to_string());
    }

    tracing::info!(size = binary.len(), "Deploying exec helper");
    let script = format!(
        "mkdir -p {} && base64 -d > {path} && chmod +x {path}",
        quote(HELPER_DIR)?
    );
    let encoded = codec::encode(&binary);
    let output = shell.exec_with_stdin(&script, Some(encoded.as_bytes())).await?;
    if !output.success() {
        return Err(ForwardError::RemoteCommand {
            context: "helper upload",
            exit_code: output.exit_code,
            stderr: output.failure_detail(),
        });
    }
    Ok(HELPER_PATH.to_string())
}
