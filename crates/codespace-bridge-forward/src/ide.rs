//! Forwarding of IDE connections from the target.
//!
//! An editor extension running against the codespace advertises itself with
//! a lock file under `~/.copilot/ide/` on the target. Each live one gets its
//! socket forwarded over the SSH master and a local lock file pointing at the
//! forwarded socket, so a locally running agent finds the IDE as if it were
//! local.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use codespace_bridge_core::{RemoteShell, SocketForwarder};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::ForwardError;

/// Prefix of every lock file this bridge writes locally.
pub const FORWARDED_LOCK_PREFIX: &str = "codespace-bridge-";

const LOCK_BOUNDARY: &str = "===IDE_LOCK_BOUNDARY===";

/// Lists every remote lock file as `boundary, file name, content`.
const LIST_LOCKS_SCRIPT: &str = r#"d="$HOME/.copilot/ide"; [ -d "$d" ] || exit 0; for f in "$d"/*.lock; do [ -f "$f" ] || continue; echo "===IDE_LOCK_BOUNDARY==="; basename "$f"; cat "$f"; echo; done"#;

/// Lock file an IDE extension writes to announce itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdeLockFile {
    pub socket_path: String,
    #[serde(default)]
    pub scheme: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub pid: i64,
    pub ide_name: String,
    /// Unix epoch milliseconds.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub workspace_folders: Vec<String>,
    #[serde(default)]
    pub is_trusted: bool,
}

impl IdeLockFile {
    fn is_complete(&self) -> bool {
        !self.socket_path.is_empty() && !self.ide_name.is_empty() && !self.workspace_folders.is_empty()
    }

    /// Local copy pointing at the forwarded socket and owned by this process.
    #[must_use]
    pub fn localized(&self, socket: &Path, workdir: &str) -> Self {
        Self {
            socket_path: socket.to_string_lossy().into_owned(),
            pid: i64::from(std::process::id()),
            timestamp: now_millis(),
            workspace_folders: vec![workdir.to_string()],
            ..self.clone()
        }
    }
}

/// One forwarded IDE connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdeForward {
    pub ide_name: String,
    pub lock_path: PathBuf,
    pub socket_path: PathBuf,
}

/// `~/.copilot/ide` on this machine.
#[must_use]
pub fn default_lock_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".copilot").join("ide"))
}

/// Split the output of the remote listing into named lock files.
///
/// Entries that do not parse or miss the socket, name or workspace are
/// skipped.
#[must_use]
pub fn parse_lock_listing(stdout: &str) -> Vec<(String, IdeLockFile)> {
    stdout
        .split(LOCK_BOUNDARY)
        .filter_map(|part| {
            let (name, content) = part.trim().split_once('\n')?;
            match serde_json::from_str::<IdeLockFile>(content.trim()) {
                Ok(lock) if lock.is_complete() => Some((name.trim().to_string(), lock)),
                Ok(_) => None,
                Err(e) => {
                    tracing::debug!(name = name.trim(), error = %e, "Skipping unreadable IDE lock file");
                    None
                }
            }
        })
        .collect()
}

/// Lock files on the target whose IDE process is still running.
///
/// # Errors
/// Returns `RemoteCommand` if the listing fails.
pub async fn fetch_lock_files<S: RemoteShell + ?Sized>(shell: &S) -> Result<Vec<(String, IdeLockFile)>, ForwardError> {
    let output = shell.exec(LIST_LOCKS_SCRIPT).await?;
    if !output.success() {
        return Err(ForwardError::RemoteCommand {
            context: "list IDE lock files",
            exit_code: output.exit_code,
            stderr: output.failure_detail(),
        });
    }

    let mut live = Vec::new();
    for (name, lock) in parse_lock_listing(&output.stdout) {
        let check = shell
            .exec(&format!("kill -0 {} 2>/dev/null && echo alive", lock.pid))
            .await?;
        if check.stdout.contains("alive") {
            live.push((name, lock));
        } else {
            tracing::debug!(name, pid = lock.pid, "IDE process gone on target");
        }
    }
    Ok(live)
}

/// Forward every live IDE on the target and write local lock files for them.
///
/// Stale lock files left by earlier runs are removed first. A forward that
/// fails is logged and skipped.
///
/// # Errors
/// Returns an error if the lock directory cannot be created or the remote
/// listing fails.
pub async fn forward_ide_connections<S>(
    shell: &S,
    target: &str,
    workdir: &str,
    lock_dir: &Path,
    socket_dir: &Path,
) -> Result<Vec<IdeForward>, ForwardError>
where
    S: RemoteShell + SocketForwarder + ?Sized,
{
    tokio::fs::create_dir_all(lock_dir).await?;
    clean_stale_forwards(lock_dir).await;

    let mut forwards = Vec::new();
    for (name, remote) in fetch_lock_files(shell).await? {
        let hash = short_hash(&format!("{target}:{name}"));
        let socket_path = socket_dir.join(format!("codespace-bridge-ide-{hash}.sock"));
        if let Err(e) = shell.forward_socket(&socket_path, &remote.socket_path).await {
            tracing::warn!(ide = %remote.ide_name, error = %e, "IDE forward failed");
            continue;
        }

        let lock_path = lock_dir.join(format!("{FORWARDED_LOCK_PREFIX}{hash}.lock"));
        let local = remote.localized(&socket_path, workdir);
        let text = serde_json::to_string_pretty(&local)?;
        if let Err(e) = tokio::fs::write(&lock_path, text).await {
            tracing::warn!(path = %lock_path.display(), error = %e, "Cannot write IDE lock file");
            continue;
        }

        tracing::info!(ide = %remote.ide_name, socket = %socket_path.display(), "Forwarded IDE connection");
        forwards.push(IdeForward {
            ide_name: remote.ide_name,
            lock_path,
            socket_path,
        });
    }
    Ok(forwards)
}

/// Remove the lock files and sockets of `forwards`. Best effort.
pub async fn remove_forwards(forwards: &[IdeForward]) {
    for forward in forwards {
        remove_quietly(&forward.lock_path).await;
        remove_quietly(&forward.socket_path).await;
    }
}

/// Remove lock files written by earlier runs whose process has exited.
///
/// Returns how many were removed.
pub async fn clean_stale_forwards(lock_dir: &Path) -> usize {
    let Ok(mut entries) = tokio::fs::read_dir(lock_dir).await else {
        return 0;
    };

    let mut removed = 0;
    while let Ok(Some(entry)) = entries.next_entry().await {
        if !entry.file_name().to_string_lossy().starts_with(FORWARDED_LOCK_PREFIX) {
            continue;
        }
        let path = entry.path();
        let Ok(text) = tokio::fs::read_to_string(&path).await else {
            continue;
        };
        match serde_json::from_str::<IdeLockFile>(&text) {
            Ok(lock) if pid_alive(lock.pid) => continue,
            Ok(lock) => remove_quietly(Path::new(&lock.socket_path)).await,
            Err(_) => {}
        }
        remove_quietly(&path).await;
        tracing::debug!(path = %path.display(), "Removed stale IDE lock file");
        removed += 1;
    }
    removed
}

async fn remove_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::debug!(path = %path.display(), error = %e, "Cannot remove file"),
    }
}

fn short_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    hex::encode(&digest[..8])
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[cfg(unix)]
fn pid_alive(pid: i64) -> bool {
    use nix::{errno::Errno, sys::signal::kill, unistd::Pid};

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    // EPERM still means the process exists.
    raw > 0 && !matches!(kill(Pid::from_raw(raw), None), Err(Errno::ESRCH))
}

#[cfg(not(unix))]
fn pid_alive(pid: i64) -> bool {
    pid > 0
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use codespace_bridge_core::{ExecOutput, TransportError};
    use serde_json::json;

    use super::*;

    /// Target with two advertised IDEs, one of them dead.
    struct FakeTarget {
        listing: String,
        alive: Vec<i64>,
        refuse: Option<String>,
        forwarded: Mutex<Vec<(PathBuf, String)>>,
    }

    impl FakeTarget {
        fn new(locks: &[(&str, serde_json::Value)], alive: &[i64]) -> Self {
            let listing = locks
                .iter()
                .map(|(name, content)| format!("{LOCK_BOUNDARY}\n{name}\n{content}\n"))
                .collect();
            Self {
                listing,
                alive: alive.to_vec(),
                refuse: None,
                forwarded: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RemoteShell for FakeTarget {
        async fn exec_with_stdin(&self, command: &str, _stdin: Option<&[u8]>) -> Result<ExecOutput, TransportError> {
            if command == LIST_LOCKS_SCRIPT {
                return Ok(ExecOutput::new(self.listing.clone(), "", 0));
            }
            let pid: i64 = command
                .strip_prefix("kill -0 ")
                .and_then(|rest| rest.split_whitespace().next())
                .and_then(|p| p.parse().ok())
                .unwrap();
            Ok(if self.alive.contains(&pid) {
                ExecOutput::new("alive\n", "", 0)
            } else {
                ExecOutput::new("", "", 1)
            })
        }
    }

    #[async_trait]
    impl SocketForwarder for FakeTarget {
        async fn forward_socket(&self, local: &Path, remote: &str) -> Result<(), TransportError> {
            if self.refuse.as_deref() == Some(remote) {
                return Err(TransportError::Forward("administratively prohibited".to_string()));
            }
            self.forwarded.lock().unwrap().push((local.to_path_buf(), remote.to_string()));
            Ok(())
        }
    }

    fn lock(socket: &str, pid: i64) -> serde_json::Value {
        json!({
            "socketPath": socket,
            "scheme": "unix",
            "headers": {"Authorization": "Nonce abc"},
            "pid": pid,
            "ideName": "Visual Studio Code",
            "timestamp": 1,
            "workspaceFolders": ["/workspaces/app"],
            "isTrusted": true
        })
    }

    #[test]
    fn test_parse_lock_listing_skips_incomplete_entries() {
        let listing = format!(
            "{LOCK_BOUNDARY}\na.lock\n{}\n{LOCK_BOUNDARY}\nb.lock\nnot json\n{LOCK_BOUNDARY}\nc.lock\n{}\n",
            lock("/tmp/a.sock", 1),
            json!({"socketPath": "/tmp/c.sock", "ideName": "x", "workspaceFolders": []}),
        );
        let parsed = parse_lock_listing(&listing);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].0, "a.lock");
        assert_eq!(parsed[0].1.headers["Authorization"], "Nonce abc");
        assert!(parse_lock_listing("").is_empty());
    }

    #[tokio::test]
    async fn test_forwards_live_ides_only() {
        let dir = tempfile::tempdir().unwrap();
        let lock_dir = dir.path().join("ide");
        let target = FakeTarget::new(
            &[("live.lock", lock("/tmp/vscode-live.sock", 100)), ("dead.lock", lock("/tmp/vscode-dead.sock", 200))],
            &[100],
        );

        let forwards = tokio_test::assert_ok!(
            forward_ide_connections(&target, "my-cs", "/home/me/app", &lock_dir, dir.path()).await
        );
        assert_eq!(forwards.len(), 1);
        let forward = &forwards[0];
        assert!(forward.lock_path.file_name().unwrap().to_string_lossy().starts_with(FORWARDED_LOCK_PREFIX));

        let forwarded = target.forwarded.lock().unwrap().clone();
        assert_eq!(forwarded, [(forward.socket_path.clone(), "/tmp/vscode-live.sock".to_string())]);

        let written: IdeLockFile =
            serde_json::from_str(&std::fs::read_to_string(&forward.lock_path).unwrap()).unwrap();
        assert_eq!(written.socket_path, forward.socket_path.to_string_lossy());
        assert_eq!(written.pid, i64::from(std::process::id()));
        assert_eq!(written.workspace_folders, ["/home/me/app"]);
        assert_eq!(written.scheme, "unix");
        assert!(written.is_trusted);

        remove_forwards(&forwards).await;
        assert!(!forward.lock_path.exists());
    }

    #[tokio::test]
    async fn test_refused_forward_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut target = FakeTarget::new(
            &[("a.lock", lock("/tmp/a.sock", 7)), ("b.lock", lock("/tmp/b.sock", 7))],
            &[7],
        );
        target.refuse = Some("/tmp/a.sock".to_string());

        let forwards = forward_ide_connections(&target, "my-cs", "/w", dir.path(), dir.path())
            .await
            .unwrap();
        assert_eq!(forwards.len(), 1);
        assert_eq!(target.forwarded.lock().unwrap()[0].1, "/tmp/b.sock");
    }

    #[tokio::test]
    async fn test_socket_names_are_stable_per_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = FakeTarget::new(&[("a.lock", lock("/tmp/a.sock", 7))], &[7]);
        let first = forward_ide_connections(&target, "cs-one", "/w", dir.path(), dir.path())
            .await
            .unwrap();
        let again = forward_ide_connections(&target, "cs-one", "/w", dir.path(), dir.path())
            .await
            .unwrap();
        let other = forward_ide_connections(&target, "cs-two", "/w", dir.path(), dir.path())
            .await
            .unwrap();
        assert_eq!(first[0].socket_path, again[0].socket_path);
        assert_ne!(first[0].socket_path, other[0].socket_path);
    }

    #[tokio::test]
    async fn test_listing_failure_is_an_error() {
        struct Broken;

        #[async_trait]
        impl RemoteShell for Broken {
            async fn exec_with_stdin(&self, _command: &str, _stdin: Option<&[u8]>) -> Result<ExecOutput, TransportError> {
                Ok(ExecOutput::new("", "permission denied", 1))
            }
        }

        let err = tokio_test::assert_err!(fetch_lock_files(&Broken).await);
        assert!(matches!(err, ForwardError::RemoteCommand { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_clean_stale_forwards() {
        let dir = tempfile::tempdir().unwrap();
        let stale_socket = dir.path().join("stale.sock");
        std::fs::write(&stale_socket, "").unwrap();

        let write = |name: &str, content: String| std::fs::write(dir.path().join(name), content).unwrap();
        write(
            "codespace-bridge-live.lock",
            lock("/tmp/live.sock", i64::from(std::process::id())).to_string(),
        );
        write("codespace-bridge-stale.lock", lock(&stale_socket.to_string_lossy(), 0).to_string());
        write("codespace-bridge-garbage.lock", "{".to_string());
        write("vscode-own.lock", lock("/tmp/own.sock", 0).to_string());

        assert_eq!(clean_stale_forwards(dir.path()).await, 2);
        assert!(dir.path().join("codespace-bridge-live.lock").exists());
        assert!(dir.path().join("vscode-own.lock").exists());
        assert!(!dir.path().join("codespace-bridge-stale.lock").exists());
        assert!(!dir.path().join("codespace-bridge-garbage.lock").exists());
        assert!(!stale_socket.exists());
    }

    #[test]
    fn test_short_hash() {
        assert_eq!(short_hash("my-cs:a.lock").len(), 16);
        assert_ne!(short_hash("my-cs:a.lock"), short_hash("my-cs:b.lock"));
    }
}
