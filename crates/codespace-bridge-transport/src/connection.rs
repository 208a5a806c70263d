//! The single channel every remote round trip goes through.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use codespace_bridge_core::{
    BridgeConfig, CommandParts, ExecOutput, RemoteShell, SocketForwarder, TargetDiscovery,
    TransportError,
};
use tokio::sync::Mutex;

use crate::{process, ssh_config};

const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(60);

/// How remote commands reach the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Every call goes through the discovery collaborator's own invocation.
    Direct,
    /// Calls share one authenticated SSH master.
    Multiplexed { host_alias: String },
}

/// Connection to one remote target.
///
/// Construct once per target and share it by `Arc`. Round trips are
/// serialized: at most one remote command is in flight at a time.
pub struct Connection {
    target: String,
    control_path: PathBuf,
    ssh_config_path: PathBuf,
    state_dir: PathBuf,
    control_persist: Duration,
    handshake_timeout: Duration,
    ssh_program: String,
    discovery: Arc<dyn TargetDiscovery>,
    mode: Mode,
    lock: Mutex<()>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("target", &self.target)
            .field("control_path", &self.control_path)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Create an un-established connection in direct mode.
    #[must_use]
    pub fn new(config: &BridgeConfig, discovery: Arc<dyn TargetDiscovery>) -> Self {
        Self {
            target: config.target.clone(),
            control_path: config.control_socket_path(),
            ssh_config_path: config.ssh_config_path(),
            state_dir: config.state_dir.clone(),
            control_persist: config.control_persist,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            ssh_program: "ssh".to_string(),
            discovery,
            mode: Mode::Direct,
            lock: Mutex::new(()),
        }
    }

    /// Use a specific SSH client binary.
    #[must_use]
    pub fn with_ssh_program(mut self, program: impl Into<String>) -> Self {
        self.ssh_program = program.into();
        self
    }

    /// Bound how long the master handshake may take.
    #[must_use]
    pub const fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Try to bring up the multiplexed channel.
    ///
    /// Never fails: on any problem the connection stays in direct mode and
    /// every call pays the full connection setup instead. Returns whether
    /// multiplexing is active.
    pub async fn establish(&mut self) -> bool {
        match self.try_establish().await {
            Ok(host_alias) => {
                tracing::info!(
                    target_name = %self.target,
                    host = %host_alias,
                    control_path = %self.control_path.display(),
                    "SSH multiplexing established"
                );
                self.mode = Mode::Multiplexed { host_alias };
                true
            }
            Err(e) => {
                tracing::warn!(
                    target_name = %self.target,
                    error = %e,
                    "SSH multiplexing unavailable, falling back to direct invocation"
                );
                if !self.discovery.is_reachable(&self.target).await {
                    tracing::warn!(target_name = %self.target, "Target is not accepting remote commands");
                }
                self.mode = Mode::Direct;
                false
            }
        }
    }

    async fn try_establish(&self) -> Result<String, TransportError> {
        let profile = self.discovery.connection_profile(&self.target).await?;

        tokio::fs::create_dir_all(&self.state_dir).await?;
        let config = ssh_config::with_control_options(
            &profile.ssh_config,
            &self.control_path,
            self.control_persist,
        );
        ssh_config::write_private(&self.ssh_config_path, &config).await?;

        let args = vec![
            "-F".to_string(),
            self.ssh_config_path.to_string_lossy().into_owned(),
            "-o".to_string(),
            "ControlMaster=yes".to_string(),
            "-o".to_string(),
            format!("ControlPersist={}", self.control_persist.as_secs()),
            "-fN".to_string(),
            profile.host_alias.clone(),
        ];
        let status = tokio::time::timeout(
            self.handshake_timeout,
            process::run_status(&self.ssh_program, &args),
        )
        .await
        .map_err(|_| TransportError::Timeout(self.handshake_timeout))??;

        if !status.success() {
            return Err(TransportError::Handshake(format!(
                "ssh master exited with {status}"
            )));
        }
        Ok(profile.host_alias)
    }

    /// Local invocation that runs `command` on the target.
    #[must_use]
    pub fn invocation(&self, command: &str) -> CommandParts {
        match &self.mode {
            Mode::Multiplexed { host_alias } => self.ssh_prefix().extend_args([host_alias.as_str(), command]),
            Mode::Direct => self.discovery.direct_invocation(&self.target).arg(command),
        }
    }

    /// Prefix any local process can use to run a command on the target.
    ///
    /// Independent of the master's lifetime, so it stays valid after this
    /// process exits.
    #[must_use]
    pub fn addressing(&self) -> CommandParts {
        self.discovery.direct_invocation(&self.target)
    }

    /// Ask the master to exit. Best effort.
    pub async fn close(&self) {
        let Mode::Multiplexed { host_alias } = &self.mode else {
            return;
        };
        let parts = self.ssh_prefix().extend_args(["-O", "exit", host_alias.as_str()]);
        match process::run(&parts.program, &parts.args, None).await {
            Ok(output) if output.success() => tracing::debug!("SSH master stopped"),
            Ok(output) => tracing::debug!(detail = %output.failure_detail(), "SSH master did not stop"),
            Err(e) => tracing::debug!(error = %e, "Failed to stop SSH master"),
        }
    }

    fn ssh_prefix(&self) -> CommandParts {
        CommandParts::new(
            &self.ssh_program,
            vec!["-F".to_string(), self.ssh_config_path.to_string_lossy().into_owned()],
        )
    }

    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    #[must_use]
    pub const fn mode(&self) -> &Mode {
        &self.mode
    }

    #[must_use]
    pub const fn is_multiplexed(&self) -> bool {
        matches!(self.mode, Mode::Multiplexed { .. })
    }

    #[must_use]
    pub fn control_path(&self) -> &Path {
        &self.control_path
    }

    #[must_use]
    pub fn ssh_config_path(&self) -> &Path {
        &self.ssh_config_path
    }
}

#[async_trait]
impl RemoteShell for Connection {
    async fn exec_with_stdin(
        &self,
        command: &str,
        stdin: Option<&[u8]>,
    ) -> Result<ExecOutput, TransportError> {
        let parts = self.invocation(command);
        let _guard = self.lock.lock().await;
        tracing::trace!(command, "Remote exec");
        process::run(&parts.program, &parts.args, stdin).await
    }
}

#[async_trait]
impl SocketForwarder for Connection {
    /// Forward a local Unix socket to a socket on the target.
    ///
    /// # Errors
    /// Returns `NotMultiplexed` in direct mode, or `Forward` if the master
    /// refuses the request.
    async fn forward_socket(&self, local: &Path, remote: &str) -> Result<(), TransportError> {
        let Mode::Multiplexed { host_alias } = &self.mode else {
            return Err(TransportError::NotMultiplexed);
        };

        match tokio::fs::remove_file(local).await {
            Ok(()) => tracing::debug!(path = %local.display(), "Removed stale local socket"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let parts = self.ssh_prefix().extend_args([
            "-o".to_string(),
            "StreamLocalBindUnlink=yes".to_string(),
            "-O".to_string(),
            "forward".to_string(),
            "-L".to_string(),
            format!("{}:{remote}", local.display()),
            host_alias.clone(),
        ]);
        let output = process::run(&parts.program, &parts.args, None).await?;
        if !output.success() {
            return Err(TransportError::Forward(output.failure_detail()));
        }
        tracing::info!(local = %local.display(), remote, "Forwarding socket to target");
        Ok(())
    }
}
