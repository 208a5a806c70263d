//! Process configuration.

use std::{path::PathBuf, time::Duration};

/// Remote root used when none is configured.
pub const DEFAULT_WORKDIR: &str = "/workspaces";

/// Default cap on search/find result lines.
pub const DEFAULT_MAX_RESULTS: usize = 200;

/// Configuration shared by every component of one bridge process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Remote target identifier (codespace name).
    pub target: String,

    /// Remote root; default working directory for commands and searches.
    pub workdir: String,

    /// Local directory for the SSH config and control socket.
    pub state_dir: PathBuf,

    /// How long the SSH master lingers after the last client disconnects.
    pub control_persist: Duration,

    /// Wait between starting an async session and the first read.
    pub start_grace: Duration,

    /// Default wait before reading an async session.
    pub read_delay: Duration,

    /// Cap on lines returned by search and find.
    pub max_results: usize,
}

impl BridgeConfig {
    /// Configuration for `target` with defaults everywhere else.
    #[must_use]
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            workdir: DEFAULT_WORKDIR.to_string(),
            state_dir: Self::default_state_dir(),
            control_persist: Duration::from_secs(600),
            start_grace: Duration::from_secs(1),
            read_delay: Duration::from_secs(2),
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    /// Override the remote root. Empty values keep the default.
    #[must_use]
    pub fn with_workdir(mut self, workdir: impl Into<String>) -> Self {
        let workdir = workdir.into();
        let trimmed = workdir.trim_end_matches('/');
        if !trimmed.is_empty() {
            self.workdir = trimmed.to_string();
        } else if workdir.starts_with('/') {
            self.workdir = "/".to_string();
        }
        self
    }

    /// Override the local state directory.
    #[must_use]
    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = dir.into();
        self
    }

    /// `~/.codespace-bridge`, or a temp dir when there is no home.
    #[must_use]
    pub fn default_state_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(".codespace-bridge")
    }

    /// Control socket of the SSH master for this target.
    #[must_use]
    pub fn control_socket_path(&self) -> PathBuf {
        self.state_dir.join(format!(".ssh-{}", self.target))
    }

    /// Generated SSH config for this target.
    #[must_use]
    pub fn ssh_config_path(&self) -> PathBuf {
        self.state_dir.join(format!(".ssh-config-{}", self.target))
    }
}
