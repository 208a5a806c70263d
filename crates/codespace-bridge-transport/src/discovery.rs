//! Target discovery through the GitHub CLI.

use std::time::Duration;

use async_trait::async_trait;
use codespace_bridge_core::{CommandParts, ConnectionProfile, TargetDiscovery, TransportError};

use crate::{process, ssh_config::parse_profile};

const REACHABILITY_TIMEOUT: Duration = Duration::from_secs(30);

/// Discovers codespaces with `gh codespace ssh`.
#[derive(Debug, Clone)]
pub struct GhCodespaceDiscovery {
    gh_program: String,
}

impl Default for GhCodespaceDiscovery {
    fn default() -> Self {
        Self::new("gh")
    }
}

impl GhCodespaceDiscovery {
    /// Use `gh_program` (a name on `PATH` or a full path).
    #[must_use]
    pub fn new(gh_program: impl Into<String>) -> Self {
        Self {
            gh_program: gh_program.into(),
        }
    }

    fn gh_args(args: &[&str]) -> Vec<String> {
        args.iter().map(ToString::to_string).collect()
    }
}

#[async_trait]
impl TargetDiscovery for GhCodespaceDiscovery {
    async fn connection_profile(&self, target: &str) -> Result<ConnectionProfile, TransportError> {
        let args = Self::gh_args(&["codespace", "ssh", "--config", "-c", target]);
        let output = process::run(&self.gh_program, &args, None).await?;
        if !output.success() {
            return Err(TransportError::Handshake(format!(
                "gh codespace ssh --config failed: {}",
                output.failure_detail()
            )));
        }
        parse_profile(&output.stdout).ok_or_else(|| {
            TransportError::Handshake("no Host entry in generated ssh config".to_string())
        })
    }

    async fn is_reachable(&self, target: &str) -> bool {
        let args = Self::gh_args(&["codespace", "ssh", "-c", target, "--", "true"]);
        match tokio::time::timeout(
            REACHABILITY_TIMEOUT,
            process::run(&self.gh_program, &args, None),
        )
        .await
        {
            Ok(Ok(output)) => output.success(),
            Ok(Err(e)) => {
                tracing::debug!(target, error = %e, "Reachability probe failed");
                false
            }
            Err(_) => false,
        }
    }

    fn direct_invocation(&self, target: &str) -> CommandParts {
        CommandParts::new(&self.gh_program, Self::gh_args(&["codespace", "ssh", "-c", target, "--"]))
    }
}
