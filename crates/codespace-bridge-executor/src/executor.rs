use std::sync::Arc;

use codespace_bridge_core::{BridgeConfig, ExecOutput, RemoteOperation, RemoteShell, quote};

use crate::ExecutorError;

/// Exit status a guard script uses to report a missing path.
pub(crate) const MISSING_STATUS: i32 = 44;

/// Runs file and command operations on the target.
///
/// Holds no state between calls besides its configuration; every operation
/// is rebuilt from its arguments.
pub struct RemoteExecutor<S> {
    pub(crate) shell: Arc<S>,
    pub(crate) workdir: String,
    pub(crate) max_results: usize,
}

impl<S: RemoteShell> RemoteExecutor<S> {
    /// Create an executor rooted at the configured remote workdir.
    #[must_use]
    pub fn new(shell: Arc<S>, config: &BridgeConfig) -> Self {
        Self {
            shell,
            workdir: config.workdir.clone(),
            max_results: config.max_results,
        }
    }

    /// Remote root that relative paths resolve against.
    #[must_use]
    pub fn workdir(&self) -> &str {
        &self.workdir
    }

    /// Run an arbitrary command with its context.
    ///
    /// Output and exit status are returned as they are; a non-zero exit is
    /// not an error.
    ///
    /// # Errors
    /// Returns error if the script cannot be rendered, the round trip fails,
    /// or the operation's deadline passes.
    pub async fn run(&self, op: &RemoteOperation) -> Result<ExecOutput, ExecutorError> {
        let script = op.to_script(&self.workdir)?;
        tracing::debug!(command = %op.command, "Running remote command");
        let output = match op.timeout {
            Some(timeout) => self.shell.exec_with_timeout(&script, timeout).await?,
            None => self.shell.exec(&script).await?,
        };
        Ok(output)
    }

    /// Prefix `script` with a change into the remote root.
    pub(crate) fn in_workdir(&self, script: &str) -> Result<String, ExecutorError> {
        Ok(format!("cd {} && {script}", quote(&self.workdir)?))
    }
}
