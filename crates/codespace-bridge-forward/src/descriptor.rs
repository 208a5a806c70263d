//! Automation descriptors as other local tooling writes them.

use std::collections::BTreeMap;

use codespace_bridge_core::CommandParts;
use serde::{Deserialize, Serialize};

/// A tool server launched over stdio: `{command, args, env}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
}

/// A lifecycle hook: shell code plus where and how to run it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookDescriptor {
    pub bash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// A descriptor together with the local invocation that runs it remotely.
///
/// The forwarded invocation carries the working directory and environment
/// itself; it has no separate cwd or env.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardingRule<D> {
    pub source: D,
    pub forwarded: CommandParts,
}

impl<D> ForwardingRule<D> {
    /// The forwarded invocation as one shell command line.
    ///
    /// # Errors
    /// Returns error if a word contains a NUL byte.
    pub fn command_line(&self) -> Result<String, shlex::QuoteError> {
        self.forwarded.render()
    }
}
