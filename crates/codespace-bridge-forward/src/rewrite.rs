//! Descriptor rewriting.
//!
//! The addressing prefix (for example `gh codespace ssh -c <name> --`) hands
//! its trailing words to the remote login shell joined by spaces, as `ssh`
//! does. Every remote word is therefore quoted exactly once here, so the
//! remote shell sees the same argv the descriptor asked for.

use std::collections::BTreeMap;

use codespace_bridge_core::{CommandParts, is_env_name, quote, quote_all};

use crate::{
    ForwardError,
    descriptor::{ForwardingRule, HookDescriptor, ServerDescriptor},
};

/// How the remote side sets up the working directory and environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// The exec helper is deployed at `helper`; arguments stay structured.
    Structured { helper: String },
    /// Plain `bash -c` with the setup assembled as shell code.
    ShellAssembly,
}

/// Rewrites descriptors for one target.
#[derive(Debug, Clone)]
pub struct Rewriter {
    addressing: CommandParts,
    workdir: String,
    strategy: Strategy,
}

impl Rewriter {
    #[must_use]
    pub fn new(addressing: CommandParts, workdir: impl Into<String>, strategy: Strategy) -> Self {
        Self {
            addressing,
            workdir: workdir.into(),
            strategy,
        }
    }

    #[must_use]
    pub const fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    /// Remote directory for a descriptor's `cwd`.
    #[must_use]
    pub fn resolve_dir(&self, cwd: Option<&str>) -> String {
        match cwd.map(str::trim) {
            None | Some("" | ".") => self.workdir.clone(),
            Some(dir) if dir.starts_with('/') => dir.to_string(),
            Some(dir) => {
                let dir = dir.strip_prefix("./").unwrap_or(dir);
                format!("{}/{dir}", self.workdir.trim_end_matches('/'))
            }
        }
    }

    /// Forward a stdio tool server.
    ///
    /// # Errors
    /// Returns `MissingCommand` for an empty command and `InvalidEnvName`
    /// for an environment key that is not an identifier.
    pub fn rewrite_server(
        &self,
        server: &ServerDescriptor,
    ) -> Result<ForwardingRule<ServerDescriptor>, ForwardError> {
        if server.command.trim().is_empty() {
            return Err(ForwardError::MissingCommand);
        }
        let dir = self.resolve_dir(server.cwd.as_deref());
        check_env(&server.env)?;

        let remote = match &self.strategy {
            Strategy::Structured { helper } => {
                let mut words = helper_prefix(helper, &dir, &server.env);
                words.push(server.command.clone());
                words.extend(server.args.iter().cloned());
                words
            }
            Strategy::ShellAssembly => {
                let program = std::iter::once(server.command.as_str()).chain(server.args.iter().map(String::as_str));
                let script = format!("{} && exec {}", setup_script(&dir, &server.env)?, quote_all(program)?);
                vec!["bash".to_string(), "-c".to_string(), script]
            }
        };

        Ok(ForwardingRule {
            source: server.clone(),
            forwarded: self.forward(&remote)?,
        })
    }

    /// Forward a hook. The hook body is shell code and runs under `bash -c`.
    ///
    /// # Errors
    /// Returns `MissingCommand` for an empty body and `InvalidEnvName` for
    /// an environment key that is not an identifier.
    pub fn rewrite_hook(&self, hook: &HookDescriptor) -> Result<ForwardingRule<HookDescriptor>, ForwardError> {
        if hook.bash.trim().is_empty() {
            return Err(ForwardError::MissingCommand);
        }
        let dir = self.resolve_dir(hook.cwd.as_deref());
        check_env(&hook.env)?;

        let remote = match &self.strategy {
            Strategy::Structured { helper } => {
                let mut words = helper_prefix(helper, &dir, &hook.env);
                words.extend(["bash".to_string(), "-c".to_string(), hook.bash.clone()]);
                words
            }
            Strategy::ShellAssembly => {
                let script = format!("{} && {}", setup_script(&dir, &hook.env)?, hook.bash);
                vec!["bash".to_string(), "-c".to_string(), script]
            }
        };

        Ok(ForwardingRule {
            source: hook.clone(),
            forwarded: self.forward(&remote)?,
        })
    }

    fn forward(&self, remote: &[String]) -> Result<CommandParts, ForwardError> {
        let quoted = remote.iter().map(|w| quote(w)).collect::<Result<Vec<_>, _>>()?;
        Ok(self.addressing.clone().extend_args(quoted))
    }
}

fn check_env(env: &BTreeMap<String, String>) -> Result<(), ForwardError> {
    match env.keys().find(|k| !is_env_name(k)) {
        Some(bad) => Err(ForwardError::InvalidEnvName(bad.clone())),
        None => Ok(()),
    }
}

/// `<helper> exec --workdir <dir> --env K=V ... --`
fn helper_prefix(helper: &str, dir: &str, env: &BTreeMap<String, String>) -> Vec<String> {
    let mut words = vec![
        helper.to_string(),
        "exec".to_string(),
        "--workdir".to_string(),
        dir.to_string(),
    ];
    for (key, value) in env {
        words.push("--env".to_string());
        words.push(format!("{key}={value}"));
    }
    words.push("--".to_string());
    words
}

/// `cd <dir> && export K=<v> && ...`
fn setup_script(dir: &str, env: &BTreeMap<String, String>) -> Result<String, ForwardError> {
    let mut script = format!("cd {}", quote(dir)?);
    for (key, value) in env {
        script.push_str(&format!(" && export {key}={}", quote(value)?));
    }
    Ok(script)
}
