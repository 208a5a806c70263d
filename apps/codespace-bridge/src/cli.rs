//! Command line definition.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use codespace_bridge_core::BridgeConfig;

#[derive(Parser, Debug)]
#[command(name = "codespace-bridge", version)]
#[command(about = "Run agent tools against a remote GitHub codespace")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the remote_* tools over stdio
    Serve {
        #[command(flatten)]
        target: TargetArgs,

        /// Do not forward IDE connections from the codespace
        #[arg(long)]
        no_ide: bool,
    },

    /// Run a command in a directory with extra environment (remote helper)
    Exec {
        /// Working directory for the command
        #[arg(long)]
        workdir: Option<String>,

        /// Environment assignment, repeatable
        #[arg(long = "env", value_name = "K=V")]
        env: Vec<String>,

        /// Command and its arguments, after `--`
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },

    /// Forward a hooks or tool server document to the codespace
    Rewrite {
        #[command(flatten)]
        target: TargetArgs,

        /// Kind of document
        #[arg(value_enum)]
        kind: DocumentKind,

        /// Document to rewrite
        input: PathBuf,

        /// Write here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        strategy: StrategyArgs,
    },

    /// Print the agent's tool server configuration
    Config {
        #[command(flatten)]
        target: TargetArgs,

        /// Remote tool server document to forward alongside ours
        #[arg(long)]
        servers: Option<PathBuf>,

        /// Write here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        strategy: StrategyArgs,
    },
}

/// Which codespace to talk to and how.
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Codespace name
    #[arg(short = 'c', long, env = "CODESPACE_NAME")]
    pub codespace: String,

    /// Remote workspace root
    #[arg(long, env = "CODESPACE_WORKDIR")]
    pub workdir: Option<String>,

    /// Local directory for the SSH config and control socket
    #[arg(long, env = "CODESPACE_BRIDGE_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// GitHub CLI binary
    #[arg(long, default_value = "gh")]
    pub gh: String,

    /// SSH client binary
    #[arg(long, default_value = "ssh")]
    pub ssh: String,
}

impl TargetArgs {
    pub fn config(&self) -> BridgeConfig {
        let mut config = BridgeConfig::new(&self.codespace).with_workdir(self.workdir.clone().unwrap_or_default());
        if let Some(dir) = &self.state_dir {
            config = config.with_state_dir(dir);
        }
        config
    }
}

#[derive(Args, Debug, Clone)]
pub struct StrategyArgs {
    /// How forwarded commands set up their directory and environment
    #[arg(long, value_enum, default_value_t = StrategyChoice::Auto)]
    pub strategy: StrategyChoice,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyChoice {
    /// Deploy the exec helper, falling back to shell assembly
    Auto,
    /// Require the exec helper
    Structured,
    /// Never deploy; assemble shell code
    Shell,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// `{"hooks": {...}}`
    Hooks,
    /// `{"mcpServers": {...}}`
    Servers,
}
