//! Forwarding of automation descriptors onto the remote target.
//!
//! Provides:
//! - `Rewriter` - Turns server and hook descriptors into remote invocations
//! - Whole-document rewriting for tool server configs and hook files
//! - `build_agent_config` - The agent's tool server configuration
//! - Deployment of the remote exec helper and its argument handling
//! - Forwarding of IDE connections advertised on the target

pub mod config_files;
pub mod deploy;
pub mod descriptor;
pub mod error;
pub mod helper;
pub mod ide;
pub mod rewrite;

pub use config_files::{
    BRIDGE_SERVER_NAME, build_agent_config, rewrite_hooks_config, rewrite_server_config,
};
pub use deploy::{HELPER_DIR, HELPER_PATH, deploy_helper};
pub use descriptor::{ForwardingRule, HookDescriptor, ServerDescriptor};
pub use error::ForwardError;
pub use helper::{build_command, parse_env_pair};
pub use ide::{IdeForward, IdeLockFile, default_lock_dir, forward_ide_connections, remove_forwards};
pub use rewrite::{Rewriter, Strategy};
