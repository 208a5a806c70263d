//! Core abstractions for running agent tools against a remote codespace.
//!
//! This crate provides the fundamental building blocks:
//! - `RemoteShell` - The seam every component uses to reach the target
//! - `SocketForwarder` - Local access to a socket on the target
//! - `TargetDiscovery` - Boundary to the collaborator that knows how to reach a target
//! - `RemoteOperation` - One remote command with its working directory and environment
//! - `CommandParts` and POSIX quoting helpers
//! - Base64 codec for binary-safe file transfer
//! - `BridgeConfig` - Process configuration

pub mod codec;
pub mod command;
pub mod config;
pub mod context;
pub mod traits;

pub use command::{CommandParts, quote, quote_all};
pub use config::BridgeConfig;
pub use context::{RemoteOperation, ScriptError, is_env_name};
pub use traits::{
    ConnectionProfile, ExecOutput, RemoteShell, SocketForwarder, TargetDiscovery, TransportError,
};
